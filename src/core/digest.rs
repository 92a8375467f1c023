//! Streaming SHA-256 file digests.
//!
//! Digests are the tamper baseline for digital evidence. Files are read in
//! fixed-size chunks so large disk images never have to fit in memory.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::fs::{self, File};
use tokio::io::AsyncReadExt;
use tokio::time::timeout;

use super::error::DigestError;

/// Default read size for streaming digests (64 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Capability to fingerprint a file.
///
/// The evidence service only depends on this trait, so the hashing
/// strategy is chosen by whoever builds the service.
#[async_trait]
pub trait Digester: Send + Sync {
    /// Name of the digest algorithm
    fn algorithm(&self) -> &str;

    /// Compute the lowercase hex digest of the file at `path`
    async fn digest(&self, path: &Path) -> Result<String, DigestError>;
}

/// SHA-256 digester with an optional deadline
#[derive(Debug, Clone)]
pub struct Sha256Digester {
    chunk_size: usize,
    deadline: Option<Duration>,
}

impl Default for Sha256Digester {
    fn default() -> Self {
        Self::new()
    }
}

impl Sha256Digester {
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            deadline: None,
        }
    }

    /// Override the read chunk size (minimum 1 byte)
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Fail digests that take longer than `deadline`
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }
}

#[async_trait]
impl Digester for Sha256Digester {
    fn algorithm(&self) -> &str {
        "sha256"
    }

    async fn digest(&self, path: &Path) -> Result<String, DigestError> {
        match self.deadline {
            Some(limit) => with_deadline(path, limit, stream_digest(path, self.chunk_size)).await,
            None => stream_digest(path, self.chunk_size).await,
        }
    }
}

/// Compute the SHA-256 digest of a file as lowercase hex
pub async fn compute_digest(path: &Path) -> Result<String, DigestError> {
    stream_digest(path, DEFAULT_CHUNK_SIZE).await
}

/// Compute a digest, giving up once `limit` has elapsed.
///
/// Dropping the returned future cancels the read; no locks are held.
pub async fn compute_digest_with_deadline(
    path: &Path,
    limit: Duration,
) -> Result<String, DigestError> {
    with_deadline(path, limit, stream_digest(path, DEFAULT_CHUNK_SIZE)).await
}

async fn with_deadline<F>(path: &Path, limit: Duration, digest: F) -> Result<String, DigestError>
where
    F: std::future::Future<Output = Result<String, DigestError>>,
{
    timeout(limit, digest)
        .await
        .map_err(|_| DigestError::TimedOut {
            path: path.to_path_buf(),
            limit,
        })?
}

async fn stream_digest(path: &Path, chunk_size: usize) -> Result<String, DigestError> {
    let io_error = |source: std::io::Error| {
        if source.kind() == std::io::ErrorKind::NotFound {
            DigestError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            DigestError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    };

    let metadata = fs::metadata(path).await.map_err(io_error)?;
    if !metadata.is_file() {
        return Err(DigestError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let mut file = File::open(path).await.map_err(io_error)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; chunk_size.max(1)];

    loop {
        let read = file.read(&mut buffer).await.map_err(io_error)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}
