//! Error types for the custody ledger.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::domain::{EvidenceStatus, EvidenceType};

/// Errors from computing a file digest
#[derive(Debug, Error)]
pub enum DigestError {
    #[error("File not found or not a regular file: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Hashing {} exceeded the {limit:?} deadline", path.display())]
    TimedOut { path: PathBuf, limit: Duration },
}

/// Errors from the evidence store and custody log backends
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt log {}: line {line}: {reason}", path.display())]
    Corrupt {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}

/// Errors surfaced by the evidence service.
///
/// None of these are retried; each carries enough context for the caller
/// to decide what to do next.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Case not found: {0}")]
    CaseNotFound(String),

    #[error("Evidence not found: {0}")]
    NotFound(String),

    #[error("File error: {0}")]
    File(#[from] DigestError),

    #[error("Cannot verify integrity of {evidence_id}: {source}")]
    IntegrityCheckFailed {
        evidence_id: String,
        #[source]
        source: DigestError,
    },

    #[error("Evidence {evidence_id} is finalized ({status}); no further custody events allowed")]
    EvidenceFinalized {
        evidence_id: String,
        status: EvidenceStatus,
    },

    #[error("{operation} is not supported for {evidence_type} evidence ({evidence_id})")]
    UnsupportedOperation {
        evidence_id: String,
        operation: &'static str,
        evidence_type: EvidenceType,
    },

    #[error("Invalid status transition for {evidence_id}: {from} → {to}")]
    InvalidTransition {
        evidence_id: String,
        from: EvidenceStatus,
        to: EvidenceStatus,
    },

    #[error("Case lookup failed for {case_id}: {source}")]
    CaseLink {
        case_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Storage failure during {operation} of {evidence_id}: {source}")]
    Storage {
        evidence_id: String,
        operation: &'static str,
        #[source]
        source: StoreError,
    },
}

impl LedgerError {
    /// Wrap a backend failure with the evidence ID and operation it hit
    pub fn storage(evidence_id: &str, operation: &'static str, source: StoreError) -> Self {
        Self::Storage {
            evidence_id: evidence_id.to_string(),
            operation,
            source,
        }
    }
}
