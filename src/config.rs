//! Configuration for custodian.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (CUSTODIAN_HOME)
//! 2. Config file (.custodian/config.yaml)
//! 3. Defaults (~/.custodian)
//!
//! Config file discovery:
//! - Searches current directory and parents for .custodian/config.yaml
//! - `paths.home` is relative to the .custodian/ directory

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::digest::DEFAULT_CHUNK_SIZE;
use crate::core::Sha256Digester;
use crate::domain::DEFAULT_STORAGE_LOCATION;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub storage: Option<StorageConfig>,
    #[serde(default)]
    pub digest: Option<DigestConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Ledger state directory (relative to .custodian/)
    pub home: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub default_location: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DigestConfig {
    pub chunk_size_bytes: Option<usize>,
    pub timeout_seconds: Option<u64>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to custodian home (ledger state)
    pub home: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Storage location used when collection names none
    pub default_location: String,
    /// Digest settings
    pub digest: DigestSettings,
}

#[derive(Debug, Clone)]
pub struct DigestSettings {
    pub chunk_size_bytes: usize,
    pub timeout_seconds: Option<u64>,
}

impl Default for DigestSettings {
    fn default() -> Self {
        Self {
            chunk_size_bytes: DEFAULT_CHUNK_SIZE,
            timeout_seconds: None,
        }
    }
}

impl DigestSettings {
    /// Build the SHA-256 digester these settings describe
    pub fn digester(&self) -> Sha256Digester {
        Sha256Digester::new()
            .with_chunk_size(self.chunk_size_bytes)
            .with_deadline(self.timeout_seconds.map(Duration::from_secs))
    }
}

impl ResolvedConfig {
    /// Directory holding one subdirectory per evidence item
    pub fn evidence_dir(&self) -> PathBuf {
        self.home.join("evidence")
    }

    /// Path to the case registry
    pub fn cases_path(&self) -> PathBuf {
        self.home.join("cases.json")
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".custodian").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to `base`
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Combine a parsed config file with the environment and defaults
fn resolve(
    config: Option<(&Path, ConfigFile)>,
    env_home: Option<String>,
    default_home: PathBuf,
) -> ResolvedConfig {
    let Some((config_path, config)) = config else {
        return ResolvedConfig {
            home: env_home.map(PathBuf::from).unwrap_or(default_home),
            config_file: None,
            default_location: DEFAULT_STORAGE_LOCATION.to_string(),
            digest: DigestSettings::default(),
        };
    };

    let home = if let Some(env_home) = env_home {
        PathBuf::from(env_home)
    } else if let Some(ref home_path) = config.paths.home {
        let custodian_dir = config_path.parent().unwrap_or(Path::new("."));
        resolve_path(custodian_dir, home_path)
    } else {
        default_home
    };

    let default_location = config
        .storage
        .and_then(|s| s.default_location)
        .filter(|l| !l.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_STORAGE_LOCATION.to_string());

    let digest = DigestSettings {
        chunk_size_bytes: config
            .digest
            .as_ref()
            .and_then(|d| d.chunk_size_bytes)
            .unwrap_or(DEFAULT_CHUNK_SIZE),
        timeout_seconds: config.digest.as_ref().and_then(|d| d.timeout_seconds),
    };

    ResolvedConfig {
        home,
        config_file: Some(config_path.to_path_buf()),
        default_location,
        digest,
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".custodian");

    let env_home = std::env::var("CUSTODIAN_HOME").ok();

    let resolved = match find_config_file() {
        Some(path) => {
            let config = load_config_file(&path)?;
            resolve(Some((&path, config)), env_home, default_home)
        }
        None => resolve(None, env_home, default_home),
    };

    Ok(resolved)
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_file() {
        let config = resolve(None, None, PathBuf::from("/home/u/.custodian"));

        assert_eq!(config.home, PathBuf::from("/home/u/.custodian"));
        assert_eq!(config.evidence_dir(), PathBuf::from("/home/u/.custodian/evidence"));
        assert_eq!(config.cases_path(), PathBuf::from("/home/u/.custodian/cases.json"));
        assert_eq!(config.default_location, "Evidence Locker");
        assert_eq!(config.digest.chunk_size_bytes, 65536);
        assert!(config.digest.timeout_seconds.is_none());
        assert!(config.config_file.is_none());
    }

    #[test]
    fn test_env_home_without_file() {
        let config = resolve(
            None,
            Some("/srv/ledger".to_string()),
            PathBuf::from("/home/u/.custodian"),
        );
        assert_eq!(config.home, PathBuf::from("/srv/ledger"));
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let custodian_dir = temp.path().join(".custodian");
        std::fs::create_dir_all(&custodian_dir).unwrap();

        let config_path = custodian_dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
version: "1.0"
paths:
  home: /var/lib/custodian
storage:
  default_location: Property Room B
digest:
  chunk_size_bytes: 4096
  timeout_seconds: 30
"#
        )
        .unwrap();

        let parsed = load_config_file(&config_path).unwrap();
        assert_eq!(parsed.version, "1.0");
        assert_eq!(parsed.paths.home, Some("/var/lib/custodian".to_string()));

        let config = resolve(
            Some((&config_path, parsed)),
            None,
            PathBuf::from("/unused"),
        );
        assert_eq!(config.home, PathBuf::from("/var/lib/custodian"));
        assert_eq!(config.default_location, "Property Room B");
        assert_eq!(config.digest.chunk_size_bytes, 4096);
        assert_eq!(config.digest.timeout_seconds, Some(30));
        assert_eq!(config.config_file.as_deref(), Some(config_path.as_path()));
    }

    #[test]
    fn test_env_overrides_config_home() {
        let parsed: ConfigFile = serde_yaml::from_str(
            r#"
version: "1.0"
paths:
  home: ./state
"#,
        )
        .unwrap();

        let config_path = PathBuf::from("/project/.custodian/config.yaml");
        let config = resolve(
            Some((&config_path, parsed)),
            Some("/override".to_string()),
            PathBuf::from("/unused"),
        );

        assert_eq!(config.home, PathBuf::from("/override"));
        assert_eq!(config.default_location, "Evidence Locker");
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project/.custodian");

        assert_eq!(
            resolve_path(&base, "./state"),
            PathBuf::from("/home/user/project/.custodian/state")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
