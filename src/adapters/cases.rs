//! Case link implementations.
//!
//! `CaseRegistry` is a small JSON index of known case IDs, kept so the
//! command line can attach evidence to cases without the full case
//! management system. `StaticCaseLink` is a fixed in-memory set.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;

use super::CaseLink;

/// Fixed set of known case IDs
#[derive(Debug, Clone, Default)]
pub struct StaticCaseLink {
    cases: HashSet<String>,
}

impl StaticCaseLink {
    pub fn new(cases: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            cases: cases.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl CaseLink for StaticCaseLink {
    async fn exists(&self, case_id: &str) -> Result<bool> {
        Ok(self.cases.contains(case_id))
    }
}

/// Registry of known cases, persisted as JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseRegistry {
    /// Registry format version
    pub version: u32,

    /// All registered cases
    pub cases: Vec<CaseRecord>,

    #[serde(skip)]
    path: PathBuf,
}

/// Minimal case stub known to the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub id: String,

    #[serde(default)]
    pub title: String,

    pub opened_at: DateTime<Utc>,
}

impl CaseRegistry {
    /// Create an empty registry that will be saved at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            version: 1,
            cases: Vec::new(),
            path: path.into(),
        }
    }

    /// Load the registry from disk (empty if the file does not exist)
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if !path.exists() {
            return Ok(Self::new(path));
        }

        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read case registry: {}", path.display()))?;

        let mut registry: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse case registry: {}", path.display()))?;
        registry.path = path;

        Ok(registry)
    }

    /// Save the registry to disk
    pub async fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(&self.path, content)
            .await
            .with_context(|| format!("Failed to write case registry: {}", self.path.display()))?;

        Ok(())
    }

    /// Path the registry is stored at
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Register a case; returns false if the ID was already known
    pub fn register(&mut self, id: impl Into<String>, title: impl Into<String>) -> bool {
        let id = id.into();
        if self.get(&id).is_some() {
            return false;
        }

        self.cases.push(CaseRecord {
            id,
            title: title.into(),
            opened_at: Utc::now(),
        });
        true
    }

    pub fn get(&self, id: &str) -> Option<&CaseRecord> {
        self.cases.iter().find(|c| c.id == id)
    }

    /// All cases, oldest first
    pub fn list(&self) -> Vec<&CaseRecord> {
        let mut cases: Vec<_> = self.cases.iter().collect();
        cases.sort_by(|a, b| a.opened_at.cmp(&b.opened_at));
        cases
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}

#[async_trait]
impl CaseLink for CaseRegistry {
    async fn exists(&self, case_id: &str) -> Result<bool> {
        Ok(self.get(case_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_static_case_link() {
        let link = StaticCaseLink::new(["CASE-1", "CASE-2"]);

        assert!(link.exists("CASE-1").await.unwrap());
        assert!(!link.exists("CASE-404").await.unwrap());
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut registry = CaseRegistry::new("/tmp/unused.json");

        assert!(registry.register("CASE-1", "Burglary"));
        assert!(!registry.register("CASE-1", "Duplicate"));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("CASE-1").unwrap().title, "Burglary");
    }

    #[tokio::test]
    async fn test_registry_round_trip_on_disk() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("cases.json");

        let mut registry = CaseRegistry::load(&path).await.unwrap();
        assert!(registry.is_empty());

        registry.register("CASE-1", "Burglary");
        registry.register("CASE-2", "Fraud");
        registry.save().await.unwrap();

        let loaded = CaseRegistry::load(&path).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.path(), path.as_path());
        assert!(loaded.exists("CASE-2").await.unwrap());
        assert!(!loaded.exists("CASE-3").await.unwrap());

        let ids: Vec<&str> = loaded.list().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["CASE-1", "CASE-2"]);
    }
}
