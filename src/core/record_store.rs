//! Evidence record persistence.
//!
//! The store is a plain persistence boundary: it keeps whatever record the
//! service hands it and enforces nothing about custody. The evidence service
//! is its only writer.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::{is_valid_id, EvidenceItem};

use super::error::StoreError;

/// File name of the per-item record
pub const RECORD_FILE: &str = "record.json";

/// Storage for evidence records keyed by evidence ID
#[async_trait]
pub trait EvidenceStore: Send + Sync {
    /// Persist a new record (fails if the ID is taken)
    async fn save(&self, item: &EvidenceItem) -> Result<(), StoreError>;

    /// Load a record by ID
    async fn find(&self, id: &str) -> Result<EvidenceItem, StoreError>;

    /// All records attached to a case
    async fn find_by_case(&self, case_id: &str) -> Result<Vec<EvidenceItem>, StoreError> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|item| item.case_id == case_id)
            .collect())
    }

    /// All records, ordered by ID
    async fn list(&self) -> Result<Vec<EvidenceItem>, StoreError>;

    /// Replace an existing record
    async fn update(&self, item: &EvidenceItem) -> Result<(), StoreError>;

    /// Remove a record
    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    /// Check if a record exists
    async fn contains(&self, id: &str) -> Result<bool, StoreError> {
        match self.find(id).await {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// In-process evidence store
#[derive(Debug, Default)]
pub struct MemoryEvidenceStore {
    items: RwLock<BTreeMap<String, EvidenceItem>>,
}

impl MemoryEvidenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EvidenceStore for MemoryEvidenceStore {
    async fn save(&self, item: &EvidenceItem) -> Result<(), StoreError> {
        let mut items = self.items.write().await;
        if items.contains_key(&item.id) {
            return Err(StoreError::AlreadyExists(item.id.clone()));
        }
        items.insert(item.id.clone(), item.clone());
        Ok(())
    }

    async fn find(&self, id: &str) -> Result<EvidenceItem, StoreError> {
        self.items
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn list(&self) -> Result<Vec<EvidenceItem>, StoreError> {
        Ok(self.items.read().await.values().cloned().collect())
    }

    async fn update(&self, item: &EvidenceItem) -> Result<(), StoreError> {
        let mut items = self.items.write().await;
        match items.get_mut(&item.id) {
            Some(existing) => {
                *existing = item.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(item.id.clone())),
        }
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.items
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}

/// File-backed store: `<root>/<evidence_id>/record.json`
///
/// Records are written to a temporary file in the same directory and then
/// renamed into place, so a reader never sees a half-written record.
#[derive(Debug, Clone)]
pub struct JsonEvidenceStore {
    root: PathBuf,
}

impl JsonEvidenceStore {
    /// Create a store rooted at the evidence directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path to the record file for an item
    pub fn record_path(&self, id: &str) -> PathBuf {
        self.root.join(id).join(RECORD_FILE)
    }

    /// Record path for an ID that cannot leave the evidence directory
    fn checked_path(&self, id: &str) -> Result<PathBuf, StoreError> {
        if !is_valid_id(id) {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(self.record_path(id))
    }

    async fn write_record(&self, item: &EvidenceItem, overwrite: bool) -> Result<(), StoreError> {
        let path = self.checked_path(&item.id)?;
        let content = serde_json::to_vec_pretty(item)?;
        let id = item.id.clone();

        tokio::task::spawn_blocking(move || write_atomic(&path, &content, overwrite, &id))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
    }
}

#[async_trait]
impl EvidenceStore for JsonEvidenceStore {
    async fn save(&self, item: &EvidenceItem) -> Result<(), StoreError> {
        self.write_record(item, false).await?;
        debug!(evidence_id = %item.id, "Saved evidence record");
        Ok(())
    }

    async fn find(&self, id: &str) -> Result<EvidenceItem, StoreError> {
        let path = self.checked_path(id)?;

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        Ok(serde_json::from_str(&content)?)
    }

    async fn list(&self) -> Result<Vec<EvidenceItem>, StoreError> {
        let mut items = Vec::new();

        if !self.root.exists() {
            return Ok(items);
        }

        let mut entries = fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }

            let path = entry.path().join(RECORD_FILE);
            if !path.exists() {
                continue;
            }

            let content = fs::read_to_string(&path).await?;
            items.push(serde_json::from_str::<EvidenceItem>(&content)?);
        }

        items.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(items)
    }

    async fn update(&self, item: &EvidenceItem) -> Result<(), StoreError> {
        if !self.checked_path(&item.id)?.exists() {
            return Err(StoreError::NotFound(item.id.clone()));
        }

        self.write_record(item, true).await?;
        debug!(evidence_id = %item.id, "Updated evidence record");
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let path = self.checked_path(id)?;

        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        if let Some(dir) = path.parent() {
            let _ = fs::remove_dir(dir).await;
        }

        Ok(())
    }
}

fn write_atomic(path: &Path, content: &[u8], overwrite: bool, id: &str) -> Result<(), StoreError> {
    let dir = path
        .parent()
        .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
    std::fs::create_dir_all(dir)?;

    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(content)?;
    temp.as_file().sync_data()?;

    if overwrite {
        temp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    } else {
        temp.persist_noclobber(path).map_err(|e| {
            if e.error.kind() == std::io::ErrorKind::AlreadyExists {
                StoreError::AlreadyExists(id.to_string())
            } else {
                StoreError::Io(e.error)
            }
        })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CollectionSite, EvidenceKind, EvidenceStatus};
    use chrono::Utc;
    use tempfile::TempDir;

    fn item(id: &str, case_id: &str) -> EvidenceItem {
        let now = Utc::now();
        EvidenceItem {
            id: id.to_string(),
            case_id: case_id.to_string(),
            evidence_number: None,
            description: format!("Item {}", id),
            kind: EvidenceKind::Physical,
            tags: Default::default(),
            is_confidential: false,
            related_evidence_ids: Default::default(),
            collected_by: "officer-a".to_string(),
            collection_date: now,
            collection_site: CollectionSite::new("Scene"),
            collection_method: String::new(),
            collection_notes: String::new(),
            notes: String::new(),
            status: EvidenceStatus::Collected,
            current_storage_location: "locker".to_string(),
            current_custodian: "officer-a".to_string(),
            last_sequence: 1,
            created_at: now,
            updated_at: now,
        }
    }

    async fn exercise_store(store: &dyn EvidenceStore) {
        store.save(&item("EV-1", "CASE-1")).await.unwrap();
        store.save(&item("EV-2", "CASE-1")).await.unwrap();
        store.save(&item("EV-3", "CASE-2")).await.unwrap();

        // Duplicate IDs are rejected
        let dup = store.save(&item("EV-1", "CASE-9")).await;
        assert!(matches!(dup, Err(StoreError::AlreadyExists(_))));
        assert_eq!(store.find("EV-1").await.unwrap().case_id, "CASE-1");

        assert_eq!(store.find_by_case("CASE-1").await.unwrap().len(), 2);
        assert_eq!(store.find_by_case("CASE-2").await.unwrap().len(), 1);
        assert!(store.find_by_case("CASE-3").await.unwrap().is_empty());

        let mut updated = store.find("EV-2").await.unwrap();
        updated.current_storage_location = "lab".to_string();
        store.update(&updated).await.unwrap();
        assert_eq!(
            store.find("EV-2").await.unwrap().current_storage_location,
            "lab"
        );

        let missing = store.update(&item("EV-404", "CASE-1")).await;
        assert!(matches!(missing, Err(StoreError::NotFound(_))));

        store.delete("EV-3").await.unwrap();
        assert!(matches!(store.find("EV-3").await, Err(StoreError::NotFound(_))));
        assert!(!store.contains("EV-3").await.unwrap());
        assert!(matches!(store.delete("EV-3").await, Err(StoreError::NotFound(_))));

        let ids: Vec<String> = store.list().await.unwrap().into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec!["EV-1".to_string(), "EV-2".to_string()]);
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryEvidenceStore::new();
        exercise_store(&store).await;
    }

    #[tokio::test]
    async fn test_json_store() {
        let temp = TempDir::new().unwrap();
        let store = JsonEvidenceStore::new(temp.path());
        exercise_store(&store).await;

        assert!(store.record_path("EV-1").exists());
        assert!(!temp.path().join("EV-3").exists());
    }

    #[tokio::test]
    async fn test_json_store_missing_root_lists_nothing() {
        let temp = TempDir::new().unwrap();
        let store = JsonEvidenceStore::new(temp.path().join("not-created"));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_json_store_leaves_no_temp_files() {
        let temp = TempDir::new().unwrap();
        let store = JsonEvidenceStore::new(temp.path());
        let mut record = item("EV-1", "CASE-1");

        store.save(&record).await.unwrap();
        record.notes = "re-sealed".to_string();
        store.update(&record).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(temp.path().join("EV-1"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec![RECORD_FILE.to_string()]);
    }

    #[tokio::test]
    async fn test_json_store_rejects_escaping_ids() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("evidence");
        let store = JsonEvidenceStore::new(&root);

        // A record sitting just outside the store root
        let outside = item("EV-OUT", "CASE-1");
        std::fs::write(
            temp.path().join(RECORD_FILE),
            serde_json::to_vec(&outside).unwrap(),
        )
        .unwrap();

        assert!(matches!(store.find("..").await, Err(StoreError::NotFound(_))));
        assert!(matches!(store.delete("..").await, Err(StoreError::NotFound(_))));
        assert!(matches!(
            store.save(&item("../EV-1", "CASE-1")).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(temp.path().join(RECORD_FILE).exists());
        assert!(!temp.path().join("EV-1").exists());
    }
}
