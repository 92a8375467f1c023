//! Append-only custody event log.
//!
//! Each evidence item has its own ordered sequence of events. Append order
//! is authoritative: every append receives the next sequence number for its
//! item, and that number breaks ties between equal timestamps.
//!
//! The file backend stores one newline-delimited JSON (JSONL) file per
//! item, which keeps the history easy to inspect and impossible to edit
//! through this API.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs2::FileExt;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::{is_valid_id, CustodyEvent, NewCustodyEvent};

use super::error::StoreError;

/// File name of the per-item custody log
pub const CUSTODY_FILE: &str = "custody.jsonl";

/// Ordered, append-only history of custody events per evidence item
#[async_trait]
pub trait CustodyLog: Send + Sync {
    /// Append an event, assigning the next sequence number for its item
    async fn append(&self, event: NewCustodyEvent) -> Result<CustodyEvent, StoreError>;

    /// Append the first event of a new history; `AlreadyExists` once any
    /// event has been recorded for the item
    async fn append_first(&self, event: NewCustodyEvent) -> Result<CustodyEvent, StoreError>;

    /// All events for an item, oldest first (empty if none)
    async fn list_for(&self, evidence_id: &str) -> Result<Vec<CustodyEvent>, StoreError>;

    /// The most recent event for an item
    async fn latest(&self, evidence_id: &str) -> Result<Option<CustodyEvent>, StoreError> {
        Ok(self.list_for(evidence_id).await?.pop())
    }

    /// Remove an item's entire history (administrative delete only)
    async fn purge(&self, evidence_id: &str) -> Result<(), StoreError>;
}

/// In-process custody log
#[derive(Debug, Default)]
pub struct MemoryCustodyLog {
    events: RwLock<HashMap<String, Vec<CustodyEvent>>>,
}

impl MemoryCustodyLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CustodyLog for MemoryCustodyLog {
    async fn append(&self, event: NewCustodyEvent) -> Result<CustodyEvent, StoreError> {
        let mut events = self.events.write().await;
        let log = events.entry(event.evidence_id.clone()).or_default();

        let previous = log.last().map(|e| e.timestamp);
        let sealed = event.seal(log.len() as u64 + 1, previous);
        log.push(sealed.clone());

        Ok(sealed)
    }

    async fn append_first(&self, event: NewCustodyEvent) -> Result<CustodyEvent, StoreError> {
        let mut events = self.events.write().await;
        let log = events.entry(event.evidence_id.clone()).or_default();
        if !log.is_empty() {
            return Err(StoreError::AlreadyExists(event.evidence_id));
        }

        let sealed = event.seal(1, None);
        log.push(sealed.clone());

        Ok(sealed)
    }

    async fn list_for(&self, evidence_id: &str) -> Result<Vec<CustodyEvent>, StoreError> {
        let events = self.events.read().await;
        Ok(events.get(evidence_id).cloned().unwrap_or_default())
    }

    async fn purge(&self, evidence_id: &str) -> Result<(), StoreError> {
        self.events.write().await.remove(evidence_id);
        Ok(())
    }
}

/// File-backed custody log: `<root>/<evidence_id>/custody.jsonl`
#[derive(Debug, Clone)]
pub struct JsonlCustodyLog {
    root: PathBuf,
}

impl JsonlCustodyLog {
    /// Create a log rooted at the evidence directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path to the log file for an item
    pub fn log_path(&self, evidence_id: &str) -> PathBuf {
        self.root.join(evidence_id).join(CUSTODY_FILE)
    }

    /// Log path for an ID that cannot leave the evidence directory
    fn checked_path(&self, evidence_id: &str) -> Result<PathBuf, StoreError> {
        if !is_valid_id(evidence_id) {
            return Err(StoreError::NotFound(evidence_id.to_string()));
        }
        Ok(self.log_path(evidence_id))
    }

    async fn append_with(
        &self,
        event: NewCustodyEvent,
        first: bool,
    ) -> Result<CustodyEvent, StoreError> {
        let path = self.checked_path(&event.evidence_id)?;

        // fs2 locks are blocking, so the whole read-last/append runs off the runtime
        let sealed = tokio::task::spawn_blocking(move || append_locked(&path, event, first))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;

        debug!(
            evidence_id = %sealed.evidence_id,
            sequence = sealed.sequence,
            action = %sealed.action,
            "Appended custody event"
        );

        Ok(sealed)
    }
}

#[async_trait]
impl CustodyLog for JsonlCustodyLog {
    async fn append(&self, event: NewCustodyEvent) -> Result<CustodyEvent, StoreError> {
        self.append_with(event, false).await
    }

    async fn append_first(&self, event: NewCustodyEvent) -> Result<CustodyEvent, StoreError> {
        self.append_with(event, true).await
    }

    async fn list_for(&self, evidence_id: &str) -> Result<Vec<CustodyEvent>, StoreError> {
        if !is_valid_id(evidence_id) {
            return Ok(Vec::new());
        }
        let path = self.log_path(evidence_id);

        if !path.exists() {
            return Ok(Vec::new());
        }

        tokio::task::spawn_blocking(move || list_locked(&path))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
    }

    async fn purge(&self, evidence_id: &str) -> Result<(), StoreError> {
        let path = self.checked_path(evidence_id)?;

        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        // The item directory is shared with the record store; only drop it once empty
        if let Some(dir) = path.parent() {
            let _ = fs::remove_dir(dir).await;
        }

        Ok(())
    }
}

/// Read every event under a shared lock so a concurrent append is never seen half-written
fn list_locked(path: &Path) -> Result<Vec<CustodyEvent>, StoreError> {
    let file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    file.lock_shared()?;
    read_events(path, &file)
}

/// Parse a log file, checking that sequences run 1..n without gaps
fn read_events(path: &Path, file: &std::fs::File) -> Result<Vec<CustodyEvent>, StoreError> {
    let mut events: Vec<CustodyEvent> = Vec::new();

    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let event: CustodyEvent = serde_json::from_str(&line).map_err(|e| StoreError::Corrupt {
            path: path.to_path_buf(),
            line: idx + 1,
            reason: e.to_string(),
        })?;

        let expected = events.len() as u64 + 1;
        if event.sequence != expected {
            return Err(StoreError::Corrupt {
                path: path.to_path_buf(),
                line: idx + 1,
                reason: format!("sequence {} where {} was expected", event.sequence, expected),
            });
        }

        events.push(event);
    }

    Ok(events)
}

/// Append one event under an exclusive lock on the log file.
///
/// With `first` set, the append is refused if the log already holds events.
fn append_locked(
    path: &Path,
    event: NewCustodyEvent,
    first: bool,
) -> Result<CustodyEvent, StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
        .read(true)
        .append(true)
        .create(true)
        .open(path)?;

    file.lock_exclusive()?;

    let last = read_events(path, &file)?.pop();
    if first && last.is_some() {
        return Err(StoreError::AlreadyExists(event.evidence_id));
    }
    let sequence = last.as_ref().map(|e| e.sequence).unwrap_or(0) + 1;
    let sealed = event.seal(sequence, last.map(|e| e.timestamp));

    let mut line = serde_json::to_string(&sealed)?;
    line.push('\n');

    let mut writer = &file;
    writer.write_all(line.as_bytes())?;
    writer.flush()?;
    file.sync_data()?;

    // Lock is released when file is dropped
    Ok(sealed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CustodyAction, EvidenceStatus};
    use tempfile::TempDir;

    fn transfer(evidence_id: &str, to: &str) -> NewCustodyEvent {
        NewCustodyEvent::new(evidence_id, CustodyAction::Transferred, EvidenceStatus::Collected)
            .between("officer-a", "officer-b")
            .moving("locker", to)
            .with_reason("test")
    }

    #[tokio::test]
    async fn test_memory_sequences_per_item() {
        let log = MemoryCustodyLog::new();

        let a1 = log.append(transfer("EV-A", "lab")).await.unwrap();
        let b1 = log.append(transfer("EV-B", "lab")).await.unwrap();
        let a2 = log.append(transfer("EV-A", "vault")).await.unwrap();

        assert_eq!(a1.sequence, 1);
        assert_eq!(b1.sequence, 1);
        assert_eq!(a2.sequence, 2);

        let latest = log.latest("EV-A").await.unwrap().unwrap();
        assert_eq!(latest.to_location, "vault");
        assert!(log.latest("EV-C").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_purge() {
        let log = MemoryCustodyLog::new();
        log.append(transfer("EV-A", "lab")).await.unwrap();

        log.purge("EV-A").await.unwrap();
        assert!(log.list_for("EV-A").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_jsonl_append_and_list_order() {
        let temp = TempDir::new().unwrap();
        let log = JsonlCustodyLog::new(temp.path());

        for i in 0..5 {
            log.append(transfer("EV-A", &format!("room-{}", i))).await.unwrap();
        }

        let events = log.list_for("EV-A").await.unwrap();
        assert_eq!(events.len(), 5);
        for (i, event) in events.iter().enumerate() {
            assert_eq!(event.sequence, i as u64 + 1);
            assert_eq!(event.to_location, format!("room-{}", i));
        }

        // Timestamps never go backwards
        assert!(events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test]
    async fn test_jsonl_one_line_per_event() {
        let temp = TempDir::new().unwrap();
        let log = JsonlCustodyLog::new(temp.path());

        log.append(transfer("EV-A", "lab")).await.unwrap();
        log.append(transfer("EV-A", "vault")).await.unwrap();

        let content = std::fs::read_to_string(log.log_path("EV-A")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"sequence\":1"));
        assert!(lines[1].contains("\"sequence\":2"));
    }

    #[tokio::test]
    async fn test_jsonl_missing_log_is_empty() {
        let temp = TempDir::new().unwrap();
        let log = JsonlCustodyLog::new(temp.path());

        assert!(log.list_for("EV-NONE").await.unwrap().is_empty());
        assert!(log.latest("EV-NONE").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_jsonl_detects_sequence_gap() {
        let temp = TempDir::new().unwrap();
        let log = JsonlCustodyLog::new(temp.path());

        log.append(transfer("EV-A", "lab")).await.unwrap();
        let second = log.append(transfer("EV-A", "vault")).await.unwrap();

        // Rewrite the file without the first line
        let path = log.log_path("EV-A");
        let line = serde_json::to_string(&second).unwrap();
        std::fs::write(&path, format!("{}\n", line)).unwrap();

        let result = log.list_for("EV-A").await;
        assert!(matches!(result, Err(StoreError::Corrupt { line: 1, .. })));
    }

    #[tokio::test]
    async fn test_jsonl_purge_removes_file() {
        let temp = TempDir::new().unwrap();
        let log = JsonlCustodyLog::new(temp.path());

        log.append(transfer("EV-A", "lab")).await.unwrap();
        log.purge("EV-A").await.unwrap();

        assert!(!log.log_path("EV-A").exists());
        assert!(!temp.path().join("EV-A").exists());

        // Purging twice is harmless
        log.purge("EV-A").await.unwrap();
    }

    #[tokio::test]
    async fn test_jsonl_rejects_escaping_ids() {
        let temp = TempDir::new().unwrap();
        let log = JsonlCustodyLog::new(temp.path().join("evidence"));

        let result = log.append(transfer("..", "lab")).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
        assert!(!temp.path().join(CUSTODY_FILE).exists());

        assert!(log.list_for("..").await.unwrap().is_empty());
        assert!(matches!(log.purge("..").await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_append_first_refuses_existing_history() {
        let temp = TempDir::new().unwrap();
        let jsonl = JsonlCustodyLog::new(temp.path());
        let memory = MemoryCustodyLog::new();
        let logs: [&dyn CustodyLog; 2] = [&jsonl, &memory];

        for log in logs {
            let first = log.append_first(transfer("EV-A", "lab")).await.unwrap();
            assert_eq!(first.sequence, 1);

            let again = log.append_first(transfer("EV-A", "vault")).await;
            assert!(matches!(again, Err(StoreError::AlreadyExists(ref id)) if id == "EV-A"));

            let history = log.list_for("EV-A").await.unwrap();
            assert_eq!(history.len(), 1);
            assert_eq!(history[0].to_location, "lab");
        }
    }
}

