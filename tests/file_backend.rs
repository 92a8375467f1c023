//! File Backend Integration Tests
//!
//! Tests for the on-disk layout: one directory per item holding
//! `record.json` and the append-only `custody.jsonl`.

use std::sync::Arc;

use tempfile::TempDir;

use custodian::core::{
    EvidenceService, JsonEvidenceStore, JsonlCustodyLog, LedgerError, Sha256Digester,
    TransferRequest, CUSTODY_FILE, RECORD_FILE,
};
use custodian::domain::{CustodyEvent, EvidenceItem, NewEvidence, NewEvidenceKind};
use custodian::{CaseLink, CaseRegistry};

async fn registry(temp: &TempDir) -> Arc<CaseRegistry> {
    let mut registry = CaseRegistry::load(temp.path().join("cases.json")).await.unwrap();
    registry.register("CASE-1", "Warehouse fire");
    registry.save().await.unwrap();
    Arc::new(registry)
}

fn glove() -> NewEvidence {
    NewEvidence::new("CASE-1", "Burnt glove", NewEvidenceKind::Physical)
        .with_id("EV-GLOVE")
        .collected_by("officer-a")
        .stored_in("locker")
}

#[tokio::test]
async fn test_layout_on_disk() {
    let temp = TempDir::new().unwrap();
    let evidence_dir = temp.path().join("evidence");
    let svc = EvidenceService::file_backed(
        &evidence_dir,
        registry(&temp).await,
        Arc::new(Sha256Digester::new()),
    );

    svc.create_evidence(glove()).await.unwrap();
    svc.transfer_custody(
        "EV-GLOVE",
        TransferRequest::new("officer-a", "analyst-b", "locker", "lab", "residue test"),
    )
    .await
    .unwrap();

    let item_dir = evidence_dir.join("EV-GLOVE");
    let record: EvidenceItem =
        serde_json::from_str(&std::fs::read_to_string(item_dir.join(RECORD_FILE)).unwrap())
            .unwrap();
    assert_eq!(record.current_storage_location, "lab");
    assert_eq!(record.last_sequence, 2);

    let log = std::fs::read_to_string(item_dir.join(CUSTODY_FILE)).unwrap();
    let events: Vec<CustodyEvent> = log
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].sequence, 1);
    assert_eq!(events[1].sequence, 2);
    assert_eq!(events[1].to_location, "lab");

    // Status uses the uppercase wire names
    let raw: serde_json::Value = serde_json::from_str(log.lines().next().unwrap()).unwrap();
    assert_eq!(raw["action"], "COLLECTED");
    assert_eq!(raw["status_after"], "COLLECTED");
}

#[tokio::test]
async fn test_state_survives_reopen() {
    let temp = TempDir::new().unwrap();
    let evidence_dir = temp.path().join("evidence");
    let cases = registry(&temp).await;

    {
        let svc = EvidenceService::file_backed(
            &evidence_dir,
            cases.clone(),
            Arc::new(Sha256Digester::new()),
        );
        svc.create_evidence(glove()).await.unwrap();
    }

    let reloaded = CaseRegistry::load(temp.path().join("cases.json")).await.unwrap();
    assert!(reloaded.exists("CASE-1").await.unwrap());

    let svc = EvidenceService::file_backed(
        &evidence_dir,
        Arc::new(reloaded),
        Arc::new(Sha256Digester::new()),
    );
    let item = svc.get_evidence("EV-GLOVE").await.unwrap();
    assert_eq!(item.current_custodian, "officer-a");
    assert_eq!(svc.custody_history("EV-GLOVE").await.unwrap().len(), 1);

    let again = svc.create_evidence(glove()).await;
    assert!(matches!(again, Err(LedgerError::Validation(_))));
}

#[tokio::test]
async fn test_stale_record_is_rebuilt_from_log() {
    let temp = TempDir::new().unwrap();
    let evidence_dir = temp.path().join("evidence");
    let svc = EvidenceService::file_backed(
        &evidence_dir,
        registry(&temp).await,
        Arc::new(Sha256Digester::new()),
    );

    svc.create_evidence(glove()).await.unwrap();
    let record_path = evidence_dir.join("EV-GLOVE").join(RECORD_FILE);
    let stale = std::fs::read_to_string(&record_path).unwrap();

    svc.transfer_custody(
        "EV-GLOVE",
        TransferRequest::new("officer-a", "analyst-b", "locker", "lab", "residue test"),
    )
    .await
    .unwrap();

    // Simulate a record write lost after the custody append
    std::fs::write(&record_path, stale).unwrap();

    let item = svc.get_evidence("EV-GLOVE").await.unwrap();
    assert_eq!(item.current_storage_location, "lab");
    assert_eq!(item.last_sequence, 2);
}

#[tokio::test]
async fn test_delete_removes_item_directory() {
    let temp = TempDir::new().unwrap();
    let evidence_dir = temp.path().join("evidence");
    let svc = EvidenceService::file_backed(
        &evidence_dir,
        registry(&temp).await,
        Arc::new(Sha256Digester::new()),
    );

    svc.create_evidence(glove()).await.unwrap();
    svc.delete_evidence("EV-GLOVE").await.unwrap();

    assert!(!evidence_dir.join("EV-GLOVE").exists());

    // The ID is free again once both files are gone
    svc.create_evidence(glove()).await.unwrap();
}

#[tokio::test]
async fn test_orphan_log_blocks_id_reuse() {
    let temp = TempDir::new().unwrap();
    let evidence_dir = temp.path().join("evidence");
    let svc = EvidenceService::file_backed(
        &evidence_dir,
        registry(&temp).await,
        Arc::new(Sha256Digester::new()),
    );

    svc.create_evidence(glove()).await.unwrap();
    std::fs::remove_file(evidence_dir.join("EV-GLOVE").join(RECORD_FILE)).unwrap();

    let result = svc.create_evidence(glove()).await;
    assert!(matches!(result, Err(LedgerError::Validation(_))));

    let log = JsonlCustodyLog::new(&evidence_dir);
    assert!(log.log_path("EV-GLOVE").exists());
    let store = JsonEvidenceStore::new(&evidence_dir);
    assert!(!store.record_path("EV-GLOVE").exists());
}

#[tokio::test]
async fn test_parent_directory_id_is_not_found() {
    let temp = TempDir::new().unwrap();
    let evidence_dir = temp.path().join("evidence");
    let svc = EvidenceService::file_backed(
        &evidence_dir,
        registry(&temp).await,
        Arc::new(Sha256Digester::new()),
    );
    svc.create_evidence(glove()).await.unwrap();

    // A record and log one level above the evidence directory
    let item = svc.get_evidence("EV-GLOVE").await.unwrap();
    let history = svc.custody_history("EV-GLOVE").await.unwrap();
    let outside_record = temp.path().join(RECORD_FILE);
    let outside_log = temp.path().join(CUSTODY_FILE);
    std::fs::write(&outside_record, serde_json::to_vec(&item).unwrap()).unwrap();
    std::fs::write(
        &outside_log,
        format!("{}\n", serde_json::to_string(&history[0]).unwrap()),
    )
    .unwrap();

    assert!(matches!(svc.get_evidence("..").await, Err(LedgerError::NotFound(_))));
    assert!(matches!(
        svc.custody_history("..").await,
        Err(LedgerError::NotFound(_))
    ));
    let transfer = svc
        .transfer_custody(
            "..",
            TransferRequest::new("officer-a", "analyst-b", "locker", "lab", "residue test"),
        )
        .await;
    assert!(matches!(transfer, Err(LedgerError::NotFound(_))));
    assert!(matches!(
        svc.delete_evidence("..").await,
        Err(LedgerError::NotFound(_))
    ));

    assert!(outside_record.exists());
    assert_eq!(std::fs::read_to_string(&outside_log).unwrap().lines().count(), 1);
}

#[tokio::test]
async fn test_duplicate_create_keeps_history() {
    let temp = TempDir::new().unwrap();
    let evidence_dir = temp.path().join("evidence");
    let svc = EvidenceService::file_backed(
        &evidence_dir,
        registry(&temp).await,
        Arc::new(Sha256Digester::new()),
    );

    svc.create_evidence(glove()).await.unwrap();
    svc.transfer_custody(
        "EV-GLOVE",
        TransferRequest::new("officer-a", "analyst-b", "locker", "lab", "residue test"),
    )
    .await
    .unwrap();

    // A second ledger process holds no item lock in common with the first
    let other = EvidenceService::file_backed(
        &evidence_dir,
        registry(&temp).await,
        Arc::new(Sha256Digester::new()),
    );
    let result = other.create_evidence(glove()).await;
    assert!(matches!(result, Err(LedgerError::Validation(_))));

    let history = svc.custody_history("EV-GLOVE").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(svc.get_evidence("EV-GLOVE").await.unwrap().current_storage_location, "lab");
}

