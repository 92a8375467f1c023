//! Evidence service: the only writer of the custody ledger.
//!
//! Coordinates collection, custody transfers, status changes and integrity
//! checks. Every mutation appends exactly one custody event and updates the
//! derived record, both under the item's write lock.
//!
//! The custody log is the commit point. The record is written first with
//! the new event applied, then the event is appended; a failed append
//! restores the previous record. A record that is ahead of or behind its
//! log is brought back in line from the log whenever it is read.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

use crate::adapters::CaseLink;
use crate::domain::{
    generate_evidence_id, is_valid_id, CustodyAction, CustodyEvent, DigitalArtifact, EvidenceItem, EvidenceKind,
    EvidenceStatus, NewCustodyEvent, NewEvidence, NewEvidenceKind,
};

use super::custody_log::{CustodyLog, JsonlCustodyLog, MemoryCustodyLog};
use super::digest::{Digester, Sha256Digester};
use super::error::{DigestError, LedgerError, StoreError};
use super::locks::ItemLocks;
use super::record_store::{EvidenceStore, JsonEvidenceStore, MemoryEvidenceStore};

type LedgerResult<T> = Result<T, LedgerError>;

/// A custody transfer between people and/or locations
#[derive(Debug, Clone, Default)]
pub struct TransferRequest {
    pub from_person: String,
    pub to_person: String,
    /// Defaults to the item's current location when empty
    pub from_location: String,
    pub to_location: String,
    pub reason: String,
    pub notes: String,
    pub authorized_by: Option<String>,
    pub transport_method: Option<String>,
    pub verification_method: Option<String>,
}

impl TransferRequest {
    pub fn new(
        from_person: impl Into<String>,
        to_person: impl Into<String>,
        from_location: impl Into<String>,
        to_location: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            from_person: from_person.into(),
            to_person: to_person.into(),
            from_location: from_location.into(),
            to_location: to_location.into(),
            reason: reason.into(),
            ..Default::default()
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    pub fn authorized_by(mut self, person: impl Into<String>) -> Self {
        self.authorized_by = Some(person.into());
        self
    }
}

/// A lifecycle status change
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub target: EvidenceStatus,
    /// Person carrying out the change; becomes the item's custodian
    pub performed_by: String,
    /// New location; the item stays where it is when `None`
    pub location: Option<String>,
    pub reason: String,
    pub notes: String,
    pub authorized_by: Option<String>,
}

impl StatusChange {
    pub fn new(
        target: EvidenceStatus,
        performed_by: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            target,
            performed_by: performed_by.into(),
            location: None,
            reason: reason.into(),
            notes: String::new(),
            authorized_by: None,
        }
    }

    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn authorized_by(mut self, person: impl Into<String>) -> Self {
        self.authorized_by = Some(person.into());
        self
    }
}

/// How an item leaves custody for good
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisposalMethod {
    Release,
    Destroy,
}

impl DisposalMethod {
    pub fn target_status(&self) -> EvidenceStatus {
        match self {
            Self::Release => EvidenceStatus::Released,
            Self::Destroy => EvidenceStatus::Destroyed,
        }
    }
}

/// Administrative disposal of an item
#[derive(Debug, Clone)]
pub struct Disposal {
    pub method: DisposalMethod,
    pub performed_by: String,
    pub reason: String,
    /// Required for disposal
    pub authorized_by: String,
    pub location: Option<String>,
    pub notes: String,
}

/// Result of a mutation: the updated record and the event that caused it
#[derive(Debug, Clone)]
pub struct CustodyUpdate {
    pub item: EvidenceItem,
    pub event: CustodyEvent,
}

/// Outcome of re-hashing a digital evidence file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityReport {
    pub evidence_id: String,
    pub file_path: PathBuf,
    pub algorithm: String,
    /// Baseline recorded at collection
    pub expected: String,
    /// Digest of the file as it is now
    pub actual: String,
    pub matched: bool,
    pub checked_at: DateTime<Utc>,
}

impl IntegrityReport {
    /// Human-readable verdict
    pub fn explanation(&self) -> String {
        if self.matched {
            format!(
                "{} digest of {} matches the collection baseline {}",
                self.algorithm,
                self.file_path.display(),
                self.expected
            )
        } else {
            format!(
                "{} digest of {} is {} but the collection baseline is {}; the file changed after collection",
                self.algorithm,
                self.file_path.display(),
                self.actual,
                self.expected
            )
        }
    }
}

/// Evidence lifecycle and chain-of-custody service
pub struct EvidenceService {
    store: Arc<dyn EvidenceStore>,
    log: Arc<dyn CustodyLog>,
    cases: Arc<dyn CaseLink>,
    digester: Arc<dyn Digester>,
    locks: ItemLocks,
}

impl EvidenceService {
    /// Build a service from its collaborators
    pub fn new(
        store: Arc<dyn EvidenceStore>,
        log: Arc<dyn CustodyLog>,
        cases: Arc<dyn CaseLink>,
        digester: Arc<dyn Digester>,
    ) -> Self {
        Self {
            store,
            log,
            cases,
            digester,
            locks: ItemLocks::new(),
        }
    }

    /// Service with in-process storage and SHA-256 digests
    pub fn in_memory(cases: Arc<dyn CaseLink>) -> Self {
        Self::new(
            Arc::new(MemoryEvidenceStore::new()),
            Arc::new(MemoryCustodyLog::new()),
            cases,
            Arc::new(Sha256Digester::new()),
        )
    }

    /// Service persisting under `evidence_dir` (`<id>/record.json` + `<id>/custody.jsonl`)
    pub fn file_backed(
        evidence_dir: &Path,
        cases: Arc<dyn CaseLink>,
        digester: Arc<dyn Digester>,
    ) -> Self {
        Self::new(
            Arc::new(JsonEvidenceStore::new(evidence_dir)),
            Arc::new(JsonlCustodyLog::new(evidence_dir)),
            cases,
            digester,
        )
    }

    /// Collect a new evidence item.
    ///
    /// Digital evidence is hashed before anything is written; if hashing
    /// fails nothing is persisted.
    #[instrument(skip(self, input), fields(case_id = %input.case_id))]
    pub async fn create_evidence(&self, input: NewEvidence) -> LedgerResult<EvidenceItem> {
        validate_new_evidence(&input)?;
        self.require_case(&input.case_id).await?;

        let id = input.id.clone().unwrap_or_else(generate_evidence_id);
        if input.related_evidence_ids.contains(&id) {
            return Err(LedgerError::Validation(format!(
                "evidence {} cannot be related to itself",
                id
            )));
        }

        // Hash outside the item lock; only the commit below is serialized
        let kind = self.resolve_kind(input.kind).await?;

        let _guard = self.locks.acquire(&id).await;

        let taken = self
            .store
            .contains(&id)
            .await
            .map_err(|e| LedgerError::storage(&id, "create", e))?
            || self
                .log
                .latest(&id)
                .await
                .map_err(|e| LedgerError::storage(&id, "create", e))?
                .is_some();
        if taken {
            return Err(LedgerError::Validation(format!(
                "evidence ID {} is already in use",
                id
            )));
        }

        let now = Utc::now();
        let mut item = EvidenceItem {
            id: id.clone(),
            case_id: input.case_id,
            evidence_number: input.evidence_number,
            description: input.description.trim().to_string(),
            kind,
            tags: input.tags,
            is_confidential: input.is_confidential,
            related_evidence_ids: input.related_evidence_ids,
            collected_by: input.collected_by.clone(),
            collection_date: input.collection_date,
            collection_site: input.collection_site,
            collection_method: input.collection_method,
            collection_notes: input.collection_notes.clone(),
            notes: input.notes,
            status: EvidenceStatus::Collected,
            current_storage_location: String::new(),
            current_custodian: String::new(),
            last_sequence: 0,
            created_at: now,
            updated_at: now,
        };

        let collected = NewCustodyEvent::new(
            &id,
            EvidenceStatus::Collected.custody_action(),
            EvidenceStatus::Collected,
        )
        .between("", input.collected_by)
        .moving(item.collection_site.summary(), input.storage_location)
        .with_reason("Initial collection")
        .with_notes(input.collection_notes)
        .with_timestamp(input.collection_date);

        item.apply_event(&collected.clone().seal(1, None));

        // The no-clobber save claims the ID, also against other processes
        match self.store.save(&item).await {
            Ok(()) => {}
            Err(StoreError::AlreadyExists(_)) => {
                return Err(LedgerError::Validation(format!(
                    "evidence ID {} is already in use",
                    id
                )));
            }
            Err(e) => return Err(LedgerError::storage(&id, "create", e)),
        }

        // Only ever the first event; an existing history is left untouched
        if let Err(e) = self.log.append_first(collected).await {
            self.discard_record(&id).await;
            return Err(match e {
                StoreError::AlreadyExists(_) => LedgerError::Validation(format!(
                    "evidence ID {} already has a custody history",
                    id
                )),
                e => LedgerError::storage(&id, "create", e),
            });
        }

        info!(
            evidence_id = %item.id,
            evidence_type = %item.evidence_type(),
            location = %item.current_storage_location,
            "Evidence collected"
        );

        Ok(item)
    }

    /// Load an item, with its derived view brought up to date with the log
    pub async fn get_evidence(&self, id: &str) -> LedgerResult<EvidenceItem> {
        let item = self.find(id, "get").await?;
        let (item, _) = self
            .reconcile(item, "get", false)
            .await?
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))?;
        Ok(item)
    }

    /// Full custody history of an item, oldest first
    pub async fn custody_history(&self, id: &str) -> LedgerResult<Vec<CustodyEvent>> {
        self.find(id, "history").await?;
        let history = self
            .log
            .list_for(id)
            .await
            .map_err(|e| LedgerError::storage(id, "history", e))?;

        // A record without events was never committed
        if history.is_empty() {
            return Err(LedgerError::NotFound(id.to_string()));
        }

        Ok(history)
    }

    /// Hand an item to another person and/or location
    #[instrument(skip(self, request))]
    pub async fn transfer_custody(
        &self,
        evidence_id: &str,
        request: TransferRequest,
    ) -> LedgerResult<CustodyUpdate> {
        require_field("from_person", &request.from_person)?;
        require_field("to_person", &request.to_person)?;
        require_field("to_location", &request.to_location)?;
        require_field("reason", &request.reason)?;

        let update = self
            .record_event(evidence_id, "transfer", |item| {
                let from_location = if request.from_location.trim().is_empty() {
                    item.current_storage_location.clone()
                } else {
                    request.from_location.clone()
                };

                if from_location != item.current_storage_location {
                    warn!(
                        recorded = %item.current_storage_location,
                        claimed = %from_location,
                        "Transfer origin differs from recorded location"
                    );
                }
                if request.from_person != item.current_custodian {
                    warn!(
                        recorded = %item.current_custodian,
                        claimed = %request.from_person,
                        "Transfer origin differs from recorded custodian"
                    );
                }

                Ok(NewCustodyEvent::new(
                    &item.id,
                    CustodyAction::Transferred,
                    item.status,
                )
                .between(request.from_person.clone(), request.to_person.clone())
                .moving(from_location, request.to_location.clone())
                .with_reason(request.reason.clone())
                .with_notes(request.notes.clone())
                .authorized_by(request.authorized_by.clone())
                .transported_by(request.transport_method.clone())
                .verified_by(request.verification_method.clone()))
            })
            .await?;

        info!(summary = %update.event.summary(), "Custody transferred");
        Ok(update)
    }

    /// Move an item along its lifecycle
    #[instrument(skip(self, change), fields(target = %change.target))]
    pub async fn update_status(
        &self,
        evidence_id: &str,
        change: StatusChange,
    ) -> LedgerResult<CustodyUpdate> {
        require_field("performed_by", &change.performed_by)?;
        require_field("reason", &change.reason)?;
        if let Some(location) = &change.location {
            require_field("location", location)?;
        }

        let update = self
            .record_event(evidence_id, "status update", |item| {
                if !item.status.can_transition_to(change.target) {
                    return Err(LedgerError::InvalidTransition {
                        evidence_id: item.id.clone(),
                        from: item.status,
                        to: change.target,
                    });
                }

                let to_location = change
                    .location
                    .clone()
                    .unwrap_or_else(|| item.current_storage_location.clone());

                Ok(NewCustodyEvent::new(
                    &item.id,
                    change.target.custody_action(),
                    change.target,
                )
                .between(item.current_custodian.clone(), change.performed_by.clone())
                .moving(item.current_storage_location.clone(), to_location)
                .with_reason(change.reason.clone())
                .with_notes(change.notes.clone())
                .authorized_by(change.authorized_by.clone()))
            })
            .await?;

        info!(status = %update.item.status, "Evidence status changed");
        Ok(update)
    }

    /// Release or destroy an item (requires an authorizing person)
    pub async fn dispose(&self, evidence_id: &str, disposal: Disposal) -> LedgerResult<CustodyUpdate> {
        require_field("authorized_by", &disposal.authorized_by)?;

        let change = StatusChange {
            target: disposal.method.target_status(),
            performed_by: disposal.performed_by,
            location: disposal.location,
            reason: disposal.reason,
            notes: disposal.notes,
            authorized_by: Some(disposal.authorized_by),
        };

        self.update_status(evidence_id, change).await
    }

    /// Re-hash a digital evidence file and compare it with the collection baseline.
    ///
    /// Detection only: the record is never modified. A file that cannot be
    /// read yields `IntegrityCheckFailed`, distinct from a mismatch report.
    #[instrument(skip(self))]
    pub async fn verify_integrity(&self, evidence_id: &str) -> LedgerResult<IntegrityReport> {
        let item = self.get_evidence(evidence_id).await?;

        let artifact = item
            .digital()
            .ok_or_else(|| LedgerError::UnsupportedOperation {
                evidence_id: item.id.clone(),
                operation: "integrity verification",
                evidence_type: item.evidence_type(),
            })?;

        let actual = self
            .digester
            .digest(&artifact.file_path)
            .await
            .map_err(|source| LedgerError::IntegrityCheckFailed {
                evidence_id: item.id.clone(),
                source,
            })?;

        let report = IntegrityReport {
            evidence_id: item.id.clone(),
            file_path: artifact.file_path.clone(),
            algorithm: self.digester.algorithm().to_string(),
            matched: actual == artifact.original_hash,
            expected: artifact.original_hash.clone(),
            actual,
            checked_at: Utc::now(),
        };

        if report.matched {
            info!("Integrity verified");
        } else {
            warn!(expected = %report.expected, actual = %report.actual, "Integrity mismatch");
        }

        Ok(report)
    }

    /// All evidence attached to a case
    pub async fn search_by_case(&self, case_id: &str) -> LedgerResult<Vec<EvidenceItem>> {
        self.require_case(case_id).await?;

        let items = self
            .store
            .find_by_case(case_id)
            .await
            .map_err(|e| LedgerError::storage(case_id, "search", e))?;

        self.reconcile_all(items).await
    }

    /// Free-text search over description and tags (empty query matches all)
    pub async fn search(&self, query: &str) -> LedgerResult<Vec<EvidenceItem>> {
        let query = query.trim();
        let items = self
            .store
            .list()
            .await
            .map_err(|e| LedgerError::storage(query, "search", e))?
            .into_iter()
            .filter(|item| item.matches_query(query))
            .collect();

        self.reconcile_all(items).await
    }

    /// Remove an item and its entire custody history.
    ///
    /// Destructive and administrative; never part of the normal lifecycle.
    #[instrument(skip(self))]
    pub async fn delete_evidence(&self, evidence_id: &str) -> LedgerResult<()> {
        let _guard = self.locks.acquire(evidence_id).await;

        self.find(evidence_id, "delete").await?;
        self.store
            .delete(evidence_id)
            .await
            .map_err(|e| LedgerError::storage(evidence_id, "delete", e))?;
        self.log
            .purge(evidence_id)
            .await
            .map_err(|e| LedgerError::storage(evidence_id, "delete", e))?;

        warn!("Evidence and custody history deleted");
        Ok(())
    }

    /// Record one event for an item, under the item lock.
    ///
    /// The record is staged with the event applied before the event is
    /// appended. If the append fails the previous record is restored, so an
    /// error never leaves an observable change behind.
    async fn record_event<F>(
        &self,
        evidence_id: &str,
        operation: &'static str,
        build: F,
    ) -> LedgerResult<CustodyUpdate>
    where
        F: FnOnce(&EvidenceItem) -> LedgerResult<NewCustodyEvent>,
    {
        let _guard = self.locks.acquire(evidence_id).await;

        let item = self.find(evidence_id, operation).await?;
        let (item, latest) = self
            .reconcile(item, operation, true)
            .await?
            .ok_or_else(|| LedgerError::NotFound(evidence_id.to_string()))?;

        if item.is_finalized() {
            return Err(LedgerError::EvidenceFinalized {
                evidence_id: item.id,
                status: item.status,
            });
        }

        let event = build(&item)?;
        let expected = event
            .clone()
            .seal(latest.sequence + 1, Some(latest.timestamp));

        let mut staged = item.clone();
        staged.apply_event(&expected);
        self.store
            .update(&staged)
            .await
            .map_err(|e| LedgerError::storage(evidence_id, operation, e))?;

        let sealed = match self.log.append(event).await {
            Ok(sealed) => sealed,
            Err(e) => {
                if let Err(restore_err) = self.store.update(&item).await {
                    warn!(
                        evidence_id = %evidence_id,
                        error = %restore_err,
                        "Failed to restore record after custody append failed; reads fall back to the log"
                    );
                }
                return Err(LedgerError::storage(evidence_id, operation, e));
            }
        };

        if sealed != expected {
            // Another process appended first; describe the event actually written
            staged = item;
            staged.apply_event(&sealed);
            if let Err(e) = self.store.update(&staged).await {
                warn!(
                    evidence_id = %evidence_id,
                    sequence = sealed.sequence,
                    error = %e,
                    "Record update failed after custody append; reads fall back to the log"
                );
            }
        }

        Ok(CustodyUpdate {
            item: staged,
            event: sealed,
        })
    }

    /// Bring a record in line with its custody log.
    ///
    /// Events the record has not seen are applied. A record that is ahead of
    /// the log describes an event that was never committed and is rolled back
    /// to the latest logged one. Returns `None` when the log is empty, i.e.
    /// the item itself was never committed, and otherwise the item and the
    /// latest event.
    async fn reconcile(
        &self,
        mut item: EvidenceItem,
        operation: &'static str,
        writing: bool,
    ) -> LedgerResult<Option<(EvidenceItem, CustodyEvent)>> {
        let mut events = self
            .log
            .list_for(&item.id)
            .await
            .map_err(|e| LedgerError::storage(&item.id, operation, e))?;

        let Some(latest) = events.pop() else {
            return Ok(None);
        };

        let recorded = item.last_sequence;
        if recorded == latest.sequence {
            return Ok(Some((item, latest)));
        }

        if recorded < latest.sequence {
            for event in events.iter().filter(|e| e.sequence > recorded) {
                item.apply_event(event);
            }
        }
        item.apply_event(&latest);

        if writing {
            warn!(
                evidence_id = %item.id,
                recorded,
                logged = latest.sequence,
                "Evidence record disagreed with its custody log; rebuilt from log"
            );
            self.store
                .update(&item)
                .await
                .map_err(|e| LedgerError::storage(&item.id, operation, e))?;
        } else {
            // Unlocked reads can land inside another writer's update
            debug!(
                evidence_id = %item.id,
                recorded,
                logged = latest.sequence,
                "Read record out of step with custody log"
            );
        }

        Ok(Some((item, latest)))
    }

    /// Remove a record whose custody event could not be committed
    async fn discard_record(&self, evidence_id: &str) {
        if let Err(e) = self.store.delete(evidence_id).await {
            warn!(evidence_id = %evidence_id, error = %e, "Failed to remove uncommitted evidence record");
        }
    }

    async fn reconcile_all(&self, items: Vec<EvidenceItem>) -> LedgerResult<Vec<EvidenceItem>> {
        let mut current = Vec::with_capacity(items.len());
        for item in items {
            if let Some((item, _)) = self.reconcile(item, "search", false).await? {
                current.push(item);
            }
        }

        current.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(current)
    }

    async fn find(&self, id: &str, operation: &'static str) -> LedgerResult<EvidenceItem> {
        // Malformed IDs can never name a stored item
        if !is_valid_id(id) {
            return Err(LedgerError::NotFound(id.to_string()));
        }

        match self.store.find(id).await {
            Ok(item) => Ok(item),
            Err(StoreError::NotFound(_)) => Err(LedgerError::NotFound(id.to_string())),
            Err(e) => Err(LedgerError::storage(id, operation, e)),
        }
    }

    async fn require_case(&self, case_id: &str) -> LedgerResult<()> {
        require_field("case_id", case_id)?;

        let exists = self
            .cases
            .exists(case_id)
            .await
            .map_err(|source| LedgerError::CaseLink {
                case_id: case_id.to_string(),
                source,
            })?;

        if !exists {
            return Err(LedgerError::CaseNotFound(case_id.to_string()));
        }

        Ok(())
    }

    /// Turn collection input into a stored kind, hashing digital evidence
    async fn resolve_kind(&self, kind: NewEvidenceKind) -> LedgerResult<EvidenceKind> {
        let kind = match kind {
            NewEvidenceKind::Physical => EvidenceKind::Physical,
            NewEvidenceKind::Document => EvidenceKind::Document,
            NewEvidenceKind::Weapon => EvidenceKind::Weapon,
            NewEvidenceKind::Other => EvidenceKind::Other,
            NewEvidenceKind::Biological(sample) => EvidenceKind::Biological(sample),
            NewEvidenceKind::Digital {
                file_path,
                device_source,
            } => {
                let hash = self.digester.digest(&file_path).await?;

                let metadata = fs::metadata(&file_path).await.map_err(|source| DigestError::Io {
                    path: file_path.clone(),
                    source,
                })?;

                let file_type = file_path
                    .extension()
                    .map(|ext| ext.to_string_lossy().to_string())
                    .unwrap_or_default();

                debug!(path = %file_path.display(), %hash, "Computed collection baseline");

                EvidenceKind::Digital(DigitalArtifact {
                    file_path,
                    file_size: metadata.len(),
                    file_type,
                    device_source,
                    file_hash: hash.clone(),
                    original_hash: hash,
                })
            }
        };

        Ok(kind)
    }
}

fn require_field(name: &str, value: &str) -> LedgerResult<()> {
    if value.trim().is_empty() {
        return Err(LedgerError::Validation(format!("{} is required", name)));
    }
    Ok(())
}

fn validate_new_evidence(input: &NewEvidence) -> LedgerResult<()> {
    require_field("description", &input.description)?;
    require_field("collected_by", &input.collected_by)?;
    require_field("storage_location", &input.storage_location)?;

    if let Some(id) = &input.id {
        if !is_valid_id(id) {
            return Err(LedgerError::Validation(format!(
                "invalid evidence ID '{}': use letters, digits, '-', '_' or '.'",
                id
            )));
        }
    }

    Ok(())
}
