//! Core ledger logic.
//!
//! This module contains:
//! - Digest: File fingerprinting behind the `Digester` capability
//! - CustodyLog: Append-only custody event history per item
//! - EvidenceStore: Current-state evidence records
//! - EvidenceService: The only writer, enforcing the lifecycle rules

pub mod custody_log;
pub mod digest;
pub mod error;
pub mod locks;
pub mod record_store;
pub mod service;

// Re-export commonly used types
pub use custody_log::{CustodyLog, JsonlCustodyLog, MemoryCustodyLog, CUSTODY_FILE};
pub use digest::{compute_digest, compute_digest_with_deadline, Digester, Sha256Digester};
pub use error::{DigestError, LedgerError, StoreError};
pub use locks::ItemLocks;
pub use record_store::{EvidenceStore, JsonEvidenceStore, MemoryEvidenceStore, RECORD_FILE};
pub use service::{
    CustodyUpdate, Disposal, DisposalMethod, EvidenceService, IntegrityReport, StatusChange,
    TransferRequest,
};
