//! custodian - Evidence lifecycle and chain-of-custody ledger
//!
//! Tracks evidence items attached to cases and keeps an append-only,
//! per-item history of every handling: who had the item, where it was,
//! and why it moved.
//!
//! # Architecture
//!
//! The ledger is event-sourced per item:
//! - Every mutation appends one immutable custody event
//! - The item's status, location and custodian are derived from its events
//! - Digital evidence is hashed at collection; later checks compare
//!   against that frozen baseline
//!
//! # Modules
//!
//! - `adapters`: Boundary to the case subsystem
//! - `core`: Service, custody log, record store, digests
//! - `domain`: Data structures (EvidenceItem, CustodyEvent)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! custodian case add CASE-1 --title "Burglary at 12 Elm St"
//! custodian evidence add --case CASE-1 --type digital --file disk.img \
//!     --desc "Laptop image" --collected-by officer-a
//! custodian evidence transfer <ID> --from officer-a --to analyst-b \
//!     --to-location lab --reason "Forensic imaging"
//! custodian evidence verify <ID>
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use adapters::{CaseLink, CaseRegistry, StaticCaseLink};
pub use crate::core::{EvidenceService, LedgerError};
pub use domain::{
    CustodyAction, CustodyEvent, EvidenceItem, EvidenceKind, EvidenceStatus, EvidenceType,
    NewEvidence, NewEvidenceKind,
};
