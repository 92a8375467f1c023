//! Domain types for the custody ledger.
//!
//! This module contains the core data structures:
//! - Evidence: Evidence items, their kinds and lifecycle status
//! - Custody: Immutable records of every handling of an item

pub mod custody;
pub mod evidence;

// Re-export commonly used types
pub use custody::{generate_event_id, CustodyAction, CustodyEvent, NewCustodyEvent};
pub use evidence::{
    generate_evidence_id, is_valid_id, BiologicalSample, CollectionSite, DigitalArtifact,
    EvidenceItem, EvidenceKind, EvidenceStatus, EvidenceType, GeoPoint, NewEvidence,
    NewEvidenceKind, DEFAULT_STORAGE_LOCATION,
};
