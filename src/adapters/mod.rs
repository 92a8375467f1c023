//! Adapter interfaces for external systems.
//!
//! Case management lives outside the ledger. The ledger only needs to know
//! whether a case ID exists before evidence is attached to it.

pub mod cases;

use anyhow::Result;
use async_trait::async_trait;

pub use cases::{CaseRecord, CaseRegistry, StaticCaseLink};

/// Boundary to the case subsystem
#[async_trait]
pub trait CaseLink: Send + Sync {
    /// Check if a case with this ID currently exists
    async fn exists(&self, case_id: &str) -> Result<bool>;
}
