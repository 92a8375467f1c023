//! Evidence items and their lifecycle.
//!
//! An [`EvidenceItem`] combines immutable collection facts with a derived
//! current-state view (status, holder, location). The derived view is only
//! ever changed by applying a [`CustodyEvent`] from the item's log.

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::custody::{CustodyAction, CustodyEvent};

/// Storage location used when none is given at collection time
pub const DEFAULT_STORAGE_LOCATION: &str = "Evidence Locker";

/// A single piece of evidence attached to a case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    /// Unique evidence identifier
    pub id: String,

    /// Case this evidence belongs to
    pub case_id: String,

    /// Official exhibit number, if one was issued
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_number: Option<String>,

    pub description: String,

    /// Kind of evidence, with kind-specific details
    pub kind: EvidenceKind,

    #[serde(default)]
    pub tags: BTreeSet<String>,

    #[serde(default)]
    pub is_confidential: bool,

    /// Other evidence items this one relates to
    #[serde(default)]
    pub related_evidence_ids: BTreeSet<String>,

    /// Person who collected the item
    pub collected_by: String,

    pub collection_date: DateTime<Utc>,

    pub collection_site: CollectionSite,

    #[serde(default)]
    pub collection_method: String,

    #[serde(default)]
    pub collection_notes: String,

    #[serde(default)]
    pub notes: String,

    /// Lifecycle status (derived from the custody log)
    pub status: EvidenceStatus,

    /// Where the item currently is (derived from the custody log)
    pub current_storage_location: String,

    /// Who currently holds the item (derived from the custody log)
    pub current_custodian: String,

    /// Sequence number of the last custody event applied to this view
    pub last_sequence: u64,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl EvidenceItem {
    /// The evidence type label of this item's kind
    pub fn evidence_type(&self) -> EvidenceType {
        self.kind.evidence_type()
    }

    /// Digital-only details, present only for digital evidence
    pub fn digital(&self) -> Option<&DigitalArtifact> {
        match &self.kind {
            EvidenceKind::Digital(artifact) => Some(artifact),
            _ => None,
        }
    }

    /// Check if the item reached a terminal status
    pub fn is_finalized(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a custody event to the derived current-state view
    pub fn apply_event(&mut self, event: &CustodyEvent) {
        self.status = event.status_after;
        self.current_storage_location = event.to_location.clone();
        self.current_custodian = event.to_person.clone();
        self.last_sequence = event.sequence;
        self.updated_at = self.updated_at.max(event.timestamp);
    }

    /// Check if the item matches a free-text query (case-insensitive
    /// substring over description and tags)
    pub fn matches_query(&self, query: &str) -> bool {
        let query_lower = query.to_lowercase();

        self.description.to_lowercase().contains(&query_lower)
            || self
                .tags
                .iter()
                .any(|t| t.to_lowercase().contains(&query_lower))
    }
}

/// Kind of evidence, carrying the details only that kind has
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvidenceKind {
    Physical,
    Digital(DigitalArtifact),
    Document,
    Biological(BiologicalSample),
    Weapon,
    Other,
}

impl EvidenceKind {
    pub fn evidence_type(&self) -> EvidenceType {
        match self {
            Self::Physical => EvidenceType::Physical,
            Self::Digital(_) => EvidenceType::Digital,
            Self::Document => EvidenceType::Document,
            Self::Biological(_) => EvidenceType::Biological,
            Self::Weapon => EvidenceType::Weapon,
            Self::Other => EvidenceType::Other,
        }
    }
}

/// Details of a digital evidence file.
///
/// `file_hash` and `original_hash` are computed once when the item is
/// collected and form the tamper baseline; nothing rewrites them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigitalArtifact {
    pub file_path: PathBuf,

    /// Size in bytes at collection time
    pub file_size: u64,

    /// File extension, if any
    #[serde(default)]
    pub file_type: String,

    /// Device the file was taken from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_source: Option<String>,

    /// SHA-256 of the file at collection (lowercase hex)
    pub file_hash: String,

    /// Frozen baseline used for integrity verification
    pub original_hash: String,
}

/// Details of a biological sample
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiologicalSample {
    /// e.g. BLOOD, DNA, TISSUE
    pub biological_type: String,

    #[serde(default)]
    pub sample_id: String,

    #[serde(default)]
    pub preservation_method: String,

    #[serde(default)]
    pub storage_conditions: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<DateTime<Utc>>,
}

/// Where an item was found
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionSite {
    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo: Option<GeoPoint>,
}

impl CollectionSite {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_geo(mut self, latitude: f64, longitude: f64) -> Self {
        self.geo = Some(GeoPoint {
            latitude,
            longitude,
        });
        self
    }

    /// Single-line description used as the origin of the collection event
    pub fn summary(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if !self.description.is_empty() {
            parts.push(&self.description);
        }
        if let Some(room) = &self.room {
            parts.push(room);
        }
        if let Some(address) = &self.address {
            parts.push(address);
        }
        parts.join(", ")
    }
}

/// Geographic reference (WGS84 degrees)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Evidence type labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvidenceType {
    Physical,
    Digital,
    Document,
    Biological,
    Weapon,
    Other,
}

impl std::fmt::Display for EvidenceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            EvidenceType::Physical => "PHYSICAL",
            EvidenceType::Digital => "DIGITAL",
            EvidenceType::Document => "DOCUMENT",
            EvidenceType::Biological => "BIOLOGICAL",
            EvidenceType::Weapon => "WEAPON",
            EvidenceType::Other => "OTHER",
        };
        f.write_str(label)
    }
}

impl std::str::FromStr for EvidenceType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "PHYSICAL" => Ok(EvidenceType::Physical),
            "DIGITAL" => Ok(EvidenceType::Digital),
            "DOCUMENT" => Ok(EvidenceType::Document),
            "BIOLOGICAL" => Ok(EvidenceType::Biological),
            "WEAPON" => Ok(EvidenceType::Weapon),
            "OTHER" => Ok(EvidenceType::Other),
            _ => anyhow::bail!("Unknown evidence type: {}", s),
        }
    }
}

/// Lifecycle status of an evidence item.
///
/// ```text
/// COLLECTED -> PROCESSING -> ANALYZED -> IN_STORAGE -> {TRANSFERRED, RELEASED, DESTROYED}
/// TRANSFERRED -> {IN_STORAGE, RELEASED, DESTROYED}
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvidenceStatus {
    Collected,
    Processing,
    Analyzed,
    InStorage,
    Transferred,
    Released,
    Destroyed,
}

impl EvidenceStatus {
    /// Terminal statuses accept no further custody events
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Released | Self::Destroyed)
    }

    /// Check if moving from this status to `target` is allowed
    pub fn can_transition_to(&self, target: EvidenceStatus) -> bool {
        use EvidenceStatus::*;

        matches!(
            (self, target),
            (Collected, Processing)
                | (Processing, Analyzed)
                | (Analyzed, InStorage)
                | (InStorage, Transferred)
                | (InStorage, Released)
                | (InStorage, Destroyed)
                | (Transferred, InStorage)
                | (Transferred, Released)
                | (Transferred, Destroyed)
        )
    }

    /// Custody action recorded when an item enters this status
    pub fn custody_action(&self) -> CustodyAction {
        match self {
            Self::Collected => CustodyAction::Collected,
            Self::Processing => CustodyAction::Processing,
            Self::Analyzed => CustodyAction::Analyzed,
            Self::InStorage => CustodyAction::Stored,
            Self::Transferred => CustodyAction::Transferred,
            Self::Released => CustodyAction::Released,
            Self::Destroyed => CustodyAction::Destroyed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collected => "COLLECTED",
            Self::Processing => "PROCESSING",
            Self::Analyzed => "ANALYZED",
            Self::InStorage => "IN_STORAGE",
            Self::Transferred => "TRANSFERRED",
            Self::Released => "RELEASED",
            Self::Destroyed => "DESTROYED",
        }
    }
}

impl std::fmt::Display for EvidenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EvidenceStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().replace('-', "_").as_str() {
            "COLLECTED" => Ok(Self::Collected),
            "PROCESSING" => Ok(Self::Processing),
            "ANALYZED" => Ok(Self::Analyzed),
            "IN_STORAGE" | "STORED" => Ok(Self::InStorage),
            "TRANSFERRED" => Ok(Self::Transferred),
            "RELEASED" => Ok(Self::Released),
            "DESTROYED" => Ok(Self::Destroyed),
            _ => anyhow::bail!("Unknown evidence status: {}", s),
        }
    }
}

/// Input for collecting a new evidence item
#[derive(Debug, Clone)]
pub struct NewEvidence {
    /// Caller-chosen ID; generated when absent
    pub id: Option<String>,
    pub case_id: String,
    pub evidence_number: Option<String>,
    pub description: String,
    pub kind: NewEvidenceKind,
    pub tags: BTreeSet<String>,
    pub is_confidential: bool,
    pub related_evidence_ids: BTreeSet<String>,
    pub collected_by: String,
    pub collection_date: DateTime<Utc>,
    pub collection_site: CollectionSite,
    pub collection_method: String,
    pub collection_notes: String,
    pub notes: String,
    /// Where the item is stored right after collection
    pub storage_location: String,
}

impl NewEvidence {
    /// Create collection input with defaults for everything optional
    pub fn new(
        case_id: impl Into<String>,
        description: impl Into<String>,
        kind: NewEvidenceKind,
    ) -> Self {
        Self {
            id: None,
            case_id: case_id.into(),
            evidence_number: None,
            description: description.into(),
            kind,
            tags: BTreeSet::new(),
            is_confidential: false,
            related_evidence_ids: BTreeSet::new(),
            collected_by: String::new(),
            collection_date: Utc::now(),
            collection_site: CollectionSite::default(),
            collection_method: String::new(),
            collection_notes: String::new(),
            notes: String::new(),
            storage_location: DEFAULT_STORAGE_LOCATION.to_string(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn collected_by(mut self, person: impl Into<String>) -> Self {
        self.collected_by = person.into();
        self
    }

    pub fn collected_at(mut self, site: CollectionSite) -> Self {
        self.collection_site = site;
        self
    }

    pub fn stored_in(mut self, location: impl Into<String>) -> Self {
        self.storage_location = location.into();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn related_to(mut self, evidence_id: impl Into<String>) -> Self {
        self.related_evidence_ids.insert(evidence_id.into());
        self
    }

    pub fn confidential(mut self) -> Self {
        self.is_confidential = true;
        self
    }
}

/// Kind-specific input at collection time.
///
/// Digital evidence only names the file; size and hashes are computed
/// during collection.
#[derive(Debug, Clone)]
pub enum NewEvidenceKind {
    Physical,
    Digital {
        file_path: PathBuf,
        device_source: Option<String>,
    },
    Document,
    Biological(BiologicalSample),
    Weapon,
    Other,
}

impl NewEvidenceKind {
    /// Digital evidence read from `file_path`
    pub fn digital(file_path: impl Into<PathBuf>) -> Self {
        Self::Digital {
            file_path: file_path.into(),
            device_source: None,
        }
    }

    pub fn evidence_type(&self) -> EvidenceType {
        match self {
            Self::Physical => EvidenceType::Physical,
            Self::Digital { .. } => EvidenceType::Digital,
            Self::Document => EvidenceType::Document,
            Self::Biological(_) => EvidenceType::Biological,
            Self::Weapon => EvidenceType::Weapon,
            Self::Other => EvidenceType::Other,
        }
    }
}

/// Generate a collision-resistant evidence ID
pub fn generate_evidence_id() -> String {
    format!("EV-{}", Uuid::new_v4().simple())
}

/// Check that an ID is usable as a storage key.
///
/// Accepts ASCII letters, digits, `-`, `_` and `.`, and rejects `.`/`..`.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && id != ".."
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
