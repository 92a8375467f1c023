//! Custody events for the append-only chain-of-custody log.
//!
//! Every handling of an evidence item is recorded as an immutable event.
//! The current state of an item (status, holder, location) is derived from
//! the most recent event in its log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::evidence::EvidenceStatus;

/// A single sealed entry in an evidence item's custody log.
///
/// Sealed events carry the sequence number assigned by the log. They are
/// never edited or removed once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustodyEvent {
    /// Unique identifier for this event
    pub id: String,

    /// The evidence item this event belongs to
    pub evidence_id: String,

    /// Position in the item's log, starting at 1
    pub sequence: u64,

    /// When the handling occurred
    pub timestamp: DateTime<Utc>,

    /// What happened to the item
    pub action: CustodyAction,

    /// Status of the item once this event is applied
    pub status_after: EvidenceStatus,

    /// Person handing the item over ("" for the initial collection)
    pub from_person: String,

    /// Person receiving the item
    pub to_person: String,

    pub from_location: String,

    pub to_location: String,

    /// Why the handling happened
    pub reason: String,

    #[serde(default)]
    pub notes: String,

    /// Person who authorized the handling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorized_by: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport_method: Option<String>,

    /// How the item was checked during handover (seal, photo, hash...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_method: Option<String>,
}

impl CustodyEvent {
    /// One-line human-readable summary of the handling
    pub fn summary(&self) -> String {
        let from = if self.from_person.is_empty() {
            "-"
        } else {
            self.from_person.as_str()
        };
        format!(
            "#{} {} {}: {} ({}) -> {} ({}) [{}]",
            self.sequence,
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.action,
            from,
            self.from_location,
            self.to_person,
            self.to_location,
            self.reason
        )
    }
}

/// An event that has not been appended yet.
///
/// The log turns it into a [`CustodyEvent`] by assigning a sequence number.
#[derive(Debug, Clone)]
pub struct NewCustodyEvent {
    pub id: String,
    pub evidence_id: String,
    pub timestamp: DateTime<Utc>,
    pub action: CustodyAction,
    pub status_after: EvidenceStatus,
    pub from_person: String,
    pub to_person: String,
    pub from_location: String,
    pub to_location: String,
    pub reason: String,
    pub notes: String,
    pub authorized_by: Option<String>,
    pub transport_method: Option<String>,
    pub verification_method: Option<String>,
}

impl NewCustodyEvent {
    /// Create a pending event with a fresh ID and the current timestamp
    pub fn new(
        evidence_id: impl Into<String>,
        action: CustodyAction,
        status_after: EvidenceStatus,
    ) -> Self {
        Self {
            id: generate_event_id(),
            evidence_id: evidence_id.into(),
            timestamp: Utc::now(),
            action,
            status_after,
            from_person: String::new(),
            to_person: String::new(),
            from_location: String::new(),
            to_location: String::new(),
            reason: String::new(),
            notes: String::new(),
            authorized_by: None,
            transport_method: None,
            verification_method: None,
        }
    }

    /// Set who handed over and who received the item
    pub fn between(mut self, from_person: impl Into<String>, to_person: impl Into<String>) -> Self {
        self.from_person = from_person.into();
        self.to_person = to_person.into();
        self
    }

    /// Set where the item moved from and to
    pub fn moving(mut self, from_location: impl Into<String>, to_location: impl Into<String>) -> Self {
        self.from_location = from_location.into();
        self.to_location = to_location.into();
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn authorized_by(mut self, authorized_by: Option<String>) -> Self {
        self.authorized_by = authorized_by;
        self
    }

    pub fn transported_by(mut self, transport_method: Option<String>) -> Self {
        self.transport_method = transport_method;
        self
    }

    pub fn verified_by(mut self, verification_method: Option<String>) -> Self {
        self.verification_method = verification_method;
        self
    }

    /// Seal the event at the given position in the log.
    ///
    /// The timestamp is clamped so it never precedes `previous`, keeping
    /// timestamps non-decreasing within an item's log.
    pub fn seal(self, sequence: u64, previous: Option<DateTime<Utc>>) -> CustodyEvent {
        let timestamp = match previous {
            Some(prev) if prev > self.timestamp => prev,
            _ => self.timestamp,
        };

        CustodyEvent {
            id: self.id,
            evidence_id: self.evidence_id,
            sequence,
            timestamp,
            action: self.action,
            status_after: self.status_after,
            from_person: self.from_person,
            to_person: self.to_person,
            from_location: self.from_location,
            to_location: self.to_location,
            reason: self.reason,
            notes: self.notes,
            authorized_by: self.authorized_by,
            transport_method: self.transport_method,
            verification_method: self.verification_method,
        }
    }
}

/// Kinds of handling recorded in the custody log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CustodyAction {
    /// Initial collection (always the first event)
    Collected,

    /// Handed to a lab or examiner for processing
    Processing,

    /// Moved between people or locations
    Transferred,

    /// Analysis completed
    Analyzed,

    /// Placed in long-term storage
    Stored,

    /// Returned to an owner or released from custody
    Released,

    /// Destroyed
    Destroyed,
}

impl CustodyAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collected => "COLLECTED",
            Self::Processing => "PROCESSING",
            Self::Transferred => "TRANSFERRED",
            Self::Analyzed => "ANALYZED",
            Self::Stored => "STORED",
            Self::Released => "RELEASED",
            Self::Destroyed => "DESTROYED",
        }
    }
}

impl std::fmt::Display for CustodyAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generate a collision-resistant custody event ID
pub fn generate_event_id() -> String {
    format!("CE-{}", Uuid::new_v4().simple())
}
