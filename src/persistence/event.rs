//! Event types for the persistence journals.
//!
//! Events are appended to a journal in JSON Lines format. Each event has a
//! monotonic sequence number and timestamp; the payload is flattened into the
//! same JSON object.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::types::{AttendanceStatus, Participant, ParticipantId, QrToken, ScanLogEntry};

/// A payload that can be written to an [`EventLog`](super::EventLog).
pub trait JournalPayload: Serialize + DeserializeOwned {}

/// An event in a journal.
///
/// Example JSON:
/// ```json
/// {"seq":3,"ts":"2025-08-16T10:00:00Z","type":"status_changed","id":"p1","from":"registered","to":"scanned"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(serialize = "P: Serialize", deserialize = "P: DeserializeOwned"))]
pub struct Event<P> {
    /// Monotonic sequence number. Used for replay validation and ordering.
    pub seq: u64,

    /// Timestamp when the event was appended (UTC).
    pub ts: DateTime<Utc>,

    /// The event payload, flattened into the JSON object.
    #[serde(flatten)]
    pub payload: P,
}

impl<P: JournalPayload> Event<P> {
    pub fn new(seq: u64, payload: P) -> Self {
        Event {
            seq,
            ts: Utc::now(),
            payload,
        }
    }
}

/// Mutations of the participant registry.
///
/// Replaying these in order from an empty registry reproduces its state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegistryEvent {
    /// A participant was registered.
    Registered { participant: Participant },

    /// A compare-and-set on the attendance status committed.
    StatusChanged {
        id: ParticipantId,
        from: AttendanceStatus,
        to: AttendanceStatus,
    },

    /// The gift flag was set.
    GiftRedeemed { id: ParticipantId },

    /// A regenerated opaque token was installed. The previous token stays reserved.
    TokenReissued { id: ParticipantId, token: QrToken },
}

impl JournalPayload for RegistryEvent {}

/// Records in the scan audit journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// One scan attempt, whatever its outcome.
    ScanRecorded { entry: ScanLogEntry },
}

impl JournalPayload for AuditEvent {}
