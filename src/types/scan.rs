//! Scan outcomes and audit log entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{ParticipantId, VolunteerId};
use super::participant::{Participant, Purpose};

/// The business outcome of a single scan attempt, as shown to the volunteer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScanOutcome {
    /// The transition was committed.
    Success,

    /// The transition had already happened (or another desk won the race).
    /// No state was changed.
    Duplicate,

    /// The token decoded but no participant matches it.
    NotFound,

    /// The token could not be decoded or resolved.
    InvalidToken,

    /// The scan broke a business rule (gift before attendance).
    RuleViolation,

    /// The registry could not be reached or did not answer in time.
    /// The effect is unknown; the volunteer should retry.
    Unavailable,
}

impl ScanOutcome {
    /// Outcome recorded in the audit log for this scan outcome.
    ///
    /// Business-rule rejections are recorded in the invalid-token class.
    pub fn log_outcome(&self) -> LogOutcome {
        match self {
            ScanOutcome::Success => LogOutcome::Success,
            ScanOutcome::Duplicate => LogOutcome::Duplicate,
            ScanOutcome::NotFound => LogOutcome::NotFound,
            ScanOutcome::InvalidToken | ScanOutcome::RuleViolation => LogOutcome::InvalidToken,
            ScanOutcome::Unavailable => LogOutcome::Unavailable,
        }
    }

    /// Returns true if retrying the same scan may produce a different result.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ScanOutcome::Unavailable)
    }
}

/// Outcome column of the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogOutcome {
    Success,
    Duplicate,
    NotFound,
    InvalidToken,
    Unavailable,
}

/// One row of the append-only scan audit log.
///
/// Every scan attempt produces one entry, whatever its outcome. An attempt that
/// timed out but whose write committed later also gets a `success` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanLogEntry {
    /// Position in the audit log. Assigned on append.
    pub seq: u64,
    /// `None` when the token could not be resolved to a participant.
    pub participant_id: Option<ParticipantId>,
    pub volunteer_id: VolunteerId,
    pub purpose: Purpose,
    pub outcome: LogOutcome,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// An audit entry before the log has assigned it a sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLogEntry {
    pub participant_id: Option<ParticipantId>,
    pub volunteer_id: VolunteerId,
    pub purpose: Purpose,
    pub outcome: LogOutcome,
    pub message: String,
}

impl PendingLogEntry {
    pub fn into_entry(self, seq: u64, timestamp: DateTime<Utc>) -> ScanLogEntry {
        ScanLogEntry {
            seq,
            participant_id: self.participant_id,
            volunteer_id: self.volunteer_id,
            purpose: self.purpose,
            outcome: self.outcome,
            timestamp,
            message: self.message,
        }
    }
}

/// Inbound scan request from a desk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    pub raw_token: String,
    pub volunteer_id: VolunteerId,
    pub purpose: Purpose,
}

/// What the desk gets back for a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResponse {
    pub outcome: ScanOutcome,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant: Option<Participant>,
}
