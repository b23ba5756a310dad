//! Participant records and their lifecycle state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ids::{ParticipantId, QrToken};

/// Attendance axis of the participant lifecycle.
///
/// The derived ordering is the lifecycle order: `Registered < CheckedIn < Scanned`.
/// Status only ever moves forward; `CheckedIn` may be skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttendanceStatus {
    /// Registered for the event, not yet seen at a desk.
    Registered,

    /// Passed the optional entrance check-in.
    CheckedIn,

    /// Attendance scan completed. Terminal.
    Scanned,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Registered => "registered",
            AttendanceStatus::CheckedIn => "checked-in",
            AttendanceStatus::Scanned => "scanned",
        }
    }

    /// Returns true if moving from `self` to `next` goes forward in the lifecycle.
    pub fn can_advance_to(&self, next: AttendanceStatus) -> bool {
        next > *self
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a QR scan is meant to accomplish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Purpose {
    /// Entrance check-in (`registered -> checked-in`).
    CheckIn,

    /// Attendance scan (`registered | checked-in -> scanned`).
    Attendance,

    /// Gift redemption. Requires a completed attendance scan.
    Gift,
}

impl Purpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Purpose::CheckIn => "check-in",
            Purpose::Attendance => "attendance",
            Purpose::Gift => "gift",
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown purpose string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown scan purpose: {0:?}")]
pub struct UnknownPurpose(pub String);

impl FromStr for Purpose {
    type Err = UnknownPurpose;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "check-in" => Ok(Purpose::CheckIn),
            "attendance" => Ok(Purpose::Attendance),
            "gift" => Ok(Purpose::Gift),
            other => Err(UnknownPurpose(other.to_string())),
        }
    }
}

/// A participant record as held by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    /// The most recently issued opaque token.
    pub qr_token: QrToken,

    pub status: AttendanceStatus,

    /// Gift axis. Starts false and only ever flips to true.
    pub gift_redeemed: bool,

    pub registered_at: DateTime<Utc>,
}

impl Participant {
    /// Builds a freshly registered participant.
    pub fn registered(new: NewParticipant, at: DateTime<Utc>) -> Self {
        Participant {
            id: new.id.unwrap_or_else(ParticipantId::generate),
            name: new.name,
            email: new.email,
            phone: new.phone,
            qr_token: new.qr_token.unwrap_or_else(QrToken::generate),
            status: AttendanceStatus::Registered,
            gift_redeemed: false,
            registered_at: at,
        }
    }

    /// Lexicographic progress marker used to detect regressions in change streams.
    pub fn progress(&self) -> (AttendanceStatus, bool) {
        (self.status, self.gift_redeemed)
    }
}

/// Registration request from the external registration system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewParticipant {
    /// Identifier from the identity provider. Generated when absent.
    #[serde(default)]
    pub id: Option<ParticipantId>,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    /// Pre-printed opaque token. Generated when absent.
    #[serde(default)]
    pub qr_token: Option<QrToken>,
}

impl NewParticipant {
    pub fn new(
        id: impl Into<ParticipantId>,
        name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        NewParticipant {
            id: Some(id.into()),
            name: name.into(),
            email: email.into(),
            phone: None,
            qr_token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<QrToken>) -> Self {
        self.qr_token = Some(token.into());
        self
    }
}
