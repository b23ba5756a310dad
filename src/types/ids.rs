//! Newtype wrappers for domain identifiers.
//!
//! These types prevent accidental mixing of identifiers (e.g., passing a volunteer
//! id where a participant id is expected) and keep signatures self-documenting.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a registered participant.
///
/// Assigned by the registration system and immutable afterwards. In practice this
/// is whatever the identity provider hands out (an email address or a UUID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    pub fn new(s: impl Into<String>) -> Self {
        ParticipantId(s.into())
    }

    /// Generates a fresh random identifier for registrations that arrive without one.
    pub fn generate() -> Self {
        ParticipantId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(s: &str) -> Self {
        ParticipantId(s.to_string())
    }
}

impl From<String> for ParticipantId {
    fn from(s: String) -> Self {
        ParticipantId(s)
    }
}

/// Identifier of the volunteer operating a desk.
///
/// Authenticated upstream; this crate only records it for the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VolunteerId(pub String);

impl VolunteerId {
    pub fn new(s: impl Into<String>) -> Self {
        VolunteerId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VolunteerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for VolunteerId {
    fn from(s: &str) -> Self {
        VolunteerId(s.to_string())
    }
}

/// An opaque QR token stored on a participant record.
///
/// Registration hands every participant one of these; regenerated tokens are
/// added alongside the old ones, which keep resolving to the same participant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QrToken(pub String);

impl QrToken {
    pub fn new(s: impl Into<String>) -> Self {
        QrToken(s.into())
    }

    /// Generates a random opaque token.
    pub fn generate() -> Self {
        QrToken(format!("qr-{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QrToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for QrToken {
    fn from(s: &str) -> Self {
        QrToken(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn participant_id_serializes_transparently() {
        let id = ParticipantId::new("p-42");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"p-42\"");
        let back: ParticipantId = serde_json::from_str("\"p-42\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn generated_ids_are_distinct() {
        assert_ne!(ParticipantId::generate(), ParticipantId::generate());
        assert_ne!(QrToken::generate(), QrToken::generate());
    }

    #[test]
    fn generated_token_has_prefix() {
        assert!(QrToken::generate().as_str().starts_with("qr-"));
    }
}
