//! QR token codec.
//!
//! A structured token is the compact JSON object a participant's QR page renders:
//!
//! ```json
//! {"type":"attendance","userId":"asha@example.org","timestamp":1723800000000}
//! ```
//!
//! with an extra `"sig"` field when the service signs tokens. The page asks for a
//! fresh token every few seconds, so screenshots go stale quickly; the codec itself
//! never rejects old tokens. Freshness is a presentation concern, and replay is
//! harmless because every transition is a compare-and-set in the registry.
//!
//! Decoding only establishes well-formedness. The embedded id still has to be
//! resolved against the registry before anything is trusted.

pub mod signature;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{ParticipantId, Purpose};
use signature::{canonical_payload, compute_signature, format_signature, verify_signature};

/// Why a raw scan could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// Nothing was scanned.
    #[error("empty token")]
    Empty,

    /// The raw string is not a structured token. It may still be an opaque
    /// registry token.
    #[error("token is not a structured QR payload")]
    Unstructured,

    /// Looks like a structured token but doesn't parse or lacks a field.
    #[error("malformed token: {0}")]
    Malformed(String),

    /// The embedded purpose is not one this service knows.
    #[error("unknown token purpose: {0:?}")]
    UnknownPurpose(String),

    /// A signature is required but the token has none.
    #[error("token is not signed")]
    MissingSignature,

    /// The signature doesn't match the token contents.
    #[error("token signature is invalid")]
    BadSignature,
}

/// The contents of a well-formed token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedToken {
    pub participant_id: ParticipantId,
    pub purpose: Purpose,
    /// When the token was generated. Older pages omitted it.
    pub issued_at: Option<DateTime<Utc>>,
}

/// On-the-wire token layout.
#[derive(Debug, Serialize, Deserialize)]
struct WireToken {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(rename = "userId")]
    user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sig: Option<String>,
}

/// Encodes and decodes QR tokens. Stateless apart from the optional secret.
#[derive(Clone, Default)]
pub struct QrCodec {
    secret: Option<Vec<u8>>,
}

impl std::fmt::Debug for QrCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QrCodec")
            .field("signed", &self.secret.is_some())
            .finish()
    }
}

impl QrCodec {
    /// A codec that neither signs nor checks signatures.
    pub fn new() -> Self {
        QrCodec { secret: None }
    }

    /// A codec that signs every token and rejects unsigned or forged ones.
    pub fn with_secret(secret: impl Into<Vec<u8>>) -> Self {
        QrCodec {
            secret: Some(secret.into()),
        }
    }

    pub fn is_signing(&self) -> bool {
        self.secret.is_some()
    }

    /// Encodes a token for `participant_id` and `purpose`, stamped with `issued_at`.
    pub fn encode(
        &self,
        participant_id: &ParticipantId,
        purpose: Purpose,
        issued_at: DateTime<Utc>,
    ) -> String {
        let timestamp = issued_at.timestamp_millis();
        let sig = self.secret.as_ref().map(|secret| {
            let payload =
                canonical_payload(purpose.as_str(), participant_id.as_str(), Some(timestamp));
            format_signature(&compute_signature(payload.as_bytes(), secret))
        });

        let wire = WireToken {
            kind: Some(purpose.as_str().to_string()),
            user_id: Some(participant_id.as_str().to_string()),
            timestamp: Some(timestamp),
            sig,
        };
        // Serializing a struct of strings and integers cannot fail.
        serde_json::to_string(&wire).unwrap_or_default()
    }

    /// Encodes a token stamped with the current time.
    pub fn issue(&self, participant_id: &ParticipantId, purpose: Purpose) -> String {
        self.encode(participant_id, purpose, Utc::now())
    }

    /// Decodes a raw scanned string.
    pub fn decode(&self, raw: &str) -> Result<DecodedToken, TokenError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(TokenError::Empty);
        }
        if !raw.starts_with('{') {
            return Err(TokenError::Unstructured);
        }

        let wire: WireToken =
            serde_json::from_str(raw).map_err(|e| TokenError::Malformed(e.to_string()))?;

        let kind = wire
            .kind
            .ok_or_else(|| TokenError::Malformed("missing \"type\"".to_string()))?;
        let user_id = wire
            .user_id
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| TokenError::Malformed("missing \"userId\"".to_string()))?;
        let purpose: Purpose = kind
            .parse()
            .map_err(|_| TokenError::UnknownPurpose(kind.clone()))?;

        if let Some(secret) = &self.secret {
            let sig = wire.sig.as_deref().ok_or(TokenError::MissingSignature)?;
            let payload = canonical_payload(&kind, &user_id, wire.timestamp);
            if !verify_signature(payload.as_bytes(), sig, secret) {
                return Err(TokenError::BadSignature);
            }
        }

        let issued_at = match wire.timestamp {
            Some(ms) => Some(Utc.timestamp_millis_opt(ms).single().ok_or_else(|| {
                TokenError::Malformed(format!("timestamp out of range: {ms}"))
            })?),
            None => None,
        };

        Ok(DecodedToken {
            participant_id: ParticipantId::new(user_id),
            purpose,
            issued_at,
        })
    }
}
