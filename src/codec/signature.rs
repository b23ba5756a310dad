//! HMAC-SHA256 signatures for QR tokens.
//!
//! When the service is configured with a token secret, every structured token
//! carries a hex-encoded HMAC over its canonical `type|userId|timestamp` string.
//! This stops volunteers' scanners from accepting hand-typed tokens for arbitrary
//! participant ids; it does not make tokens single-use (the registry does that).

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Builds the canonical string that gets signed.
pub fn canonical_payload(purpose: &str, user_id: &str, timestamp: Option<i64>) -> String {
    match timestamp {
        Some(ts) => format!("{purpose}|{user_id}|{ts}"),
        None => format!("{purpose}|{user_id}|"),
    }
}

/// Computes the HMAC-SHA256 signature of a payload.
pub fn compute_signature(payload: &[u8], secret: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length, so this never takes the fallback path.
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return Vec::new();
    };
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Hex-encodes a signature for embedding in a token.
pub fn format_signature(signature: &[u8]) -> String {
    hex::encode(signature)
}

/// Verifies a hex signature against the payload and secret.
///
/// Returns `false` for malformed hex. Uses constant-time comparison.
pub fn verify_signature(payload: &[u8], signature_hex: &str, secret: &[u8]) -> bool {
    let Ok(expected) = hex::decode(signature_hex) else {
        return false;
    };

    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}
