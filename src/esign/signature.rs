//! Signature primitive: PIN hashing, document fingerprints, and
//! HMAC-SHA256 signature values.
//!
//! A document fingerprint is the SHA-256 digest (hex) of the stored
//! document bytes. A signature value is HMAC-SHA256 over that
//! fingerprint string, keyed by the signer's per-key MAC secret.
//! Verification is constant-time and returns `false` for malformed
//! input rather than erroring.

use hmac::{Hmac, Mac};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::error::{EsignError, EsignResult};

type HmacSha256 = Hmac<Sha256>;

/// Hash a PIN for storage and comparison.
///
/// The PIN is trimmed first so registration and verification agree on
/// whitespace handling.
pub fn hash_pin(pin: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pin.trim().as_bytes());
    hex::encode(hasher.finalize())
}

/// Generate a fresh per-key MAC secret (32 random bytes, hex).
pub fn generate_mac_key() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Fingerprint of document bytes: SHA-256, hex encoded.
pub fn document_fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Produce a signature value over a document fingerprint.
pub fn sign_fingerprint(fingerprint: &str, mac_key: &str) -> EsignResult<String> {
    let mut mac = HmacSha256::new_from_slice(mac_key.as_bytes())
        .map_err(|e| EsignError::Internal(format!("invalid MAC key: {e}")))?;
    mac.update(fingerprint.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a signature value against a fingerprint and MAC key.
///
/// Comparison is constant-time. Malformed hex, a wrong-length tag, or
/// an unusable key all verify as `false`.
pub fn verify_fingerprint(fingerprint: &str, mac_key: &str, signature_value: &str) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(mac_key.as_bytes()) else {
        return false;
    };
    mac.update(fingerprint.as_bytes());

    let Ok(tag) = hex::decode(signature_value) else {
        return false;
    };
    mac.verify_slice(&tag).is_ok()
}
