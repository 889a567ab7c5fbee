//! Webhook signature verification
//!
//! Providers sign callbacks with HMAC-SHA256 over the raw request body, keyed
//! with a shared secret, and send the lowercase hex digest in `x-isa-signature`.

use crate::error::{AppError, AppResult};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the callback signature
pub const SIGNATURE_HEADER: &str = "x-isa-signature";

/// Hex-encoded HMAC-SHA256 of `body` keyed with `secret`
pub fn compute_signature(secret: &str, body: &[u8]) -> AppResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::configuration(format!("Invalid webhook secret: {}", e)))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check a callback signature against the configured secret.
///
/// With no secret configured the check is skipped and every callback passes.
/// A configured secret with a missing signature never passes.
pub fn verify_signature(
    secret: Option<&str>,
    body: &[u8],
    signature: Option<&str>,
) -> AppResult<bool> {
    let Some(secret) = secret else {
        return Ok(true);
    };
    let Some(provided) = signature else {
        return Ok(false);
    };

    let computed = compute_signature(secret, body)?;
    Ok(constant_time_eq(computed.as_bytes(), provided.trim().as_bytes()))
}

pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.iter().zip(b.iter()).fold(0, |acc, (x, y)| acc | (x ^ y)) == 0
}
