//! Stripe-style webhook signatures.
//!
//! Header format: `t=<unix seconds>,v1=<hex hmac>[,v1=<hex hmac>...]`, where each
//! `v1` is HMAC-SHA256(secret, "<t>.<raw body>").

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::BillingError;

type HmacSha256 = Hmac<Sha256>;

fn signed_mac(secret: &str, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, BillingError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| BillingError::InvalidSignature)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Builds a header value for `payload`, as the payment provider would send it.
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> Result<String, BillingError> {
    let mac = signed_mac(secret, timestamp, payload)?;
    Ok(format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    ))
}

/// Checks `header` against `payload`. Timestamps more than `tolerance_secs`
/// away from `now`, in either direction, are rejected even when the MAC matches.
pub fn verify_signature(
    header: &str,
    payload: &[u8],
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> Result<(), BillingError> {
    if secret.is_empty() {
        return Err(BillingError::InvalidSignature);
    }

    let mut timestamp = None;
    let mut candidates = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(BillingError::InvalidSignature)?;
    if candidates.is_empty() || (now - timestamp).abs() > tolerance_secs {
        return Err(BillingError::InvalidSignature);
    }

    let mac = signed_mac(secret, timestamp, payload)?;
    let matched = candidates.iter().any(|candidate| {
        hex::decode(candidate)
            .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
            .unwrap_or(false)
    });

    if matched {
        Ok(())
    } else {
        Err(BillingError::InvalidSignature)
    }
}
