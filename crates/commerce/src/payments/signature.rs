//! Webhook signature verification.
//!
//! Header format: `t=<unix seconds>,v1=<hex hmac>[,v1=<hex hmac>...]`, where
//! each `v1` is HMAC-SHA256 over `"{t}.{payload}"` keyed with the endpoint's
//! signing secret. Several `v1` entries appear while a secret is being rolled;
//! any one matching is enough.

use std::time::Duration;

use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::GatewayError;

/// HTTP header carrying the signature.
pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

type HmacSha256 = Hmac<Sha256>;

fn keyed_mac(secret: &[u8], timestamp: i64, payload: &[u8]) -> Result<HmacSha256, GatewayError> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| GatewayError::InvalidSignature(e.to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Build a signature header for `payload` at `timestamp`.
///
/// # Errors
///
/// Returns `GatewayError::InvalidSignature` if the key is rejected.
pub fn sign(payload: &[u8], secret: &[u8], timestamp: i64) -> Result<String, GatewayError> {
    let mac = keyed_mac(secret, timestamp, payload)?;
    Ok(format!(
        "t={timestamp},v1={}",
        hex::encode(mac.finalize().into_bytes())
    ))
}

/// Verify a signature header against `payload`.
///
/// `now` is the current unix time in seconds; timestamps further than
/// `tolerance` from it in either direction are rejected.
///
/// # Errors
///
/// Returns `GatewayError::InvalidSignature` describing the failed check.
pub fn verify(
    payload: &[u8],
    header: &str,
    secret: &[u8],
    tolerance: Duration,
    now: i64,
) -> Result<(), GatewayError> {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<&str> = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| GatewayError::InvalidSignature("missing or invalid timestamp".to_string()))?;
    if candidates.is_empty() {
        return Err(GatewayError::InvalidSignature("no v1 signature".to_string()));
    }

    if now.abs_diff(timestamp) > tolerance.as_secs() {
        return Err(GatewayError::InvalidSignature(
            "timestamp outside tolerance".to_string(),
        ));
    }

    let mac = keyed_mac(secret, timestamp, payload)?;
    let matched = candidates.iter().any(|candidate| {
        hex::decode(candidate).is_ok_and(|bytes| mac.clone().verify_slice(&bytes).is_ok())
    });

    if matched {
        Ok(())
    } else {
        Err(GatewayError::InvalidSignature("signature mismatch".to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"whsec_test_6mJq2Vn8Rk4pXz";
    const NOW: i64 = 1_700_000_000;
    const TOLERANCE: Duration = Duration::from_secs(300);

    #[test]
    fn test_signed_payload_verifies() {
        let payload = br#"{"id":"evt_1"}"#;
        let header = sign(payload, SECRET, NOW).unwrap();
        assert!(verify(payload, &header, SECRET, TOLERANCE, NOW + 10).is_ok());
    }

    #[test]
    fn test_tampered_body_rejected() {
        let header = sign(br#"{"amount":100}"#, SECRET, NOW).unwrap();
        let result = verify(br#"{"amount":999}"#, &header, SECRET, TOLERANCE, NOW);
        assert!(matches!(result, Err(GatewayError::InvalidSignature(_))));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let header = sign(b"{}", b"other-secret", NOW).unwrap();
        assert!(verify(b"{}", &header, SECRET, TOLERANCE, NOW).is_err());
    }

    #[test]
    fn test_old_timestamp_rejected() {
        let header = sign(b"{}", SECRET, NOW - 301).unwrap();
        let err = verify(b"{}", &header, SECRET, TOLERANCE, NOW).unwrap_err();
        assert!(err.to_string().contains("tolerance"));
    }

    #[test]
    fn test_any_v1_may_match() {
        let good = sign(b"{}", SECRET, NOW).unwrap();
        let good_sig = good.split_once(",v1=").unwrap().1;
        let header = format!("t={NOW},v1=deadbeef,v1={good_sig},v0=ignored");
        assert!(verify(b"{}", &header, SECRET, TOLERANCE, NOW).is_ok());
    }

    #[test]
    fn test_malformed_headers_rejected() {
        for header in ["", "garbage", "t=abc,v1=00", "t=1700000000", "v1=00"] {
            assert!(
                verify(b"{}", header, SECRET, TOLERANCE, NOW).is_err(),
                "{header:?} should be rejected"
            );
        }
    }
}
