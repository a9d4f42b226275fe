//! HMAC-SHA256 webhook signature verification.
//!
//! Inbound webhooks carry an `X-Floodgate-Signature` header of the form
//! `t=<unix-seconds>,v1=<hex-hmac>` where the HMAC is computed over the
//! string `"{t}.{raw-body}"` under a shared secret. Verification rejects
//! stale timestamps (replay / clock-skew defense) and uses constant-time
//! comparison for the digest.
//!
//! [`verify_with_rotation`] additionally accepts a secondary secret and
//! reports which one matched, so a secret can be rotated without a
//! delivery gap.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Default timestamp tolerance in seconds (5 minutes).
pub const DEFAULT_TOLERANCE_SECS: u64 = 300;

/// Why a signature failed verification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureFailure {
    /// No signature header was supplied.
    #[error("no_signature_header")]
    MissingHeader,

    /// The header did not parse as `t=<seconds>,v1=<hex>`.
    #[error("malformed_header")]
    MalformedHeader,

    /// The `v1` field was absent.
    #[error("missing_v1_signature")]
    MissingSignature,

    /// The timestamp is outside the accepted window.
    #[error("timestamp_expired (diff={diff_secs}s, tolerance={tolerance_secs}s)")]
    TimestampExpired {
        diff_secs: u64,
        tolerance_secs: u64,
    },

    /// The recomputed digest did not match.
    #[error("signature_mismatch")]
    Mismatch,

    /// The secret could not be used as an HMAC key.
    #[error("invalid_key")]
    InvalidKey,
}

/// Which secret matched during a rotation-aware verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchedSecret {
    Primary,
    Secondary,
}

/// Verify a signature header against the raw payload.
///
/// `header` is the full `t=...,v1=...` value; pass `None` when the header
/// is absent. Returns the typed failure reason on every negative path --
/// callers preferring fail-closed propagation use `?` directly.
pub fn verify_signature(
    payload: &[u8],
    header: Option<&str>,
    secret: &str,
    tolerance_secs: u64,
) -> Result<(), SignatureFailure> {
    verify_at(payload, header, secret, tolerance_secs, unix_now())
}

/// Try the primary secret, then the secondary, reporting which matched.
///
/// When both fail, the primary's failure reason is returned.
pub fn verify_with_rotation(
    payload: &[u8],
    header: Option<&str>,
    primary_secret: &str,
    secondary_secret: Option<&str>,
    tolerance_secs: u64,
) -> Result<MatchedSecret, SignatureFailure> {
    let primary_failure = match verify_signature(payload, header, primary_secret, tolerance_secs) {
        Ok(()) => return Ok(MatchedSecret::Primary),
        Err(failure) => failure,
    };

    if let Some(secondary) = secondary_secret
        && verify_signature(payload, header, secondary, tolerance_secs).is_ok()
    {
        return Ok(MatchedSecret::Secondary);
    }

    Err(primary_failure)
}

/// Produce a valid signature header for `payload` under `secret`, stamped
/// with the current time. Used by senders and test vectors.
pub fn sign_payload(payload: &[u8], secret: &str) -> Result<String, SignatureFailure> {
    sign_payload_at(payload, secret, unix_now())
}

/// [`sign_payload`] with an explicit timestamp.
pub fn sign_payload_at(
    payload: &[u8],
    secret: &str,
    timestamp: i64,
) -> Result<String, SignatureFailure> {
    let digest = compute_digest(payload, secret, timestamp)?;
    Ok(format!("t={timestamp},v1={digest}"))
}

fn verify_at(
    payload: &[u8],
    header: Option<&str>,
    secret: &str,
    tolerance_secs: u64,
    now: i64,
) -> Result<(), SignatureFailure> {
    let header = header.ok_or(SignatureFailure::MissingHeader)?;
    if header.trim().is_empty() {
        return Err(SignatureFailure::MissingHeader);
    }

    let mut timestamp: Option<i64> = None;
    let mut signature: Option<&str> = None;
    for part in header.split(',') {
        let Some((key, value)) = part.split_once('=') else {
            return Err(SignatureFailure::MalformedHeader);
        };
        match key.trim() {
            "t" => {
                timestamp = Some(
                    value
                        .trim()
                        .parse()
                        .map_err(|_| SignatureFailure::MalformedHeader)?,
                );
            }
            "v1" => signature = Some(value.trim()),
            // Unknown fields (future signature versions) are ignored.
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureFailure::MalformedHeader)?;
    let signature = signature.ok_or(SignatureFailure::MissingSignature)?;
    if signature.is_empty() {
        return Err(SignatureFailure::MissingSignature);
    }

    let diff_secs = now.abs_diff(timestamp);
    if diff_secs > tolerance_secs {
        return Err(SignatureFailure::TimestampExpired {
            diff_secs,
            tolerance_secs,
        });
    }

    let expected = hex_decode(signature).ok_or(SignatureFailure::Mismatch)?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| SignatureFailure::InvalidKey)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);

    // Constant-time comparison via the hmac crate.
    mac.verify_slice(&expected)
        .map_err(|_| SignatureFailure::Mismatch)
}

fn compute_digest(
    payload: &[u8],
    secret: &str,
    timestamp: i64,
) -> Result<String, SignatureFailure> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| SignatureFailure::InvalidKey)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(hex_encode(&mac.finalize().into_bytes()))
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";

    #[test]
    fn valid_signature_passes() {
        let payload = br#"{"job_id":"job_1","status":"success"}"#;
        let header = sign_payload(payload, SECRET).unwrap();
        assert_eq!(
            verify_signature(payload, Some(&header), SECRET, DEFAULT_TOLERANCE_SECS),
            Ok(())
        );
    }

    #[test]
    fn missing_header_is_rejected() {
        assert_eq!(
            verify_signature(b"body", None, SECRET, DEFAULT_TOLERANCE_SECS),
            Err(SignatureFailure::MissingHeader)
        );
        assert_eq!(
            verify_signature(b"body", Some(""), SECRET, DEFAULT_TOLERANCE_SECS),
            Err(SignatureFailure::MissingHeader)
        );
    }

    #[test]
    fn malformed_header_is_rejected() {
        assert_eq!(
            verify_signature(b"body", Some("not a header"), SECRET, 300),
            Err(SignatureFailure::MalformedHeader)
        );
        assert_eq!(
            verify_signature(b"body", Some("t=abc,v1=00"), SECRET, 300),
            Err(SignatureFailure::MalformedHeader)
        );
    }

    #[test]
    fn missing_v1_field_is_rejected() {
        let now = unix_now();
        assert_eq!(
            verify_signature(b"body", Some(&format!("t={now}")), SECRET, 300),
            Err(SignatureFailure::MissingSignature)
        );
        assert_eq!(
            verify_signature(b"body", Some(&format!("t={now},v1=")), SECRET, 300),
            Err(SignatureFailure::MissingSignature)
        );
    }

    #[test]
    fn expired_timestamp_is_rejected() {
        let payload = b"payload";
        let stale = unix_now() - (DEFAULT_TOLERANCE_SECS as i64) - 1;
        let header = sign_payload_at(payload, SECRET, stale).unwrap();

        let result = verify_signature(payload, Some(&header), SECRET, DEFAULT_TOLERANCE_SECS);
        assert!(matches!(
            result,
            Err(SignatureFailure::TimestampExpired { tolerance_secs: 300, .. })
        ));
    }

    #[test]
    fn future_timestamp_within_tolerance_passes() {
        // Clock skew works both ways; |now - t| is what matters.
        let payload = b"payload";
        let skewed = unix_now() + 60;
        let header = sign_payload_at(payload, SECRET, skewed).unwrap();
        assert_eq!(verify_signature(payload, Some(&header), SECRET, 300), Ok(()));
    }

    #[test]
    fn wrong_secret_is_a_mismatch() {
        let payload = b"payload";
        let header = sign_payload(payload, "whsec_other").unwrap();
        assert_eq!(
            verify_signature(payload, Some(&header), SECRET, 300),
            Err(SignatureFailure::Mismatch)
        );
    }

    #[test]
    fn tampered_body_is_a_mismatch() {
        let header = sign_payload(b"original", SECRET).unwrap();
        assert_eq!(
            verify_signature(b"tampered", Some(&header), SECRET, 300),
            Err(SignatureFailure::Mismatch)
        );
    }

    #[test]
    fn invalid_hex_signature_is_a_mismatch() {
        let now = unix_now();
        assert_eq!(
            verify_signature(b"body", Some(&format!("t={now},v1=zz")), SECRET, 300),
            Err(SignatureFailure::Mismatch)
        );
    }

    #[test]
    fn unknown_header_fields_are_ignored() {
        let payload = b"payload";
        let header = sign_payload(payload, SECRET).unwrap();
        let extended = format!("{header},v0=deadbeef");
        assert_eq!(
            verify_signature(payload, Some(&extended), SECRET, 300),
            Ok(())
        );
    }

    #[test]
    fn rotation_matches_primary_first() {
        let payload = b"payload";
        let header = sign_payload(payload, SECRET).unwrap();
        let matched =
            verify_with_rotation(payload, Some(&header), SECRET, Some("whsec_old"), 300).unwrap();
        assert_eq!(matched, MatchedSecret::Primary);
    }

    #[test]
    fn rotation_falls_back_to_secondary() {
        let payload = b"payload";
        let header = sign_payload(payload, "whsec_old").unwrap();
        let matched =
            verify_with_rotation(payload, Some(&header), SECRET, Some("whsec_old"), 300).unwrap();
        assert_eq!(matched, MatchedSecret::Secondary);
    }

    #[test]
    fn rotation_reports_primary_failure_when_both_fail() {
        let payload = b"payload";
        let header = sign_payload(payload, "whsec_unrelated").unwrap();
        let result = verify_with_rotation(payload, Some(&header), SECRET, Some("whsec_old"), 300);
        assert_eq!(result, Err(SignatureFailure::Mismatch));
    }

    #[test]
    fn rotation_without_secondary_behaves_like_plain_verification() {
        let payload = b"payload";
        let header = sign_payload(payload, SECRET).unwrap();
        assert_eq!(
            verify_with_rotation(payload, Some(&header), SECRET, None, 300),
            Ok(MatchedSecret::Primary)
        );
    }
}
