//! Unverified JWT inspection
//!
//! Reads the payload segment of a bearer token to decide whether it is worth
//! sending. Signatures are not checked; the server stays authoritative.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Deserializer};

/// Seconds before `exp` at which a token already counts as expired.
pub const DEFAULT_EXPIRY_BUFFER_SECS: i64 = 30;

/// Claims read from an access token payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TokenClaims {
    /// NumericDate; fractional seconds are floored.
    #[serde(default, deserialize_with = "numeric_date")]
    pub exp: Option<i64>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub sub: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn numeric_date<'de, D: Deserializer<'de>>(de: D) -> Result<Option<i64>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(de)?;
    Ok(value.and_then(|v| match v {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.floor() as i64)),
        _ => None,
    }))
}

fn string_or_number<'de, D: Deserializer<'de>>(de: D) -> Result<Option<String>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(de)?;
    Ok(value.and_then(|v| match v {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }))
}

/// Decode the payload of a `header.payload.signature` token.
///
/// Returns `None` for anything that isn't three segments with a base64url JSON
/// object in the middle.
pub fn decode(token: &str) -> Option<TokenClaims> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        tracing::debug!("Token does not have three segments");
        return None;
    };

    let bytes = match URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')) {
        Ok(b) => b,
        Err(e) => {
            tracing::debug!("Token payload is not base64url: {}", e);
            return None;
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(claims) => Some(claims),
        Err(e) => {
            tracing::debug!("Token payload is not a JSON object: {}", e);
            None
        }
    }
}

/// Whether `token` is unusable at `now`: absent, undecodable, missing `exp`, or
/// expiring within `buffer_secs`.
pub fn is_expired_at(token: Option<&str>, buffer_secs: i64, now: i64) -> bool {
    match token.and_then(decode).and_then(|c| c.exp) {
        Some(exp) => exp <= now.saturating_add(buffer_secs),
        None => true,
    }
}

pub fn is_expired(token: Option<&str>, buffer_secs: i64) -> bool {
    is_expired_at(token, buffer_secs, now())
}

/// Seconds until `exp`, zero when expired or undecodable.
pub fn time_remaining_at(token: Option<&str>, now: i64) -> u64 {
    token
        .and_then(decode)
        .and_then(|c| c.exp)
        .map_or(0, |exp| u64::try_from(exp.saturating_sub(now)).unwrap_or(0))
}

pub fn time_remaining(token: Option<&str>) -> u64 {
    time_remaining_at(token, now())
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Unsigned token with the given payload, for tests elsewhere in the crate.
#[cfg(test)]
pub fn unsigned_token(payload: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{}.{}.sig", header, body)
}

/// Unsigned token expiring `secs` from now (negative for the past).
#[cfg(test)]
pub fn token_expiring_in(secs: i64) -> String {
    unsigned_token(&serde_json::json!({"sub": "user-1", "exp": now() + secs}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn test_decode_reads_standard_and_extra_claims() {
        let token = unsigned_token(&json!({"sub": "42", "exp": NOW, "role": "admin"}));
        let claims = decode(&token).unwrap();
        assert_eq!(claims.exp, Some(NOW));
        assert_eq!(claims.sub.as_deref(), Some("42"));
        assert_eq!(claims.extra.get("role"), Some(&json!("admin")));
    }

    #[test]
    fn test_fractional_exp_is_floored() {
        let token = unsigned_token(&json!({"sub": "u", "exp": 1_700_003_600.5}));
        let claims = decode(&token).unwrap();
        assert_eq!(claims.exp, Some(1_700_003_600));
        assert!(!is_expired_at(Some(&token), 30, NOW));
        assert_eq!(time_remaining_at(Some(&token), NOW), 3600);
    }

    #[test]
    fn test_numeric_sub_does_not_break_decode() {
        let token = unsigned_token(&json!({"sub": 42, "exp": NOW + 3600}));
        let claims = decode(&token).unwrap();
        assert_eq!(claims.sub.as_deref(), Some("42"));
        assert!(!is_expired_at(Some(&token), 30, NOW));

        let odd = unsigned_token(&json!({"sub": {"id": 1}, "exp": "soon"}));
        let claims = decode(&odd).unwrap();
        assert_eq!(claims.sub, None);
        assert_eq!(claims.exp, None);
        assert!(is_expired_at(Some(&odd), 0, NOW));
    }

    #[test]
    fn test_decode_tolerates_padding() {
        let token = unsigned_token(&json!({"exp": 1}));
        let mut parts: Vec<String> = token.split('.').map(String::from).collect();
        parts[1].push_str("==");
        assert!(decode(&parts.join(".")).is_some());
    }

    #[test]
    fn test_decode_rejects_bad_structure() {
        assert!(decode("").is_none());
        assert!(decode("only.two").is_none());
        assert!(decode("a.b.c.d").is_none());
        assert!(decode("header.!!!.sig").is_none());
        let not_json = format!("h.{}.s", URL_SAFE_NO_PAD.encode("not json"));
        assert!(decode(&not_json).is_none());
        let not_object = format!("h.{}.s", URL_SAFE_NO_PAD.encode("[1,2]"));
        assert!(decode(&not_object).is_none());
    }

    #[test]
    fn test_expiry_within_buffer() {
        // Expires in 10s with a 30s buffer.
        let token = unsigned_token(&json!({"exp": NOW + 10}));
        assert!(is_expired_at(Some(&token), 30, NOW));
        assert!(!is_expired_at(Some(&token), 5, NOW));
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let token = unsigned_token(&json!({"exp": NOW + 30}));
        assert!(is_expired_at(Some(&token), 30, NOW));
        assert!(!is_expired_at(Some(&token), 29, NOW));
    }

    #[test]
    fn test_missing_or_broken_token_is_expired() {
        assert!(is_expired_at(None, 0, NOW));
        assert!(is_expired_at(Some("garbage"), 0, NOW));
        let no_exp = unsigned_token(&json!({"sub": "x"}));
        assert!(is_expired_at(Some(&no_exp), 0, NOW));
    }

    #[test]
    fn test_time_remaining_clamps_at_zero() {
        let future = unsigned_token(&json!({"exp": NOW + 90}));
        let past = unsigned_token(&json!({"exp": NOW - 90}));
        assert_eq!(time_remaining_at(Some(&future), NOW), 90);
        assert_eq!(time_remaining_at(Some(&past), NOW), 0);
        assert_eq!(time_remaining_at(None, NOW), 0);
    }

    #[test]
    fn test_wall_clock_helpers() {
        assert!(is_expired(Some(&token_expiring_in(10)), DEFAULT_EXPIRY_BUFFER_SECS));
        assert!(!is_expired(Some(&token_expiring_in(3600)), DEFAULT_EXPIRY_BUFFER_SECS));
        assert!(time_remaining(Some(&token_expiring_in(3600))) > 3500);
    }
}
