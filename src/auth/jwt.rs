//! Minimal JWT inspection: reads the `exp` claim, never verifies signatures

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::Deserialize;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    exp: Option<f64>,
}

/// Expiry of a JWT as seconds since the Unix epoch
///
/// Returns `None` when the token is not a JWT, the payload is not valid
/// base64url JSON, or the `exp` claim is missing.
#[must_use]
pub fn expires_at(token: &str) -> Option<u64> {
    let mut segments = token.split('.');
    let (_header, payload, _signature) = (segments.next()?, segments.next()?, segments.next()?);
    if segments.next().is_some() {
        return None;
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claims: Claims = serde_json::from_slice(&bytes).ok()?;

    claims
        .exp
        .filter(|exp| exp.is_finite() && *exp >= 0.0)
        .map(|exp| exp as u64)
}

/// Check whether a token is expired, or expires within `leeway`
///
/// Unreadable tokens count as expired.
#[must_use]
pub fn is_expired(token: &str, leeway: Duration) -> bool {
    let Some(exp) = expires_at(token) else {
        return true;
    };

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs();
    now.saturating_add(leeway.as_secs()) >= exp
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_with_payload(payload: &serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(payload.to_string());
        format!("{header}.{payload}.signature")
    }

    fn now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    #[test]
    fn test_expires_at() {
        let token = token_with_payload(&serde_json::json!({ "sub": "trader-1", "exp": 1_900_000_000 }));
        assert_eq!(expires_at(&token), Some(1_900_000_000));
    }

    #[test]
    fn test_fresh_token_not_expired() {
        let token = token_with_payload(&serde_json::json!({ "exp": now() + 3600 }));
        assert!(!is_expired(&token, Duration::from_secs(30)));
    }

    #[test]
    fn test_leeway_makes_token_expired() {
        let token = token_with_payload(&serde_json::json!({ "exp": now() + 10 }));
        assert!(!is_expired(&token, Duration::ZERO));
        assert!(is_expired(&token, Duration::from_secs(30)));
    }

    #[test]
    fn test_past_token_expired() {
        let token = token_with_payload(&serde_json::json!({ "exp": now() - 100 }));
        assert!(is_expired(&token, Duration::ZERO));
    }

    #[test]
    fn test_malformed_tokens_are_expired() {
        assert!(is_expired("not-a-jwt", Duration::ZERO));
        assert!(is_expired("a.b", Duration::ZERO));
        assert!(is_expired("a.%%%.c", Duration::ZERO));
        assert!(is_expired("a.b.c.d", Duration::ZERO));

        let no_exp = token_with_payload(&serde_json::json!({ "sub": "trader-1" }));
        assert!(is_expired(&no_exp, Duration::ZERO));
    }
}
