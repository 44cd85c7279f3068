use aliri_clock::UnixTime;
use serde::Deserialize;
use std::fmt;

/// Fraction of a token's lifetime after which it is treated as expired.
pub const REFRESH_BUFFER: f64 = 0.8;

/// How long a refresh token stays usable past the access token's expiration.
pub const REFRESH_TOKEN_HORIZON_SECS: u64 = 7 * 24 * 60 * 60;

/// Token issued by the IAM identity endpoint.
///
/// `Deserialize` only; the `Debug` impl redacts both tokens.
#[derive(Clone, Deserialize)]
pub struct TokenInfo {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Lifetime in seconds
    #[serde(default)]
    pub expires_in: u64,
    /// Absolute expiry, unix seconds
    #[serde(default)]
    pub expiration: u64,
}

impl TokenInfo {
    /// True once 80% of the token lifetime has elapsed at `now`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn is_expired_at(&self, now: UnixTime) -> bool {
        let refresh_time =
            self.expiration as f64 - self.expires_in as f64 * (1.0 - REFRESH_BUFFER);
        refresh_time < now.0 as f64
    }

    /// True when the refresh token can no longer be exchanged at `now`.
    ///
    /// A token without an `expiration` is always treated as unrefreshable.
    #[must_use]
    pub fn is_refresh_expired_at(&self, now: UnixTime) -> bool {
        if self.expiration == 0 {
            return true;
        }
        self.expiration.saturating_add(REFRESH_TOKEN_HORIZON_SECS) < now.0
    }
}

impl fmt::Debug for TokenInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenInfo")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("expiration", &self.expiration)
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    const NOW: u64 = 1_700_000_000;

    fn token(expires_in: u64, expiration: u64) -> TokenInfo {
        TokenInfo {
            access_token: "A1".to_owned(),
            refresh_token: "R1".to_owned(),
            token_type: Some("Bearer".to_owned()),
            expires_in,
            expiration,
        }
    }

    #[test]
    fn fresh_token_is_not_expired() {
        assert!(!token(3600, NOW + 3600).is_expired_at(UnixTime(NOW)));
    }

    #[test]
    fn token_past_expiration_is_expired() {
        assert!(token(3600, NOW - 1).is_expired_at(UnixTime(NOW)));
    }

    #[test]
    fn token_inside_refresh_window_is_expired() {
        // 600s left of a 3600s lifetime is less than the 20% buffer
        assert!(token(3600, NOW + 600).is_expired_at(UnixTime(NOW)));
    }

    #[test]
    fn refresh_token_usable_at_expiration() {
        assert!(!token(3600, NOW).is_refresh_expired_at(UnixTime(NOW)));
    }

    #[test]
    fn refresh_token_expires_after_seven_days() {
        let eight_days = 8 * 24 * 60 * 60;
        assert!(token(3600, NOW - eight_days).is_refresh_expired_at(UnixTime(NOW)));
    }

    #[test]
    fn missing_expiration_disables_refresh() {
        assert!(token(3600, 0).is_refresh_expired_at(UnixTime(NOW)));
    }

    #[test]
    fn deserializes_iam_response() {
        let json = r#"{
            "access_token": "A1",
            "refresh_token": "R1",
            "token_type": "Bearer",
            "expires_in": 3600,
            "expiration": 1700003600,
            "scope": "ibm openid"
        }"#;
        let info: TokenInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.access_token, "A1");
        assert_eq!(info.refresh_token, "R1");
        assert_eq!(info.expires_in, 3600);
        assert_eq!(info.expiration, 1_700_003_600);
    }

    #[test]
    fn debug_redacts_tokens() {
        let rendered = format!("{:?}", token(3600, NOW));
        assert!(!rendered.contains("A1"));
        assert!(!rendered.contains("R1"));
        assert!(rendered.contains("expires_in: 3600"));
    }
}
