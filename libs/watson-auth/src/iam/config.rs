use std::fmt;
use std::sync::Arc;

use aliri_clock::Clock;
use url::Url;
use watson_http::HttpClientConfig;

use super::error::TokenError;
use crate::SecretString;

/// Public IBM Cloud IAM identity endpoint.
pub const DEFAULT_IAM_URL: &str = "https://iam.cloud.ibm.com/identity/token";

/// Shared time source used for token expiry checks.
pub type SharedClock = Arc<dyn Clock + Send + Sync>;

/// Configuration for a [`TokenManager`](super::TokenManager).
///
/// At least one of [`api_key`](Self::api_key) or
/// [`access_token`](Self::access_token) must be set. A user-supplied access
/// token takes precedence and disables token minting entirely.
///
/// `Debug` is manually implemented to redact credentials.
#[derive(Clone, Default)]
pub struct IamConfig {
    /// IAM API key used to mint tokens
    pub api_key: Option<SecretString>,

    /// Externally managed bearer token, returned as-is
    pub access_token: Option<SecretString>,

    /// Identity endpoint; [`DEFAULT_IAM_URL`] when `None`
    pub iam_url: Option<Url>,

    /// Override for the token client; `HttpClientConfig::iam_token_endpoint()` when `None`
    pub http_config: Option<HttpClientConfig>,

    /// Time source; the system clock when `None`
    pub clock: Option<SharedClock>,
}

impl IamConfig {
    #[must_use]
    pub fn with_api_key(api_key: impl Into<SecretString>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_access_token(access_token: impl Into<SecretString>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn iam_url(mut self, url: Url) -> Self {
        self.iam_url = Some(url);
        self
    }

    #[must_use]
    pub fn http_config(mut self, config: HttpClientConfig) -> Self {
        self.http_config = Some(config);
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// # Errors
    ///
    /// Returns [`TokenError::Config`] when neither a non-empty API key nor a
    /// non-empty access token is configured.
    pub fn validate(&self) -> Result<(), TokenError> {
        let has_key = self.api_key.as_ref().is_some_and(|k| !k.is_empty());
        let has_token = self.access_token.as_ref().is_some_and(|t| !t.is_empty());
        if has_key || has_token {
            Ok(())
        } else {
            Err(TokenError::Config(
                "an IAM API key or an IAM access token is required".into(),
            ))
        }
    }

    pub(super) fn resolved_url(&self) -> Result<Url, TokenError> {
        match &self.iam_url {
            Some(url) => Ok(url.clone()),
            None => Url::parse(DEFAULT_IAM_URL)
                .map_err(|e| TokenError::Config(format!("invalid default IAM URL: {e}"))),
        }
    }
}

impl fmt::Debug for IamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IamConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("iam_url", &self.iam_url.as_ref().map(Url::as_str))
            .field("http_config", &self.http_config)
            .field("clock", &self.clock.as_ref().map(|_| "custom"))
            .finish()
    }
}
