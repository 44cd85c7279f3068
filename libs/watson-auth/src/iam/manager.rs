use std::fmt;
use std::sync::Arc;

use aliri_clock::{Clock, System};
use arc_swap::ArcSwapOption;
use base64::{Engine as _, engine::general_purpose};
use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use tokio::sync::Mutex;
use url::Url;
use watson_http::{HttpClient, HttpClientBuilder, HttpClientConfig, Method, RequestBuilder};
use zeroize::Zeroizing;

use super::config::{IamConfig, SharedClock};
use super::error::TokenError;
use super::types::TokenInfo;
use crate::SecretString;

const APIKEY_GRANT_TYPE: &str = "urn:ibm:params:oauth:grant-type:apikey";
const REFRESH_GRANT_TYPE: &str = "refresh_token";
const RESPONSE_TYPE: &str = "cloud_iam";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Client id/secret pair IAM expects on every token request.
const IAM_CLIENT_CREDENTIALS: &str = "bx:bx";

/// Issues, caches, and refreshes IAM bearer tokens.
///
/// Reads are lock-free through `ArcSwapOption`; when the cached token is past
/// its refresh point, callers serialize on an async gate and only the first
/// one talks to IAM. The rest observe the stored result.
///
/// A user-supplied access token bypasses all of this and is returned verbatim.
pub struct TokenManager {
    client: HttpClient,
    iam_url: Url,
    api_key: ArcSwapOption<SecretString>,
    user_access_token: ArcSwapOption<SecretString>,
    token_info: ArcSwapOption<TokenInfo>,
    refresh_gate: Mutex<()>,
    clock: SharedClock,
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("iam_url", &self.iam_url.as_str())
            .field("user_managed", &self.user_access_token.load().is_some())
            .field("token_info", &self.token_info.load_full())
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    /// # Errors
    ///
    /// Returns [`TokenError::Config`] if the config has no usable credential
    /// or the HTTP client cannot be built.
    pub fn new(config: IamConfig) -> Result<Self, TokenError> {
        config.validate()?;
        let iam_url = config.resolved_url()?;

        let http_config = config
            .http_config
            .clone()
            .unwrap_or_else(HttpClientConfig::iam_token_endpoint);
        let client = HttpClientBuilder::with_config(http_config)
            .build()
            .map_err(|e| TokenError::Config(format!("failed to build IAM client: {e}")))?;

        let clock: SharedClock = config.clock.clone().unwrap_or_else(|| Arc::new(System));

        Ok(Self {
            client,
            iam_url,
            api_key: ArcSwapOption::from(non_empty(config.api_key).map(Arc::new)),
            user_access_token: ArcSwapOption::from(non_empty(config.access_token).map(Arc::new)),
            token_info: ArcSwapOption::empty(),
            refresh_gate: Mutex::new(()),
            clock,
        })
    }

    /// Returns a usable bearer token, contacting IAM only when needed.
    ///
    /// # Errors
    ///
    /// Any [`TokenError`] from the token or refresh exchange.
    pub async fn get_token(&self) -> Result<SecretString, TokenError> {
        if let Some(token) = self.user_access_token.load_full() {
            return Ok(SecretString::clone(&token));
        }

        if let Some(info) = self.valid_token_info() {
            tracing::debug!("using cached IAM token");
            return Ok(SecretString::new(info.access_token.as_str()));
        }

        let _gate = self.refresh_gate.lock().await;

        // Another caller may have finished the exchange while we waited.
        if let Some(info) = self.valid_token_info() {
            return Ok(SecretString::new(info.access_token.as_str()));
        }

        let now = self.clock.now();
        let current = self.token_info.load_full();
        let fresh = match current {
            Some(info) if !info.refresh_token.is_empty() && !info.is_refresh_expired_at(now) => {
                match self.exchange_refresh_token(&info.refresh_token).await {
                    Ok(fresh) => {
                        tracing::info!(expires_in = fresh.expires_in, "refreshed IAM token");
                        fresh
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "IAM token refresh failed, requesting a new token");
                        self.request_token().await?
                    }
                }
            }
            _ => {
                let fresh = self.request_token().await?;
                tracing::info!(expires_in = fresh.expires_in, "obtained IAM token");
                fresh
            }
        };

        let token = SecretString::new(fresh.access_token.as_str());
        self.token_info.store(Some(Arc::new(fresh)));
        Ok(token)
    }

    /// Requests a brand new token with the configured API key.
    ///
    /// The result is returned, not cached.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Config`] when no API key is set, otherwise any
    /// error from the exchange.
    pub async fn request_token(&self) -> Result<TokenInfo, TokenError> {
        let api_key = self
            .api_key
            .load_full()
            .ok_or_else(|| TokenError::Config("no IAM API key configured".into()))?;

        let form = Zeroizing::new(encode_form(&[
            ("grant_type", APIKEY_GRANT_TYPE),
            ("apikey", api_key.expose()),
            ("response_type", RESPONSE_TYPE),
        ])?);
        self.post_form(form.as_str()).await
    }

    /// Exchanges the cached refresh token for a new token.
    ///
    /// The result is returned, not cached.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Config`] when there is no refresh token yet,
    /// otherwise any error from the exchange.
    pub async fn refresh_token(&self) -> Result<TokenInfo, TokenError> {
        let info = self
            .token_info
            .load_full()
            .filter(|info| !info.refresh_token.is_empty())
            .ok_or_else(|| TokenError::Config("no IAM refresh token available".into()))?;
        self.exchange_refresh_token(&info.refresh_token).await
    }

    /// True when there is no cached token or it is inside its refresh window.
    #[must_use]
    pub fn is_token_expired(&self) -> bool {
        self.token_info
            .load_full()
            .is_none_or(|info| info.is_expired_at(self.clock.now()))
    }

    /// True when there is no cached token or its refresh token is unusable.
    #[must_use]
    pub fn is_refresh_token_expired(&self) -> bool {
        self.token_info
            .load_full()
            .is_none_or(|info| info.is_refresh_expired_at(self.clock.now()))
    }

    /// Switches to a user-managed token. An empty value switches back to
    /// minting tokens with the API key.
    pub fn set_access_token(&self, token: impl Into<String>) {
        let token = SecretString::new(token);
        if token.is_empty() {
            self.user_access_token.store(None);
        } else {
            self.user_access_token.store(Some(Arc::new(token)));
        }
    }

    /// Replaces the API key and drops any cached token.
    pub fn set_api_key(&self, api_key: impl Into<String>) {
        let api_key = SecretString::new(api_key);
        self.api_key
            .store((!api_key.is_empty()).then(|| Arc::new(api_key)));
        self.token_info.store(None);
    }

    fn valid_token_info(&self) -> Option<Arc<TokenInfo>> {
        self.token_info
            .load_full()
            .filter(|info| !info.is_expired_at(self.clock.now()))
    }

    async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<TokenInfo, TokenError> {
        let form = Zeroizing::new(encode_form(&[
            ("grant_type", REFRESH_GRANT_TYPE),
            ("refresh_token", refresh_token),
        ])?);
        self.post_form(form.as_str()).await
    }

    async fn post_form(&self, form: &str) -> Result<TokenInfo, TokenError> {
        let credentials =
            Zeroizing::new(general_purpose::STANDARD.encode(IAM_CLIENT_CREDENTIALS));

        let request = RequestBuilder::new(Method::Post)
            .with_url(self.iam_url.clone())
            .add_header(CONTENT_TYPE.as_str(), FORM_CONTENT_TYPE)
            .add_header(ACCEPT.as_str(), "application/json")
            .add_sensitive_header(AUTHORIZATION.as_str(), &format!("Basic {}", &*credentials))
            .set_body_content_string(form)
            .build()?;

        tracing::debug!(url = %self.iam_url, "requesting IAM token");
        let response = self.client.execute(request).await?;
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            return Err(TokenError::Auth {
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        let info: TokenInfo = serde_json::from_slice(&body)
            .map_err(|e| TokenError::InvalidResponse(e.to_string()))?;

        if let Some(token_type) = info.token_type.as_deref()
            && !token_type.eq_ignore_ascii_case("bearer")
        {
            return Err(TokenError::UnsupportedTokenType(token_type.to_owned()));
        }
        if info.access_token.is_empty() {
            return Err(TokenError::InvalidResponse(
                "response has an empty access_token".into(),
            ));
        }

        Ok(info)
    }
}

fn non_empty(value: Option<SecretString>) -> Option<SecretString> {
    value.filter(|v| !v.is_empty())
}

fn encode_form(fields: &[(&str, &str)]) -> Result<String, TokenError> {
    serde_urlencoded::to_string(fields)
        .map_err(|e| TokenError::Config(format!("failed to encode IAM form: {e}")))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn apikey_form_is_url_encoded() {
        let form = encode_form(&[
            ("grant_type", APIKEY_GRANT_TYPE),
            ("apikey", "a b&c"),
            ("response_type", RESPONSE_TYPE),
        ])
        .unwrap();
        assert_eq!(
            form,
            "grant_type=urn%3Aibm%3Aparams%3Aoauth%3Agrant-type%3Aapikey&apikey=a+b%26c&response_type=cloud_iam"
        );
    }

    #[test]
    fn client_credentials_encode_to_known_value() {
        assert_eq!(
            general_purpose::STANDARD.encode(IAM_CLIENT_CREDENTIALS),
            "Yng6Yng="
        );
    }

    #[test]
    fn new_rejects_missing_credentials() {
        let err = TokenManager::new(IamConfig::default()).unwrap_err();
        assert!(matches!(err, TokenError::Config(_)));
    }

    #[tokio::test]
    async fn fresh_manager_reports_expired() {
        let manager = TokenManager::new(IamConfig::with_api_key("key")).unwrap();
        assert!(manager.is_token_expired());
        assert!(manager.is_refresh_token_expired());
    }

    #[tokio::test]
    async fn refresh_without_token_is_config_error() {
        let manager = TokenManager::new(IamConfig::with_api_key("key")).unwrap();
        let err = manager.refresh_token().await.unwrap_err();
        assert!(matches!(err, TokenError::Config(_)));
    }

    #[tokio::test]
    async fn clearing_user_token_without_api_key_fails() {
        let manager = TokenManager::new(IamConfig::with_access_token("user-token")).unwrap();
        assert_eq!(manager.get_token().await.unwrap().expose(), "user-token");

        manager.set_access_token("");
        let err = manager.get_token().await.unwrap_err();
        assert!(matches!(err, TokenError::Config(_)));
    }

    #[tokio::test]
    async fn debug_does_not_leak_user_token() {
        let manager = TokenManager::new(IamConfig::with_access_token("user-token")).unwrap();
        let rendered = format!("{manager:?}");
        assert!(!rendered.contains("user-token"));
        assert!(rendered.contains("user_managed: true"));
    }
}
