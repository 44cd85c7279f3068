use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use http::header::AUTHORIZATION;
use http::{HeaderValue, Request, Response, Uri};
use http_body_util::Full;
use tower::{Layer, Service};
use url::Url;
use watson_auth::{IamConfig, SecretString, TokenManager};
use watson_http::{HttpClientConfig, HttpError, InvalidUriKind};
use zeroize::Zeroizing;

use crate::error::ServiceError;
use crate::options::ServiceOptions;

/// Username that marks the password as an IAM API key.
const IAM_APIKEY_USERNAME: &str = "apikey";

/// Query parameter carrying a legacy service API key.
const API_KEY_QUERY_PARAM: &str = "api_key";

/// How requests to a service are authenticated.
#[derive(Clone)]
#[non_exhaustive]
pub enum Authenticator {
    /// `Authorization: Bearer <token>` from an IAM token manager
    Iam(Arc<TokenManager>),
    /// `Authorization: Basic base64(username:password)`
    Basic {
        username: String,
        password: SecretString,
    },
    /// `api_key` query parameter
    ApiKeyQuery(SecretString),
    None,
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Iam(manager) => f.debug_tuple("Iam").field(manager).finish(),
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
            Self::ApiKeyQuery(_) => f.write_str("ApiKeyQuery([REDACTED])"),
            Self::None => f.write_str("None"),
        }
    }
}

impl Authenticator {
    /// Picks the authentication scheme from `options`.
    ///
    /// IAM credentials win, then the `apikey` username convention, then
    /// username and password, then a legacy API key. Without any of these
    /// requests go out unauthenticated.
    ///
    /// `iam_http_config` overrides the token client's transport settings.
    /// Must be called inside a tokio runtime when IAM is selected.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Config`] for an invalid IAM URL and
    /// [`ServiceError::Auth`] if the token manager cannot be created.
    pub fn from_options(
        options: &ServiceOptions,
        iam_http_config: Option<HttpClientConfig>,
    ) -> Result<Self, ServiceError> {
        let iam_api_key = non_empty(options.iam_api_key.as_deref());
        let iam_access_token = non_empty(options.iam_access_token.as_deref());
        let username = non_empty(options.username.as_deref());
        let password = non_empty(options.password.as_deref());

        if iam_api_key.is_some() || iam_access_token.is_some() {
            let config = IamConfig {
                api_key: iam_api_key.map(SecretString::from),
                access_token: iam_access_token.map(SecretString::from),
                ..IamConfig::default()
            };
            return Self::iam(config, options, iam_http_config);
        }

        if let (Some(IAM_APIKEY_USERNAME), Some(password)) = (username, password) {
            tracing::debug!("treating password as an IAM API key");
            return Self::iam(IamConfig::with_api_key(password), options, iam_http_config);
        }

        if let (Some(username), Some(password)) = (username, password) {
            return Ok(Self::Basic {
                username: username.to_owned(),
                password: SecretString::from(password),
            });
        }

        if let Some(api_key) = non_empty(options.api_key.as_deref()) {
            return Ok(Self::ApiKeyQuery(SecretString::from(api_key)));
        }

        tracing::warn!("no credentials configured; requests will be sent unauthenticated");
        Ok(Self::None)
    }

    fn iam(
        mut config: IamConfig,
        options: &ServiceOptions,
        http_config: Option<HttpClientConfig>,
    ) -> Result<Self, ServiceError> {
        if let Some(raw) = non_empty(options.iam_url.as_deref()) {
            let url = Url::parse(raw)
                .map_err(|e| ServiceError::Config(format!("invalid IAM URL '{raw}': {e}")))?;
            config.iam_url = Some(url);
        }
        config.http_config = http_config;
        Ok(Self::Iam(Arc::new(TokenManager::new(config)?)))
    }

    /// Token manager behind [`Authenticator::Iam`].
    #[must_use]
    pub fn token_manager(&self) -> Option<&Arc<TokenManager>> {
        match self {
            Self::Iam(manager) => Some(manager),
            _ => None,
        }
    }

    /// Adds credentials to an outgoing request.
    ///
    /// # Errors
    ///
    /// Returns the token error boxed in [`HttpError::Auth`] when no IAM token
    /// can be obtained. The client never retries that variant.
    pub async fn authenticate(&self, request: &mut Request<Full<Bytes>>) -> Result<(), HttpError> {
        match self {
            Self::Iam(manager) => {
                let token = manager
                    .get_token()
                    .await
                    .map_err(|e| HttpError::Auth(Box::new(e)))?;
                let raw = Zeroizing::new(format!("Bearer {}", token.expose()));
                set_sensitive_header(request, &raw)
            }
            Self::Basic { username, password } => {
                let credentials = Zeroizing::new(format!("{username}:{}", password.expose()));
                let encoded =
                    Zeroizing::new(general_purpose::STANDARD.encode(credentials.as_bytes()));
                let raw = Zeroizing::new(format!("Basic {}", &*encoded));
                set_sensitive_header(request, &raw)
            }
            Self::ApiKeyQuery(api_key) => append_query(request, api_key.expose()),
            Self::None => Ok(()),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn set_sensitive_header(request: &mut Request<Full<Bytes>>, raw: &str) -> Result<(), HttpError> {
    let mut value = HeaderValue::from_str(raw)?;
    value.set_sensitive(true);
    request.headers_mut().insert(AUTHORIZATION, value);
    Ok(())
}

fn append_query(request: &mut Request<Full<Bytes>>, api_key: &str) -> Result<(), HttpError> {
    let raw = request.uri().to_string();
    let invalid = |reason: String| HttpError::InvalidUri {
        url: raw.clone(),
        kind: InvalidUriKind::ParseError,
        reason,
    };

    let mut url = Url::parse(&raw).map_err(|e| invalid(e.to_string()))?;
    url.query_pairs_mut().append_pair(API_KEY_QUERY_PARAM, api_key);
    *request.uri_mut() = url
        .as_str()
        .parse::<Uri>()
        .map_err(|e| invalid(e.to_string()))?;
    Ok(())
}

/// Tower layer applying an [`Authenticator`] to every attempt.
///
/// Sits inside the client's retry layer so a retried request re-reads the
/// current token.
#[derive(Clone, Debug)]
pub struct AuthLayer {
    authenticator: Arc<Authenticator>,
}

impl AuthLayer {
    #[must_use]
    pub fn new(authenticator: Arc<Authenticator>) -> Self {
        Self { authenticator }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService {
            inner,
            authenticator: Arc::clone(&self.authenticator),
        }
    }
}

/// Service created by [`AuthLayer`].
#[derive(Clone, Debug)]
pub struct AuthService<S> {
    inner: S,
    authenticator: Arc<Authenticator>,
}

impl<S, ResBody> Service<Request<Full<Bytes>>> for AuthService<S>
where
    S: Service<Request<Full<Bytes>>, Response = Response<ResBody>, Error = HttpError>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
    ResBody: Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = HttpError;
    type Future = Pin<Box<dyn Future<Output = Result<Response<ResBody>, HttpError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Full<Bytes>>) -> Self::Future {
        let authenticator = Arc::clone(&self.authenticator);

        // Clone-swap: the instance that was polled ready handles this call.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            authenticator.authenticate(&mut req).await?;
            inner.call(req).await
        })
    }
}
