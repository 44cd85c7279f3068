use crate::client::{BufferedService, HttpClient};
use crate::config::{HttpClientConfig, RetryConfig, TlsRootConfig, TransportSecurity};
use crate::error::HttpError;
use crate::layers::{DefaultHeadersLayer, RetryLayer};
use crate::response::ResponseBody;
use crate::tls;
use bytes::Bytes;
use http::Response;
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::time::Duration;
use tower::buffer::Buffer;
use tower::timeout::TimeoutLayer;
use tower::util::BoxCloneService;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::decompression::DecompressionLayer;

/// Type-erased service handed to an auth layer installed with
/// [`HttpClientBuilder::with_auth_layer`].
pub type InnerService =
    BoxCloneService<http::Request<Full<Bytes>>, http::Response<ResponseBody>, HttpError>;

type AuthWrap = Box<dyn FnOnce(InnerService) -> InnerService + Send>;

/// Builder for an [`HttpClient`] and its tower middleware stack.
pub struct HttpClientBuilder {
    config: HttpClientConfig,
    auth_layer: Option<AuthWrap>,
}

impl HttpClientBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(HttpClientConfig::default())
    }

    #[must_use]
    pub fn with_config(config: HttpClientConfig) -> Self {
        Self {
            config,
            auth_layer: None,
        }
    }

    /// Timeout for each individual attempt
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Deadline across all attempts, failing with `HttpError::DeadlineExceeded`
    #[must_use]
    pub fn total_timeout(mut self, timeout: Duration) -> Self {
        self.config.total_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    #[must_use]
    pub fn retry(mut self, retry: Option<RetryConfig>) -> Self {
        self.config.retry = retry;
        self
    }

    #[must_use]
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.max_body_size = size;
        self
    }

    #[must_use]
    pub fn transport(mut self, transport: TransportSecurity) -> Self {
        self.config.transport = transport;
        self
    }

    #[must_use]
    pub fn tls_roots(mut self, roots: TlsRootConfig) -> Self {
        self.config.tls_roots = roots;
        self
    }

    /// Accept plain `http://` URLs. Only compiled into debug builds unless the
    /// `allow-insecure-http` feature is enabled.
    #[must_use]
    #[cfg(any(debug_assertions, feature = "allow-insecure-http"))]
    pub fn allow_insecure_http(mut self) -> Self {
        tracing::warn!(
            target: "watson_http::security",
            "allow_insecure_http() called - HTTP traffic will NOT be encrypted"
        );
        self.config.transport = TransportSecurity::AllowInsecureHttp;
        self
    }

    /// Installs an auth layer inside the retry loop, so every attempt runs it
    /// again and picks up refreshed credentials. A second call replaces the first.
    ///
    /// Stack position: `Buffer → Retry → auth → Timeout → ...`
    #[must_use]
    pub fn with_auth_layer(
        mut self,
        wrap: impl FnOnce(InnerService) -> InnerService + Send + 'static,
    ) -> Self {
        self.auth_layer = Some(Box::new(wrap));
        self
    }

    /// Request queue capacity, clamped to at least 1
    #[must_use]
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.buffer_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn pool_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.pool_idle_timeout = timeout;
        self
    }

    #[must_use]
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.config.pool_max_idle_per_host = max;
        self
    }

    /// Builds the client.
    ///
    /// Request flow, outer to inner:
    /// `Buffer → Retry → [auth] → error mapping → Timeout → DefaultHeaders →
    /// Decompression → hyper`.
    ///
    /// # Errors
    /// Returns an error if TLS setup fails or the User-Agent is not a valid header value
    pub fn build(self) -> Result<HttpClient, HttpError> {
        let config = self.config;
        if config.transport == TransportSecurity::AllowInsecureHttp {
            tracing::warn!(
                "insecure HTTP enabled (TransportSecurity::AllowInsecureHttp); \
                 use only for testing with mock servers"
            );
        }

        let https = build_https_connector(config.tls_roots, config.transport)?;

        let mut client_builder = Client::builder(TokioExecutor::new());
        // pool_idle_timeout has no effect without a pool timer
        client_builder
            .pool_timer(TokioTimer::new())
            .pool_max_idle_per_host(config.pool_max_idle_per_host);
        if let Some(idle) = config.pool_idle_timeout {
            client_builder.pool_idle_timeout(idle);
        }
        let hyper_client = client_builder.build::<_, Full<Bytes>>(https);

        let timeout = config.request_timeout;
        let mut service: InnerService = ServiceBuilder::new()
            .layer(TimeoutLayer::new(timeout))
            .layer(DefaultHeadersLayer::user_agent(&config.user_agent)?)
            .layer(DecompressionLayer::new())
            .service(hyper_client)
            .map_response(box_response_body)
            .map_err(move |e: tower::BoxError| map_tower_error(e, timeout))
            .boxed_clone();

        if let Some(wrap) = self.auth_layer {
            service = wrap(service);
        }

        if let Some(retry) = config.retry {
            service = ServiceBuilder::new()
                .layer(RetryLayer::with_total_timeout(retry, config.total_timeout))
                .service(service)
                .boxed_clone();
        }

        let service: BufferedService = Buffer::new(service, config.buffer_capacity.max(1));

        Ok(HttpClient {
            service,
            max_body_size: config.max_body_size,
            transport_security: config.transport,
        })
    }
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps typed `HttpError`s that were boxed by tower and turns the timeout
/// layer's `Elapsed` into `HttpError::Timeout`.
fn map_tower_error(err: tower::BoxError, timeout: Duration) -> HttpError {
    if err.is::<tower::timeout::error::Elapsed>() {
        return HttpError::Timeout(timeout);
    }
    match err.downcast::<HttpError>() {
        Ok(http_err) => *http_err,
        Err(other) => HttpError::Transport(other),
    }
}

fn box_response_body<B>(response: Response<B>) -> Response<ResponseBody>
where
    B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    response.map(|body| body.map_err(Into::into).boxed())
}

/// HTTPS connector advertising both h2 and http/1.1 via ALPN.
fn build_https_connector(
    tls_roots: TlsRootConfig,
    transport: TransportSecurity,
) -> Result<HttpsConnector<HttpConnector>, HttpError> {
    let builder = match tls_roots {
        TlsRootConfig::WebPki => hyper_rustls::HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(tls::crypto_provider())
            .map_err(|e| HttpError::Tls(Box::new(e)))?,
        TlsRootConfig::Native => {
            let tls_config =
                tls::native_roots_client_config().map_err(|e| HttpError::Tls(e.into()))?;
            hyper_rustls::HttpsConnectorBuilder::new().with_tls_config(tls_config)
        }
    };

    let connector = match transport {
        TransportSecurity::AllowInsecureHttp => builder.https_or_http().enable_all_versions().build(),
        TransportSecurity::TlsOnly => builder.https_only().enable_all_versions().build(),
    };
    Ok(connector)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::config::DEFAULT_USER_AGENT;

    #[test]
    fn builder_overrides_config() {
        let builder = HttpClientBuilder::new()
            .timeout(Duration::from_secs(5))
            .total_timeout(Duration::from_secs(20))
            .user_agent("custom/1.0")
            .retry(None)
            .max_body_size(1024)
            .buffer_capacity(0);

        assert_eq!(builder.config.request_timeout, Duration::from_secs(5));
        assert_eq!(builder.config.total_timeout, Some(Duration::from_secs(20)));
        assert_eq!(builder.config.user_agent, "custom/1.0");
        assert!(builder.config.retry.is_none());
        assert_eq!(builder.config.max_body_size, 1024);
        assert_eq!(builder.config.buffer_capacity, 1);
    }

    #[test]
    fn default_builder_uses_sdk_user_agent() {
        let builder = HttpClientBuilder::default();
        assert_eq!(builder.config.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(builder.config.transport, TransportSecurity::TlsOnly);
    }

    #[tokio::test]
    async fn builds_with_presets() {
        assert!(HttpClientBuilder::new().build().is_ok());
        assert!(
            HttpClientBuilder::with_config(HttpClientConfig::iam_token_endpoint())
                .build()
                .is_ok()
        );
        assert!(HttpClientBuilder::new().allow_insecure_http().build().is_ok());
    }

    #[tokio::test]
    async fn invalid_user_agent_fails_build() {
        let result = HttpClientBuilder::new().user_agent("bad\nagent").build();
        assert!(matches!(result, Err(HttpError::InvalidHeaderValue(_))));
    }

    #[test]
    fn tower_errors_keep_their_type() {
        let err = map_tower_error(Box::new(HttpError::Overloaded), Duration::from_secs(1));
        assert!(matches!(err, HttpError::Overloaded));

        let err = map_tower_error(
            Box::new(tower::timeout::error::Elapsed::new()),
            Duration::from_secs(3),
        );
        assert!(matches!(err, HttpError::Timeout(d) if d == Duration::from_secs(3)));
    }
}
