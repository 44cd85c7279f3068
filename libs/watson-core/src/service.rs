use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use tower::{ServiceBuilder, ServiceExt};
use watson_auth::TokenManager;
use watson_http::{
    HttpClient, HttpClientBuilder, HttpClientConfig, HttpResponse, Method, RequestBuilder,
    RetryConfig, is_json_mime_type,
};

use crate::authenticator::{AuthLayer, Authenticator};
use crate::error::ServiceError;
use crate::options::ServiceOptions;
use crate::response::DetailedResponse;

/// Header asking Watson not to use request data for service improvement.
pub const LEARNING_OPT_OUT_HEADER: &str = "X-Watson-Learning-Opt-Out";

/// Shared plumbing for a Watson service client.
///
/// Holds the endpoint, API version, default headers, and an authenticated
/// [`HttpClient`]. Service clients call [`request`](Self::request) to start a
/// call and [`handle_request`](Self::handle_request) to send it.
#[derive(Debug, Clone)]
pub struct BaseService {
    client: HttpClient,
    authenticator: Arc<Authenticator>,
    service_url: Option<String>,
    version: Option<String>,
    default_headers: BTreeMap<String, String>,
    learning_opt_out: bool,
}

impl BaseService {
    /// Creates a service with the default transport settings.
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Config`] for unusable options and
    /// [`ServiceError::Http`] if the HTTP client cannot be built.
    pub fn new(options: ServiceOptions) -> Result<Self, ServiceError> {
        let authenticator = Authenticator::from_options(&options, None)?;
        Self::with_authenticator(options, HttpClientConfig::default(), authenticator)
    }

    /// Creates a service with custom transport settings.
    ///
    /// The IAM token client inherits `http_config`, keeping its own
    /// retry policy when `http_config` enables retries.
    ///
    /// # Errors
    ///
    /// As [`new`](Self::new).
    pub fn with_http_config(
        options: ServiceOptions,
        http_config: HttpClientConfig,
    ) -> Result<Self, ServiceError> {
        let iam_http_config = HttpClientConfig {
            retry: http_config
                .retry
                .as_ref()
                .map(|_| RetryConfig::iam_token_endpoint()),
            ..http_config.clone()
        };
        let authenticator = Authenticator::from_options(&options, Some(iam_http_config))?;
        Self::with_authenticator(options, http_config, authenticator)
    }

    /// Creates a service with an explicitly chosen authenticator.
    ///
    /// # Errors
    ///
    /// As [`new`](Self::new).
    pub fn with_authenticator(
        options: ServiceOptions,
        mut http_config: HttpClientConfig,
        authenticator: Authenticator,
    ) -> Result<Self, ServiceError> {
        if let Some(user_agent) = options.user_agent.filter(|ua| !ua.is_empty()) {
            http_config.user_agent = user_agent;
        }

        let authenticator = Arc::new(authenticator);
        let mut builder = HttpClientBuilder::with_config(http_config);
        if !matches!(*authenticator, Authenticator::None) {
            let layer = AuthLayer::new(Arc::clone(&authenticator));
            builder = builder.with_auth_layer(move |svc| {
                ServiceBuilder::new()
                    .layer(layer)
                    .service(svc)
                    .boxed_clone()
            });
        }
        let client = builder.build()?;

        let mut service = Self {
            client,
            authenticator,
            service_url: None,
            version: options.version.filter(|v| !v.is_empty()),
            default_headers: BTreeMap::new(),
            learning_opt_out: options.learning_opt_out,
        };
        if let Some(url) = options.url {
            service.set_url(url);
        }
        service.set_default_headers(options.default_headers)?;
        Ok(service)
    }

    /// Replaces the service endpoint.
    pub fn set_url(&mut self, url: impl Into<String>) {
        let url = url.into();
        self.service_url = (!url.is_empty()).then_some(url);
    }

    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.service_url.as_deref()
    }

    /// Replaces the headers sent with every request.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Config`] if a name or value is not a valid
    /// HTTP header; the previous headers are kept in that case.
    pub fn set_default_headers<I, K, V>(&mut self, headers: I) -> Result<(), ServiceError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut validated = BTreeMap::new();
        for (name, value) in headers {
            let (name, value) = (name.into(), value.into());
            HeaderName::try_from(name.as_str())
                .map_err(|e| ServiceError::Config(format!("invalid header name '{name}': {e}")))?;
            HeaderValue::try_from(value.as_str())
                .map_err(|e| ServiceError::Config(format!("invalid value for '{name}': {e}")))?;
            validated.insert(name, value);
        }
        self.default_headers = validated;
        Ok(())
    }

    pub fn set_learning_opt_out(&mut self, opt_out: bool) {
        self.learning_opt_out = opt_out;
    }

    #[must_use]
    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    /// Token manager when the service authenticates with IAM.
    #[must_use]
    pub fn token_manager(&self) -> Option<&Arc<TokenManager>> {
        self.authenticator.token_manager()
    }

    /// Starts a request against the service endpoint.
    ///
    /// The builder carries the `version` query parameter, the default
    /// headers, and the learning opt-out header when enabled. Headers added
    /// afterwards replace defaults with the same name.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Config`] when no URL is set and
    /// [`ServiceError::Build`] when the URL is not absolute.
    pub fn request<S, P>(
        &self,
        method: Method,
        path_segments: &[S],
        path_parameters: &[P],
    ) -> Result<RequestBuilder, ServiceError>
    where
        S: AsRef<str>,
        P: AsRef<str>,
    {
        let base = self
            .service_url
            .as_deref()
            .ok_or_else(|| ServiceError::Config("service URL is not set".into()))?;

        let mut builder =
            RequestBuilder::new(method).construct_url(base, path_segments, path_parameters)?;
        if let Some(version) = &self.version {
            builder = builder.add_query("version", version.as_str());
        }
        for (name, value) in &self.default_headers {
            builder = builder.add_header(name, value);
        }
        if self.learning_opt_out {
            builder = builder.add_header(LEARNING_OPT_OUT_HEADER, "true");
        }
        Ok(builder)
    }

    /// Sends the request and decodes a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Status`] for non-2xx responses with the body
    /// verbatim, [`ServiceError::Decode`] for an undecodable JSON body, and
    /// transport or authentication errors as they occur.
    pub async fn handle_request<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<DetailedResponse<T>, ServiceError> {
        let response = self.send(builder).await?;
        let is_json = response.content_type().is_some_and(is_json_mime_type);
        let (status_code, headers, body) = read_success(response).await?;

        let result = if is_json && !body.iter().all(u8::is_ascii_whitespace) {
            Some(serde_json::from_slice(&body)?)
        } else {
            None
        };

        Ok(DetailedResponse {
            status_code,
            headers,
            result,
        })
    }

    /// Sends the request and returns the raw body, e.g. synthesized audio.
    ///
    /// # Errors
    ///
    /// As [`handle_request`](Self::handle_request), without decoding.
    pub async fn handle_binary_request(
        &self,
        builder: RequestBuilder,
    ) -> Result<DetailedResponse<Bytes>, ServiceError> {
        let response = self.send(builder).await?;
        let (status_code, headers, body) = read_success(response).await?;
        Ok(DetailedResponse {
            status_code,
            headers,
            result: Some(body),
        })
    }

    async fn send(&self, builder: RequestBuilder) -> Result<HttpResponse, ServiceError> {
        let request = builder.build()?;
        tracing::debug!(
            method = %request.method(),
            path = request.uri().path(),
            "sending service request"
        );
        let response = self.client.execute(request).await?;
        tracing::debug!(status = %response.status(), "service responded");
        Ok(response)
    }
}

async fn read_success(
    response: HttpResponse,
) -> Result<(http::StatusCode, http::HeaderMap, Bytes), ServiceError> {
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await?;

    if !status.is_success() {
        tracing::debug!(status = %status, "service returned an error status");
        return Err(ServiceError::from_status(
            status,
            String::from_utf8_lossy(&body).into_owned(),
        ));
    }
    Ok((status, headers, body))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    const NO_PARAMS: &[&str] = &[];

    fn service(options: ServiceOptions) -> BaseService {
        BaseService::with_http_config(options, HttpClientConfig::for_testing()).unwrap()
    }

    #[tokio::test]
    async fn request_carries_version_and_opt_out() {
        let svc = service(ServiceOptions {
            url: Some("https://host/api".into()),
            version: Some("2018-09-20".into()),
            learning_opt_out: true,
            ..ServiceOptions::default()
        });
        let request = svc
            .request(Method::Get, &["v1/workspaces"], NO_PARAMS)
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(
            request.uri().to_string(),
            "https://host/api/v1/workspaces?version=2018-09-20"
        );
        assert_eq!(request.headers()[LEARNING_OPT_OUT_HEADER], "true");
    }

    #[tokio::test]
    async fn request_without_url_is_config_error() {
        let svc = service(ServiceOptions::default());
        let err = svc
            .request(Method::Get, &["v1/models"], NO_PARAMS)
            .unwrap_err();
        assert!(matches!(err, ServiceError::Config(_)));
    }

    #[tokio::test]
    async fn per_request_header_replaces_default() {
        let mut svc = service(ServiceOptions {
            url: Some("https://host/api".into()),
            ..ServiceOptions::default()
        });
        svc.set_default_headers([("Accept-Language", "en"), ("X-Custom", "a")])
            .unwrap();
        let request = svc
            .request(Method::Get, &["v1/models"], NO_PARAMS)
            .unwrap()
            .add_header("accept-language", "fr")
            .build()
            .unwrap();
        assert_eq!(request.headers()["accept-language"], "fr");
        assert_eq!(request.headers()["x-custom"], "a");
    }

    #[tokio::test]
    async fn invalid_default_header_keeps_previous() {
        let mut svc = service(ServiceOptions::default());
        svc.set_default_headers([("X-Ok", "1")]).unwrap();
        let err = svc.set_default_headers([("bad header", "1")]).unwrap_err();
        assert!(matches!(err, ServiceError::Config(_)));
        assert_eq!(svc.default_headers.get("X-Ok").map(String::as_str), Some("1"));
    }

    #[tokio::test]
    async fn set_url_and_opt_out_at_runtime() {
        let mut svc = service(ServiceOptions::default());
        svc.set_url("https://other/api");
        svc.set_learning_opt_out(true);
        assert_eq!(svc.url(), Some("https://other/api"));
        let request = svc
            .request(Method::Delete, &["v1/workspaces"], &["ws1"])
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(request.uri().to_string(), "https://other/api/v1/workspaces/ws1");
        assert!(request.headers().contains_key(LEARNING_OPT_OUT_HEADER));

        svc.set_url("");
        assert!(svc.url().is_none());
    }
}
