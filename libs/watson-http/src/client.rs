use crate::builder::HttpClientBuilder;
use crate::config::TransportSecurity;
use crate::error::{HttpError, InvalidUriKind};
use crate::response::{HttpResponse, ResponseBody};
use bytes::Bytes;
use http::{Request, Response};
use http_body_util::Full;
use std::future::Future;
use std::pin::Pin;
use std::task::Poll;
use tower::Service;
use tower::buffer::Buffer;

/// Future of the boxed middleware stack
pub type ServiceFuture =
    Pin<Box<dyn Future<Output = Result<Response<ResponseBody>, HttpError>> + Send>>;

/// Middleware stack behind a tower `Buffer`
pub type BufferedService = Buffer<Request<Full<Bytes>>, ServiceFuture>;

/// Async HTTP client that sends requests produced by
/// [`RequestBuilder::build`](crate::RequestBuilder::build).
///
/// `Clone + Send + Sync`; clones share one connection pool and middleware
/// stack through the internal buffer, so no external locking is needed.
///
/// # Example
///
/// ```ignore
/// let client = HttpClient::new()?;
/// let request = RequestBuilder::new(Method::Get)
///     .construct_url("https://api.example.com", &["v3/models"], &[] as &[&str])?
///     .build()?;
/// let body = client.execute(request).await?.bytes().await?;
/// let models: serde_json::Value = serde_json::from_slice(&body)?;
/// ```
#[derive(Clone)]
pub struct HttpClient {
    pub(crate) service: BufferedService,
    pub(crate) max_body_size: usize,
    pub(crate) transport_security: TransportSecurity,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("max_body_size", &self.max_body_size)
            .field("transport_security", &self.transport_security)
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    /// Client with the default configuration.
    ///
    /// # Errors
    /// Returns an error if TLS initialization fails
    pub fn new() -> Result<Self, HttpError> {
        HttpClientBuilder::new().build()
    }

    #[must_use]
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }

    /// Sends one request through the middleware stack.
    ///
    /// Returns `Ok` for every HTTP status once retries are exhausted.
    ///
    /// # Errors
    ///
    /// - `HttpError::InvalidUri` / `HttpError::InvalidScheme` when the URL is
    ///   not absolute or its scheme is not allowed by the transport security mode
    /// - `HttpError::Overloaded` when the request queue is full
    /// - transport, timeout, and deadline errors from the stack
    pub async fn execute(&self, request: Request<Full<Bytes>>) -> Result<HttpResponse, HttpError> {
        self.validate_uri(request.uri())?;

        tracing::debug!(method = %request.method(), url = %request.uri(), "sending request");

        let mut service = self.service.clone();
        try_acquire_buffer_slot(&mut service).await?;
        let inner = service.call(request).await.map_err(map_buffer_error)?;

        tracing::debug!(status = inner.status().as_u16(), "response received");
        Ok(HttpResponse {
            inner,
            max_body_size: self.max_body_size,
        })
    }

    fn validate_uri(&self, uri: &http::Uri) -> Result<(), HttpError> {
        if uri.authority().is_none() {
            return Err(HttpError::InvalidUri {
                url: uri.to_string(),
                kind: InvalidUriKind::MissingAuthority,
                reason: "missing host/authority".to_owned(),
            });
        }

        match uri.scheme_str() {
            Some("https") => Ok(()),
            Some("http") if self.transport_security == TransportSecurity::AllowInsecureHttp => {
                Ok(())
            }
            Some("http") => Err(HttpError::InvalidScheme {
                scheme: "http".to_owned(),
                reason: "HTTPS required (transport security is TlsOnly)".to_owned(),
            }),
            Some(other) => Err(HttpError::InvalidScheme {
                scheme: other.to_owned(),
                reason: "only http:// and https:// schemes are supported".to_owned(),
            }),
            None => Err(HttpError::InvalidUri {
                url: uri.to_string(),
                kind: InvalidUriKind::MissingScheme,
                reason: "missing scheme".to_owned(),
            }),
        }
    }
}

/// Unwraps an inner `HttpError`; anything else means the buffer worker is gone.
fn map_buffer_error(err: tower::BoxError) -> HttpError {
    match err.downcast::<HttpError>() {
        Ok(http_err) => *http_err,
        Err(err) => {
            tracing::error!(error = %err, "buffer worker closed unexpectedly; service unavailable");
            HttpError::ServiceClosed
        }
    }
}

/// Polls the buffer once; a full queue fails fast with `HttpError::Overloaded`.
async fn try_acquire_buffer_slot(service: &mut BufferedService) -> Result<(), HttpError> {
    let ready = std::future::poll_fn(|cx| match service.poll_ready(cx) {
        Poll::Ready(result) => Poll::Ready(Some(result)),
        Poll::Pending => Poll::Ready(None),
    })
    .await;

    match ready {
        Some(Ok(())) => Ok(()),
        Some(Err(e)) => Err(map_buffer_error(e)),
        None => Err(HttpError::Overloaded),
    }
}
