use std::time::Duration;
use thiserror::Error;

/// Classification of URL validation failures on the transport path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidUriKind {
    /// URL could not be parsed (malformed syntax)
    ParseError,
    /// URL is missing required host/authority component
    MissingAuthority,
    /// URL is missing required scheme (http/https)
    MissingScheme,
}

/// Errors raised while assembling a request with [`RequestBuilder`].
///
/// Every construction failure surfaces here; the builder never panics.
///
/// [`RequestBuilder`]: crate::RequestBuilder
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BuildError {
    /// The constructed URL is not a valid absolute URL
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// `build()` was called before a URL was set
    #[error("Request URL was never set")]
    MissingUrl,

    /// Invalid header name
    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    /// Invalid header value
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// JSON body encoding failed
    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Body content does not fit the declared content type
    #[error("Unsupported body content '{type_name}': {reason}")]
    UnsupportedBody {
        /// Name of the rejected content kind (e.g. `object`, `number`)
        type_name: String,
        /// Why the content was rejected
        reason: String,
    },

    /// Reading a body or multipart stream failed
    #[error("Failed to read body stream: {0}")]
    Io(#[from] std::io::Error),

    /// The transport-level request could not be assembled
    #[error("Failed to assemble request: {0}")]
    Request(#[from] http::Error),
}

/// HTTP transport error types
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpError {
    /// Request building failed
    #[error("Failed to build request: {0}")]
    RequestBuild(#[from] http::Error),

    /// Invalid header value
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// Single request attempt timed out
    #[error("Request attempt timed out after {0:?}")]
    Timeout(Duration),

    /// Total operation deadline exceeded (including all retries)
    #[error("Operation deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),

    /// Transport error (network, connection, etc)
    #[error("Transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Credentials could not be attached to the request.
    ///
    /// Never retried by the client; the credential source owns its own
    /// retry policy.
    #[error("Authentication failed: {0}")]
    Auth(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// TLS error
    #[error("TLS error: {0}")]
    Tls(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Response body exceeded size limit
    #[error("Response body too large: limit {limit} bytes, got {actual} bytes")]
    BodyTooLarge { limit: usize, actual: usize },

    /// Request queue is full (fail-fast)
    #[error("Service overloaded: request queue is full")]
    Overloaded,

    /// Internal service failure (buffer worker died, channel closed)
    #[error("Service unavailable: internal failure")]
    ServiceClosed,

    /// Invalid URL
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUri {
        url: String,
        kind: InvalidUriKind,
        reason: String,
    },

    /// Invalid URL scheme for transport security configuration
    #[error("URL scheme '{scheme}' not allowed: {reason}")]
    InvalidScheme { scheme: String, reason: String },
}

impl From<hyper::Error> for HttpError {
    fn from(err: hyper::Error) -> Self {
        HttpError::Transport(Box::new(err))
    }
}

impl From<hyper_util::client::legacy::Error> for HttpError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        HttpError::Transport(Box::new(err))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::error::Error;
    use std::fmt;

    #[derive(Debug)]
    struct TestError(&'static str);

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl Error for TestError {}

    #[test]
    fn transport_error_preserves_source() {
        let err = HttpError::Transport(Box::new(TestError("connection refused")));

        let source = err.source().unwrap();
        let downcast = source.downcast_ref::<TestError>().unwrap();
        assert_eq!(downcast.0, "connection refused");
    }

    #[test]
    fn unsupported_body_names_the_rejected_type() {
        let err = BuildError::UnsupportedBody {
            type_name: "object".to_owned(),
            reason: "content type 'text/plain' requires a string or a byte stream".to_owned(),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("'object'"), "got: {rendered}");
        assert!(rendered.contains("text/plain"), "got: {rendered}");
    }

    #[test]
    fn build_error_wraps_io_source() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        let err = BuildError::from(io);
        assert!(matches!(err, BuildError::Io(_)));
        assert!(err.source().is_some());
    }
}
