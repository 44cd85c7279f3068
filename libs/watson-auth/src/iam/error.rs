use thiserror::Error;
use watson_http::{BuildError, HttpError};

/// Errors from IAM token acquisition.
///
/// No variant carries the API key or a token value.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TokenError {
    /// IAM answered with a non-2xx status. `body` is the response text as sent.
    #[error("IAM token request rejected with HTTP {status}: {body}")]
    Auth {
        status: http::StatusCode,
        body: String,
    },

    /// The IAM endpoint could not be reached or the exchange failed midway.
    #[error("IAM token request failed: {cause}")]
    Transport {
        #[source]
        cause: HttpError,
    },

    /// The token request could not be assembled.
    #[error("failed to build IAM token request: {0}")]
    Build(#[from] BuildError),

    /// IAM answered 2xx with a body that is not a usable token.
    #[error("invalid IAM token response: {0}")]
    InvalidResponse(String),

    /// IAM issued a token type other than `Bearer`.
    #[error("unsupported token type: {0}")]
    UnsupportedTokenType(String),

    /// Token manager configuration is unusable.
    #[error("IAM config error: {0}")]
    Config(String),
}

impl From<HttpError> for TokenError {
    fn from(cause: HttpError) -> Self {
        Self::Transport { cause }
    }
}
