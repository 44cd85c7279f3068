use thiserror::Error;
use watson_auth::TokenError;
use watson_http::{BuildError, HttpError};

/// Body fields that Watson services use for a human-readable error.
const MESSAGE_FIELDS: [&str; 4] = ["error", "message", "errorMessage", "error_message"];

/// Errors returned by [`BaseService`](crate::BaseService) calls.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServiceError {
    #[error("failed to build request: {0}")]
    Build(#[from] BuildError),

    #[error("HTTP transport error: {0}")]
    Http(#[source] HttpError),

    #[error("authentication failed: {0}")]
    Auth(#[from] TokenError),

    /// The service answered with a non-2xx status.
    ///
    /// `body` is the response text as received; `message` is the service's
    /// own error text when the body carries one.
    #[error("HTTP {status}: {}", status_detail(.message.as_deref(), .body))]
    Status {
        status: http::StatusCode,
        body: String,
        message: Option<String>,
    },

    #[error("failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("service configuration error: {0}")]
    Config(String),
}

impl ServiceError {
    /// Builds a [`ServiceError::Status`] from a failed response body.
    #[must_use]
    pub fn from_status(status: http::StatusCode, body: String) -> Self {
        let message = extract_error_message(&body);
        Self::Status {
            status,
            body,
            message,
        }
    }

    /// HTTP status of a [`ServiceError::Status`], or of an IAM rejection.
    #[must_use]
    pub fn status(&self) -> Option<http::StatusCode> {
        match self {
            Self::Status { status, .. } | Self::Auth(TokenError::Auth { status, .. }) => {
                Some(*status)
            }
            _ => None,
        }
    }
}

impl From<HttpError> for ServiceError {
    /// Token failures raised inside the auth layer travel boxed in
    /// [`HttpError::Auth`]; they are unwrapped back into [`ServiceError::Auth`].
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Auth(boxed) => match boxed.downcast::<TokenError>() {
                Ok(token_err) => Self::Auth(*token_err),
                Err(other) => Self::Http(HttpError::Auth(other)),
            },
            other => Self::Http(other),
        }
    }
}

fn status_detail<'a>(message: Option<&'a str>, body: &'a str) -> &'a str {
    message.unwrap_or(body)
}

/// Best-effort lookup of the service's error text in a JSON body.
#[must_use]
pub fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let object = value.as_object()?;
    MESSAGE_FIELDS.iter().find_map(|field| match object.get(*field)? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Object(nested) => nested
            .get("message")
            .and_then(serde_json::Value::as_str)
            .map(ToOwned::to_owned),
        _ => None,
    })
}
