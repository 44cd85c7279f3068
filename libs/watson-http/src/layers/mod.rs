//! Tower layers composed by [`HttpClientBuilder`](crate::HttpClientBuilder).
//!
//! - [`DefaultHeadersLayer`] fills in User-Agent and other defaults
//! - [`RetryLayer`] replays requests with exponential backoff and jitter

mod default_headers;
mod retry;

pub use default_headers::{DefaultHeadersLayer, DefaultHeadersService};
pub use retry::{RETRY_ATTEMPT_HEADER, RetryLayer, RetryService};
