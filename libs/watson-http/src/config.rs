use std::collections::HashSet;
use std::time::Duration;

/// Default User-Agent sent by every Watson SDK request
pub const DEFAULT_USER_AGENT: &str = concat!("watson-apis-rust-sdk/", env!("CARGO_PKG_VERSION"));

/// Conditions that trigger a retry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum RetryTrigger {
    /// Connection refused, DNS failure, reset, etc.
    TransportError,
    /// Single attempt timed out
    Timeout,
    /// Specific HTTP status code
    Status(u16),
    /// Error that is never retried (deadline, closed service, ...)
    NonRetryable,
}

impl RetryTrigger {
    pub const TOO_MANY_REQUESTS: Self = Self::Status(429);
    pub const REQUEST_TIMEOUT: Self = Self::Status(408);
    pub const INTERNAL_SERVER_ERROR: Self = Self::Status(500);
    pub const BAD_GATEWAY: Self = Self::Status(502);
    pub const SERVICE_UNAVAILABLE: Self = Self::Status(503);
    pub const GATEWAY_TIMEOUT: Self = Self::Status(504);
}

/// Check if an HTTP method is idempotent per RFC 9110.
#[must_use]
pub fn is_idempotent_method(method: &http::Method) -> bool {
    matches!(
        *method,
        http::Method::GET
            | http::Method::HEAD
            | http::Method::PUT
            | http::Method::DELETE
            | http::Method::OPTIONS
            | http::Method::TRACE
    )
}

/// Exponential backoff: `min(initial * multiplier^attempt, max)`, plus up to
/// 25% jitter when enabled.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
    pub jitter: bool,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl ExponentialBackoff {
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            ..Default::default()
        }
    }

    /// 1ms initial, 100ms max, no jitter. Meant for tests.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            initial: Duration::from_millis(1),
            max: Duration::from_millis(100),
            multiplier: 2.0,
            jitter: false,
        }
    }
}

/// Retry policy.
///
/// Triggers in `always_retry` fire for every method. Triggers in
/// `idempotent_retry` fire only for idempotent methods.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the initial attempt; total attempts = 1 + `max_retries`
    pub max_retries: usize,
    pub backoff: ExponentialBackoff,
    pub always_retry: HashSet<RetryTrigger>,
    pub idempotent_retry: HashSet<RetryTrigger>,
    /// Use backoff even when the server sends `Retry-After`
    pub ignore_retry_after: bool,
    /// Upper bound of bytes read from a discarded response before retrying
    pub retry_response_drain_limit: usize,
}

/// Default drain limit for response bodies before retry (64 KiB)
pub const DEFAULT_RETRY_RESPONSE_DRAIN_LIMIT: usize = 64 * 1024;

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: ExponentialBackoff::default(),
            always_retry: HashSet::from([RetryTrigger::TOO_MANY_REQUESTS]),
            idempotent_retry: HashSet::from([
                RetryTrigger::TransportError,
                RetryTrigger::Timeout,
                RetryTrigger::REQUEST_TIMEOUT,
                RetryTrigger::INTERNAL_SERVER_ERROR,
                RetryTrigger::BAD_GATEWAY,
                RetryTrigger::SERVICE_UNAVAILABLE,
                RetryTrigger::GATEWAY_TIMEOUT,
            ]),
            ignore_retry_after: false,
            retry_response_drain_limit: DEFAULT_RETRY_RESPONSE_DRAIN_LIMIT,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Policy for IAM token requests: two retries on transport errors and
    /// timeouts only. Status codes, including 4xx, are returned as-is.
    #[must_use]
    pub fn iam_token_endpoint() -> Self {
        Self {
            max_retries: 2,
            always_retry: HashSet::from([RetryTrigger::TransportError, RetryTrigger::Timeout]),
            idempotent_retry: HashSet::new(),
            ..Default::default()
        }
    }

    /// Whether `trigger` warrants another attempt for `method`.
    #[must_use]
    pub fn should_retry(&self, trigger: RetryTrigger, method: &http::Method) -> bool {
        self.always_retry.contains(&trigger)
            || (self.idempotent_retry.contains(&trigger) && is_idempotent_method(method))
    }
}

/// TLS root certificate source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TlsRootConfig {
    /// Mozilla's root certificates (webpki-roots)
    #[default]
    WebPki,
    /// OS native certificate store
    Native,
}

/// Whether plain HTTP is accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportSecurity {
    /// HTTPS only
    #[default]
    TlsOnly,
    /// Plain HTTP allowed. Local mock servers only.
    AllowInsecureHttp,
}

/// Transport configuration for [`HttpClient`](crate::HttpClient).
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Timeout for a single attempt (default: 60 seconds)
    pub request_timeout: Duration,

    /// Deadline spanning all attempts and backoff delays (default: none)
    pub total_timeout: Option<Duration>,

    /// Maximum decompressed response body size (default: 64 MB)
    pub max_body_size: usize,

    /// User-Agent value, applied when the request has none
    pub user_agent: String,

    pub retry: Option<RetryConfig>,

    pub transport: TransportSecurity,

    pub tls_roots: TlsRootConfig,

    /// Capacity of the request queue in front of the middleware stack (default: 1024)
    pub buffer_capacity: usize,

    /// Idle connection lifetime in the pool; `None` uses hyper-util's default
    pub pool_idle_timeout: Option<Duration>,

    /// Idle connections kept per host (default: 32)
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            total_timeout: None,
            // Speech synthesis and document downloads run larger than typical JSON APIs.
            max_body_size: 64 * 1024 * 1024,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            retry: Some(RetryConfig::default()),
            transport: TransportSecurity::TlsOnly,
            tls_roots: TlsRootConfig::default(),
            buffer_capacity: 1024,
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
        }
    }
}

impl HttpClientConfig {
    /// No retry, short timeout, small body limit
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_body_size: 1024 * 1024,
            retry: None,
            buffer_capacity: 256,
            pool_idle_timeout: Some(Duration::from_secs(30)),
            pool_max_idle_per_host: 8,
            ..Default::default()
        }
    }

    /// Configuration for the IAM identity endpoint.
    ///
    /// Token requests are POSTs but safe to repeat, so transport errors and
    /// timeouts are always retried; an IAM rejection is never retried.
    #[must_use]
    pub fn iam_token_endpoint() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_body_size: 1024 * 1024,
            retry: Some(RetryConfig::iam_token_endpoint()),
            buffer_capacity: 256,
            pool_idle_timeout: Some(Duration::from_secs(60)),
            pool_max_idle_per_host: 4,
            ..Default::default()
        }
    }

    /// Plain HTTP allowed, no retry. Mock servers only.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_body_size: 1024 * 1024,
            retry: None,
            transport: TransportSecurity::AllowInsecureHttp,
            buffer_capacity: 256,
            pool_idle_timeout: Some(Duration::from_secs(10)),
            pool_max_idle_per_host: 4,
            ..Default::default()
        }
    }
}
