use crate::config::{ExponentialBackoff, RetryConfig, RetryTrigger};
use crate::error::HttpError;
use crate::response::{ResponseBody, parse_retry_after};
use bytes::Bytes;
use http::{HeaderValue, Request, Response};
use http_body_util::{BodyExt, Full};
use rand::Rng;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::Instant;
use tower::{Layer, Service, ServiceExt};

/// Header carrying the 1-indexed retry attempt on replayed requests.
pub const RETRY_ATTEMPT_HEADER: &str = "X-Retry-Attempt";

/// Tower layer that replays failed requests with exponential backoff.
#[derive(Clone)]
pub struct RetryLayer {
    config: RetryConfig,
    total_timeout: Option<Duration>,
}

impl RetryLayer {
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            total_timeout: None,
        }
    }

    /// Same as [`new`](Self::new) with a deadline covering every attempt and delay.
    #[must_use]
    pub fn with_total_timeout(config: RetryConfig, total_timeout: Option<Duration>) -> Self {
        Self {
            config,
            total_timeout,
        }
    }
}

impl<S> Layer<S> for RetryLayer {
    type Service = RetryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RetryService {
            inner,
            config: self.config.clone(),
            total_timeout: self.total_timeout,
        }
    }
}

/// Retries on `Err(HttpError)` and on `Ok(Response)` with a retryable status.
///
/// Once retries are exhausted the last response is returned as `Ok` whatever
/// its status; only transport-level failures come back as `Err`.
#[derive(Clone)]
pub struct RetryService<S> {
    inner: S,
    config: RetryConfig,
    total_timeout: Option<Duration>,
}

impl<S> Service<Request<Full<Bytes>>> for RetryService<S>
where
    S: Service<Request<Full<Bytes>>, Response = Response<ResponseBody>, Error = HttpError>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
{
    type Response = S::Response;
    type Error = HttpError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Full<Bytes>>) -> Self::Future {
        let fresh = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, fresh);
        let config = self.config.clone();
        let deadline = self.total_timeout.map(|t| (Instant::now() + t, t));

        let (parts, body) = req.into_parts();
        let version = parts.version;
        let extensions = parts.extensions.clone();
        let parts = Arc::new(parts);

        Box::pin(async move {
            let method = parts.method.clone();
            let host = parts
                .uri
                .authority()
                .map_or_else(|| "unknown".to_owned(), ToString::to_string);

            let mut attempt = 0usize;
            loop {
                if let Some((at, total)) = deadline
                    && Instant::now() >= at
                {
                    return Err(HttpError::DeadlineExceeded(total));
                }

                let mut req = Request::from_parts((*parts).clone(), body.clone());
                *req.version_mut() = version;
                *req.extensions_mut() = extensions.clone();
                if attempt > 0
                    && let Ok(value) = HeaderValue::try_from(attempt.to_string())
                {
                    req.headers_mut().insert(RETRY_ATTEMPT_HEADER, value);
                }

                let mut svc = inner.clone();
                svc.ready().await?;
                let outcome = svc.call(req).await;
                let exhausted = attempt >= config.max_retries;

                let delay = match outcome {
                    Ok(resp) => {
                        let trigger = RetryTrigger::Status(resp.status().as_u16());
                        if exhausted || !config.should_retry(trigger, &method) {
                            return Ok(resp);
                        }

                        let retry_after = if config.ignore_retry_after {
                            None
                        } else {
                            parse_retry_after(resp.headers())
                        };
                        tracing::debug!(
                            retry = attempt + 1,
                            max_retries = config.max_retries,
                            status = resp.status().as_u16(),
                            method = %method,
                            host = %host,
                            retry_after_used = retry_after.is_some(),
                            "retrying request after status code"
                        );
                        drain(resp, config.retry_response_drain_limit).await;
                        retry_after.unwrap_or_else(|| calculate_backoff(&config.backoff, attempt))
                    }
                    Err(err) => {
                        let trigger = retry_trigger(&err);
                        if exhausted || !config.should_retry(trigger, &method) {
                            return Err(err);
                        }

                        tracing::debug!(
                            retry = attempt + 1,
                            max_retries = config.max_retries,
                            error = %err,
                            trigger = ?trigger,
                            method = %method,
                            host = %host,
                            "retrying request after error"
                        );
                        calculate_backoff(&config.backoff, attempt)
                    }
                };

                let delay = match deadline {
                    Some((at, total)) => {
                        let remaining = at.saturating_duration_since(Instant::now());
                        if remaining.is_zero() {
                            return Err(HttpError::DeadlineExceeded(total));
                        }
                        delay.min(remaining)
                    }
                    None => delay,
                };
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        })
    }
}

/// Reads and discards up to `limit` bytes so the connection can be reused.
async fn drain(response: Response<ResponseBody>, limit: usize) {
    let declared = response
        .headers()
        .get(http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<usize>().ok());
    if declared.is_some_and(|len| len > limit) {
        return;
    }

    let mut body = std::pin::pin!(response.into_body());
    let mut drained = 0usize;
    while let Some(frame) = body.frame().await {
        match frame {
            Ok(frame) => {
                drained += frame.data_ref().map_or(0, Bytes::len);
                if drained >= limit {
                    break;
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "failed to drain response body before retry");
                break;
            }
        }
    }
}

fn retry_trigger(err: &HttpError) -> RetryTrigger {
    match err {
        HttpError::Transport(_) => RetryTrigger::TransportError,
        HttpError::Timeout(_) => RetryTrigger::Timeout,
        _ => RetryTrigger::NonRetryable,
    }
}

/// Backoff for the given zero-based attempt, clamped to `backoff.max` (and to
/// one day) even for non-finite or negative settings.
pub fn calculate_backoff(backoff: &ExponentialBackoff, attempt: usize) -> Duration {
    const CEILING_SECS: f64 = 86_400.0;

    let sanitize = |v: f64, fallback: f64| {
        if v.is_finite() && v >= 0.0 { v } else { fallback }
    };
    let multiplier = sanitize(backoff.multiplier, 1.0);
    let initial = sanitize(backoff.initial.as_secs_f64(), 0.0);
    let max = sanitize(backoff.max.as_secs_f64(), CEILING_SECS).min(CEILING_SECS);

    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let raw = initial * multiplier.powi(exponent);
    let secs = if raw.is_finite() { raw.clamp(0.0, max) } else { max };
    let mut delay = Duration::from_secs_f64(secs);

    if backoff.jitter {
        let factor = rand::rng().random_range(0.0..=0.25);
        delay += delay.mul_f64(factor);
    }

    delay.min(Duration::from_secs_f64(max))
}
