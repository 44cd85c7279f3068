use crate::error::HttpError;
use bytes::Bytes;
use http::{HeaderMap, Response, StatusCode};
use http_body_util::BodyExt;
use std::time::{Duration, SystemTime};

/// Boxed response body after transparent decompression.
pub type ResponseBody =
    http_body_util::combinators::BoxBody<Bytes, Box<dyn std::error::Error + Send + Sync>>;

/// Parse a `Retry-After` header given either as delta-seconds or as an
/// HTTP-date. Negative values and dates in the past yield `None`.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(http::header::RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(seconds) = value.parse::<i64>() {
        return u64::try_from(seconds).ok().map(Duration::from_secs);
    }

    httpdate::parse_http_date(value)
        .ok()?
        .duration_since(SystemTime::now())
        .ok()
}

/// Response returned by [`HttpClient::execute`](crate::HttpClient::execute).
///
/// Every HTTP status is returned as `Ok`; callers decide what a non-2xx
/// status means. Body reads are bounded by the client's `max_body_size`.
#[derive(Debug)]
pub struct HttpResponse {
    pub(crate) inner: Response<ResponseBody>,
    pub(crate) max_body_size: usize,
}

impl HttpResponse {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// `Content-Type` header value, if present and valid UTF-8.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.inner
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    /// Reads the whole body regardless of status.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::BodyTooLarge` past the size limit, or
    /// `HttpError::Transport` if the body stream fails.
    pub async fn bytes(self) -> Result<Bytes, HttpError> {
        read_limited(self.inner, self.max_body_size).await
    }
}

/// Collects the body, enforcing `limit` on decompressed bytes.
async fn read_limited(
    response: Response<ResponseBody>,
    limit: usize,
) -> Result<Bytes, HttpError> {
    let mut body = std::pin::pin!(response.into_body());
    let mut collected = Vec::new();

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(HttpError::Transport)?;
        if let Some(chunk) = frame.data_ref() {
            let actual = collected.len() + chunk.len();
            if actual > limit {
                return Err(HttpError::BodyTooLarge { limit, actual });
            }
            collected.extend_from_slice(chunk);
        }
    }

    Ok(Bytes::from(collected))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use http_body_util::Full;

    fn response(status: u16, body: &'static str) -> HttpResponse {
        let body: ResponseBody = Full::new(Bytes::from_static(body.as_bytes()))
            .map_err(|e| -> Box<dyn std::error::Error + Send + Sync> { Box::new(e) })
            .boxed();
        HttpResponse {
            inner: Response::builder()
                .status(status)
                .header(http::header::CONTENT_TYPE, "application/json")
                .body(body)
                .unwrap(),
            max_body_size: 16,
        }
    }

    #[test]
    fn retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::RETRY_AFTER, " 120 ".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(120)));
    }

    #[test]
    fn retry_after_rejects_negative_and_garbage() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::RETRY_AFTER, "-5".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(http::header::RETRY_AFTER, "soon".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), None);

        assert_eq!(parse_retry_after(&HeaderMap::new()), None);
    }

    #[test]
    fn retry_after_http_date_in_past() {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::RETRY_AFTER,
            "Wed, 21 Oct 2015 07:28:00 GMT".parse().unwrap(),
        );
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[tokio::test]
    async fn body_limit_is_enforced() {
        let err = response(200, "this body is longer than sixteen bytes")
            .bytes()
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::BodyTooLarge { limit: 16, .. }));
    }

    #[tokio::test]
    async fn bytes_are_returned_for_any_status() {
        let body = response(404, r#"{"error":"nope"}"#).bytes().await.unwrap();
        assert_eq!(&body[..], br#"{"error":"nope"}"#);
    }
}
