use crate::error::HttpError;
use http::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use http::{Request, Response};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Tower layer that fills in headers the request does not already carry.
///
/// The client always installs one with the configured User-Agent.
#[derive(Clone, Debug)]
pub struct DefaultHeadersLayer {
    headers: Arc<HeaderMap>,
}

impl DefaultHeadersLayer {
    /// Layer that only supplies `User-Agent`.
    ///
    /// # Errors
    /// Returns `HttpError::InvalidHeaderValue` if the value is not a valid header value
    pub fn user_agent(user_agent: impl AsRef<str>) -> Result<Self, HttpError> {
        Self::try_new([(USER_AGENT.as_str(), user_agent.as_ref())])
    }

    /// # Errors
    /// Returns `HttpError::InvalidHeaderValue` for an invalid value and
    /// `HttpError::RequestBuild` for an invalid name
    pub fn try_new<'a>(
        headers: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, HttpError> {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::try_from(name).map_err(|e| HttpError::RequestBuild(e.into()))?;
            map.insert(name, HeaderValue::from_str(value)?);
        }
        Ok(Self {
            headers: Arc::new(map),
        })
    }
}

impl<S> Layer<S> for DefaultHeadersLayer {
    type Service = DefaultHeadersService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        DefaultHeadersService {
            inner,
            headers: Arc::clone(&self.headers),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DefaultHeadersService<S> {
    inner: S,
    headers: Arc<HeaderMap>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for DefaultHeadersService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        for (name, value) in self.headers.iter() {
            if !req.headers().contains_key(name) {
                req.headers_mut().insert(name.clone(), value.clone());
            }
        }
        self.inner.call(req)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::StatusCode;
    use http_body_util::Full;
    use tower::ServiceExt;

    /// Echoes the request headers back as response headers.
    #[derive(Clone)]
    struct Echo;

    impl Service<Request<Full<Bytes>>> for Echo {
        type Response = Response<Full<Bytes>>;
        type Error = std::convert::Infallible;
        type Future = std::future::Ready<Result<Self::Response, Self::Error>>;

        fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: Request<Full<Bytes>>) -> Self::Future {
            let mut resp = Response::new(Full::new(Bytes::new()));
            *resp.status_mut() = StatusCode::OK;
            *resp.headers_mut() = req.headers().clone();
            std::future::ready(Ok(resp))
        }
    }

    fn request() -> Request<Full<Bytes>> {
        Request::builder()
            .uri("http://example.com")
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    #[tokio::test]
    async fn user_agent_is_added() {
        let svc = DefaultHeadersLayer::user_agent("watson-test/1.0")
            .unwrap()
            .layer(Echo);
        let resp = svc.oneshot(request()).await.unwrap();
        assert_eq!(resp.headers()[USER_AGENT], "watson-test/1.0");
    }

    #[tokio::test]
    async fn existing_headers_are_kept() {
        let svc = DefaultHeadersLayer::try_new([("user-agent", "sdk/1"), ("x-extra", "yes")])
            .unwrap()
            .layer(Echo);

        let mut req = request();
        req.headers_mut()
            .insert(USER_AGENT, HeaderValue::from_static("caller/2"));
        let resp = svc.oneshot(req).await.unwrap();

        assert_eq!(resp.headers()[USER_AGENT], "caller/2");
        assert_eq!(resp.headers()["x-extra"], "yes");
    }

    #[test]
    fn invalid_value_is_rejected() {
        assert!(DefaultHeadersLayer::user_agent("bad\x00agent").is_err());
        assert!(DefaultHeadersLayer::try_new([("bad name", "v")]).is_err());
    }
}
