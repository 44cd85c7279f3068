use http::{HeaderMap, StatusCode};

/// Outcome of a successful service call.
///
/// `result` is `None` when the body was empty or not JSON.
#[derive(Debug, Clone)]
pub struct DetailedResponse<T> {
    pub status_code: StatusCode,
    pub headers: HeaderMap,
    pub result: Option<T>,
}

impl<T> DetailedResponse<T> {
    /// Consumes the response, keeping only the decoded body.
    #[must_use]
    pub fn into_result(self) -> Option<T> {
        self.result
    }

    /// Value of a response header, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn header_lookup_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert("x-global-transaction-id", HeaderValue::from_static("abc123"));
        let response = DetailedResponse {
            status_code: StatusCode::OK,
            headers,
            result: Some(1),
        };
        assert_eq!(response.header("X-Global-Transaction-Id"), Some("abc123"));
        assert_eq!(response.header("missing"), None);
        assert_eq!(response.into_result(), Some(1));
    }
}
