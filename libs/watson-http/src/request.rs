use crate::error::BuildError;
use crate::mime::{is_json_mime_type, is_json_patch_mime_type};
use crate::multipart::{BodyStream, FormContents, FormData, MultipartWriter};
use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, Request};
use http_body_util::Full;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use url::Url;

/// HTTP verbs used by the Watson service APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl From<Method> for http::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => http::Method::GET,
            Method::Post => http::Method::POST,
            Method::Put => http::Method::PUT,
            Method::Delete => http::Method::DELETE,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(http::Method::from(*self).as_str())
    }
}

/// Body handed to [`RequestBuilder::set_body_content`].
///
/// The content type decides how each variant is encoded: JSON content types
/// serialize `Json` and `Text`, everything else accepts only text or a stream.
pub enum BodyContent {
    Json(serde_json::Value),
    Text(String),
    Stream(BodyStream),
}

impl BodyContent {
    fn kind(&self) -> &'static str {
        match self {
            Self::Json(value) => json_type_name(value),
            Self::Text(_) => "string",
            Self::Stream(_) => "stream",
        }
    }
}

impl fmt::Debug for BodyContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(value) => f.debug_tuple("Json").field(value).finish(),
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

enum Body {
    Empty,
    Json(Bytes),
    Text(String),
    Stream(BodyStream),
}

/// Fluent builder that turns method, URL, headers, query, and body
/// instructions into one `http::Request`.
///
/// Errors from header parsing are deferred and reported by [`build`](Self::build);
/// URL construction and JSON encoding fail immediately.
///
/// # Example
///
/// ```ignore
/// use watson_http::{Method, RequestBuilder};
///
/// let request = RequestBuilder::new(Method::Post)
///     .construct_url("https://api.example.com/api", &["v1/workspaces", "message"], &["ws-1"])?
///     .add_query("version", "2018-09-20")
///     .add_header("Accept", "application/json")
///     .set_body_content_json(&serde_json::json!({"input": {"text": "hi"}}))?
///     .build()?;
/// ```
#[must_use = "RequestBuilder does nothing until .build() is called"]
pub struct RequestBuilder {
    method: Method,
    url: Option<Url>,
    headers: HeaderMap,
    query: BTreeMap<String, String>,
    form: Vec<(String, FormData)>,
    body: Body,
    error: Option<BuildError>,
}

impl fmt::Debug for RequestBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestBuilder")
            .field("method", &self.method)
            .field("url", &self.url.as_ref().map(Url::as_str))
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("query", &self.query.keys().collect::<Vec<_>>())
            .field("form_parts", &self.form.len())
            .finish_non_exhaustive()
    }
}

impl RequestBuilder {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            url: None,
            headers: HeaderMap::new(),
            query: BTreeMap::new(),
            form: Vec::new(),
            body: Body::Empty,
            error: None,
        }
    }

    #[must_use]
    pub fn method(&self) -> Method {
        self.method
    }

    /// The URL set so far, if any.
    #[must_use]
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// Builds the URL from a base endpoint and positionally paired segments.
    ///
    /// For each index `i`, `/segments[i]` is appended, then `/parameters[i]`
    /// if a parameter exists at the same index.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::InvalidUrl`] if the result is not a valid absolute URL.
    pub fn construct_url<S, P>(
        mut self,
        base_endpoint: &str,
        path_segments: &[S],
        path_parameters: &[P],
    ) -> Result<Self, BuildError>
    where
        S: AsRef<str>,
        P: AsRef<str>,
    {
        let mut raw = base_endpoint.trim_end_matches('/').to_owned();
        for (i, segment) in path_segments.iter().enumerate() {
            raw.push('/');
            raw.push_str(segment.as_ref());
            if let Some(parameter) = path_parameters.get(i) {
                raw.push('/');
                raw.push_str(parameter.as_ref());
            }
        }
        self.url = Some(parse_url(&raw)?);
        Ok(self)
    }

    /// Uses an already constructed URL.
    pub fn with_url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    /// Sets a query parameter; a repeated name replaces the earlier value.
    pub fn add_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    /// Sets a header; a repeated name replaces the earlier value.
    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        if self.error.is_some() {
            return self;
        }

        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            (Err(e), _) => self.error = Some(BuildError::InvalidHeaderName(e)),
            (_, Err(e)) => self.error = Some(BuildError::InvalidHeaderValue(e)),
        }
        self
    }

    /// Same as [`add_header`](Self::add_header) but marks the value as
    /// sensitive so it is hidden from `Debug` output.
    pub fn add_sensitive_header(mut self, name: &str, value: &str) -> Self {
        if self.error.is_some() {
            return self;
        }

        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(mut value)) => {
                value.set_sensitive(true);
                self.headers.insert(name, value);
            }
            (Err(e), _) => self.error = Some(BuildError::InvalidHeaderName(e)),
            (_, Err(e)) => self.error = Some(BuildError::InvalidHeaderValue(e)),
        }
        self
    }

    /// Registers one multipart part. Any form part turns the request body
    /// into `multipart/form-data` at build time.
    pub fn add_form_data(
        mut self,
        field_name: impl Into<String>,
        file_name: Option<&str>,
        content_type: Option<&str>,
        contents: impl Into<FormContents>,
    ) -> Self {
        self.form.push((
            field_name.into(),
            FormData {
                file_name: file_name.map(ToOwned::to_owned),
                content_type: content_type.map(ToOwned::to_owned),
                contents: contents.into(),
            },
        ));
        self
    }

    /// Serializes `value` as the JSON body, replacing any previous body.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Json`] if serialization fails.
    pub fn set_body_content_json<T: Serialize + ?Sized>(
        mut self,
        value: &T,
    ) -> Result<Self, BuildError> {
        let encoded = serde_json::to_vec(value)?;
        self.body = Body::Json(Bytes::from(encoded));
        Ok(self)
    }

    /// Uses the raw string as the body, replacing any previous body.
    pub fn set_body_content_string(mut self, value: impl Into<String>) -> Self {
        self.body = Body::Text(value.into());
        self
    }

    /// Uses the reader as the body, replacing any previous body.
    ///
    /// The stream is drained by [`build`](Self::build) so the request can be
    /// replayed by the transport retry layer.
    pub fn set_body_content_stream(mut self, reader: impl Read + Send + 'static) -> Self {
        self.body = Body::Stream(Box::new(reader));
        self
    }

    /// Dispatches `content` by `content_type` and records the content type header.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::UnsupportedBody`] if the content type is empty or
    /// a structured value is given for a non-JSON content type, and
    /// [`BuildError::Json`] if JSON encoding fails.
    pub fn set_body_content(
        self,
        content_type: &str,
        content: BodyContent,
    ) -> Result<Self, BuildError> {
        if content_type.trim().is_empty() {
            return Err(BuildError::UnsupportedBody {
                type_name: content.kind().to_owned(),
                reason: "content type must not be empty".to_owned(),
            });
        }

        let builder = self.add_header(CONTENT_TYPE.as_str(), content_type);

        if is_json_mime_type(content_type) || is_json_patch_mime_type(content_type) {
            return match content {
                BodyContent::Json(value) => builder.set_body_content_json(&value),
                BodyContent::Text(text) => builder.set_body_content_json(&text),
                BodyContent::Stream(reader) => Ok(builder.with_body(Body::Stream(reader))),
            };
        }

        match content {
            BodyContent::Text(text) | BodyContent::Json(serde_json::Value::String(text)) => {
                Ok(builder.set_body_content_string(text))
            }
            BodyContent::Stream(reader) => Ok(builder.with_body(Body::Stream(reader))),
            BodyContent::Json(other) => Err(BuildError::UnsupportedBody {
                type_name: json_type_name(&other).to_owned(),
                reason: format!(
                    "content type '{content_type}' requires a string or a byte stream"
                ),
            }),
        }
    }

    fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    /// Produces the finished request.
    ///
    /// Re-parses the URL, encodes form parts as `multipart/form-data` when
    /// present (replacing any body), copies headers, and merges query
    /// parameters into the URL.
    ///
    /// # Errors
    ///
    /// Returns a [`BuildError`] for any deferred header error, a missing or
    /// invalid URL, a failing body stream, or request assembly failure.
    pub fn build(self) -> Result<Request<Full<Bytes>>, BuildError> {
        let Self {
            method,
            url,
            mut headers,
            query,
            form,
            body,
            error,
        } = self;

        if let Some(e) = error {
            return Err(e);
        }

        let url = url.ok_or(BuildError::MissingUrl)?;
        let mut url = parse_url(url.as_str())?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &query {
                pairs.append_pair(name, value);
            }
        }

        let payload = if form.is_empty() {
            match body {
                Body::Empty => Bytes::new(),
                Body::Json(encoded) => {
                    if !headers.contains_key(CONTENT_TYPE) {
                        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                    }
                    encoded
                }
                Body::Text(text) => Bytes::from(text),
                Body::Stream(mut reader) => {
                    let mut buf = Vec::new();
                    reader.read_to_end(&mut buf)?;
                    Bytes::from(buf)
                }
            }
        } else {
            let mut writer = MultipartWriter::new();
            for (field_name, data) in form {
                writer.write_part(&field_name, data)?;
            }
            headers.insert(CONTENT_TYPE, HeaderValue::try_from(writer.content_type())?);
            writer.finish()
        };

        let uri: http::Uri =
            url.as_str()
                .parse()
                .map_err(|e: http::uri::InvalidUri| BuildError::InvalidUrl {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;

        let mut request = Request::builder()
            .method(http::Method::from(method))
            .uri(uri)
            .body(Full::new(payload))?;
        *request.headers_mut() = headers;

        tracing::trace!(method = %method, url = %url, "request built");
        Ok(request)
    }
}

fn parse_url(raw: &str) -> Result<Url, BuildError> {
    let url = Url::parse(raw).map_err(|e| BuildError::InvalidUrl {
        url: raw.to_owned(),
        reason: e.to_string(),
    })?;
    if !url.has_host() {
        return Err(BuildError::InvalidUrl {
            url: raw.to_owned(),
            reason: "missing host".to_owned(),
        });
    }
    Ok(url)
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
