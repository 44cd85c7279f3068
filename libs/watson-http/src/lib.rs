#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Request construction and HTTP transport for the Watson SDK.
//!
//! Two halves:
//! - [`RequestBuilder`] turns method, URL pieces, headers, query parameters,
//!   and a JSON, text, stream, or multipart body into one `http::Request`.
//! - [`HttpClient`] sends it through a hyper + tower stack with rustls,
//!   connection pooling, per-attempt timeouts, retries with exponential
//!   backoff, User-Agent injection, and transparent gzip/brotli/deflate
//!   decompression.
//!
//! # Example
//!
//! ```ignore
//! use watson_http::{HttpClient, Method, RequestBuilder};
//!
//! let client = HttpClient::new()?;
//! let request = RequestBuilder::new(Method::Get)
//!     .construct_url("https://api.us-south.language-translator.watson.cloud.ibm.com",
//!                    &["v3/identifiable_languages"], &[] as &[&str])?
//!     .add_query("version", "2018-05-01")
//!     .build()?;
//! let body = client.execute(request).await?.bytes().await?;
//! let languages: serde_json::Value = serde_json::from_slice(&body)?;
//! ```

mod builder;
mod client;
mod config;
mod error;
mod layers;
pub mod mime;
mod multipart;
mod request;
mod response;
mod tls;

pub use builder::{HttpClientBuilder, InnerService};
pub use client::HttpClient;
pub use config::{
    DEFAULT_USER_AGENT, ExponentialBackoff, HttpClientConfig, RetryConfig, RetryTrigger,
    TlsRootConfig, TransportSecurity, is_idempotent_method,
};
pub use error::{BuildError, HttpError, InvalidUriKind};
pub use layers::{
    DefaultHeadersLayer, DefaultHeadersService, RETRY_ATTEMPT_HEADER, RetryLayer, RetryService,
};
pub use mime::{is_json_mime_type, is_json_patch_mime_type};
pub use multipart::{BodyStream, FormContents, FormData, MultipartWriter};
pub use request::{BodyContent, Method, RequestBuilder};
pub use response::{HttpResponse, ResponseBody};
