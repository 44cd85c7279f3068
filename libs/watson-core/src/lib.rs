#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Base service shared by the Watson service clients.
//!
//! A [`BaseService`] is configured from [`ServiceOptions`], picks an
//! [`Authenticator`], and sends requests built with
//! [`watson_http::RequestBuilder`], returning a [`DetailedResponse`].
//!
//! ```ignore
//! use watson_core::{BaseService, ServiceOptions};
//! use watson_http::Method;
//!
//! let options = ServiceOptions::load("assistant", None)?;
//! let service = BaseService::new(options)?;
//! let builder = service.request(Method::Get, &["v1/workspaces"], &[] as &[&str])?;
//! let workspaces = service.handle_request::<serde_json::Value>(builder).await?;
//! ```

pub mod authenticator;
pub mod error;
pub mod options;
pub mod response;
pub mod service;

pub use authenticator::{AuthLayer, AuthService, Authenticator};
pub use error::{ServiceError, extract_error_message};
pub use options::ServiceOptions;
pub use response::DetailedResponse;
pub use service::{BaseService, LEARNING_OPT_OUT_HEADER};
