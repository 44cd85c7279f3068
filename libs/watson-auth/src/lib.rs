#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Credentials for Watson services.
//!
//! The [`iam`] module handles IBM Cloud IAM token issuance and refresh;
//! [`SecretString`] keeps API keys and tokens out of logs.

pub mod iam;
mod secret_string;

pub use iam::{IamConfig, TokenError, TokenInfo, TokenManager};
pub use secret_string::SecretString;
