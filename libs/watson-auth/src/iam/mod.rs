//! IBM Cloud IAM bearer tokens.
//!
//! [`TokenManager`] mints tokens from an API key, caches them, and refreshes
//! them once 80% of their lifetime has elapsed. A user-managed access token
//! short-circuits all of that.

pub mod config;
pub mod error;
pub mod manager;
pub mod types;

pub use config::{DEFAULT_IAM_URL, IamConfig, SharedClock};
pub use error::TokenError;
pub use manager::TokenManager;
pub use types::{REFRESH_BUFFER, REFRESH_TOKEN_HORIZON_SECS, TokenInfo};
