use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// Settings for one Watson service client.
///
/// Deserializable so it can be layered with [`ServiceOptions::load`]; the
/// `Debug` impl redacts every credential.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServiceOptions {
    /// Service endpoint, e.g. `https://api.us-south.assistant.watson.cloud.ibm.com`
    pub url: Option<String>,
    /// API version date sent as the `version` query parameter
    pub version: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Legacy API key sent as the `api_key` query parameter
    pub api_key: Option<String>,
    pub iam_api_key: Option<String>,
    pub iam_access_token: Option<String>,
    pub iam_url: Option<String>,
    /// Headers added to every request unless the request sets them itself
    pub default_headers: BTreeMap<String, String>,
    /// Sends `X-Watson-Learning-Opt-Out: true` on every request
    pub learning_opt_out: bool,
    pub user_agent: Option<String>,
}

impl ServiceOptions {
    /// Extracts options from an already assembled figment.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Config`] if the figment does not describe
    /// valid options.
    pub fn from_figment(figment: &Figment) -> Result<Self, ServiceError> {
        figment
            .extract()
            .map_err(|e| ServiceError::Config(e.to_string()))
    }

    /// Loads options for `service` from defaults, an optional YAML file, and
    /// `WATSON_<SERVICE>_*` environment variables, later sources winning.
    ///
    /// `service` is upper-cased with `-` mapped to `_`, so `speech-to-text`
    /// reads `WATSON_SPEECH_TO_TEXT_IAM_API_KEY`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Config`] if the YAML file is missing or any
    /// source holds values of the wrong shape.
    pub fn load(service: &str, yaml_path: Option<&Path>) -> Result<Self, ServiceError> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));

        if let Some(path) = yaml_path {
            if !path.is_file() {
                return Err(ServiceError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            figment = figment.merge(Yaml::file(path));
        }

        let prefix = env_prefix(service);
        tracing::debug!(service, prefix = %prefix, "loading service options");
        figment = figment.merge(Env::prefixed(&prefix));

        Self::from_figment(&figment)
    }
}

fn env_prefix(service: &str) -> String {
    format!("WATSON_{}_", service.to_ascii_uppercase().replace('-', "_"))
}

fn redact(value: Option<&String>) -> Option<&'static str> {
    value.map(|_| "[REDACTED]")
}

impl fmt::Debug for ServiceOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceOptions")
            .field("url", &self.url)
            .field("version", &self.version)
            .field("username", &self.username)
            .field("password", &redact(self.password.as_ref()))
            .field("api_key", &redact(self.api_key.as_ref()))
            .field("iam_api_key", &redact(self.iam_api_key.as_ref()))
            .field("iam_access_token", &redact(self.iam_access_token.as_ref()))
            .field("iam_url", &self.iam_url)
            .field("default_headers", &self.default_headers)
            .field("learning_opt_out", &self.learning_opt_out)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}
