use serde::{Deserialize, Serialize};

use crate::age::AgeContext;
use crate::error::Result;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Root configuration stored in `config.toml`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ClientConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_to_file: bool,
    /// Session age used when none is given explicitly.
    #[serde(default)]
    pub default_age: Option<u8>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            log_level: default_log_level(),
            log_to_file: false,
            default_age: None,
        }
    }
}

impl ClientConfig {
    /// The configured default age, validated.
    pub fn default_age(&self) -> Result<Option<AgeContext>> {
        self.default_age.map(AgeContext::new).transpose()
    }
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_log_level() -> String {
    "info".to_string()
}
