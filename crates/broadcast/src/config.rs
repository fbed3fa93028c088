//! Metadata source configuration.

use serde::{Deserialize, Serialize};

/// REST metadata source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// API base URL (must end with `/`)
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Application client ID sent with every request
    #[serde(default)]
    pub client_id: String,
    /// Static bearer token (optional)
    #[serde(default)]
    pub access_token: Option<String>,
    /// Request timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// How long resolved categories are cached
    #[serde(default = "default_category_cache_ttl_secs")]
    pub category_cache_ttl_secs: u64,
    /// Warn when the remaining rate-limit budget drops below this
    #[serde(default = "default_rate_limit_warn_below")]
    pub rate_limit_warn_below: u32,
}

fn default_api_url() -> String {
    "https://api.twitch.tv/helix/".to_string()
}

fn default_request_timeout_ms() -> u64 {
    60_000
}

fn default_category_cache_ttl_secs() -> u64 {
    3600
}

fn default_rate_limit_warn_below() -> u32 {
    60
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            client_id: String::new(),
            access_token: None,
            request_timeout_ms: default_request_timeout_ms(),
            category_cache_ttl_secs: default_category_cache_ttl_secs(),
            rate_limit_warn_below: default_rate_limit_warn_below(),
        }
    }
}
