//! Remote hub configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_HUB_URL: &str = "https://huggingface.co";
const DEFAULT_USER_AGENT: &str = concat!("rant/", env!("CARGO_PKG_VERSION"));
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_LISTING_REQUESTS: usize = 10_000;

/// Settings for talking to the content repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Base URL of the hub, without trailing slash
    pub base_url: String,
    /// User agent sent with every request
    pub user_agent: String,
    /// Per-read timeout; bodies of multi-GB files may take far longer overall
    pub request_timeout_secs: u64,
    /// TCP/TLS connect timeout
    pub connect_timeout_secs: u64,
    /// Upper bound on tree-listing calls in one acquisition
    pub max_listing_requests: usize,
}

impl HubConfig {
    /// Config pointing at a different hub, keeping the other defaults
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_HUB_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            max_listing_requests: DEFAULT_MAX_LISTING_REQUESTS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HubConfig::default();
        assert_eq!(config.base_url, DEFAULT_HUB_URL);
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
        assert_eq!(config.max_listing_requests, 10_000);
    }

    #[test]
    fn test_with_base_url_strips_slash() {
        let config = HubConfig::with_base_url("http://127.0.0.1:8080/");
        assert_eq!(config.base_url, "http://127.0.0.1:8080");
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() {
        let config: HubConfig =
            serde_json::from_str(r#"{"base_url": "http://mirror.local"}"#).unwrap();
        assert_eq!(config.base_url, "http://mirror.local");
        assert_eq!(config.connect_timeout_secs, DEFAULT_CONNECT_TIMEOUT_SECS);
    }
}
