//! Runtime configuration for the hosted inference API

use std::time::Duration;

/// Default API host
pub const DEFAULT_BASE_URL: &str = "https://api.electronhub.top";

/// Default chat model used for text explanations
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4";

/// Default voice used for spoken explanations
pub const DEFAULT_VOICE: &str = "en-US-Wavenet-D";

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for talking to the remote API
#[derive(Debug, Clone, PartialEq)]
pub struct TutorConfig {
    /// Scheme and host of the API, without a trailing slash
    pub base_url: String,
    /// Bearer token sent with every request
    pub api_key: String,
    /// Timeout applied to non-streaming requests
    pub timeout: Duration,
    /// Model name for chat completions
    pub chat_model: String,
    /// Voice name for speech synthesis
    pub voice: String,
}

impl Default for TutorConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            timeout: DEFAULT_TIMEOUT,
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
        }
    }
}

impl TutorConfig {
    /// Creates a configuration with the given API key and default settings
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    /// Points the configuration at a different API host
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Overrides the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = TutorConfig::new("key");
        assert_eq!(config.api_key, "key");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.chat_model, "gpt-4");
        assert_eq!(config.voice, "en-US-Wavenet-D");
    }

    #[test]
    fn test_with_base_url_strips_trailing_slash() {
        let config = TutorConfig::new("key").with_base_url("http://127.0.0.1:8080/");
        assert_eq!(config.base_url, "http://127.0.0.1:8080");
    }
}
