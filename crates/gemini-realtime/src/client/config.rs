use super::consts;
use anyhow::Result;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;

pub struct Config {
    base_url: String,
    api_key: SecretString,
    model: String,
    setup_timeout: Duration,
}

pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.config.base_url = base_url.to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.config.api_key = SecretString::from(api_key.to_string());
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.config.model = model.to_string();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Defaults, with the key taken from `GEMINI_API_KEY` when it is set.
    pub fn new() -> Self {
        Self {
            base_url: consts::BASE_URL.to_string(),
            api_key: std::env::var(consts::GEMINI_API_KEY)
                .unwrap_or_default()
                .into(),
            model: consts::DEFAULT_MODEL.to_string(),
            setup_timeout: Duration::from_secs(consts::SETUP_TIMEOUT_SECS),
        }
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_key(&self) -> &SecretString {
        &self.api_key
    }

    /// Model name with the `models/` prefix the setup message expects.
    pub fn model(&self) -> String {
        if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        }
    }

    pub fn setup_timeout(&self) -> Duration {
        self.setup_timeout
    }

    pub(crate) fn build_request(&self) -> Result<Request> {
        let url = format!("{}?key={}", self.base_url, self.api_key.expose_secret());
        Ok(url.into_client_request()?)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_gets_prefix() {
        let config = Config::builder().with_model("gemini-live-test").build();
        assert_eq!(config.model(), "models/gemini-live-test");
        let config = Config::builder().with_model("models/x").build();
        assert_eq!(config.model(), "models/x");
    }

    #[test]
    fn test_request_carries_key_in_query() {
        let config = Config::builder()
            .with_base_url("wss://example.test/live")
            .with_api_key("abc")
            .build();
        let request = config.build_request().unwrap();
        assert_eq!(request.uri().query(), Some("key=abc"));
        assert_eq!(request.uri().host(), Some("example.test"));
    }
}
