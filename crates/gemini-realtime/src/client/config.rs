use secrecy::SecretString;

use crate::client::consts::{DEFAULT_API_VERSION, DEFAULT_MODEL, GEMINI_API_KEY, HOST};

/// Connection settings for a Live session.
///
/// The socket URL is derived from the API version unless an explicit
/// endpoint is set, which local test servers use.
#[derive(Debug)]
pub struct Config {
    api_version: String,
    endpoint: Option<String>,
    api_key: SecretString,
    model: String,
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    api_version: Option<String>,
    endpoint: Option<String>,
    api_key: Option<SecretString>,
    model: Option<String>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_version(mut self, version: &str) -> Self {
        self.api_version = Some(version.to_string());
        self
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = Some(endpoint.to_string());
        self
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.api_key = Some(SecretString::from(api_key.to_string()));
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = Some(model.to_string());
        self
    }

    /// Missing fields take their defaults; the key falls back to `GEMINI_API_KEY`.
    /// An empty key is rejected by the server, not here.
    pub fn build(self) -> Config {
        Config {
            api_version: self
                .api_version
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            endpoint: self.endpoint,
            api_key: self.api_key.unwrap_or_else(|| {
                SecretString::from(std::env::var(GEMINI_API_KEY).unwrap_or_default())
            }),
            model: self.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn endpoint(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!(
                "{}/ws/google.ai.generativelanguage.{}.GenerativeService.BidiGenerateContent",
                HOST, self.api_version
            ),
        }
    }

    pub fn api_key(&self) -> &SecretString {
        &self.api_key
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl Default for Config {
    fn default() -> Self {
        ConfigBuilder::new().build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn endpoint_follows_api_version() {
        let config = Config::builder()
            .with_api_key("k")
            .with_api_version("v1alpha")
            .build();
        assert!(config.endpoint().ends_with(
            "/ws/google.ai.generativelanguage.v1alpha.GenerativeService.BidiGenerateContent"
        ));
        assert_eq!(config.model(), DEFAULT_MODEL);
        assert_eq!(config.api_key().expose_secret(), "k");
    }

    #[test]
    fn explicit_endpoint_wins() {
        let config = Config::builder()
            .with_api_key("k")
            .with_endpoint("ws://127.0.0.1:9/live")
            .build();
        assert_eq!(config.endpoint(), "ws://127.0.0.1:9/live");
    }
}
