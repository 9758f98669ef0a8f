use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// Default auth endpoint.
pub const DEFAULT_AUTH_URL: &str = "https://genie.chula.ac.th/api/v1/external/auth";

/// Default chat completions endpoint.
pub const DEFAULT_COMPLETION_URL: &str = "https://genie.chula.ac.th/api/v1/external/completions";

/// How long an issued token is trusted (4 hours).
pub const DEFAULT_TOKEN_TTL_SECONDS: u64 = 4 * 60 * 60;

/// Configuration for talking to the Genie upstream.
///
/// The API key is held as a [`SecretString`] and never serialized, so a
/// config can be logged or written back without leaking credentials.
///
/// # Examples
///
/// ```
/// use genie_common::Config;
///
/// let config = Config::new("my-app", "gpt-4o")
///     .with_api_key("secret")
///     .with_temperature(0.2);
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application id registered with the auth service.
    #[serde(default)]
    pub app_id: String,
    /// Model requested on every completion.
    #[serde(default)]
    pub model: String,
    /// Static key sent to the auth endpoint in the `api-key` header.
    #[serde(skip_serializing, default)]
    pub api_key: Option<SecretString>,
    /// Auth endpoint URL.
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    /// Completion endpoint URL.
    #[serde(default = "default_completion_url")]
    pub completion_url: String,
    /// Sampling temperature (0.0 to 2.0), omitted upstream when unset.
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Per-request timeout in seconds. `None` means requests may wait forever.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    /// Lifetime of a cached token in seconds.
    #[serde(default = "default_token_ttl_seconds")]
    pub token_ttl_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            model: String::new(),
            api_key: None,
            auth_url: default_auth_url(),
            completion_url: default_completion_url(),
            temperature: None,
            timeout_seconds: None,
            token_ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
        }
    }
}

fn default_auth_url() -> String {
    DEFAULT_AUTH_URL.to_string()
}

fn default_completion_url() -> String {
    DEFAULT_COMPLETION_URL.to_string()
}

const fn default_token_ttl_seconds() -> u64 {
    DEFAULT_TOKEN_TTL_SECONDS
}

impl Config {
    /// Creates a configuration for the given application and model.
    pub fn new(app_id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            model: model.into(),
            ..Default::default()
        }
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::new(api_key.into().into()));
        self
    }

    /// Overrides the auth endpoint.
    #[must_use]
    pub fn with_auth_url(mut self, auth_url: impl Into<String>) -> Self {
        self.auth_url = auth_url.into();
        self
    }

    /// Overrides the completion endpoint.
    #[must_use]
    pub fn with_completion_url(mut self, completion_url: impl Into<String>) -> Self {
        self.completion_url = completion_url.into();
        self
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Sets a per-request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = Some(timeout_seconds);
        self
    }

    /// Sets how long fetched tokens are cached.
    #[must_use]
    pub const fn with_token_ttl(mut self, token_ttl_seconds: u64) -> Self {
        self.token_ttl_seconds = token_ttl_seconds;
        self
    }

    /// Token lifetime as a [`Duration`].
    #[must_use]
    pub const fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_seconds)
    }

    /// Checks that everything needed to reach the upstream is present and sane.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the API key, application id or model is missing or blank
    /// - either endpoint is not an absolute URL
    /// - `temperature` is outside 0.0 to 2.0
    /// - `token_ttl_seconds` is zero
    pub fn validate(&self) -> anyhow::Result<()> {
        if self
            .api_key
            .as_ref()
            .is_none_or(|key| key.expose_secret().trim().is_empty())
        {
            anyhow::bail!("API key is required");
        }

        if self.app_id.trim().is_empty() {
            anyhow::bail!("Application id is required");
        }

        if self.model.trim().is_empty() {
            anyhow::bail!("Model is required");
        }

        for (name, value) in [
            ("auth_url", &self.auth_url),
            ("completion_url", &self.completion_url),
        ] {
            url::Url::parse(value)
                .map_err(|e| anyhow::anyhow!("Invalid {name} '{value}': {e}"))?;
        }

        if let Some(temp) = self.temperature
            && !(0.0..=2.0).contains(&temp)
        {
            anyhow::bail!("Temperature must be between 0.0 and 2.0, got {temp}");
        }

        if self.token_ttl_seconds == 0 {
            anyhow::bail!("token_ttl_seconds must be greater than zero");
        }

        Ok(())
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn temperature_validation(temp in -10.0f32..10.0f32) {
            let config = Config::new("app", "model").with_api_key("key").with_temperature(temp);
            let is_valid = (0.0..=2.0).contains(&temp);
            prop_assert_eq!(config.validate().is_ok(), is_valid);
        }
    }
}
