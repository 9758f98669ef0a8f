//! Gateway configuration.
//!
//! Configuration is read from `~/.config/genie-gateway/config.toml` (or the
//! file given with `--config`), then overridden by `GENIE_*` environment
//! variables. A missing default file is not an error; everything can come
//! from the environment.
//!
//! ## Example Configuration
//!
//! ```toml
//! listen_addr = "127.0.0.1:8080"
//! max_body_bytes = 33554432
//! email_domain = "student.chula.ac.th"
//!
//! [genie]
//! app_id = "my-app"
//! model = "gpt-4o"
//! api_key = "..."
//! temperature = 0.7
//! ```

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use genie_common::{Config, DEFAULT_EMAIL_DOMAIN};

use crate::error::{GatewayError, Result};

/// Environment variable overriding `genie.api_key`.
pub const ENV_API_KEY: &str = "GENIE_API_KEY";
/// Environment variable overriding `genie.app_id`.
pub const ENV_APP_ID: &str = "GENIE_APP_ID";
/// Environment variable overriding `genie.model`.
pub const ENV_MODEL: &str = "GENIE_MODEL";
/// Environment variable overriding `genie.auth_url`.
pub const ENV_AUTH_URL: &str = "GENIE_AUTH_URL";
/// Environment variable overriding `genie.completion_url`.
pub const ENV_COMPLETION_URL: &str = "GENIE_COMPLETION_URL";
/// Environment variable overriding `listen_addr`.
pub const ENV_LISTEN_ADDR: &str = "GENIE_LISTEN_ADDR";

/// Gateway configuration loaded from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Address the HTTP server binds to (default: `0.0.0.0:8080`)
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Maximum accepted request body in bytes (default: 32 MiB)
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Domain appended to caller handles to form their email
    #[serde(default = "default_email_domain")]
    pub email_domain: String,

    /// Upstream settings
    #[serde(default)]
    pub genie: Config,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            max_body_bytes: default_max_body_bytes(),
            email_domain: default_email_domain(),
            genie: Config::default(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

const fn default_max_body_bytes() -> usize {
    32 * 1024 * 1024
}

fn default_email_domain() -> String {
    DEFAULT_EMAIL_DOMAIN.to_string()
}

impl GatewayConfig {
    /// Loads configuration from `path`, or from the default location.
    ///
    /// An explicit path must exist. When no path is given and the default
    /// file is absent, defaults are used.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - An explicit file doesn't exist
    /// - The file cannot be read
    /// - Deserialization fails
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(GatewayError::Config(format!(
                        "Configuration file not found: {}",
                        path.display()
                    )));
                }
                path.to_path_buf()
            }
            None => match Self::config_path() {
                Ok(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };

        let contents = fs::read_to_string(&path).map_err(|e| {
            GatewayError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;

        Self::from_toml(&contents)
    }

    /// Parses configuration from a TOML document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document does not match the schema.
    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Returns the default configuration file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined.
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| GatewayError::Config("Failed to determine config directory".to_string()))?
            .join("genie-gateway");

        Ok(config_dir.join("config.toml"))
    }

    /// Applies `GENIE_*` overrides, reading variables through `lookup`.
    ///
    /// Empty values are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if `GENIE_LISTEN_ADDR` is not a socket address.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(key) = var(ENV_API_KEY) {
            self.genie.api_key = Some(SecretString::from(key));
        }
        if let Some(app_id) = var(ENV_APP_ID) {
            self.genie.app_id = app_id;
        }
        if let Some(model) = var(ENV_MODEL) {
            self.genie.model = model;
        }
        if let Some(url) = var(ENV_AUTH_URL) {
            self.genie.auth_url = url;
        }
        if let Some(url) = var(ENV_COMPLETION_URL) {
            self.genie.completion_url = url;
        }
        if let Some(addr) = var(ENV_LISTEN_ADDR) {
            self.listen_addr = addr.trim().parse().map_err(|e| {
                GatewayError::Config(format!("Invalid {ENV_LISTEN_ADDR} '{addr}': {e}"))
            })?;
        }

        Ok(())
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The upstream settings are incomplete (see [`Config::validate`])
    /// - `max_body_bytes` is zero
    /// - `email_domain` is blank
    pub fn validate(&self) -> Result<()> {
        self.genie.validate()?;

        if self.max_body_bytes == 0 {
            return Err(GatewayError::Config(
                "max_body_bytes must be greater than zero".to_string(),
            ));
        }

        if self.email_domain.trim().is_empty() {
            return Err(GatewayError::Config("email_domain is required".to_string()));
        }

        Ok(())
    }
}
