//! # sta-config
//!
//! Layered configuration loading for SensorThings clients using figment.
//!
//! Configuration sources (in priority order, highest wins):
//! 1. Environment variables (`STA_*` prefix, `__` as separator)
//! 2. Project-level `.sta/config.toml`
//! 3. User-level `~/.config/sta/config.toml`
//! 4. Built-in defaults
//!
//! `STA_SERVICE__BASE_URL` maps to `service.base_url`,
//! `STA_PUBSUB__FILTER_ALLOWED` to `pubsub.filter_allowed`, and so on.
//!
//! # Usage
//!
//! ```no_run
//! use sta_config::StaConfig;
//!
//! let config = StaConfig::load_with_dotenv().expect("config");
//! if config.service.is_configured() {
//!     println!("service: {}", config.service.base_url);
//! }
//! ```

mod error;
mod model;
mod pubsub;
mod service;

pub use error::ConfigError;
pub use model::{LogConfig, ModelConfig};
pub use pubsub::PubSubConfig;
pub use service::ServiceConfig;

use std::path::PathBuf;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

/// Prefix of the environment variables read by [`StaConfig::figment`].
pub const ENV_PREFIX: &str = "STA_";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct StaConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub pubsub: PubSubConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl StaConfig {
    /// Load and validate configuration from TOML files and the environment.
    ///
    /// Does not read `.env`; see [`load_with_dotenv`](Self::load_with_dotenv).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Figment`] if a source cannot be merged, or
    /// [`ConfigError::InvalidValue`] if [`validate`](Self::validate) fails.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(&Self::figment())
    }

    /// [`load`](Self::load) after loading `.env` into the process
    /// environment.
    ///
    /// # Errors
    ///
    /// See [`load`](Self::load).
    pub fn load_with_dotenv() -> Result<Self, ConfigError> {
        Self::load_dotenv_from_workspace();
        Self::load()
    }

    /// Extract and validate from an arbitrary figment.
    ///
    /// # Errors
    ///
    /// See [`load`](Self::load).
    pub fn from_figment(figment: &Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// The provider chain, public so callers can merge providers on top.
    #[must_use]
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                figment = figment.merge(Toml::file(global_path));
            }
        }

        let local_path = PathBuf::from(".sta/config.toml");
        if local_path.exists() {
            figment = figment.merge(Toml::file(local_path));
        }

        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for a zero resubscribe batch,
    /// an empty namespace, or a base URL that is not `http(s)`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pubsub.resubscribe_batch == 0 {
            return Err(ConfigError::invalid(
                "pubsub.resubscribe_batch",
                "must be at least 1",
            ));
        }
        if self.model.namespace.is_empty() {
            return Err(ConfigError::invalid("model.namespace", "must not be empty"));
        }
        let url = &self.service.base_url;
        if !url.is_empty() && !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::invalid(
                "service.base_url",
                format!("expected an http or https URL, got '{url}'"),
            ));
        }
        Ok(())
    }

    /// The service section, if it names an endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotConfigured`] when `service.base_url` is empty.
    pub fn require_service(&self) -> Result<&ServiceConfig, ConfigError> {
        if self.service.is_configured() {
            Ok(&self.service)
        } else {
            Err(ConfigError::NotConfigured {
                section: "service".to_string(),
            })
        }
    }

    /// Topic prefix: the configured one, or the API version followed by `/`.
    #[must_use]
    pub fn topic_prefix(&self) -> String {
        if self.pubsub.topic_prefix.is_empty() {
            format!("{}/", self.service.api_version)
        } else {
            self.pubsub.topic_prefix.clone()
        }
    }

    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("sta").join("config.toml"))
    }

    /// Walk up from `CARGO_MANIFEST_DIR` looking for `.env`, falling back to
    /// the current directory. Missing files are ignored.
    fn load_dotenv_from_workspace() {
        if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
            let mut dir = PathBuf::from(manifest_dir);
            for _ in 0..3 {
                let env_path = dir.join(".env");
                if env_path.exists() {
                    let _ = dotenvy::from_path(&env_path);
                    return;
                }
                if !dir.pop() {
                    break;
                }
            }
        }
        let _ = dotenvy::dotenv();
    }
}
