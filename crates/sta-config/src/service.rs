//! Service endpoint configuration.

use serde::{Deserialize, Serialize};

fn default_api_version() -> String {
    String::from("v1.1")
}

fn default_metadata_path() -> String {
    String::from("$metadata")
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Service root, e.g. `https://example.org/FROST-Server/v1.1`.
    #[serde(default)]
    pub base_url: String,

    /// API version segment, also the default pub/sub topic prefix.
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Path of the schema document relative to `base_url`.
    #[serde(default = "default_metadata_path")]
    pub metadata_path: String,

    /// Ask for `$count=true` on every list request.
    #[serde(default)]
    pub count_by_default: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_version: default_api_version(),
            metadata_path: default_metadata_path(),
            count_by_default: false,
        }
    }
}

impl ServiceConfig {
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.base_url.is_empty()
    }

    /// `base_url` without a trailing slash.
    #[must_use]
    pub fn root(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Absolute URL of the JSON schema document.
    #[must_use]
    pub fn metadata_url(&self) -> String {
        format!(
            "{}/{}?$format=json",
            self.root(),
            self.metadata_path.trim_start_matches('/')
        )
    }
}
