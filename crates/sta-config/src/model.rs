//! Model and logging settings.

use serde::{Deserialize, Serialize};

fn default_namespace() -> String {
    String::from("org.OGC")
}

fn default_level() -> String {
    String::from("warn")
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ModelConfig {
    /// Namespace for emitted types that carry none of their own.
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LogConfig {
    /// Filter directive used when `STA_LOG` is unset, e.g. `info` or
    /// `sta_model=debug,warn`.
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}
