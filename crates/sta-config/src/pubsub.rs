//! Pub/sub behaviour.

use serde::{Deserialize, Serialize};

const fn default_resubscribe_batch() -> usize {
    100
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PubSubConfig {
    /// The broker accepts `$expand` in topics.
    #[serde(default)]
    pub expand_allowed: bool,

    /// The broker accepts `$filter` in topics.
    #[serde(default)]
    pub filter_allowed: bool,

    /// Topics per network subscribe call when resubscribing after a reconnect.
    #[serde(default = "default_resubscribe_batch")]
    pub resubscribe_batch: usize,

    /// Prepended to every topic. Empty means `{api_version}/`.
    #[serde(default)]
    pub topic_prefix: String,
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self {
            expand_allowed: false,
            filter_allowed: false,
            resubscribe_batch: default_resubscribe_batch(),
            topic_prefix: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_correct() {
        let config = PubSubConfig::default();
        assert!(!config.expand_allowed);
        assert!(!config.filter_allowed);
        assert_eq!(config.resubscribe_batch, 100);
        assert!(config.topic_prefix.is_empty());
    }
}
