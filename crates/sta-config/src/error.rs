//! Errors raised while loading or validating configuration.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// A provider could not be read or the merged values did not fit
    /// [`StaConfig`](crate::StaConfig).
    #[error("Configuration error: {0}")]
    Figment(#[from] figment::Error),

    /// A section the caller needs has no usable values.
    #[error("Section '{section}' is not configured")]
    NotConfigured { section: String },

    /// A value was present but unusable.
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}
