//! Error types for the schema codec.

use sta_model::ModelError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CsdlError {
    /// The document is not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The document is JSON but not a well-formed schema document.
    #[error("Malformed schema document at {path}: {reason}")]
    Malformed { path: String, reason: String },

    /// Applying the document to a registry failed.
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl CsdlError {
    pub(crate) fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
