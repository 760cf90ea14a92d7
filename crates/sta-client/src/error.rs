//! Pub/sub error types.

use sta_model::ModelError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PubSubError {
    /// The broker connection refused or failed a (un)subscribe call.
    #[error("Pub/sub transport error: {0}")]
    Transport(String),

    /// No live subscription has this id.
    #[error("Unknown subscription {0}")]
    UnknownSubscription(u64),

    /// No topic could be built for the query.
    #[error(transparent)]
    Model(#[from] ModelError),
}
