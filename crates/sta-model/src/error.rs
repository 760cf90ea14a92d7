//! Error types for the model layer.
//!
//! `ModelError` covers type-system and shape failures, which are raised
//! synchronously to the caller. `ServiceError` covers everything that can go
//! wrong while talking to a server through a [`Session`](crate::Session).

use thiserror::Error;

/// Type-system and shape errors.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A different entity type is already registered under this name.
    #[error("Naming conflict: entity type '{0}' is already registered")]
    NamingConflict(String),

    /// A type name could not be resolved.
    #[error("Unknown type: {0}")]
    UnknownType(String),

    /// A property is not declared on the entity type.
    #[error("Unknown property '{property}' on entity type {entity_type}")]
    UnknownProperty {
        entity_type: String,
        property: String,
    },

    /// A property exists but is of the wrong kind for the operation.
    #[error("Property '{property}' on entity type {entity_type} is not {expected}")]
    PropertyKind {
        entity_type: String,
        property: String,
        expected: &'static str,
    },

    /// A navigation property has no (valid) inverse.
    #[error("Navigation property {entity_type}/{property} has no inverse")]
    MissingInverse {
        entity_type: String,
        property: String,
    },

    /// A feature that exists as a data shape but is not wired end-to-end.
    #[error("Not yet supported: {0}")]
    NotYetSupported(String),

    /// The entity type is referenced outside the registry and can no longer
    /// be modified in place.
    #[error("Entity type '{0}' is shared and can no longer be modified")]
    TypeShared(String),

    /// The registry or entity type is already finalised.
    #[error("Already finalised: {0}")]
    Finalised(String),

    /// A value does not fit the property it is assigned to.
    #[error("Invalid value for '{property}': {reason}")]
    InvalidValue { property: String, reason: String },

    /// The entity type has no container name, so no path can be built.
    #[error("Entity type '{0}' has no container")]
    NoContainer(String),

    /// The entity has no primary key value, so no path can be built.
    #[error("Entity of type '{0}' has no primary key value")]
    MissingKey(String),
}

impl ModelError {
    pub(crate) fn unknown_property(entity_type: &str, property: &str) -> Self {
        Self::UnknownProperty {
            entity_type: entity_type.to_string(),
            property: property.to_string(),
        }
    }

    pub(crate) fn invalid_value(property: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            property: property.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors from requests issued through a session.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The server answered with a non-success status.
    #[error("Service returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// The transport failed before a response was received.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A response body could not be mapped onto the model.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// A response body was not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Model(#[from] ModelError),

    /// An operation needed a session but the entity or set has none.
    #[error("No session available to load {0}")]
    NoSession(String),

    /// Catch-all for transport implementations.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
