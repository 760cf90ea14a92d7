//! # sta-client
//!
//! Client session for SensorThings services.
//!
//! This crate provides:
//! - [`Service`]: the production [`Session`](sta_model::Session), built from
//!   configuration and the service's own schema document
//! - Pluggable [`HttpTransport`] and [`PubSubTransport`] traits
//! - [`SubscriptionMap`]: reference-counted pub/sub topics with batched
//!   resubscription
//! - [`init_tracing`]: a `tracing-subscriber` setup driven by `STA_LOG`

pub mod error;
pub mod pubsub;
pub mod service;
pub mod telemetry;
pub mod transport;

pub use error::PubSubError;
pub use pubsub::{DEFAULT_RESUBSCRIBE_BATCH, Handler, SubscriptionId, SubscriptionMap};
pub use service::{Service, fetch_metadata, load_model};
pub use telemetry::{LOG_ENV, env_filter, init_tracing};
pub use transport::{HttpTransport, NoPubSub, PubSubTransport};
