//! Pluggable transports.
//!
//! The client never opens sockets itself. An [`HttpTransport`] carries
//! requests to the service and a [`PubSubTransport`] manages topic
//! subscriptions on a message broker; incoming messages are handed back to
//! [`SubscriptionMap::deliver`](crate::SubscriptionMap::deliver).

use sta_model::{Request, Response, ServiceError};

use crate::error::PubSubError;

pub trait HttpTransport: Send + Sync {
    /// Send one request and wait for the response.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Transport`] or [`ServiceError::Other`] when no
    /// response was received. Non-2xx statuses are responses, not errors.
    fn send(&self, request: &Request) -> Result<Response, ServiceError>;
}

/// Network side of pub/sub.
///
/// Implementations must not deliver messages synchronously from inside
/// `subscribe` or `unsubscribe`.
pub trait PubSubTransport: Send + Sync {
    /// # Errors
    ///
    /// Returns [`PubSubError::Transport`] if the broker rejects the call.
    fn subscribe(&self, topics: &[String]) -> Result<(), PubSubError>;

    /// # Errors
    ///
    /// Returns [`PubSubError::Transport`] if the broker rejects the call.
    fn unsubscribe(&self, topics: &[String]) -> Result<(), PubSubError>;
}

/// A broker that accepts every call. For services used without pub/sub.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPubSub;

impl PubSubTransport for NoPubSub {
    fn subscribe(&self, _topics: &[String]) -> Result<(), PubSubError> {
        Ok(())
    }

    fn unsubscribe(&self, _topics: &[String]) -> Result<(), PubSubError> {
        Ok(())
    }
}
