//! Reference-counted topic subscriptions.
//!
//! Many handlers may listen on the same topic; the broker only sees one
//! subscribe when the first handler arrives and one unsubscribe when the
//! last one leaves. Handlers run outside the lock, so a handler may
//! subscribe or unsubscribe while it is being called.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::PubSubError;
use crate::transport::PubSubTransport;

/// Called with `(topic, payload)` for every message on a subscribed topic.
pub type Handler = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Default number of topics per subscribe call in [`SubscriptionMap::resubscribe_all`].
pub const DEFAULT_RESUBSCRIBE_BATCH: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct Subscription {
    topic: String,
    handler: Handler,
}

#[derive(Default)]
struct State {
    next_id: u64,
    subscriptions: BTreeMap<u64, Subscription>,
    /// Live handler count per topic.
    topics: HashMap<String, usize>,
}

pub struct SubscriptionMap {
    transport: Arc<dyn PubSubTransport>,
    batch_size: usize,
    state: Mutex<State>,
}

impl SubscriptionMap {
    #[must_use]
    pub fn new(transport: Arc<dyn PubSubTransport>) -> Self {
        Self {
            transport,
            batch_size: DEFAULT_RESUBSCRIBE_BATCH,
            state: Mutex::new(State::default()),
        }
    }

    /// Topics per network call when resubscribing. Zero is treated as one.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `handler` for `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`PubSubError::Transport`] if this is the topic's first
    /// handler and the broker rejects the subscribe. Nothing is registered
    /// in that case.
    pub fn subscribe(
        &self,
        topic: impl Into<String>,
        handler: Handler,
    ) -> Result<SubscriptionId, PubSubError> {
        let topic = topic.into();
        let mut state = self.state();
        let first = !state.topics.contains_key(&topic);
        if first {
            tracing::debug!(%topic, "subscribing on the network");
            self.transport.subscribe(std::slice::from_ref(&topic))?;
        }
        *state.topics.entry(topic.clone()).or_default() += 1;

        let id = state.next_id;
        state.next_id += 1;
        state
            .subscriptions
            .insert(id, Subscription { topic, handler });
        Ok(SubscriptionId(id))
    }

    /// Remove one handler. The topic is released on the broker when its last
    /// handler goes.
    ///
    /// # Errors
    ///
    /// Returns [`PubSubError::UnknownSubscription`] for an id that is not
    /// live, or [`PubSubError::Transport`] if the network unsubscribe fails.
    /// The handler is removed either way.
    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<(), PubSubError> {
        let mut state = self.state();
        let subscription = state
            .subscriptions
            .remove(&id.0)
            .ok_or(PubSubError::UnknownSubscription(id.0))?;

        let remaining = match state.topics.get_mut(&subscription.topic) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => 0,
        };
        if remaining == 0 {
            state.topics.remove(&subscription.topic);
            tracing::debug!(topic = %subscription.topic, "unsubscribing on the network");
            self.transport
                .unsubscribe(std::slice::from_ref(&subscription.topic))?;
        }
        Ok(())
    }

    /// Hand `payload` to every handler of `topic`. Returns how many ran.
    pub fn deliver(&self, topic: &str, payload: &str) -> usize {
        let handlers: Vec<Handler> = self
            .state()
            .subscriptions
            .values()
            .filter(|s| s.topic == topic)
            .map(|s| Arc::clone(&s.handler))
            .collect();
        if handlers.is_empty() {
            tracing::debug!(topic, "message on a topic without handlers");
        }
        for handler in &handlers {
            handler(topic, payload);
        }
        handlers.len()
    }

    /// Subscribe every live topic again, e.g. after a reconnect, in batches.
    ///
    /// # Errors
    ///
    /// Stops at the first batch the broker rejects.
    pub fn resubscribe_all(&self) -> Result<usize, PubSubError> {
        let topics = self.topics();
        for batch in topics.chunks(self.batch_size) {
            tracing::debug!(topics = batch.len(), "resubscribing batch");
            self.transport.subscribe(batch)?;
        }
        Ok(topics.len())
    }

    /// Live topics, sorted.
    #[must_use]
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.state().topics.keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Handlers currently registered for `topic`.
    #[must_use]
    pub fn handler_count(&self, topic: &str) -> usize {
        self.state().topics.get(topic).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state().subscriptions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for SubscriptionMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionMap")
            .field("batch_size", &self.batch_size)
            .field("topics", &self.topics())
            .finish_non_exhaustive()
    }
}
