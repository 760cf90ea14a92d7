//! A connection to one SensorThings service.

use std::sync::{Arc, Weak};

use sta_config::{ConfigError, StaConfig};
use sta_csdl::{CsdlDocument, CsdlError};
use sta_model::{
    Entity, EntityDecoder, EntityType, ModelError, ModelRegistry, PubSubCapabilities, Query,
    QueryBuilder, Request, Response, ServiceError, Session, Value, encode_entity,
};

use crate::error::PubSubError;
use crate::pubsub::{SubscriptionId, SubscriptionMap};
use crate::transport::{HttpTransport, PubSubTransport};

/// Fetch the service's JSON schema document.
///
/// # Errors
///
/// Transport and status failures as [`ServiceError`], and a document that
/// does not parse as [`ServiceError::Json`] or [`ServiceError::Decode`].
pub fn fetch_metadata(
    http: &dyn HttpTransport,
    metadata_url: &str,
) -> Result<CsdlDocument, ServiceError> {
    tracing::debug!(url = metadata_url, "fetching schema document");
    let response = http.send(&Request::get(metadata_url))?.error_for_status()?;
    CsdlDocument::from_json_str(&response.body).map_err(schema_error)
}

/// Build a finalised registry from a schema document.
///
/// # Errors
///
/// Returns [`ServiceError::Model`] if the document cannot be applied or the
/// resulting model does not finalise.
pub fn load_model(document: &CsdlDocument) -> Result<ModelRegistry, ServiceError> {
    let mut registry = ModelRegistry::new();
    document.apply_to(&mut registry).map_err(schema_error)?;
    registry.init_finalise()?;
    tracing::debug!(
        entity_types = registry.entity_types().len(),
        containers = registry.containers().len(),
        "loaded model from schema document"
    );
    Ok(registry)
}

fn schema_error(error: CsdlError) -> ServiceError {
    match error {
        CsdlError::Json(e) => ServiceError::Json(e),
        CsdlError::Model(e) => ServiceError::Model(e),
        other @ CsdlError::Malformed { .. } => ServiceError::Decode(other.to_string()),
    }
}

/// The production [`Session`]: requests go through an [`HttpTransport`],
/// topic subscriptions through a [`SubscriptionMap`].
///
/// Operations that hand the session to entities take `self: &Arc<Self>`.
pub struct Service {
    base_url: String,
    metadata_url: String,
    topic_prefix: String,
    capabilities: PubSubCapabilities,
    count_by_default: bool,
    namespace: String,
    registry: ModelRegistry,
    http: Arc<dyn HttpTransport>,
    subscriptions: SubscriptionMap,
}

impl Service {
    /// A service over an already-built model. The registry is finalised if
    /// it is not yet.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Other`] wrapping [`ConfigError::NotConfigured`]
    /// when no base URL is configured, and [`ServiceError::Model`] if the
    /// registry does not finalise.
    pub fn new(
        config: &StaConfig,
        registry: ModelRegistry,
        http: Arc<dyn HttpTransport>,
        pubsub: Arc<dyn PubSubTransport>,
    ) -> Result<Self, ServiceError> {
        let service = config.require_service().map_err(config_error)?;
        if !registry.is_finalised() {
            registry.init_finalise()?;
        }
        Ok(Self {
            base_url: service.root().to_string(),
            metadata_url: service.metadata_url(),
            topic_prefix: config.topic_prefix(),
            capabilities: PubSubCapabilities {
                expand_allowed: config.pubsub.expand_allowed,
                filter_allowed: config.pubsub.filter_allowed,
            },
            count_by_default: service.count_by_default,
            namespace: config.model.namespace.clone(),
            registry,
            http,
            subscriptions: SubscriptionMap::new(pubsub)
                .with_batch_size(config.pubsub.resubscribe_batch),
        })
    }

    /// Fetch the schema document, build the model from it and connect.
    ///
    /// # Errors
    ///
    /// See [`fetch_metadata`], [`load_model`] and [`new`](Self::new).
    pub fn connect(
        config: &StaConfig,
        http: Arc<dyn HttpTransport>,
        pubsub: Arc<dyn PubSubTransport>,
    ) -> Result<Arc<Self>, ServiceError> {
        let service = config.require_service().map_err(config_error)?;
        let document = fetch_metadata(http.as_ref(), &service.metadata_url())?;
        let registry = load_model(&document)?;
        tracing::info!(base_url = %service.root(), "connected");
        Ok(Arc::new(Self::new(config, registry, http, pubsub)?))
    }

    /// Fetch the schema document again.
    ///
    /// # Errors
    ///
    /// See [`fetch_metadata`].
    pub fn fetch_metadata(&self) -> Result<CsdlDocument, ServiceError> {
        fetch_metadata(self.http.as_ref(), &self.metadata_url)
    }

    /// This session's model as a schema document.
    #[must_use]
    pub fn schema(&self) -> CsdlDocument {
        CsdlDocument::fill_from(&self.registry, &self.namespace)
    }

    #[must_use]
    pub const fn subscriptions(&self) -> &SubscriptionMap {
        &self.subscriptions
    }

    fn shared(self: &Arc<Self>) -> Arc<dyn Session> {
        Arc::clone(self) as Arc<dyn Session>
    }

    // -- entities -----------------------------------------------------------

    /// A query over the container of `entity_type`, bound to this session.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownType`] for an unregistered type.
    pub fn query(self: &Arc<Self>, entity_type: &str) -> Result<Query, ModelError> {
        let entity_type = self.registry.entity_type_or_err(entity_type)?;
        let query = Query::new(entity_type).with_session(self.shared());
        Ok(if self.count_by_default {
            query.count(true)
        } else {
            query
        })
    }

    /// A new, empty entity of `entity_type` bound to this session.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownType`] for an unregistered type.
    pub fn entity(self: &Arc<Self>, entity_type: &str) -> Result<Entity, ModelError> {
        let entity_type = self.registry.entity_type_or_err(entity_type)?;
        Ok(Entity::new(entity_type).with_session(self.shared()))
    }

    /// Fetch one entity by its single-property key. `Ok(None)` when the
    /// server has no such entity.
    ///
    /// # Errors
    ///
    /// Model errors for unknown types or types without a container;
    /// transport, status and decode failures otherwise.
    pub fn get(
        self: &Arc<Self>,
        entity_type: &str,
        key: impl Into<Value>,
    ) -> Result<Option<Entity>, ServiceError> {
        let entity_type = self.registry.entity_type_or_err(entity_type)?;
        let container = entity_type
            .container()
            .ok_or_else(|| ModelError::NoContainer(entity_type.name().to_string()))?;
        let url = self.url_for(&format!("{container}({})", key.into().to_literal()));

        let response = self.execute(&Request::get(&url))?;
        if response.is_absent() {
            return Ok(None);
        }
        let entity = self.decode(&entity_type, &response.error_for_status()?)?;
        Ok(Some(entity))
    }

    /// POST a new entity to its container.
    ///
    /// When the server answers with a body, `entity` is replaced by the
    /// decoded representation; otherwise its self link is taken from the
    /// `Location` header.
    ///
    /// # Errors
    ///
    /// [`ModelError::NoContainer`], transport, status and decode failures.
    pub fn create(self: &Arc<Self>, entity: &mut Entity) -> Result<(), ServiceError> {
        let entity_type = Arc::clone(entity.entity_type());
        let container = entity_type
            .container()
            .ok_or_else(|| ModelError::NoContainer(entity_type.name().to_string()))?;
        let url = self.url_for(container);

        tracing::debug!(entity_type = %entity_type.name(), %url, "creating entity");
        let response = self
            .execute(&Request::post(&url, encode_entity(entity)))?
            .error_for_status()?;
        if response.body.trim().is_empty() {
            entity.set_self_link(response.location);
        } else {
            *entity = self.decode(&entity_type, &response)?;
        }
        entity.set_session(Some(self.shared()));
        Ok(())
    }

    /// PATCH the explicitly set properties of `entity`.
    ///
    /// # Errors
    ///
    /// Model errors when the entity has no path; transport and status
    /// failures otherwise.
    pub fn update(&self, entity: &Entity) -> Result<(), ServiceError> {
        let url = self.url_for(&entity.url()?);
        tracing::debug!(entity_type = %entity.entity_type().name(), %url, "updating entity");
        self.execute(&Request::patch(&url, encode_entity(entity)))?
            .error_for_status()?;
        Ok(())
    }

    /// # Errors
    ///
    /// Model errors when the entity has no path; transport and status
    /// failures otherwise.
    pub fn delete(&self, entity: &Entity) -> Result<(), ServiceError> {
        let url = self.url_for(&entity.url()?);
        tracing::debug!(entity_type = %entity.entity_type().name(), %url, "deleting entity");
        self.execute(&Request::delete(&url))?.error_for_status()?;
        Ok(())
    }

    fn decode(
        self: &Arc<Self>,
        entity_type: &Arc<EntityType>,
        response: &Response,
    ) -> Result<Entity, ServiceError> {
        EntityDecoder::new(&self.registry)
            .with_session(self.shared())
            .decode_entity(entity_type, &response.json()?)
    }

    // -- pub/sub ------------------------------------------------------------

    /// Call `handler` with every entity published on the query's topic.
    ///
    /// Payloads that do not decode are logged and dropped.
    ///
    /// # Errors
    ///
    /// [`PubSubError::Model`] if no topic can be built for the query, and
    /// [`PubSubError::Transport`] if the broker rejects the subscribe.
    pub fn subscribe<F>(self: &Arc<Self>, query: &Query, handler: F) -> Result<SubscriptionId, PubSubError>
    where
        F: Fn(Entity) + Send + Sync + 'static,
    {
        let topic = query.topic(self.capabilities)?;
        let entity_type = Arc::clone(query.entity_type());
        let expand = query.options().expand.clone();
        let service: Weak<Self> = Arc::downgrade(self);

        self.subscriptions.subscribe(
            topic,
            Arc::new(move |topic: &str, payload: &str| {
                let Some(service) = service.upgrade() else {
                    return;
                };
                let decoded = serde_json::from_str::<serde_json::Value>(payload)
                    .map_err(ServiceError::from)
                    .and_then(|json| {
                        EntityDecoder::new(&service.registry)
                            .with_session(service.shared())
                            .with_expand(expand.clone())
                            .decode_entity(&entity_type, &json)
                    });
                match decoded {
                    Ok(entity) => handler(entity),
                    Err(error) => tracing::warn!(topic, %error, "dropping undecodable message"),
                }
            }),
        )
    }

    /// # Errors
    ///
    /// See [`SubscriptionMap::unsubscribe`].
    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<(), PubSubError> {
        self.subscriptions.unsubscribe(id)
    }

    /// Dispatch an incoming broker message.
    pub fn deliver(&self, topic: &str, payload: &str) -> usize {
        self.subscriptions.deliver(topic, payload)
    }
}

fn config_error(error: ConfigError) -> ServiceError {
    ServiceError::Other(error.into())
}

impl Session for Service {
    fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn execute(&self, request: &Request) -> Result<Response, ServiceError> {
        let response = self.http.send(request)?;
        tracing::debug!(method = %request.method, url = %request.url, status = response.status, "request");
        Ok(response)
    }

    fn topic_prefix(&self) -> &str {
        &self.topic_prefix
    }

    fn pubsub_capabilities(&self) -> PubSubCapabilities {
        self.capabilities
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("base_url", &self.base_url)
            .field("topic_prefix", &self.topic_prefix)
            .field("capabilities", &self.capabilities)
            .field("subscriptions", &self.subscriptions)
            .finish_non_exhaustive()
    }
}
