//! Shared fixtures: a small sensing model and an in-memory session.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use sta_model::types::UNIT_OF_MEASUREMENT;
use sta_model::{
    EntityProperty, EntityType, ModelRegistry, NavigationProperty, PrimaryKey, Property,
    PubSubCapabilities, Request, Response, ServiceError, Session,
};

pub const BASE: &str = "http://example.org/v1.1";

fn id_property(registry: &ModelRegistry) -> EntityProperty {
    EntityProperty::new("id", registry.property_type("Edm.Int64").unwrap())
        .with_json_name("@iot.id")
        .read_only(true)
}

/// Thing 1-n Datastream 1-n Observation, finalised.
pub fn registry() -> ModelRegistry {
    let registry = registry_unfinalised();
    registry.init_finalise().unwrap();
    registry
}

/// The same model before [`ModelRegistry::init_finalise`].
pub fn registry_unfinalised() -> ModelRegistry {
    let mut registry = ModelRegistry::new();
    let string = registry.property_type("Edm.String").unwrap();
    let double = registry.property_type("Edm.Double").unwrap();
    let instant = registry.property_type("Edm.DateTimeOffset").unwrap();
    let uom = registry.property_type(UNIT_OF_MEASUREMENT).unwrap();

    let thing = EntityType::new("Thing")
        .with_namespace("org.OGC")
        .with_property(id_property(&registry))
        .with_property(EntityProperty::new("name", Arc::clone(&string)).nullable(false))
        .with_property(EntityProperty::new("description", Arc::clone(&string)))
        .with_property(Property::ToMany(
            NavigationProperty::new("Datastreams", "Datastream").with_inverse("Thing"),
        ))
        .with_primary_key(PrimaryKey::single("id"));

    let datastream = EntityType::new("Datastream")
        .with_namespace("org.OGC")
        .with_property(id_property(&registry))
        .with_property(EntityProperty::new("name", Arc::clone(&string)).nullable(false))
        .with_property(EntityProperty::new("unitOfMeasurement", uom))
        .with_property(Property::ToOne(
            NavigationProperty::new("Thing", "Thing").with_inverse("Datastreams"),
        ))
        .with_property(Property::ToMany(
            NavigationProperty::new("Observations", "Observation").with_inverse("Datastream"),
        ))
        .with_primary_key(PrimaryKey::single("id"));

    let observation = EntityType::new("Observation")
        .with_namespace("org.OGC")
        .with_property(id_property(&registry))
        .with_property(EntityProperty::new("result", double))
        .with_property(EntityProperty::new("phenomenonTime", instant))
        .with_property(Property::ToOne(
            NavigationProperty::new("Datastream", "Datastream").with_inverse("Observations"),
        ))
        .with_primary_key(PrimaryKey::single("id"));

    registry.register_entity_type(thing).unwrap();
    registry.register_entity_type(datastream).unwrap();
    registry.register_entity_type(observation).unwrap();
    registry.register_container("Things", "Thing").unwrap();
    registry.register_container("Datastreams", "Datastream").unwrap();
    registry.register_container("Observations", "Observation").unwrap();
    registry
}

/// A session answering from a URL → response table and recording every
/// request it sees.
pub struct MockSession {
    registry: ModelRegistry,
    routes: Mutex<HashMap<String, Response>>,
    requests: Mutex<Vec<Request>>,
    capabilities: PubSubCapabilities,
}

impl MockSession {
    pub fn new() -> Self {
        Self::with_registry(registry())
    }

    pub fn with_registry(registry: ModelRegistry) -> Self {
        Self {
            registry,
            routes: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            capabilities: PubSubCapabilities::default(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: PubSubCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Answer `url` (relative to [`BASE`] unless absolute).
    pub fn route(&self, url: &str, status: u16, body: serde_json::Value) {
        let url = self.url_for(url);
        let body = if body.is_null() { String::new() } else { body.to_string() };
        self.routes
            .lock()
            .unwrap()
            .insert(url, Response::new(status, body));
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn entity_type(&self, name: &str) -> Arc<EntityType> {
        self.registry.entity_type(name).unwrap()
    }
}

impl Session for MockSession {
    fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    fn base_url(&self) -> &str {
        BASE
    }

    fn execute(&self, request: &Request) -> Result<Response, ServiceError> {
        self.requests.lock().unwrap().push(request.clone());
        self.routes
            .lock()
            .unwrap()
            .get(&request.url)
            .cloned()
            .ok_or_else(|| ServiceError::Transport(format!("connection refused: {}", request.url)))
    }

    fn topic_prefix(&self) -> &str {
        "v1.1/"
    }

    fn pubsub_capabilities(&self) -> PubSubCapabilities {
        self.capabilities
    }
}

/// The concrete session plus the same session as a trait object.
pub fn session() -> (Arc<MockSession>, Arc<dyn Session>) {
    let session = Arc::new(MockSession::new());
    let shared: Arc<dyn Session> = session.clone();
    (session, shared)
}
