//! Entity JSON codec.
//!
//! Decodes server payloads (single entities and collection pages) against
//! an [`EntityType`] and encodes entities for create and update requests.
//!
//! Members are matched by property name, JSON name or alias. Inline
//! expanded navigation values are decoded recursively. Members the type does
//! not declare are ignored.

use std::sync::Arc;

use serde_json::{Map, Value as Json};

use crate::entity::{Entity, NavigationValue};
use crate::entity_set::EntitySet;
use crate::entity_type::EntityType;
use crate::error::ServiceError;
use crate::property::{NavigationProperty, Property};
use crate::query::Expand;
use crate::registry::ModelRegistry;
use crate::session::Session;

pub const SELF_LINK: &str = "@iot.selfLink";
pub const NEXT_LINK: &str = "@iot.nextLink";
pub const COUNT: &str = "@iot.count";

/// One decoded collection page.
#[derive(Debug, Clone)]
pub struct Page {
    pub entities: Vec<Entity>,
    pub count: Option<i64>,
    pub next_link: Option<String>,
}

/// Decodes JSON into entities of a registry's types.
pub struct EntityDecoder<'a> {
    registry: &'a ModelRegistry,
    session: Option<Arc<dyn Session>>,
    expand: Option<Expand>,
}

impl<'a> EntityDecoder<'a> {
    #[must_use]
    pub const fn new(registry: &'a ModelRegistry) -> Self {
        Self {
            registry,
            session: None,
            expand: None,
        }
    }

    /// Attach this session to every decoded entity and set.
    #[must_use]
    pub fn with_session(mut self, session: Arc<dyn Session>) -> Self {
        self.session = Some(session);
        self
    }

    /// The expand the payload was requested with; handed to decoded entities
    /// so their own navigation honours it.
    #[must_use]
    pub fn with_expand(mut self, expand: Option<Expand>) -> Self {
        self.expand = expand;
        self
    }

    /// Decode a single entity object.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Decode`] if the JSON is not an object, or
    /// [`ServiceError::Model`] if a value does not fit its property type.
    pub fn decode_entity(
        &self,
        entity_type: &Arc<EntityType>,
        json: &Json,
    ) -> Result<Entity, ServiceError> {
        self.entity(entity_type, json, self.expand.as_ref())
    }

    /// Decode a collection page: `value`, `@iot.count` and `@iot.nextLink`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Decode`] if `value` is missing or not an
    /// array, and any error of [`decode_entity`](Self::decode_entity).
    pub fn decode_page(
        &self,
        entity_type: &Arc<EntityType>,
        json: &Json,
    ) -> Result<Page, ServiceError> {
        let object = as_object(json, entity_type.name())?;
        let items = object
            .get("value")
            .and_then(Json::as_array)
            .ok_or_else(|| ServiceError::Decode(format!("page of {} has no value array", entity_type.name())))?;
        let entities = items
            .iter()
            .map(|item| self.entity(entity_type, item, self.expand.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page {
            entities,
            count: object.get(COUNT).and_then(Json::as_i64),
            next_link: object.get(NEXT_LINK).and_then(Json::as_str).map(str::to_string),
        })
    }

    fn entity(
        &self,
        entity_type: &Arc<EntityType>,
        json: &Json,
        expand: Option<&Expand>,
    ) -> Result<Entity, ServiceError> {
        let object = as_object(json, entity_type.name())?;
        let mut entity = Entity::new(Arc::clone(entity_type));
        if let Some(session) = &self.session {
            entity.set_session(Some(Arc::clone(session)));
        }
        entity.set_expand(expand.cloned());
        entity.set_self_link(object.get(SELF_LINK).and_then(Json::as_str).map(str::to_string));

        // Navigation members need the primary key of the owner, so entity
        // properties go first.
        let mut navigation = Vec::new();
        for (key, value) in object {
            match entity_type.property(key) {
                Some(Property::Entity(p)) => {
                    let decoded = p.property_type().decode(p.name(), value)?;
                    entity.load_value(p.name(), decoded);
                }
                Some(Property::ToOne(nav)) => navigation.push((nav, false, value)),
                Some(Property::ToMany(nav)) => navigation.push((nav, true, value)),
                None if key.contains('@') => {}
                None => {
                    tracing::debug!(entity_type = %entity_type.name(), member = %key, "ignoring undeclared member");
                }
            }
        }

        for (nav, to_many, value) in navigation {
            let nested = expand.and_then(|e| e.item(nav.name()));
            let nested_expand = nested.and_then(|i| i.nested());
            let target = self.target(nav)?;
            let decoded = if to_many {
                let Some(items) = value.as_array() else {
                    continue;
                };
                let mut set = EntitySet::new(Arc::clone(&target))
                    .with_parent(entity.with_only_pk(), nav.name())
                    .with_count(object.get(&format!("{}{COUNT}", nav.json_name())).and_then(Json::as_i64))
                    .with_next_link(
                        object
                            .get(&format!("{}{NEXT_LINK}", nav.json_name()))
                            .and_then(Json::as_str)
                            .map(str::to_string),
                    );
                if let Some(session) = &self.session {
                    set = set.with_session(Arc::clone(session));
                }
                set.set_expand_item(nested.cloned());
                for item in items {
                    set.add(self.entity(&target, item, nested_expand)?);
                }
                NavigationValue::Set(set)
            } else {
                if !value.is_object() {
                    continue;
                }
                NavigationValue::Entity(Box::new(self.entity(&target, value, nested_expand)?))
            };
            entity.load_navigation(nav.name(), decoded);
        }
        Ok(entity)
    }

    fn target(&self, nav: &NavigationProperty) -> Result<Arc<EntityType>, ServiceError> {
        match nav.target_type() {
            Some(target) => Ok(target),
            None => Ok(self.registry.entity_type_or_err(nav.target())?),
        }
    }
}

fn as_object<'j>(json: &'j Json, type_name: &str) -> Result<&'j Map<String, Json>, ServiceError> {
    json.as_object()
        .ok_or_else(|| ServiceError::Decode(format!("expected a JSON object for {type_name}, got {json}")))
}

/// Encode an entity for a create or update request.
///
/// Only explicitly set properties are written, under their JSON names.
/// Read-only properties are skipped. Linked entities that carry a primary
/// key are written as references holding only their key; others are written
/// in full.
#[must_use]
pub fn encode_entity(entity: &Entity) -> Json {
    let entity_type = entity.entity_type();
    let mut out = Map::new();
    for name in entity.set_property_names() {
        let Some(property) = entity_type.property(name) else {
            continue;
        };
        if property.is_read_only() {
            continue;
        }
        let json = match property {
            Property::Entity(p) => match entity.get(name) {
                Ok(Some(value)) => p.property_type().encode(value),
                _ => continue,
            },
            Property::ToOne(_) | Property::ToMany(_) => match entity.navigation(name) {
                Some(NavigationValue::Entity(linked)) => encode_linked(linked),
                Some(NavigationValue::Set(set)) => {
                    Json::Array(set.entities().iter().map(encode_linked).collect())
                }
                None => continue,
            },
        };
        out.insert(property.json_name().to_string(), json);
    }
    Json::Object(out)
}

fn encode_linked(entity: &Entity) -> Json {
    if entity.has_primary_key() {
        encode_reference(entity)
    } else {
        encode_entity(entity)
    }
}

/// A reference holding only the primary key, e.g. `{"@iot.id": 5}`.
#[must_use]
pub fn encode_reference(entity: &Entity) -> Json {
    let entity_type = entity.entity_type();
    let mut out = Map::new();
    let Some(pk) = entity_type.primary_key() else {
        return Json::Object(out);
    };
    for (name, value) in pk.properties().iter().zip(entity.primary_key_values()) {
        let Some(Property::Entity(p)) = entity_type.property(name) else {
            continue;
        };
        out.insert(p.json_name().to_string(), p.property_type().encode(&value));
    }
    Json::Object(out)
}
