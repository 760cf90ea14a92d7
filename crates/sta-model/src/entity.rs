//! Entities: one record of an [`EntityType`].

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::entity_set::EntitySet;
use crate::entity_type::EntityType;
use crate::error::{ModelError, ServiceError};
use crate::json::EntityDecoder;
use crate::property::{NavigationProperty, Property};
use crate::query::{Expand, ExpandItem};
use crate::session::{Request, Session};
use crate::value::Value;

/// The stored value of a navigation property.
#[derive(Debug, Clone)]
pub enum NavigationValue {
    Entity(Box<Entity>),
    Set(EntitySet),
}

impl NavigationValue {
    #[must_use]
    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Self::Entity(e) => Some(e),
            Self::Set(_) => None,
        }
    }

    #[must_use]
    pub const fn as_set(&self) -> Option<&EntitySet> {
        match self {
            Self::Set(s) => Some(s),
            Self::Entity(_) => None,
        }
    }
}

/// A record of some entity type.
///
/// Values are keyed by property name. Equality and hashing only look at the
/// entity type and the primary key values.
#[derive(Clone)]
pub struct Entity {
    entity_type: Arc<EntityType>,
    values: HashMap<String, Value>,
    navigation: HashMap<String, NavigationValue>,
    set_properties: HashSet<String>,
    /// To-one links the server answered with no entity.
    absent: HashSet<String>,
    self_link: Option<String>,
    session: Option<Arc<dyn Session>>,
    expand: Option<Expand>,
}

impl Entity {
    #[must_use]
    pub fn new(entity_type: Arc<EntityType>) -> Self {
        Self {
            entity_type,
            values: HashMap::new(),
            navigation: HashMap::new(),
            set_properties: HashSet::new(),
            absent: HashSet::new(),
            self_link: None,
            session: None,
            expand: None,
        }
    }

    #[must_use]
    pub fn with_session(mut self, session: Arc<dyn Session>) -> Self {
        self.session = Some(session);
        self
    }

    /// Builder form of [`set`](Self::set).
    ///
    /// # Errors
    ///
    /// See [`set`](Self::set).
    pub fn with(mut self, property: &str, value: impl Into<Value>) -> Result<Self, ModelError> {
        self.set(property, value)?;
        Ok(self)
    }

    #[must_use]
    pub const fn entity_type(&self) -> &Arc<EntityType> {
        &self.entity_type
    }

    #[must_use]
    pub fn session(&self) -> Option<&Arc<dyn Session>> {
        self.session.as_ref()
    }

    pub fn set_session(&mut self, session: Option<Arc<dyn Session>>) {
        self.session = session;
    }

    #[must_use]
    pub fn self_link(&self) -> Option<&str> {
        self.self_link.as_deref()
    }

    pub fn set_self_link(&mut self, self_link: Option<String>) {
        self.self_link = self_link;
    }

    /// The expand this entity was loaded with, if any.
    #[must_use]
    pub const fn expand(&self) -> Option<&Expand> {
        self.expand.as_ref()
    }

    pub fn set_expand(&mut self, expand: Option<Expand>) {
        self.expand = expand;
    }

    // -- entity properties --------------------------------------------------

    /// The stored value of an entity property, or `None` if never assigned.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownProperty`] if the type has no such
    /// property, [`ModelError::PropertyKind`] for navigation properties.
    pub fn get(&self, property: &str) -> Result<Option<&Value>, ModelError> {
        let name = self.entity_property_name(property)?;
        Ok(self.values.get(name))
    }

    /// Store an entity property value and mark it explicitly set.
    ///
    /// # Errors
    ///
    /// Same as [`get`](Self::get).
    pub fn set(&mut self, property: &str, value: impl Into<Value>) -> Result<&mut Self, ModelError> {
        let name = self.entity_property_name(property)?.to_string();
        self.values.insert(name.clone(), value.into());
        self.set_properties.insert(name);
        Ok(self)
    }

    /// Store a value received from the server without marking it set.
    pub(crate) fn load_value(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
    }

    fn entity_property_name(&self, property: &str) -> Result<&str, ModelError> {
        match self.entity_type.property_or_err(property)? {
            Property::Entity(p) => Ok(p.name()),
            other => Err(self.wrong_kind(other.name(), "an entity property")),
        }
    }

    fn wrong_kind(&self, property: &str, expected: &'static str) -> ModelError {
        ModelError::PropertyKind {
            entity_type: self.entity_type.name().to_string(),
            property: property.to_string(),
            expected,
        }
    }

    // -- navigation properties ----------------------------------------------

    fn to_one(&self, property: &str) -> Result<&NavigationProperty, ModelError> {
        match self.entity_type.property_or_err(property)? {
            Property::ToOne(nav) => Ok(nav),
            other => Err(self.wrong_kind(other.name(), "a to-one navigation property")),
        }
    }

    fn to_many(&self, property: &str) -> Result<&NavigationProperty, ModelError> {
        match self.entity_type.property_or_err(property)? {
            Property::ToMany(nav) => Ok(nav),
            other => Err(self.wrong_kind(other.name(), "a to-many navigation property")),
        }
    }

    /// The linked entity of a to-one navigation property.
    ///
    /// Without a cached value and with `auto_load` set, the entity is fetched
    /// once through the session and cached. A `404` or `204` answer means
    /// there is no linked entity and yields `Ok(None)`; that answer is
    /// remembered until the link is set or unset.
    ///
    /// # Errors
    ///
    /// Model errors for undeclared or non-to-one properties; any other
    /// failure of the fetch is propagated.
    pub fn navigation_entity(
        &mut self,
        property: &str,
        auto_load: bool,
    ) -> Result<Option<&Entity>, ServiceError> {
        let name = self.to_one(property)?.name().to_string();
        if auto_load && !self.navigation.contains_key(&name) && !self.absent.contains(&name) {
            match self.fetch_to_one(&name)? {
                Some(loaded) => {
                    self.navigation
                        .insert(name.clone(), NavigationValue::Entity(Box::new(loaded)));
                }
                None if self.session.is_some() => {
                    self.absent.insert(name.clone());
                }
                None => {}
            }
        }
        Ok(self.navigation.get(&name).and_then(NavigationValue::as_entity))
    }

    fn fetch_to_one(&self, name: &str) -> Result<Option<Self>, ServiceError> {
        let Some(session) = &self.session else {
            return Ok(None);
        };
        let nav = self.to_one(name)?;
        let target = self.target_type(nav, session.registry())?;
        let item = self.expand.as_ref().and_then(|e| e.item(name));

        let mut url = format!("{}/{name}", self.url()?);
        if let Some(query) = item.map(ExpandItem::to_encoded_query).filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(&query);
        }

        tracing::debug!(entity_type = %self.entity_type.name(), property = name, %url, "loading navigation entity");
        let response = session.execute(&Request::get(&url))?;
        if response.is_absent() {
            return Ok(None);
        }
        let json = response.error_for_status()?.json()?;
        let nested = item.and_then(ExpandItem::nested).cloned();
        let entity = EntityDecoder::new(session.registry())
            .with_session(Arc::clone(session))
            .with_expand(nested)
            .decode_entity(&target, &json)?;
        Ok(Some(entity))
    }

    /// Link a single entity, or clear the link with `None`.
    ///
    /// # Errors
    ///
    /// Model errors for undeclared or non-to-one properties.
    pub fn set_navigation_entity(
        &mut self,
        property: &str,
        entity: Option<Self>,
    ) -> Result<&mut Self, ModelError> {
        let name = self.to_one(property)?.name().to_string();
        self.store_navigation(name, entity.map(|e| NavigationValue::Entity(Box::new(e))));
        Ok(self)
    }

    /// The entity set of a to-many navigation property.
    ///
    /// Created on first access with its link derived from this entity's path
    /// and the property name, scoped by this entity's expand.
    ///
    /// # Errors
    ///
    /// Model errors for undeclared or non-to-many properties, and
    /// [`ModelError::UnknownType`] if the target type cannot be resolved.
    pub fn navigation_set(&mut self, property: &str) -> Result<&mut EntitySet, ModelError> {
        let name = self.to_many(property)?.name().to_string();
        if !matches!(self.navigation.get(&name), Some(NavigationValue::Set(_))) {
            let set = self.new_navigation_set(&name)?;
            self.navigation.insert(name.clone(), NavigationValue::Set(set));
        }
        match self.navigation.get_mut(&name) {
            Some(NavigationValue::Set(set)) => Ok(set),
            _ => Err(ModelError::unknown_property(self.entity_type.name(), &name)),
        }
    }

    pub(crate) fn new_navigation_set(&self, name: &str) -> Result<EntitySet, ModelError> {
        let nav = self.to_many(name)?;
        let target = match &self.session {
            Some(session) => self.target_type(nav, session.registry())?,
            None => nav
                .target_type()
                .ok_or_else(|| ModelError::UnknownType(nav.target().to_string()))?,
        };
        let mut set = EntitySet::new(target).with_parent(self.with_only_pk(), name);
        if let Some(session) = &self.session {
            set = set.with_session(Arc::clone(session));
        }
        if let Some(item) = self.expand.as_ref().and_then(|e| e.item(name)) {
            set.set_expand_item(Some(item.clone()));
        }
        // Nothing is buffered yet, so the first traversal starts with a fetch.
        if set.session().is_some() {
            if let Ok(link) = set.initial_link() {
                set = set.with_next_link(Some(link));
            }
        }
        Ok(set)
    }

    /// Store an entity set, or clear it with `None`.
    ///
    /// # Errors
    ///
    /// Model errors for undeclared or non-to-many properties.
    pub fn set_navigation_set(
        &mut self,
        property: &str,
        set: Option<EntitySet>,
    ) -> Result<&mut Self, ModelError> {
        let name = self.to_many(property)?.name().to_string();
        self.store_navigation(name, set.map(NavigationValue::Set));
        Ok(self)
    }

    /// Store a navigation value received from the server without marking it
    /// set.
    pub(crate) fn load_navigation(&mut self, name: &str, value: NavigationValue) {
        self.navigation.insert(name.to_string(), value);
    }

    fn store_navigation(&mut self, name: String, value: Option<NavigationValue>) {
        self.absent.remove(&name);
        match value {
            Some(value) => {
                self.navigation.insert(name.clone(), value);
                self.set_properties.insert(name);
            }
            None => {
                self.navigation.remove(&name);
                self.set_properties.remove(&name);
            }
        }
    }

    /// The stored navigation value, without loading anything.
    #[must_use]
    pub fn navigation(&self, property: &str) -> Option<&NavigationValue> {
        let name = self.entity_type.property(property)?.name();
        self.navigation.get(name)
    }

    fn target_type(
        &self,
        nav: &NavigationProperty,
        registry: &crate::ModelRegistry,
    ) -> Result<Arc<EntityType>, ModelError> {
        match nav.target_type() {
            Some(target) => Ok(target),
            None => registry.entity_type_or_err(nav.target()),
        }
    }

    // -- set tracking -------------------------------------------------------

    /// Remove a stored value and its explicitly-set marker.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownProperty`] if the type has no such
    /// property.
    pub fn unset(&mut self, property: &str) -> Result<&mut Self, ModelError> {
        let name = self.entity_type.property_or_err(property)?.name().to_string();
        self.values.remove(&name);
        self.navigation.remove(&name);
        self.absent.remove(&name);
        self.set_properties.remove(&name);
        Ok(self)
    }

    #[must_use]
    pub fn is_set(&self, property: &str) -> bool {
        self.entity_type
            .property(property)
            .is_some_and(|p| self.set_properties.contains(p.name()))
    }

    /// Names of explicitly set properties, in type order.
    #[must_use]
    pub fn set_property_names(&self) -> Vec<&str> {
        self.entity_type
            .properties()
            .iter()
            .map(Property::name)
            .filter(|name| self.set_properties.contains(*name))
            .collect()
    }

    // -- identity -----------------------------------------------------------

    /// Values of the primary key properties, `Null` where unassigned.
    #[must_use]
    pub fn primary_key_values(&self) -> Vec<Value> {
        self.entity_type
            .primary_key()
            .map(|pk| {
                pk.properties()
                    .iter()
                    .map(|p| self.values.get(p).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether every primary key property has a non-null value.
    #[must_use]
    pub fn has_primary_key(&self) -> bool {
        let values = self.primary_key_values();
        !values.is_empty() && values.iter().all(|v| !v.is_null())
    }

    /// A new entity of the same type with only the primary key copied, for
    /// link-only references.
    #[must_use]
    pub fn with_only_pk(&self) -> Self {
        let mut copy = Self::new(Arc::clone(&self.entity_type));
        if let Some(pk) = self.entity_type.primary_key() {
            for name in pk.properties() {
                if let Some(value) = self.values.get(name) {
                    copy.values.insert(name.clone(), value.clone());
                    copy.set_properties.insert(name.clone());
                }
            }
        }
        copy.self_link.clone_from(&self.self_link);
        copy.session.clone_from(&self.session);
        copy
    }

    /// The key segment, e.g. `5`, `'abc'` or `a=1,b='x'`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::MissingKey`] if a key value is missing.
    pub fn key_literal(&self) -> Result<String, ModelError> {
        let missing = || ModelError::MissingKey(self.entity_type.name().to_string());
        let pk = self.entity_type.primary_key().ok_or_else(missing)?;
        let values = self.primary_key_values();
        if values.iter().any(Value::is_null) {
            return Err(missing());
        }
        if pk.is_single() {
            return Ok(values[0].to_literal());
        }
        Ok(pk
            .properties()
            .iter()
            .zip(&values)
            .map(|(name, value)| format!("{name}={}", value.to_literal()))
            .collect::<Vec<_>>()
            .join(","))
    }

    /// The service-relative path of this entity, used for request paths and
    /// topics.
    ///
    /// `Container(key)` when the type has a container and the key is
    /// assigned. Otherwise the self link, with the session's service root
    /// removed when it starts with it.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::NoContainer`] or [`ModelError::MissingKey`] when
    /// no path can be built.
    pub fn path(&self) -> Result<String, ModelError> {
        let container = self.entity_type.container();
        if let Some(container) = container {
            if self.has_primary_key() {
                return Ok(format!("{container}({})", self.key_literal()?));
            }
        }
        if let Some(self_link) = &self.self_link {
            return Ok(self.relative_link(self_link));
        }
        match container {
            Some(_) => Err(ModelError::MissingKey(self.entity_type.name().to_string())),
            None => Err(ModelError::NoContainer(self.entity_type.name().to_string())),
        }
    }

    fn relative_link(&self, link: &str) -> String {
        let Some(session) = &self.session else {
            return link.to_string();
        };
        let root = session.base_url().trim_end_matches('/');
        link.strip_prefix(root)
            .filter(|rest| rest.is_empty() || rest.starts_with('/'))
            .map_or_else(|| link.to_string(), |rest| rest.trim_start_matches('/').to_string())
    }

    /// The URL requests about this entity go to: its self link when known,
    /// otherwise [`path`](Self::path) resolved against the session.
    ///
    /// # Errors
    ///
    /// See [`path`](Self::path).
    pub fn url(&self) -> Result<String, ModelError> {
        if let Some(self_link) = &self.self_link {
            return Ok(match &self.session {
                Some(session) => session.url_for(self_link),
                None => self_link.clone(),
            });
        }
        let path = self.path()?;
        Ok(match &self.session {
            Some(session) => session.url_for(&path),
            None => path,
        })
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.entity_type.name() == other.entity_type.name()
            && self.primary_key_values() == other.primary_key_values()
    }
}

impl Eq for Entity {}

impl Hash for Entity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.entity_type.name().hash(state);
        self.primary_key_values().hash(state);
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.entity_type.display(self))
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("entity_type", &self.entity_type.name())
            .field("values", &self.values)
            .field("navigation", &self.navigation.keys().collect::<Vec<_>>())
            .field("self_link", &self.self_link)
            .field("has_session", &self.session.is_some())
            .finish_non_exhaustive()
    }
}
