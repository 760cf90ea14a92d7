//! Entity types: ordered property sets, primary keys and finalisation.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::entity::Entity;
use crate::error::ModelError;
use crate::property::{Annotations, EntityProperty, NavigationProperty, Property};
use crate::registry::ModelRegistry;

/// Renders an entity for humans.
pub type DisplayFn = fn(&Entity) -> String;

/// Ordered list of the entity properties that identify an entity.
///
/// Composite keys exist as a shape; single keys are supported end-to-end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryKey {
    properties: Vec<String>,
}

impl PrimaryKey {
    #[must_use]
    pub fn single(property: impl Into<String>) -> Self {
        Self {
            properties: vec![property.into()],
        }
    }

    #[must_use]
    pub const fn composite(properties: Vec<String>) -> Self {
        Self { properties }
    }

    #[must_use]
    pub fn properties(&self) -> &[String] {
        &self.properties
    }

    #[must_use]
    pub fn is_single(&self) -> bool {
        self.properties.len() == 1
    }

    #[must_use]
    pub fn contains(&self, property: &str) -> bool {
        self.properties.iter().any(|p| p == property)
    }
}

/// Property indexes partitioned by kind, computed by [`EntityType::init`].
#[derive(Debug, Clone, Default)]
struct Derived {
    entity: Vec<usize>,
    navigation: Vec<usize>,
    to_one: Vec<usize>,
    to_many: Vec<usize>,
}

/// A named record shape.
#[derive(Clone)]
pub struct EntityType {
    name: String,
    namespace: Option<String>,
    container: Option<String>,
    properties: Vec<Property>,
    index: HashMap<String, usize>,
    primary_key: Option<PrimaryKey>,
    default_key: OnceLock<PrimaryKey>,
    annotations: Annotations,
    display: Option<DisplayFn>,
    derived: OnceLock<Derived>,
}

impl EntityType {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            container: None,
            properties: Vec::new(),
            index: HashMap::new(),
            primary_key: None,
            default_key: OnceLock::new(),
            annotations: Annotations::new(),
            display: None,
            derived: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set the collection name used in paths, e.g. `Things`.
    #[must_use]
    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self
    }

    #[must_use]
    pub fn with_annotation(mut self, term: impl Into<String>, value: serde_json::Value) -> Self {
        self.annotations.insert(term.into(), value);
        self
    }

    #[must_use]
    pub fn with_annotations(mut self, annotations: Annotations) -> Self {
        self.annotations = annotations;
        self
    }

    #[must_use]
    pub fn with_display(mut self, display: DisplayFn) -> Self {
        self.display = Some(display);
        self
    }

    /// Builder form of [`register_property`](Self::register_property).
    ///
    /// The value is owned by the caller, so any earlier finalisation of this
    /// copy is discarded and must be redone.
    #[must_use]
    pub fn with_property(mut self, property: impl Into<Property>) -> Self {
        self.derived = OnceLock::new();
        self.push_property(property.into());
        self
    }

    /// Builder form of [`set_primary_key`](Self::set_primary_key).
    #[must_use]
    pub fn with_primary_key(mut self, primary_key: PrimaryKey) -> Self {
        self.apply_primary_key(primary_key);
        self
    }

    /// Append a property and index it under its name, JSON name and aliases.
    ///
    /// The property's value type is not checked against any registry here.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Finalised`] once [`init`](Self::init) has run.
    pub fn register_property(&mut self, property: impl Into<Property>) -> Result<&mut Self, ModelError> {
        if self.is_initialised() {
            return Err(ModelError::Finalised(format!(
                "cannot add properties to entity type {}",
                self.name
            )));
        }
        self.push_property(property.into());
        Ok(self)
    }

    fn push_property(&mut self, mut property: Property) {
        if let Property::ToOne(nav) | Property::ToMany(nav) = &mut property {
            nav.set_owner(&self.name);
        }
        let position = match self.index.get(property.name()) {
            Some(&existing) => {
                tracing::debug!(
                    entity_type = %self.name,
                    property = property.name(),
                    "replacing existing property"
                );
                self.properties[existing] = property;
                existing
            }
            None => {
                self.properties.push(property);
                self.properties.len() - 1
            }
        };
        let property = &self.properties[position];
        let mut keys = vec![property.name().to_string(), property.json_name().to_string()];
        keys.extend(property.aliases().iter().cloned());
        for key in keys {
            self.index.insert(key, position);
        }
    }

    /// Set the primary key and mark its properties as key parts.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownProperty`] if a key property is not an
    /// entity property of this type, or [`ModelError::Finalised`] once
    /// [`init`](Self::init) has run.
    pub fn set_primary_key(&mut self, primary_key: PrimaryKey) -> Result<(), ModelError> {
        if self.is_initialised() {
            return Err(ModelError::Finalised(format!(
                "cannot change the primary key of entity type {}",
                self.name
            )));
        }
        for key in primary_key.properties() {
            if self.property(key).and_then(Property::as_entity).is_none() {
                return Err(ModelError::unknown_property(&self.name, key));
            }
        }
        self.apply_primary_key(primary_key);
        Ok(())
    }

    fn apply_primary_key(&mut self, primary_key: PrimaryKey) {
        for property in &mut self.properties {
            if let Property::Entity(p) = property {
                if primary_key.contains(p.name()) {
                    p.mark_key();
                }
            }
        }
        self.primary_key = Some(primary_key);
        self.default_key = OnceLock::new();
    }

    pub(crate) fn set_container(&mut self, container: impl Into<String>) {
        self.container = Some(container.into());
    }

    /// Finalise this type: partition its properties by kind, check that every
    /// navigation property has an inverse on a registered target type, and
    /// cache the resolved target handles.
    ///
    /// Calling it a second time logs a warning and does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::MissingInverse`] for a navigation property
    /// without a valid inverse, or [`ModelError::UnknownType`] if its target
    /// is not registered.
    pub fn init(&self, registry: &ModelRegistry) -> Result<(), ModelError> {
        if self.is_initialised() {
            tracing::warn!(entity_type = %self.name, "entity type initialised twice");
            return Ok(());
        }

        self.validate(registry)?;

        let mut derived = Derived::default();
        for (position, property) in self.properties.iter().enumerate() {
            match property {
                Property::Entity(_) => derived.entity.push(position),
                Property::ToOne(_) => {
                    derived.navigation.push(position);
                    derived.to_one.push(position);
                }
                Property::ToMany(_) => {
                    derived.navigation.push(position);
                    derived.to_many.push(position);
                }
            }
        }

        for nav in self.navigation_properties() {
            if let Some(target) = registry.entity_type(nav.target()) {
                nav.resolve(&target);
            }
        }
        let _ = self.derived.set(derived);
        tracing::debug!(entity_type = %self.name, properties = self.properties.len(), "entity type initialised");
        Ok(())
    }

    /// Check every navigation property against `registry` without changing
    /// anything.
    ///
    /// # Errors
    ///
    /// Same as [`init`](Self::init).
    pub fn validate(&self, registry: &ModelRegistry) -> Result<(), ModelError> {
        for nav in self.navigation_properties() {
            self.check_inverse(nav, registry)?;
        }
        Ok(())
    }

    fn check_inverse(&self, nav: &NavigationProperty, registry: &ModelRegistry) -> Result<(), ModelError> {
        let missing = || ModelError::MissingInverse {
            entity_type: self.name.clone(),
            property: nav.name().to_string(),
        };
        let inverse = nav.inverse().ok_or_else(missing)?;
        let target = registry.entity_type_or_err(nav.target())?;
        let back = match target.property(inverse) {
            Some(Property::ToOne(back) | Property::ToMany(back)) => back,
            _ => return Err(missing()),
        };
        match registry.entity_type(back.target()) {
            Some(back_target) if self.is(&back_target) => Ok(()),
            _ => Err(missing()),
        }
    }

    /// Whether `other` is this type: the same registered instance, or a type
    /// with the same qualified name.
    fn is(&self, other: &Arc<Self>) -> bool {
        std::ptr::eq(Arc::as_ptr(other), self) || other.full_name() == self.full_name()
    }

    #[must_use]
    pub fn is_initialised(&self) -> bool {
        self.derived.get().is_some()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// `namespace.name`, or just the name without a namespace.
    #[must_use]
    pub fn full_name(&self) -> String {
        self.namespace
            .as_ref()
            .map_or_else(|| self.name.clone(), |ns| format!("{ns}.{}", self.name))
    }

    #[must_use]
    pub fn container(&self) -> Option<&str> {
        self.container.as_deref()
    }

    #[must_use]
    pub const fn annotations(&self) -> &Annotations {
        &self.annotations
    }

    /// All properties in registration order.
    #[must_use]
    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    /// Look up a property by name, JSON name or alias.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.index.get(name).map(|&i| &self.properties[i])
    }

    /// # Errors
    ///
    /// Returns [`ModelError::UnknownProperty`] if no such property exists.
    pub fn property_or_err(&self, name: &str) -> Result<&Property, ModelError> {
        self.property(name)
            .ok_or_else(|| ModelError::unknown_property(&self.name, name))
    }

    fn subset<'a, T: 'a>(
        &'a self,
        pick: impl Fn(&Derived) -> &[usize],
        filter: impl Fn(&'a Property) -> Option<&'a T>,
    ) -> Vec<&'a T> {
        match self.derived.get() {
            Some(derived) => pick(derived)
                .iter()
                .filter_map(|&i| filter(&self.properties[i]))
                .collect(),
            None => self.properties.iter().filter_map(filter).collect(),
        }
    }

    #[must_use]
    pub fn entity_properties(&self) -> Vec<&EntityProperty> {
        self.subset(|d| &d.entity, Property::as_entity)
    }

    #[must_use]
    pub fn navigation_properties(&self) -> Vec<&NavigationProperty> {
        self.subset(|d| &d.navigation, Property::as_navigation)
    }

    #[must_use]
    pub fn to_one_properties(&self) -> Vec<&NavigationProperty> {
        self.subset(|d| &d.to_one, |p| match p {
            Property::ToOne(nav) => Some(nav),
            _ => None,
        })
    }

    #[must_use]
    pub fn to_many_properties(&self) -> Vec<&NavigationProperty> {
        self.subset(|d| &d.to_many, |p| match p {
            Property::ToMany(nav) => Some(nav),
            _ => None,
        })
    }

    /// The explicit primary key, or a single-property key on the first entity
    /// property. `None` only for a type without entity properties.
    #[must_use]
    pub fn primary_key(&self) -> Option<&PrimaryKey> {
        if let Some(primary_key) = &self.primary_key {
            return Some(primary_key);
        }
        let first = self.properties.iter().find_map(Property::as_entity)?;
        Some(
            self.default_key
                .get_or_init(|| PrimaryKey::single(first.name())),
        )
    }

    /// Whether a primary key was set explicitly.
    #[must_use]
    pub const fn has_explicit_primary_key(&self) -> bool {
        self.primary_key.is_some()
    }

    /// Render an entity of this type with the configured display strategy.
    #[must_use]
    pub fn display(&self, entity: &Entity) -> String {
        if let Some(display) = self.display {
            return display(entity);
        }
        let key = entity
            .primary_key_values()
            .iter()
            .map(crate::Value::to_literal)
            .collect::<Vec<_>>()
            .join(",");
        format!("{}({key})", self.name)
    }
}

impl fmt::Debug for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityType")
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .field("container", &self.container)
            .field("properties", &self.properties)
            .field("primary_key", &self.primary_key())
            .field("initialised", &self.is_initialised())
            .finish_non_exhaustive()
    }
}

/// Two entity types are equal when their whole shape is equal.
///
/// Derived state (initialisation, resolved handles) and the display
/// strategy are not part of the shape.
impl PartialEq for EntityType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.namespace == other.namespace
            && self.container == other.container
            && self.properties == other.properties
            && self.primary_key() == other.primary_key()
            && self.annotations == other.annotations
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::types::{Primitive, PropertyType};

    fn string() -> Arc<PropertyType> {
        Arc::new(PropertyType::primitive(Primitive::String))
    }

    #[test]
    fn default_primary_key_is_first_entity_property() {
        let thing = EntityType::new("Thing")
            .with_property(Property::ToMany(NavigationProperty::new("Datastreams", "Datastream")))
            .with_property(EntityProperty::new("id", string()))
            .with_property(EntityProperty::new("name", string()));
        assert_eq!(thing.primary_key().unwrap().properties(), ["id".to_string()]);
        assert!(!thing.has_explicit_primary_key());
    }

    #[test]
    fn explicit_primary_key_marks_key_part() {
        let mut thing = EntityType::new("Thing")
            .with_property(EntityProperty::new("name", string()))
            .with_property(EntityProperty::new("code", string()));
        thing.set_primary_key(PrimaryKey::single("code")).unwrap();
        let code = thing.property("code").and_then(Property::as_entity).unwrap();
        assert!(code.is_key_part());
        assert_eq!(thing.primary_key().unwrap().properties(), ["code".to_string()]);
    }

    #[test]
    fn primary_key_must_name_an_entity_property() {
        let mut thing = EntityType::new("Thing").with_property(EntityProperty::new("name", string()));
        let err = thing.set_primary_key(PrimaryKey::single("nope")).unwrap_err();
        assert!(matches!(err, ModelError::UnknownProperty { .. }));
    }

    #[test]
    fn lookup_by_json_name_and_alias() {
        let thing = EntityType::new("Thing").with_property(
            EntityProperty::new("id", string())
                .with_json_name("@iot.id")
                .with_alias("ID"),
        );
        assert!(thing.property("id").is_some());
        assert!(thing.property("@iot.id").is_some());
        assert!(thing.property("ID").is_some());
        assert_eq!(thing.properties().len(), 1);
    }

    #[test]
    fn re_registering_a_name_replaces_the_property() {
        let thing = EntityType::new("Thing")
            .with_property(EntityProperty::new("name", string()))
            .with_property(EntityProperty::new("name", string()).nullable(false));
        assert_eq!(thing.properties().len(), 1);
        assert!(!thing.properties()[0].is_nullable());
    }

    #[test]
    fn navigation_properties_record_their_owner() {
        let thing = EntityType::new("Thing")
            .with_property(Property::ToMany(NavigationProperty::new("Datastreams", "Datastream")));
        assert_eq!(thing.navigation_properties()[0].owner(), Some("Thing"));
    }

    #[test]
    fn full_name_includes_namespace() {
        assert_eq!(EntityType::new("Thing").full_name(), "Thing");
        assert_eq!(
            EntityType::new("Thing").with_namespace("org.OGC").full_name(),
            "org.OGC.Thing"
        );
    }
}
