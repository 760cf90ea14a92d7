//! Entity properties and navigation properties.
//!
//! A [`Property`] is one of three closed kinds, resolved once when the
//! property is registered on its entity type:
//! - [`Property::Entity`]: carries a value of some [`PropertyType`]
//! - [`Property::ToOne`]: links to a single entity of another type
//! - [`Property::ToMany`]: links to a set of entities of another type
//!
//! Navigation properties reference their target type and inverse by name.
//! The target is resolved through the registry at finalisation and cached as
//! a non-owning [`Weak`] handle, so the type graph is owned by the registry
//! alone.

use std::sync::{Arc, OnceLock, Weak};

use crate::entity_type::EntityType;
use crate::types::PropertyType;

/// Key/value metadata attached to types and properties, keyed by term
/// (e.g. `Core.Description`).
pub type Annotations = serde_json::Map<String, serde_json::Value>;

/// Optional schema facets of an entity property.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Facets {
    pub max_length: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    pub srid: Option<String>,
    pub default_value: Option<String>,
}

impl Facets {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.max_length.is_none()
            && self.precision.is_none()
            && self.scale.is_none()
            && self.srid.is_none()
            && self.default_value.is_none()
    }
}

// ---------------------------------------------------------------------------
// EntityProperty
// ---------------------------------------------------------------------------

/// A property that carries a value.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityProperty {
    name: String,
    json_name: String,
    aliases: Vec<String>,
    property_type: Arc<PropertyType>,
    nullable: bool,
    read_only: bool,
    key_part: bool,
    facets: Facets,
    annotations: Annotations,
}

impl EntityProperty {
    #[must_use]
    pub fn new(name: impl Into<String>, property_type: Arc<PropertyType>) -> Self {
        let name = name.into();
        Self {
            json_name: name.clone(),
            name,
            aliases: Vec::new(),
            property_type,
            nullable: true,
            read_only: false,
            key_part: false,
            facets: Facets::default(),
            annotations: Annotations::new(),
        }
    }

    #[must_use]
    pub fn with_json_name(mut self, json_name: impl Into<String>) -> Self {
        self.json_name = json_name.into();
        self
    }

    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    #[must_use]
    pub const fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    #[must_use]
    pub const fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    #[must_use]
    pub const fn key_part(mut self, key_part: bool) -> Self {
        self.key_part = key_part;
        self
    }

    #[must_use]
    pub fn with_facets(mut self, facets: Facets) -> Self {
        self.facets = facets;
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
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn json_name(&self) -> &str {
        &self.json_name
    }

    #[must_use]
    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    #[must_use]
    pub const fn property_type(&self) -> &Arc<PropertyType> {
        &self.property_type
    }

    #[must_use]
    pub const fn is_nullable(&self) -> bool {
        self.nullable
    }

    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        self.read_only
    }

    #[must_use]
    pub const fn is_key_part(&self) -> bool {
        self.key_part
    }

    #[must_use]
    pub const fn facets(&self) -> &Facets {
        &self.facets
    }

    #[must_use]
    pub const fn annotations(&self) -> &Annotations {
        &self.annotations
    }

    pub(crate) const fn mark_key(&mut self) {
        self.key_part = true;
    }
}

// ---------------------------------------------------------------------------
// NavigationProperty
// ---------------------------------------------------------------------------

/// A relationship to another entity type.
///
/// Whether it is to-one or to-many is decided by the [`Property`] variant
/// wrapping it.
#[derive(Debug, Clone)]
pub struct NavigationProperty {
    name: String,
    json_name: String,
    aliases: Vec<String>,
    target: String,
    inverse: Option<String>,
    owner: Option<String>,
    nullable: bool,
    read_only: bool,
    annotations: Annotations,
    resolved: OnceLock<Weak<EntityType>>,
}

impl NavigationProperty {
    /// A relationship named `name` pointing at the entity type `target`.
    #[must_use]
    pub fn new(name: impl Into<String>, target: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            json_name: name.clone(),
            name,
            aliases: Vec::new(),
            target: target.into(),
            inverse: None,
            owner: None,
            nullable: true,
            read_only: false,
            annotations: Annotations::new(),
            resolved: OnceLock::new(),
        }
    }

    /// Name of the navigation property on the target type that points back.
    #[must_use]
    pub fn with_inverse(mut self, inverse: impl Into<String>) -> Self {
        self.inverse = Some(inverse.into());
        self
    }

    #[must_use]
    pub fn with_json_name(mut self, json_name: impl Into<String>) -> Self {
        self.json_name = json_name.into();
        self
    }

    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    #[must_use]
    pub const fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    #[must_use]
    pub const fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
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
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn json_name(&self) -> &str {
        &self.json_name
    }

    #[must_use]
    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    /// Short name of the target entity type.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    #[must_use]
    pub fn inverse(&self) -> Option<&str> {
        self.inverse.as_deref()
    }

    /// Name of the entity type this property is registered on.
    #[must_use]
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    #[must_use]
    pub const fn is_nullable(&self) -> bool {
        self.nullable
    }

    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        self.read_only
    }

    #[must_use]
    pub const fn annotations(&self) -> &Annotations {
        &self.annotations
    }

    /// The target type, once the registry has been finalised and while it is
    /// alive.
    #[must_use]
    pub fn target_type(&self) -> Option<Arc<EntityType>> {
        self.resolved.get().and_then(Weak::upgrade)
    }

    pub(crate) fn set_owner(&mut self, owner: &str) {
        self.owner = Some(owner.to_string());
    }

    pub(crate) fn resolve(&self, target: &Arc<EntityType>) {
        // A second finalisation attempt resolves to the same registry entry.
        let _ = self.resolved.set(Arc::downgrade(target));
    }
}

/// The cached target handle is derived state and does not take part in
/// equality.
impl PartialEq for NavigationProperty {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.json_name == other.json_name
            && self.aliases == other.aliases
            && self.target == other.target
            && self.inverse == other.inverse
            && self.owner == other.owner
            && self.nullable == other.nullable
            && self.read_only == other.read_only
            && self.annotations == other.annotations
    }
}

// ---------------------------------------------------------------------------
// Property
// ---------------------------------------------------------------------------

/// A property of an entity type.
#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    Entity(EntityProperty),
    ToOne(NavigationProperty),
    ToMany(NavigationProperty),
}

impl Property {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Entity(p) => p.name(),
            Self::ToOne(p) | Self::ToMany(p) => p.name(),
        }
    }

    #[must_use]
    pub fn json_name(&self) -> &str {
        match self {
            Self::Entity(p) => p.json_name(),
            Self::ToOne(p) | Self::ToMany(p) => p.json_name(),
        }
    }

    #[must_use]
    pub fn aliases(&self) -> &[String] {
        match self {
            Self::Entity(p) => p.aliases(),
            Self::ToOne(p) | Self::ToMany(p) => p.aliases(),
        }
    }

    #[must_use]
    pub const fn is_nullable(&self) -> bool {
        match self {
            Self::Entity(p) => p.is_nullable(),
            Self::ToOne(p) | Self::ToMany(p) => p.is_nullable(),
        }
    }

    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        match self {
            Self::Entity(p) => p.is_read_only(),
            Self::ToOne(p) | Self::ToMany(p) => p.is_read_only(),
        }
    }

    #[must_use]
    pub const fn is_navigation(&self) -> bool {
        !matches!(self, Self::Entity(_))
    }

    #[must_use]
    pub const fn as_entity(&self) -> Option<&EntityProperty> {
        match self {
            Self::Entity(p) => Some(p),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_navigation(&self) -> Option<&NavigationProperty> {
        match self {
            Self::ToOne(p) | Self::ToMany(p) => Some(p),
            Self::Entity(_) => None,
        }
    }

    /// Short description of the kind, for error messages.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Entity(_) => "an entity property",
            Self::ToOne(_) => "a to-one navigation property",
            Self::ToMany(_) => "a to-many navigation property",
        }
    }
}

impl From<EntityProperty> for Property {
    fn from(value: EntityProperty) -> Self {
        Self::Entity(value)
    }
}
