//! The schema document tree.
//!
//! A serialization-shaped mirror of a CSDL document: a document holds
//! schemas, a schema holds named items, items hold properties. Nothing here
//! is used for data access; the tree exists to be parsed, emitted and
//! converted to and from a [`ModelRegistry`](sta_model::ModelRegistry).
//!
//! Defaults are normalised when the tree is built, so a flag that was never
//! written and one written with its default value compare equal.

use sta_model::{Annotations, Facets};

/// CSDL version written when a document does not say.
pub const DEFAULT_VERSION: &str = "4.01";

/// `$Type` of a property that does not declare one.
pub const DEFAULT_PROPERTY_TYPE: &str = "Edm.String";

/// `$UnderlyingType` of an enumeration that does not declare one.
pub const DEFAULT_ENUM_UNDERLYING_TYPE: &str = "Edm.Int32";

/// A whole schema document.
#[derive(Debug, Clone, PartialEq)]
pub struct CsdlDocument {
    pub version: String,
    /// Qualified name of the entity container, e.g. `org.OGC.Container`.
    pub entity_container: Option<String>,
    pub schemas: Vec<Schema>,
}

impl Default for CsdlDocument {
    fn default() -> Self {
        Self {
            version: DEFAULT_VERSION.to_string(),
            entity_container: None,
            schemas: Vec::new(),
        }
    }
}

impl CsdlDocument {
    #[must_use]
    pub fn schema(&self, namespace: &str) -> Option<&Schema> {
        self.schemas
            .iter()
            .find(|s| s.namespace == namespace || s.alias.as_deref() == Some(namespace))
    }

    /// The schema for `namespace`, created at the end if missing.
    pub fn schema_mut(&mut self, namespace: &str) -> &mut Schema {
        let position = match self.schemas.iter().position(|s| s.namespace == namespace) {
            Some(position) => position,
            None => {
                self.schemas.push(Schema::new(namespace));
                self.schemas.len() - 1
            }
        };
        &mut self.schemas[position]
    }

    /// The entity container named by `$EntityContainer`, or the first one
    /// found.
    #[must_use]
    pub fn container(&self) -> Option<(&Schema, &EntityContainerItem)> {
        let wanted = self
            .entity_container
            .as_deref()
            .and_then(|qualified| qualified.rsplit_once('.'));
        self.schemas.iter().find_map(|schema| {
            schema.items.iter().find_map(|item| match item {
                SchemaItem::EntityContainer(container) => match wanted {
                    Some((ns, name))
                        if !schema.is_named(ns) || container.name != name =>
                    {
                        None
                    }
                    _ => Some((schema, container)),
                },
                _ => None,
            })
        })
    }

    /// Expand an alias-qualified name (`alias.Type`) to its namespace.
    /// Names that are not alias-qualified come back unchanged.
    #[must_use]
    pub fn resolve_alias(&self, name: &str) -> String {
        if let Some(inner) = name
            .strip_prefix("Collection(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            return format!("Collection({})", self.resolve_alias(inner));
        }
        let Some((prefix, short)) = name.rsplit_once('.') else {
            return name.to_string();
        };
        self.schemas
            .iter()
            .find(|s| s.alias.as_deref() == Some(prefix))
            .map_or_else(|| name.to_string(), |s| format!("{}.{short}", s.namespace))
    }
}

/// One namespace of a document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    pub namespace: String,
    pub alias: Option<String>,
    pub items: Vec<SchemaItem>,
    pub annotations: Annotations,
}

impl Schema {
    #[must_use]
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn item(&self, name: &str) -> Option<&SchemaItem> {
        self.items.iter().find(|item| item.name() == name)
    }

    #[must_use]
    pub fn is_named(&self, name: &str) -> bool {
        self.namespace == name || self.alias.as_deref() == Some(name)
    }

    /// Qualify a short item name with this schema's namespace.
    #[must_use]
    pub fn qualify(&self, name: &str) -> String {
        format!("{}.{name}", self.namespace)
    }
}

/// A named member of a schema.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaItem {
    EntityType(EntityTypeItem),
    ComplexType(ComplexTypeItem),
    EnumType(EnumTypeItem),
    TypeDefinition(TypeDefinitionItem),
    EntityContainer(EntityContainerItem),
}

impl SchemaItem {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::EntityType(item) => &item.name,
            Self::ComplexType(item) => &item.name,
            Self::EnumType(item) => &item.name,
            Self::TypeDefinition(item) => &item.name,
            Self::EntityContainer(item) => &item.name,
        }
    }

    /// The `$Kind` this item is written with.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::EntityType(_) => "EntityType",
            Self::ComplexType(_) => "ComplexType",
            Self::EnumType(_) => "EnumType",
            Self::TypeDefinition(_) => "TypeDefinition",
            Self::EntityContainer(_) => "EntityContainer",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityTypeItem {
    pub name: String,
    /// Names of the key properties, in key order.
    pub key: Vec<String>,
    pub properties: Vec<PropertyItem>,
    pub annotations: Annotations,
}

impl EntityTypeItem {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComplexTypeItem {
    pub name: String,
    pub open: bool,
    pub properties: Vec<StructuralProperty>,
    pub annotations: Annotations,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumTypeItem {
    pub name: String,
    pub underlying_type: String,
    pub is_flags: bool,
    pub members: Vec<(String, i64)>,
    pub annotations: Annotations,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDefinitionItem {
    pub name: String,
    pub underlying_type: String,
    pub annotations: Annotations,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityContainerItem {
    pub name: String,
    pub entity_sets: Vec<EntitySetItem>,
    pub annotations: Annotations,
}

/// A container binding: the collection `name` holds entities of
/// `entity_type`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntitySetItem {
    pub name: String,
    /// Qualified entity type name.
    pub entity_type: String,
    /// Navigation property path → target entity set, in declaration order.
    pub navigation_bindings: Vec<(String, String)>,
    pub annotations: Annotations,
}

/// A member of an entity type.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyItem {
    Structural(StructuralProperty),
    Navigation(NavigationPropertyItem),
}

impl PropertyItem {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Structural(p) => &p.name,
            Self::Navigation(p) => &p.name,
        }
    }
}

/// A value-carrying property.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuralProperty {
    pub name: String,
    /// Qualified element type name. For collections this is the element
    /// type and `collection` is set.
    pub type_name: String,
    pub collection: bool,
    pub nullable: bool,
    pub facets: Facets,
    pub annotations: Annotations,
}

impl StructuralProperty {
    #[must_use]
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            collection: false,
            nullable: false,
            facets: Facets::default(),
            annotations: Annotations::new(),
        }
    }

    /// The type name with any collection wrapper applied.
    #[must_use]
    pub fn full_type_name(&self) -> String {
        wrap_collection(&self.type_name, self.collection)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NavigationPropertyItem {
    pub name: String,
    /// Qualified target entity type name.
    pub type_name: String,
    pub collection: bool,
    pub nullable: bool,
    pub partner: Option<String>,
    pub annotations: Annotations,
}

impl NavigationPropertyItem {
    #[must_use]
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            collection: false,
            nullable: false,
            partner: None,
            annotations: Annotations::new(),
        }
    }
}

/// `Collection(name)` when `collection` is set, else `name`.
#[must_use]
pub fn wrap_collection(name: &str, collection: bool) -> String {
    if collection {
        format!("Collection({name})")
    } else {
        name.to_string()
    }
}

/// Split `Collection(X)` into `(X, true)`; anything else is `(name, false)`.
#[must_use]
pub fn unwrap_collection(name: &str) -> (&str, bool) {
    name.strip_prefix("Collection(")
        .and_then(|rest| rest.strip_suffix(')'))
        .map_or((name, false), |inner| (inner, true))
}

/// Split a qualified name at its last `.` into `(namespace, name)`.
#[must_use]
pub fn split_qualified(name: &str) -> (Option<&str>, &str) {
    match name.rsplit_once('.') {
        Some((namespace, short)) => (Some(namespace), short),
        None => (None, name),
    }
}
