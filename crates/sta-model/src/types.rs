//! Property type catalog: primitive, simple, complex, collection and
//! enumeration type descriptors.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate};

use crate::error::ModelError;
use crate::property::Annotations;
use crate::value::{ComplexValue, Value};

// ---------------------------------------------------------------------------
// Primitive
// ---------------------------------------------------------------------------

/// The fixed set of base kinds every registry understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Binary,
    Boolean,
    Byte,
    SByte,
    Int16,
    Int32,
    Int64,
    Decimal,
    Double,
    Single,
    Date,
    DateTimeOffset,
    TimeOfDay,
    Duration,
    Guid,
    String,
    Stream,
    Geography,
    Geometry,
    Untyped,
}

impl Primitive {
    pub const ALL: [Self; 20] = [
        Self::Binary,
        Self::Boolean,
        Self::Byte,
        Self::SByte,
        Self::Int16,
        Self::Int32,
        Self::Int64,
        Self::Decimal,
        Self::Double,
        Self::Single,
        Self::Date,
        Self::DateTimeOffset,
        Self::TimeOfDay,
        Self::Duration,
        Self::Guid,
        Self::String,
        Self::Stream,
        Self::Geography,
        Self::Geometry,
        Self::Untyped,
    ];

    /// Qualified schema name, e.g. `Edm.Int64`.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Binary => "Edm.Binary",
            Self::Boolean => "Edm.Boolean",
            Self::Byte => "Edm.Byte",
            Self::SByte => "Edm.SByte",
            Self::Int16 => "Edm.Int16",
            Self::Int32 => "Edm.Int32",
            Self::Int64 => "Edm.Int64",
            Self::Decimal => "Edm.Decimal",
            Self::Double => "Edm.Double",
            Self::Single => "Edm.Single",
            Self::Date => "Edm.Date",
            Self::DateTimeOffset => "Edm.DateTimeOffset",
            Self::TimeOfDay => "Edm.TimeOfDay",
            Self::Duration => "Edm.Duration",
            Self::Guid => "Edm.Guid",
            Self::String => "Edm.String",
            Self::Stream => "Edm.Stream",
            Self::Geography => "Edm.Geography",
            Self::Geometry => "Edm.Geometry",
            Self::Untyped => "Edm.Untyped",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Binary => "Binary data",
            Self::Boolean => "Binary-valued logic",
            Self::Byte => "Unsigned 8-bit integer",
            Self::SByte => "Signed 8-bit integer",
            Self::Int16 => "Signed 16-bit integer",
            Self::Int32 => "Signed 32-bit integer",
            Self::Int64 => "Signed 64-bit integer",
            Self::Decimal => "Numeric values with decimal representation",
            Self::Double => "IEEE 754 binary64 floating-point number",
            Self::Single => "IEEE 754 binary32 floating-point number",
            Self::Date => "Date without a time-zone offset",
            Self::DateTimeOffset => "Date and time with a time-zone offset",
            Self::TimeOfDay => "Clock time 00:00-23:59:59.999999999999",
            Self::Duration => "Signed duration in days, hours, minutes, and seconds",
            Self::Guid => "16-byte (128-bit) unique identifier",
            Self::String => "Sequence of characters",
            Self::Stream => "Binary data stream",
            Self::Geography => "Abstract base type for all Geography types",
            Self::Geometry => "Abstract base type for all Geometry types",
            Self::Untyped => "Any value",
        }
    }

    /// Default JSON → value conversion for this kind.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidValue`] if the JSON does not fit.
    pub fn decode(self, property: &str, json: &serde_json::Value) -> Result<Value, ModelError> {
        if json.is_null() {
            return Ok(Value::Null);
        }
        let mismatch = || ModelError::invalid_value(property, format!("expected {}", self.name()));
        match self {
            Self::Boolean => json.as_bool().map(Value::Bool).ok_or_else(mismatch),
            Self::Byte | Self::SByte | Self::Int16 | Self::Int32 | Self::Int64 => {
                json.as_i64().map(Value::Int).ok_or_else(mismatch)
            }
            Self::Decimal | Self::Double | Self::Single => {
                json.as_f64().map(Value::Float).ok_or_else(mismatch)
            }
            Self::Date => {
                let text = json.as_str().ok_or_else(mismatch)?;
                NaiveDate::parse_from_str(text, "%Y-%m-%d")
                    .map(Value::Date)
                    .map_err(|e| ModelError::invalid_value(property, e.to_string()))
            }
            Self::DateTimeOffset => {
                let text = json.as_str().ok_or_else(mismatch)?;
                DateTime::parse_from_rfc3339(text)
                    .map(Value::DateTime)
                    .map_err(|e| ModelError::invalid_value(property, e.to_string()))
            }
            Self::Binary
            | Self::TimeOfDay
            | Self::Duration
            | Self::Guid
            | Self::String => json
                .as_str()
                .map(|s| Value::String(s.to_string()))
                .ok_or_else(mismatch),
            Self::Stream | Self::Geography | Self::Geometry | Self::Untyped => {
                Ok(Value::Json(json.clone()))
            }
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

/// Custom conversion between JSON and [`Value`] for a property type.
///
/// When present, hooks replace the default conversion of the type's kind.
pub trait ValueHooks: Send + Sync {
    fn serialize(&self, value: &Value) -> serde_json::Value;

    /// # Errors
    ///
    /// Returns [`ModelError::InvalidValue`] if the JSON cannot be converted.
    fn deserialize(&self, property: &str, json: &serde_json::Value) -> Result<Value, ModelError>;
}

// ---------------------------------------------------------------------------
// PropertyType
// ---------------------------------------------------------------------------

/// A member of a complex type.
#[derive(Debug, Clone, PartialEq)]
pub struct ComplexMember {
    pub name: String,
    pub property_type: Arc<PropertyType>,
    pub nullable: bool,
    pub annotations: Annotations,
}

impl ComplexMember {
    #[must_use]
    pub fn new(name: impl Into<String>, property_type: Arc<PropertyType>) -> Self {
        Self {
            name: name.into(),
            property_type,
            nullable: true,
            annotations: Annotations::new(),
        }
    }

    #[must_use]
    pub const fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }
}

/// The shape of a [`PropertyType`].
#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Primitive(Primitive),
    /// A renamed or restricted alias of a primitive.
    Simple { underlying: Primitive },
    Complex {
        members: Vec<ComplexMember>,
        open: bool,
    },
    Collection(Arc<PropertyType>),
    Enumeration {
        underlying: Primitive,
        is_flags: bool,
        members: Vec<(String, i64)>,
    },
}

/// A named value type.
#[derive(Clone)]
pub struct PropertyType {
    name: String,
    description: String,
    kind: TypeKind,
    annotations: Annotations,
    hooks: Option<Arc<dyn ValueHooks>>,
}

impl PropertyType {
    fn with_kind(name: impl Into<String>, description: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind,
            annotations: Annotations::new(),
            hooks: None,
        }
    }

    #[must_use]
    pub fn primitive(primitive: Primitive) -> Self {
        Self::with_kind(
            primitive.name(),
            primitive.description(),
            TypeKind::Primitive(primitive),
        )
    }

    #[must_use]
    pub fn simple(name: impl Into<String>, underlying: Primitive) -> Self {
        Self::with_kind(name, "", TypeKind::Simple { underlying })
    }

    #[must_use]
    pub fn complex(name: impl Into<String>, open: bool) -> Self {
        Self::with_kind(
            name,
            "",
            TypeKind::Complex {
                members: Vec::new(),
                open,
            },
        )
    }

    /// Wrap a type to make it repeatable. The name is `Collection(<inner>)`.
    #[must_use]
    pub fn collection(inner: Arc<Self>) -> Self {
        let name = format!("Collection({})", inner.name);
        let description = format!("A collection of {}", inner.name);
        Self::with_kind(name, description, TypeKind::Collection(inner))
    }

    #[must_use]
    pub fn enumeration(
        name: impl Into<String>,
        underlying: Primitive,
        members: Vec<(String, i64)>,
    ) -> Self {
        Self::with_kind(
            name,
            "",
            TypeKind::Enumeration {
                underlying,
                is_flags: false,
                members,
            },
        )
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
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
    pub fn with_hooks(mut self, hooks: Arc<dyn ValueHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Append a member. No-op on anything but a complex type.
    #[must_use]
    pub fn with_member(mut self, member: ComplexMember) -> Self {
        if let TypeKind::Complex { members, .. } = &mut self.kind {
            members.push(member);
        }
        self
    }

    /// Mark an enumeration as a flags enumeration.
    #[must_use]
    pub fn with_flags(mut self, flags: bool) -> Self {
        if let TypeKind::Enumeration { is_flags, .. } = &mut self.kind {
            *is_flags = flags;
        }
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub const fn kind(&self) -> &TypeKind {
        &self.kind
    }

    #[must_use]
    pub const fn annotations(&self) -> &Annotations {
        &self.annotations
    }

    #[must_use]
    pub const fn is_collection(&self) -> bool {
        matches!(self.kind, TypeKind::Collection(_))
    }

    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self.kind, TypeKind::Complex { open: true, .. })
    }

    /// The element type of a collection, or the type itself.
    #[must_use]
    pub fn element_type(&self) -> &Self {
        match &self.kind {
            TypeKind::Collection(inner) => inner,
            _ => self,
        }
    }

    /// Declared members of a complex type; empty for other kinds.
    #[must_use]
    pub fn members(&self) -> &[ComplexMember] {
        match &self.kind {
            TypeKind::Complex { members, .. } => members,
            _ => &[],
        }
    }

    /// Create an empty value of this complex type.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidValue`] if this is not a complex type.
    pub fn new_complex_value(&self) -> Result<ComplexValue, ModelError> {
        match &self.kind {
            TypeKind::Complex { members, open } => Ok(ComplexValue::new(
                self.name.clone(),
                *open,
                members.iter().map(|m| m.name.clone()).collect(),
            )),
            _ => Err(ModelError::invalid_value(
                &self.name,
                "not a complex type",
            )),
        }
    }

    /// Convert JSON to a value of this type.
    ///
    /// Closed complex types reject undeclared members here.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidValue`] if the JSON does not fit.
    pub fn decode(&self, property: &str, json: &serde_json::Value) -> Result<Value, ModelError> {
        if let Some(hooks) = &self.hooks {
            return hooks.deserialize(property, json);
        }
        if json.is_null() {
            return Ok(Value::Null);
        }
        match &self.kind {
            TypeKind::Primitive(p) | TypeKind::Simple { underlying: p } => p.decode(property, json),
            TypeKind::Collection(inner) => {
                let items = json.as_array().ok_or_else(|| {
                    ModelError::invalid_value(property, format!("expected {}", self.name))
                })?;
                items
                    .iter()
                    .map(|item| inner.decode(property, item))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Collection)
            }
            TypeKind::Enumeration { members, .. } => decode_enum(&self.name, members, property, json),
            TypeKind::Complex { members, open } => {
                let object = json.as_object().ok_or_else(|| {
                    ModelError::invalid_value(property, format!("expected object of {}", self.name))
                })?;
                let mut value = self.new_complex_value()?;
                for (key, member_json) in object {
                    let decoded = match members.iter().find(|m| &m.name == key) {
                        Some(member) => member.property_type.decode(key, member_json)?,
                        None if *open => Value::Json(member_json.clone()),
                        None => {
                            return Err(ModelError::invalid_value(
                                property,
                                format!("undeclared member '{key}' on closed type {}", self.name),
                            ));
                        }
                    };
                    value.set(key, decoded)?;
                }
                Ok(Value::Complex(value))
            }
        }
    }

    /// Convert a value of this type to JSON.
    #[must_use]
    pub fn encode(&self, value: &Value) -> serde_json::Value {
        if let Some(hooks) = &self.hooks {
            return hooks.serialize(value);
        }
        match (&self.kind, value) {
            (TypeKind::Collection(inner), Value::Collection(items)) => {
                serde_json::Value::Array(items.iter().map(|item| inner.encode(item)).collect())
            }
            (TypeKind::Complex { members, .. }, Value::Complex(complex)) => {
                serde_json::Value::Object(
                    complex
                        .fields()
                        .map(|(name, field)| {
                            let json = members
                                .iter()
                                .find(|m| m.name == name)
                                .map_or_else(|| field.to_json(), |m| m.property_type.encode(field));
                            (name.to_string(), json)
                        })
                        .collect(),
                )
            }
            _ => value.to_json(),
        }
    }
}

fn decode_enum(
    type_name: &str,
    members: &[(String, i64)],
    property: &str,
    json: &serde_json::Value,
) -> Result<Value, ModelError> {
    let found = match json {
        serde_json::Value::String(s) => members.iter().find(|(name, _)| name == s),
        serde_json::Value::Number(n) => {
            n.as_i64().and_then(|v| members.iter().find(|(_, ordinal)| *ordinal == v))
        }
        _ => None,
    };
    found
        .map(|(name, _)| Value::String(name.clone()))
        .ok_or_else(|| {
            ModelError::invalid_value(property, format!("not a member of {type_name}: {json}"))
        })
}

impl fmt::Debug for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyType")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("has_hooks", &self.hooks.is_some())
            .finish_non_exhaustive()
    }
}

/// Hooks are behaviour, not shape, and do not take part in equality.
impl PartialEq for PropertyType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.description == other.description
            && self.kind == other.kind
            && self.annotations == other.annotations
    }
}

// ---------------------------------------------------------------------------
// TypeCatalog
// ---------------------------------------------------------------------------

/// Built-in property types a registry falls back on.
///
/// Constructed explicitly and handed to the registry; there is no global
/// catalog.
#[derive(Debug, Clone, Default)]
pub struct TypeCatalog {
    types: HashMap<String, Arc<PropertyType>>,
}

/// Name of the built-in unit-of-measurement complex type.
pub const UNIT_OF_MEASUREMENT: &str = "org.OGC.UnitOfMeasurement";
/// Name of the built-in time-interval complex type.
pub const TIME_INTERVAL: &str = "org.OGC.TimeInterval";

impl TypeCatalog {
    /// Every primitive kind, nothing else.
    #[must_use]
    pub fn primitives() -> Self {
        let mut catalog = Self::default();
        for primitive in Primitive::ALL {
            catalog.register(PropertyType::primitive(primitive));
        }
        catalog
    }

    /// Primitives plus the standard complex types.
    #[must_use]
    pub fn standard() -> Self {
        let mut catalog = Self::primitives();
        let string = catalog.primitive(Primitive::String);
        let instant = catalog.primitive(Primitive::DateTimeOffset);

        catalog.register(
            PropertyType::complex(UNIT_OF_MEASUREMENT, false)
                .with_description("The Unit Of Measurement Type")
                .with_member(ComplexMember::new("name", Arc::clone(&string)))
                .with_member(ComplexMember::new("symbol", Arc::clone(&string)))
                .with_member(ComplexMember::new("definition", string)),
        );
        catalog.register(
            PropertyType::complex(TIME_INTERVAL, false)
                .with_description("An ISO time interval")
                .with_member(ComplexMember::new("start", Arc::clone(&instant)).nullable(false))
                .with_member(ComplexMember::new("end", instant).nullable(false)),
        );
        catalog
    }

    pub fn register(&mut self, property_type: impl Into<Arc<PropertyType>>) {
        let property_type = property_type.into();
        self.types
            .insert(property_type.name().to_string(), property_type);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<PropertyType>> {
        self.types.get(name).cloned()
    }

    /// The shared descriptor for a primitive kind.
    #[must_use]
    pub fn primitive(&self, primitive: Primitive) -> Arc<PropertyType> {
        self.get(primitive.name())
            .unwrap_or_else(|| Arc::new(PropertyType::primitive(primitive)))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn primitive_names_roundtrip() {
        for primitive in Primitive::ALL {
            assert_eq!(Primitive::from_name(primitive.name()), Some(primitive));
        }
        assert_eq!(Primitive::from_name("Edm.Nope"), None);
    }

    #[test]
    fn standard_catalog_has_primitives_and_complex_types() {
        let catalog = TypeCatalog::standard();
        assert_eq!(catalog.len(), Primitive::ALL.len() + 2);
        assert!(catalog.get("Edm.Int64").is_some());
        let uom = catalog.get(UNIT_OF_MEASUREMENT).unwrap();
        assert_eq!(uom.members().len(), 3);
        assert!(!uom.is_open());
    }

    #[test]
    fn closed_complex_type_rejects_unknown_member_on_decode() {
        let catalog = TypeCatalog::standard();
        let uom = catalog.get(UNIT_OF_MEASUREMENT).unwrap();
        let err = uom
            .decode("unitOfMeasurement", &json!({"name": "C", "bogus": 1}))
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidValue { .. }));
    }

    #[test]
    fn open_complex_type_keeps_unknown_members() {
        let catalog = TypeCatalog::primitives();
        let props = PropertyType::complex("x.Props", true)
            .with_member(ComplexMember::new("a", catalog.primitive(Primitive::Int32)));
        let value = props.decode("properties", &json!({"a": 1, "b": "two"})).unwrap();
        let complex = value.as_complex().unwrap();
        assert_eq!(complex.get("a"), Some(&Value::Int(1)));
        assert_eq!(complex.get("b"), Some(&Value::Json(json!("two"))));
    }

    #[test]
    fn enumeration_decodes_names_and_ordinals() {
        let colour = PropertyType::enumeration(
            "x.Colour",
            Primitive::Int32,
            vec![("Red".into(), 0), ("Green".into(), 1)],
        );
        assert_eq!(colour.decode("c", &json!("Green")).unwrap(), Value::from("Green"));
        assert_eq!(colour.decode("c", &json!(0)).unwrap(), Value::from("Red"));
        assert!(colour.decode("c", &json!("Blue")).is_err());
    }

    #[test]
    fn date_time_offset_decodes_rfc3339() {
        let value = Primitive::DateTimeOffset
            .decode("t", &json!("2024-03-01T10:00:00+01:00"))
            .unwrap();
        assert!(matches!(value, Value::DateTime(_)));
        assert_eq!(value.to_json(), json!("2024-03-01T10:00:00+01:00"));
    }

    #[test]
    fn collection_encode_uses_element_type() {
        let catalog = TypeCatalog::primitives();
        let tags = PropertyType::collection(catalog.primitive(Primitive::String));
        assert_eq!(tags.name(), "Collection(Edm.String)");
        let value = tags.decode("tags", &json!(["a", "b"])).unwrap();
        assert_eq!(tags.encode(&value), json!(["a", "b"]));
    }

    struct Upper;

    impl ValueHooks for Upper {
        fn serialize(&self, value: &Value) -> serde_json::Value {
            json!(value.to_string().to_lowercase())
        }

        fn deserialize(&self, _property: &str, json: &serde_json::Value) -> Result<Value, ModelError> {
            Ok(Value::from(json.as_str().unwrap_or_default().to_uppercase()))
        }
    }

    #[test]
    fn hooks_override_default_conversion() {
        let code = PropertyType::simple("x.Code", Primitive::String).with_hooks(Arc::new(Upper));
        let value = code.decode("code", &json!("abc")).unwrap();
        assert_eq!(value, Value::from("ABC"));
        assert_eq!(code.encode(&value), json!("abc"));
    }
}
