//! Property values carried by entities.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, FixedOffset, NaiveDate};

use crate::error::ModelError;

/// A typed property value.
///
/// Geometry, geography and untyped properties keep their raw JSON in
/// [`Value::Json`].
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Date(NaiveDate),
    DateTime(DateTime<FixedOffset>),
    Complex(ComplexValue),
    Collection(Vec<Self>),
    Json(serde_json::Value),
}

impl Value {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_complex(&self) -> Option<&ComplexValue> {
        match self {
            Self::Complex(c) => Some(c),
            _ => None,
        }
    }

    /// Untyped JSON rendering, used when no property type is at hand.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Date(d) => serde_json::Value::String(d.format("%Y-%m-%d").to_string()),
            Self::DateTime(dt) => serde_json::Value::String(dt.to_rfc3339()),
            Self::Complex(c) => serde_json::Value::Object(
                c.fields()
                    .map(|(name, value)| (name.to_string(), value.to_json()))
                    .collect(),
            ),
            Self::Collection(items) => {
                serde_json::Value::Array(items.iter().map(Self::to_json).collect())
            }
            Self::Json(json) => json.clone(),
        }
    }

    /// Render as an OData literal for use in key segments like `Things(…)`.
    ///
    /// Strings are single-quoted with embedded quotes doubled.
    #[must_use]
    pub fn to_literal(&self) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::String(s) => format!("'{}'", s.replace('\'', "''")),
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
            Self::DateTime(dt) => dt.to_rfc3339(),
            other => other.to_json().to_string(),
        }
    }
}

/// Floats compare with `==`, except that NaN equals NaN so that `Eq` holds.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Date(a), Self::Date(b)) => a == b,
            (Self::DateTime(a), Self::DateTime(b)) => a == b,
            (Self::Complex(a), Self::Complex(b)) => a == b,
            (Self::Collection(a), Self::Collection(b)) => a == b,
            (Self::Json(a), Self::Json(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Null => {}
            Self::Bool(b) => b.hash(state),
            Self::Int(i) => i.hash(state),
            Self::Float(f) => float_bits(*f).hash(state),
            Self::String(s) => s.hash(state),
            Self::Date(d) => d.hash(state),
            Self::DateTime(dt) => dt.hash(state),
            Self::Complex(c) => c.hash(state),
            Self::Collection(items) => items.hash(state),
            Self::Json(json) => hash_json(json, state),
        }
    }
}

/// Bits with `-0.0` folded into `0.0` and every NaN into one pattern.
fn float_bits(f: f64) -> u64 {
    if f.is_nan() {
        f64::NAN.to_bits()
    } else if f == 0.0 {
        0
    } else {
        f.to_bits()
    }
}

/// Object members are hashed in key order, as JSON object equality ignores
/// member order.
fn hash_json<H: Hasher>(json: &serde_json::Value, state: &mut H) {
    std::mem::discriminant(json).hash(state);
    match json {
        serde_json::Value::Null => {}
        serde_json::Value::Bool(b) => b.hash(state),
        serde_json::Value::Number(n) => match (n.as_i64(), n.as_u64()) {
            (Some(i), _) => i.hash(state),
            (None, Some(u)) => u.hash(state),
            (None, None) => float_bits(n.as_f64().unwrap_or_default()).hash(state),
        },
        serde_json::Value::String(s) => s.hash(state),
        serde_json::Value::Array(items) => {
            items.len().hash(state);
            for item in items {
                hash_json(item, state);
            }
        }
        serde_json::Value::Object(map) => {
            let mut members: Vec<_> = map.iter().collect();
            members.sort_unstable_by(|a, b| a.0.cmp(b.0));
            members.len().hash(state);
            for (key, value) in members {
                key.hash(state);
                hash_json(value, state);
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(value: DateTime<FixedOffset>) -> Self {
        Self::DateTime(value)
    }
}

impl From<ComplexValue> for Value {
    fn from(value: ComplexValue) -> Self {
        Self::Complex(value)
    }
}

impl From<Vec<Self>> for Value {
    fn from(value: Vec<Self>) -> Self {
        Self::Collection(value)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// A value of a complex type: a tagged map of member values.
///
/// Members not declared on the complex type are only accepted when the
/// type is open.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComplexValue {
    type_name: String,
    open: bool,
    declared: Vec<String>,
    fields: BTreeMap<String, Value>,
}

impl ComplexValue {
    /// Create an empty value. Usually obtained through
    /// [`PropertyType::new_complex_value`](crate::PropertyType::new_complex_value).
    #[must_use]
    pub fn new(type_name: impl Into<String>, open: bool, declared: Vec<String>) -> Self {
        Self {
            type_name: type_name.into(),
            open,
            declared,
            fields: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.open
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Set a member value.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidValue`] if the member is not declared and
    /// the type is closed.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), ModelError> {
        if !self.open && !self.declared.iter().any(|d| d == name) {
            return Err(ModelError::invalid_value(
                name,
                format!("'{}' is a closed type without this member", self.type_name),
            ));
        }
        self.fields.insert(name.to_string(), value.into());
        Ok(())
    }

    /// Builder form of [`set`](Self::set).
    ///
    /// # Errors
    ///
    /// See [`set`](Self::set).
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Result<Self, ModelError> {
        self.set(name, value)?;
        Ok(self)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Members that are not declared on the type (only possible when open).
    pub fn dynamic_fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields()
            .filter(|(name, _)| !self.declared.iter().any(|d| d == name))
    }
}
