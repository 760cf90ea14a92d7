//! CSDL JSON: parsing into and emitting from the document tree.
//!
//! Members whose name starts with `$` are structural keywords, members
//! starting with `@` are annotations, anything else is a named child. Unknown
//! keywords and item kinds the tree does not model (actions, functions,
//! terms, singletons) are skipped with a debug log.

use serde_json::{Map, Value, json};
use sta_model::{Annotations, Facets};

use crate::document::{
    ComplexTypeItem, CsdlDocument, DEFAULT_ENUM_UNDERLYING_TYPE, DEFAULT_PROPERTY_TYPE,
    DEFAULT_VERSION, EntityContainerItem, EntitySetItem, EntityTypeItem, EnumTypeItem,
    NavigationPropertyItem, PropertyItem, Schema, SchemaItem, StructuralProperty,
    TypeDefinitionItem,
};
use crate::error::CsdlError;

type Object = Map<String, Value>;

impl CsdlDocument {
    /// Parse a CSDL JSON document from text.
    ///
    /// # Errors
    ///
    /// Returns [`CsdlError::Json`] for invalid JSON and
    /// [`CsdlError::Malformed`] for a document of the wrong shape.
    pub fn from_json_str(text: &str) -> Result<Self, CsdlError> {
        let json: Value = serde_json::from_str(text)?;
        Self::from_json(&json)
    }

    /// Parse a CSDL JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`CsdlError::Malformed`] for a document of the wrong shape.
    pub fn from_json(json: &Value) -> Result<Self, CsdlError> {
        let root = object(json, "$")?;
        let mut document = Self {
            version: string(root, "$Version", "$")?.unwrap_or_else(|| DEFAULT_VERSION.to_string()),
            entity_container: string(root, "$EntityContainer", "$")?,
            schemas: Vec::new(),
        };
        for (key, value) in root {
            if key.starts_with('$') || key.starts_with('@') {
                skip_keyword(key, "$");
                continue;
            }
            document.schemas.push(parse_schema(key, value)?);
        }
        Ok(document)
    }

    /// Emit the document as CSDL JSON.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut root = Object::new();
        root.insert("$Version".into(), json!(self.version));
        if let Some(container) = &self.entity_container {
            root.insert("$EntityContainer".into(), json!(container));
        }
        for schema in &self.schemas {
            root.insert(schema.namespace.clone(), emit_schema(schema));
        }
        Value::Object(root)
    }

    /// Emit the document as pretty-printed CSDL JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`CsdlError::Json`] if serialization fails.
    pub fn to_json_string(&self) -> Result<String, CsdlError> {
        Ok(serde_json::to_string_pretty(&self.to_json())?)
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

fn parse_schema(namespace: &str, json: &Value) -> Result<Schema, CsdlError> {
    let members = object(json, namespace)?;
    let mut schema = Schema::new(namespace);
    schema.alias = string(members, "$Alias", namespace)?;
    schema.annotations = annotations(members);

    for (name, value) in members {
        if name.starts_with('$') || name.starts_with('@') {
            skip_keyword(name, namespace);
            continue;
        }
        let path = format!("{namespace}/{name}");
        let item = object(value, &path)?;
        let kind = string(item, "$Kind", &path)?
            .ok_or_else(|| CsdlError::malformed(&path, "missing $Kind"))?;
        let parsed = match kind.as_str() {
            "EntityType" => SchemaItem::EntityType(parse_entity_type(name, item, &path)?),
            "ComplexType" => SchemaItem::ComplexType(parse_complex_type(name, item, &path)?),
            "EnumType" => SchemaItem::EnumType(parse_enum_type(name, item, &path)?),
            "TypeDefinition" => SchemaItem::TypeDefinition(TypeDefinitionItem {
                name: name.clone(),
                underlying_type: string(item, "$UnderlyingType", &path)?
                    .ok_or_else(|| CsdlError::malformed(&path, "missing $UnderlyingType"))?,
                annotations: annotations(item),
            }),
            "EntityContainer" => SchemaItem::EntityContainer(parse_container(name, item, &path)?),
            other => {
                tracing::debug!(item = %path, kind = other, "skipping unsupported schema item");
                continue;
            }
        };
        schema.items.push(parsed);
    }
    Ok(schema)
}

fn parse_entity_type(name: &str, item: &Object, path: &str) -> Result<EntityTypeItem, CsdlError> {
    let mut entity_type = EntityTypeItem::new(name);
    entity_type.annotations = annotations(item);
    if let Some(key) = item.get("$Key") {
        let key_path = format!("{path}/$Key");
        for part in array(key, &key_path)? {
            let part = part
                .as_str()
                .ok_or_else(|| CsdlError::malformed(&key_path, "key parts must be property names"))?;
            entity_type.key.push(part.to_string());
        }
    }

    for (member, value) in children(item, path) {
        let path = format!("{path}/{member}");
        let property = object(value, &path)?;
        let parsed = match string(property, "$Kind", &path)?.as_deref() {
            None | Some("Property") => {
                PropertyItem::Structural(parse_structural(member, property, &path)?)
            }
            Some("NavigationProperty") => {
                PropertyItem::Navigation(parse_navigation(member, property, &path)?)
            }
            Some(other) => {
                return Err(CsdlError::malformed(&path, format!("unexpected $Kind {other}")));
            }
        };
        entity_type.properties.push(parsed);
    }
    Ok(entity_type)
}

fn parse_complex_type(name: &str, item: &Object, path: &str) -> Result<ComplexTypeItem, CsdlError> {
    let mut complex = ComplexTypeItem {
        name: name.to_string(),
        open: boolean(item, "$OpenType", path)?,
        properties: Vec::new(),
        annotations: annotations(item),
    };
    for (member, value) in children(item, path) {
        let path = format!("{path}/{member}");
        let property = object(value, &path)?;
        match string(property, "$Kind", &path)?.as_deref() {
            None | Some("Property") => {
                complex.properties.push(parse_structural(member, property, &path)?);
            }
            Some(other) => {
                return Err(CsdlError::malformed(
                    &path,
                    format!("{other} is not allowed on a complex type"),
                ));
            }
        }
    }
    Ok(complex)
}

fn parse_structural(name: &str, property: &Object, path: &str) -> Result<StructuralProperty, CsdlError> {
    let facets = Facets {
        max_length: unsigned(property, "$MaxLength", path)?,
        precision: unsigned(property, "$Precision", path)?,
        scale: unsigned(property, "$Scale", path)?,
        srid: match property.get("$SRID") {
            None => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(_) => return Err(CsdlError::malformed(path, "$SRID must be a string or number")),
        },
        default_value: string(property, "$DefaultValue", path)?,
    };
    Ok(StructuralProperty {
        name: name.to_string(),
        type_name: string(property, "$Type", path)?
            .unwrap_or_else(|| DEFAULT_PROPERTY_TYPE.to_string()),
        collection: boolean(property, "$Collection", path)?,
        nullable: boolean(property, "$Nullable", path)?,
        facets,
        annotations: annotations(property),
    })
}

fn parse_navigation(
    name: &str,
    property: &Object,
    path: &str,
) -> Result<NavigationPropertyItem, CsdlError> {
    Ok(NavigationPropertyItem {
        name: name.to_string(),
        type_name: string(property, "$Type", path)?
            .ok_or_else(|| CsdlError::malformed(path, "navigation property without $Type"))?,
        collection: boolean(property, "$Collection", path)?,
        nullable: boolean(property, "$Nullable", path)?,
        partner: string(property, "$Partner", path)?,
        annotations: annotations(property),
    })
}

fn parse_enum_type(name: &str, item: &Object, path: &str) -> Result<EnumTypeItem, CsdlError> {
    let mut members = Vec::new();
    for (member, value) in children(item, path) {
        let ordinal = value.as_i64().ok_or_else(|| {
            CsdlError::malformed(format!("{path}/{member}"), "enum member value must be an integer")
        })?;
        members.push((member.clone(), ordinal));
    }
    Ok(EnumTypeItem {
        name: name.to_string(),
        underlying_type: string(item, "$UnderlyingType", path)?
            .unwrap_or_else(|| DEFAULT_ENUM_UNDERLYING_TYPE.to_string()),
        is_flags: boolean(item, "$IsFlags", path)?,
        members,
        annotations: annotations(item),
    })
}

fn parse_container(name: &str, item: &Object, path: &str) -> Result<EntityContainerItem, CsdlError> {
    let mut container = EntityContainerItem {
        name: name.to_string(),
        entity_sets: Vec::new(),
        annotations: annotations(item),
    };
    for (member, value) in children(item, path) {
        let path = format!("{path}/{member}");
        let set = object(value, &path)?;
        if !boolean(set, "$Collection", &path)? {
            tracing::debug!(member = %path, "skipping container member that is not an entity set");
            continue;
        }
        let mut navigation_bindings = Vec::new();
        if let Some(bindings) = set.get("$NavigationPropertyBinding") {
            let bindings_path = format!("{path}/$NavigationPropertyBinding");
            for (nav, target) in object(bindings, &bindings_path)? {
                let target = target.as_str().ok_or_else(|| {
                    CsdlError::malformed(&bindings_path, "binding targets must be strings")
                })?;
                navigation_bindings.push((nav.clone(), target.to_string()));
            }
        }
        container.entity_sets.push(EntitySetItem {
            name: member.clone(),
            entity_type: string(set, "$Type", &path)?
                .ok_or_else(|| CsdlError::malformed(&path, "entity set without $Type"))?,
            navigation_bindings,
            annotations: annotations(set),
        });
    }
    Ok(container)
}

/// Named children: members that are neither keywords nor annotations.
/// Member-level annotations (`Name@Term`) are not modelled.
fn children<'a>(item: &'a Object, path: &str) -> impl Iterator<Item = (&'a String, &'a Value)> {
    let path = path.to_string();
    item.iter().filter(move |(key, _)| {
        if key.starts_with('$') || key.starts_with('@') {
            return false;
        }
        if key.contains('@') {
            tracing::debug!(item = %path, member = %key, "skipping member annotation");
            return false;
        }
        true
    })
}

fn skip_keyword(key: &str, path: &str) {
    if !matches!(key, "$Version" | "$EntityContainer" | "$Alias") && key.starts_with('$') {
        tracing::debug!(item = %path, keyword = key, "ignoring keyword");
    }
}

fn object<'a>(json: &'a Value, path: &str) -> Result<&'a Object, CsdlError> {
    json.as_object()
        .ok_or_else(|| CsdlError::malformed(path, "expected an object"))
}

fn array<'a>(json: &'a Value, path: &str) -> Result<&'a Vec<Value>, CsdlError> {
    json.as_array()
        .ok_or_else(|| CsdlError::malformed(path, "expected an array"))
}

fn string(object: &Object, key: &str, path: &str) -> Result<Option<String>, CsdlError> {
    match object.get(key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(CsdlError::malformed(path, format!("{key} must be a string"))),
    }
}

fn boolean(object: &Object, key: &str, path: &str) -> Result<bool, CsdlError> {
    match object.get(key) {
        None => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(CsdlError::malformed(path, format!("{key} must be a boolean"))),
    }
}

fn unsigned(object: &Object, key: &str, path: &str) -> Result<Option<u32>, CsdlError> {
    match object.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| CsdlError::malformed(path, format!("{key} must be a non-negative integer"))),
    }
}

fn annotations(object: &Object) -> Annotations {
    object
        .iter()
        .filter_map(|(key, value)| key.strip_prefix('@').map(|term| (term.to_string(), value.clone())))
        .collect()
}

// ---------------------------------------------------------------------------
// Emission
// ---------------------------------------------------------------------------

fn emit_schema(schema: &Schema) -> Value {
    let mut members = Object::new();
    if let Some(alias) = &schema.alias {
        members.insert("$Alias".into(), json!(alias));
    }
    for item in &schema.items {
        members.insert(item.name().to_string(), emit_item(item));
    }
    emit_annotations(&mut members, &schema.annotations);
    Value::Object(members)
}

fn emit_item(item: &SchemaItem) -> Value {
    let mut members = Object::new();
    members.insert("$Kind".into(), json!(item.kind()));
    match item {
        SchemaItem::EntityType(entity_type) => {
            if !entity_type.key.is_empty() {
                members.insert("$Key".into(), json!(entity_type.key));
            }
            for property in &entity_type.properties {
                let emitted = match property {
                    PropertyItem::Structural(p) => emit_structural(p),
                    PropertyItem::Navigation(p) => emit_navigation(p),
                };
                members.insert(property.name().to_string(), emitted);
            }
            emit_annotations(&mut members, &entity_type.annotations);
        }
        SchemaItem::ComplexType(complex) => {
            if complex.open {
                members.insert("$OpenType".into(), json!(true));
            }
            for property in &complex.properties {
                members.insert(property.name.clone(), emit_structural(property));
            }
            emit_annotations(&mut members, &complex.annotations);
        }
        SchemaItem::EnumType(enumeration) => {
            if enumeration.underlying_type != DEFAULT_ENUM_UNDERLYING_TYPE {
                members.insert("$UnderlyingType".into(), json!(enumeration.underlying_type));
            }
            if enumeration.is_flags {
                members.insert("$IsFlags".into(), json!(true));
            }
            for (name, ordinal) in &enumeration.members {
                members.insert(name.clone(), json!(ordinal));
            }
            emit_annotations(&mut members, &enumeration.annotations);
        }
        SchemaItem::TypeDefinition(definition) => {
            members.insert("$UnderlyingType".into(), json!(definition.underlying_type));
            emit_annotations(&mut members, &definition.annotations);
        }
        SchemaItem::EntityContainer(container) => {
            for set in &container.entity_sets {
                members.insert(set.name.clone(), emit_entity_set(set));
            }
            emit_annotations(&mut members, &container.annotations);
        }
    }
    Value::Object(members)
}

fn emit_structural(property: &StructuralProperty) -> Value {
    let mut members = Object::new();
    members.insert("$Type".into(), json!(property.type_name));
    if property.collection {
        members.insert("$Collection".into(), json!(true));
    }
    if property.nullable {
        members.insert("$Nullable".into(), json!(true));
    }
    let facets = &property.facets;
    if let Some(max_length) = facets.max_length {
        members.insert("$MaxLength".into(), json!(max_length));
    }
    if let Some(precision) = facets.precision {
        members.insert("$Precision".into(), json!(precision));
    }
    if let Some(scale) = facets.scale {
        members.insert("$Scale".into(), json!(scale));
    }
    if let Some(srid) = &facets.srid {
        members.insert("$SRID".into(), json!(srid));
    }
    if let Some(default_value) = &facets.default_value {
        members.insert("$DefaultValue".into(), json!(default_value));
    }
    emit_annotations(&mut members, &property.annotations);
    Value::Object(members)
}

fn emit_navigation(property: &NavigationPropertyItem) -> Value {
    let mut members = Object::new();
    members.insert("$Kind".into(), json!("NavigationProperty"));
    members.insert("$Type".into(), json!(property.type_name));
    if property.collection {
        members.insert("$Collection".into(), json!(true));
    }
    if property.nullable {
        members.insert("$Nullable".into(), json!(true));
    }
    if let Some(partner) = &property.partner {
        members.insert("$Partner".into(), json!(partner));
    }
    emit_annotations(&mut members, &property.annotations);
    Value::Object(members)
}

fn emit_entity_set(set: &EntitySetItem) -> Value {
    let mut members = Object::new();
    members.insert("$Collection".into(), json!(true));
    members.insert("$Type".into(), json!(set.entity_type));
    if !set.navigation_bindings.is_empty() {
        let bindings: Object = set
            .navigation_bindings
            .iter()
            .map(|(path, target)| (path.clone(), json!(target)))
            .collect();
        members.insert("$NavigationPropertyBinding".into(), Value::Object(bindings));
    }
    emit_annotations(&mut members, &set.annotations);
    Value::Object(members)
}

fn emit_annotations(members: &mut Object, annotations: &Annotations) {
    for (term, value) in annotations {
        members.insert(format!("@{term}"), value.clone());
    }
}
