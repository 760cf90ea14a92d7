//! Document → registry.
//!
//! Applied in passes because later items refer to earlier ones:
//!
//! 1. type definitions and enumerations become simple and enum property types
//! 2. complex types, whose members may use anything from pass 1 or each other
//! 3. entity type shells, so navigation properties can name any sibling
//! 4. entity type properties, navigation targets and partners, primary keys
//! 5. container bindings
//!
//! Every schema namespace is recorded as a data model of the registry, with
//! its alias and annotations. The container's name, annotations and declared
//! entity sets are recorded too, so the document can be filled back.

use std::sync::Arc;

use sta_model::{
    Annotations, ComplexMember, ContainerInfo, DataModel, EntityProperty, EntitySetInfo,
    EntityType, ModelError, ModelRegistry, NavigationProperty, PrimaryKey, Primitive, Property,
    PropertyType,
};

use crate::document::{
    ComplexTypeItem, CsdlDocument, EntityTypeItem, PropertyItem, Schema, SchemaItem,
    split_qualified, wrap_collection,
};
use crate::error::CsdlError;

/// JSON name given to the single key property of every entity type built
/// from a document. Payloads carry the key as `@iot.id`.
pub const KEY_JSON_NAME: &str = "@iot.id";

/// Annotation term read as a property type's description.
pub const DESCRIPTION_TERM: &str = "Core.Description";

impl CsdlDocument {
    /// Register every type and container of this document in `registry`.
    ///
    /// The registry is not finalised; call
    /// [`ModelRegistry::init_finalise`] once all documents are applied.
    ///
    /// # Errors
    ///
    /// Returns [`CsdlError::Model`] wrapping
    /// [`ModelError::NotYetSupported`] for a composite key,
    /// [`ModelError::UnknownType`] for an unresolvable type reference, or
    /// [`ModelError::NamingConflict`] when an entity type already exists;
    /// [`CsdlError::Malformed`] for an underlying type that is not a
    /// primitive.
    pub fn apply_to(&self, registry: &mut ModelRegistry) -> Result<(), CsdlError> {
        self.apply_simple_types(registry)?;
        self.apply_complex_types(registry)?;
        for (schema, entity_type) in self.items_of(entity_types) {
            registry.register_entity_type(
                EntityType::new(&entity_type.name)
                    .with_namespace(&schema.namespace)
                    .with_annotations(entity_type.annotations.clone()),
            )?;
        }
        for (_, entity_type) in self.items_of(entity_types) {
            self.apply_entity_type(registry, entity_type)?;
        }
        self.apply_container(registry)?;

        for schema in &self.schemas {
            registry.describe_data_model(DataModel {
                namespace: schema.namespace.clone(),
                alias: schema.alias.clone(),
                alias_references: schema
                    .alias
                    .as_deref()
                    .is_some_and(|alias| self.references_alias(alias)),
                annotations: schema.annotations.clone(),
            });
        }
        tracing::debug!(
            schemas = self.schemas.len(),
            entity_types = registry.entity_types().len(),
            property_types = registry.custom_property_types().len(),
            "applied schema document"
        );
        Ok(())
    }

    fn items_of<'a, T: 'a>(
        &'a self,
        pick: fn(&'a SchemaItem) -> Option<&'a T>,
    ) -> impl Iterator<Item = (&'a Schema, &'a T)> {
        self.schemas
            .iter()
            .flat_map(move |schema| schema.items.iter().filter_map(pick).map(move |item| (schema, item)))
    }

    fn primitive(&self, schema: &Schema, item: &str, name: &str) -> Result<Primitive, CsdlError> {
        Primitive::from_name(&self.resolve_alias(name)).ok_or_else(|| {
            CsdlError::malformed(
                format!("{}/{item}", schema.namespace),
                format!("underlying type {name} is not a primitive type"),
            )
        })
    }

    fn property_type(
        &self,
        registry: &ModelRegistry,
        type_name: &str,
        collection: bool,
    ) -> Result<Arc<PropertyType>, ModelError> {
        registry.property_type(&wrap_collection(&self.resolve_alias(type_name), collection))
    }

    // -- pass 1 -------------------------------------------------------------

    fn apply_simple_types(&self, registry: &mut ModelRegistry) -> Result<(), CsdlError> {
        for schema in &self.schemas {
            for item in &schema.items {
                let property_type = match item {
                    SchemaItem::TypeDefinition(definition) => PropertyType::simple(
                        schema.qualify(&definition.name),
                        self.primitive(schema, &definition.name, &definition.underlying_type)?,
                    )
                    .with_description(description(&definition.annotations))
                    .with_annotations(definition.annotations.clone()),
                    SchemaItem::EnumType(enumeration) => PropertyType::enumeration(
                        schema.qualify(&enumeration.name),
                        self.primitive(schema, &enumeration.name, &enumeration.underlying_type)?,
                        enumeration.members.clone(),
                    )
                    .with_flags(enumeration.is_flags)
                    .with_description(description(&enumeration.annotations))
                    .with_annotations(enumeration.annotations.clone()),
                    _ => continue,
                };
                registry.register_property_type(property_type);
            }
        }
        Ok(())
    }

    // -- pass 2 -------------------------------------------------------------

    /// Complex types may use each other, in any document order. Each round
    /// registers every type whose members all resolve; a round without
    /// progress reports the first failure.
    fn apply_complex_types(&self, registry: &mut ModelRegistry) -> Result<(), CsdlError> {
        let mut pending: Vec<(&Schema, &ComplexTypeItem)> = self.items_of(complex_types).collect();
        while !pending.is_empty() {
            let mut waiting = Vec::new();
            let mut first_error = None;
            for (schema, complex) in pending.iter().copied() {
                match self.complex_type(registry, schema, complex) {
                    Ok(property_type) => registry.register_property_type(property_type),
                    Err(ModelError::UnknownType(name)) => {
                        first_error.get_or_insert(ModelError::UnknownType(name));
                        waiting.push((schema, complex));
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            if waiting.len() == pending.len() {
                if let Some(e) = first_error {
                    return Err(e.into());
                }
                break;
            }
            pending = waiting;
        }
        Ok(())
    }

    fn complex_type(
        &self,
        registry: &ModelRegistry,
        schema: &Schema,
        complex: &ComplexTypeItem,
    ) -> Result<PropertyType, ModelError> {
        let mut property_type = PropertyType::complex(schema.qualify(&complex.name), complex.open)
            .with_description(description(&complex.annotations))
            .with_annotations(complex.annotations.clone());
        for member in &complex.properties {
            let mut built = ComplexMember::new(
                &member.name,
                self.property_type(registry, &member.type_name, member.collection)?,
            )
            .nullable(member.nullable);
            built.annotations = member.annotations.clone();
            property_type = property_type.with_member(built);
        }
        Ok(property_type)
    }

    // -- pass 4 -------------------------------------------------------------

    fn apply_entity_type(
        &self,
        registry: &mut ModelRegistry,
        item: &EntityTypeItem,
    ) -> Result<(), CsdlError> {
        let key = match item.key.as_slice() {
            [] => None,
            [single] => Some(single.as_str()),
            _ => {
                return Err(ModelError::NotYetSupported(format!(
                    "composite primary key on entity type {}",
                    item.name
                ))
                .into());
            }
        };

        let mut properties = Vec::with_capacity(item.properties.len());
        for property in &item.properties {
            properties.push(match property {
                PropertyItem::Structural(p) => {
                    let mut built = EntityProperty::new(
                        &p.name,
                        self.property_type(registry, &p.type_name, p.collection)?,
                    )
                    .nullable(p.nullable)
                    .with_facets(p.facets.clone())
                    .with_annotations(p.annotations.clone());
                    if key == Some(p.name.as_str()) {
                        built = built.read_only(true).with_json_name(KEY_JSON_NAME);
                    }
                    Property::Entity(built)
                }
                PropertyItem::Navigation(nav) => {
                    // Navigation targets are held by short name.
                    let target = registry
                        .entity_type_or_err(&self.resolve_alias(&nav.type_name))?
                        .name()
                        .to_string();
                    let mut built = NavigationProperty::new(&nav.name, target)
                        .nullable(nav.nullable)
                        .with_annotations(nav.annotations.clone());
                    if let Some(partner) = &nav.partner {
                        built = built.with_inverse(partner);
                    }
                    if nav.collection {
                        Property::ToMany(built)
                    } else {
                        Property::ToOne(built)
                    }
                }
            });
        }

        let entity_type = registry.entity_type_mut(&item.name)?;
        for property in properties {
            entity_type.register_property(property)?;
        }
        if let Some(key) = key {
            entity_type.set_primary_key(PrimaryKey::single(key))?;
        }
        Ok(())
    }

    // -- pass 5 -------------------------------------------------------------

    fn apply_container(&self, registry: &mut ModelRegistry) -> Result<(), CsdlError> {
        let Some((schema, container)) = self.container() else {
            return Ok(());
        };
        let mut info = ContainerInfo {
            namespace: schema.namespace.clone(),
            name: container.name.clone(),
            reference: self.entity_container.clone(),
            annotations: container.annotations.clone(),
            ..ContainerInfo::default()
        };
        for set in &container.entity_sets {
            let entity_type = registry
                .entity_type_or_err(&self.resolve_alias(&set.entity_type))?
                .name()
                .to_string();
            registry.register_container(&set.name, &entity_type)?;
            info.entity_sets.insert(
                set.name.clone(),
                EntitySetInfo {
                    entity_type: set.entity_type.clone(),
                    navigation_bindings: set.navigation_bindings.clone(),
                    annotations: set.annotations.clone(),
                },
            );
        }
        registry.set_container_info(info);
        Ok(())
    }

    /// Whether any property or member type reference is qualified with
    /// `alias`.
    fn references_alias(&self, alias: &str) -> bool {
        let uses = |name: &str| split_qualified(name).0 == Some(alias);
        self.schemas
            .iter()
            .flat_map(|schema| &schema.items)
            .any(|item| match item {
                SchemaItem::EntityType(entity_type) => {
                    entity_type.properties.iter().any(|property| match property {
                        PropertyItem::Structural(p) => uses(&p.type_name),
                        PropertyItem::Navigation(nav) => uses(&nav.type_name),
                    })
                }
                SchemaItem::ComplexType(complex) => {
                    complex.properties.iter().any(|member| uses(&member.type_name))
                }
                _ => false,
            })
    }
}

const fn entity_types(item: &SchemaItem) -> Option<&EntityTypeItem> {
    match item {
        SchemaItem::EntityType(entity_type) => Some(entity_type),
        _ => None,
    }
}

const fn complex_types(item: &SchemaItem) -> Option<&ComplexTypeItem> {
    match item {
        SchemaItem::ComplexType(complex) => Some(complex),
        _ => None,
    }
}

fn description(annotations: &Annotations) -> String {
    annotations
        .get(DESCRIPTION_TERM)
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn apply(json: serde_json::Value) -> Result<ModelRegistry, CsdlError> {
        let mut registry = ModelRegistry::new();
        CsdlDocument::from_json(&json)?.apply_to(&mut registry)?;
        Ok(registry)
    }

    #[test]
    fn single_key_is_read_only_with_the_payload_json_name() {
        let registry = apply(json!({
            "x": {
                "Sensor": {
                    "$Kind": "EntityType",
                    "$Key": ["id"],
                    "id": {"$Type": "Edm.Int64"},
                    "name": {"$Nullable": true}
                }
            }
        }))
        .unwrap();
        let sensor = registry.entity_type("x.Sensor").unwrap();
        let id = sensor.property("id").and_then(Property::as_entity).unwrap();
        assert!(id.is_read_only());
        assert!(id.is_key_part());
        assert_eq!(id.json_name(), KEY_JSON_NAME);
        assert!(sensor.property("@iot.id").is_some());
        assert!(!sensor.property("name").unwrap().is_read_only());
    }

    #[test]
    fn composite_keys_are_not_yet_supported() {
        let err = apply(json!({
            "x": {
                "Pair": {
                    "$Kind": "EntityType",
                    "$Key": ["a", "b"],
                    "a": {},
                    "b": {}
                }
            }
        }))
        .unwrap_err();
        assert!(matches!(err, CsdlError::Model(ModelError::NotYetSupported(_))));
    }

    #[test]
    fn complex_types_may_refer_forward() {
        let registry = apply(json!({
            "x": {
                "Outer": {"$Kind": "ComplexType", "inner": {"$Type": "x.Inner"}},
                "Inner": {"$Kind": "ComplexType", "$OpenType": true, "v": {"$Type": "Edm.Int32"}}
            }
        }))
        .unwrap();
        let outer = registry.property_type("x.Outer").unwrap();
        assert_eq!(outer.members()[0].property_type.name(), "x.Inner");
        assert!(registry.property_type("x.Inner").unwrap().is_open());
    }

    #[test]
    fn unresolvable_complex_member_is_unknown_type() {
        let err = apply(json!({
            "x": {"Outer": {"$Kind": "ComplexType", "inner": {"$Type": "x.Missing"}}}
        }))
        .unwrap_err();
        assert!(matches!(err, CsdlError::Model(ModelError::UnknownType(name)) if name == "x.Missing"));
    }

    #[test]
    fn type_definition_must_alias_a_primitive() {
        let err = apply(json!({
            "x": {"Code": {"$Kind": "TypeDefinition", "$UnderlyingType": "x.Other"}}
        }))
        .unwrap_err();
        assert!(matches!(err, CsdlError::Malformed { .. }));
    }

    #[test]
    fn descriptions_come_from_the_core_annotation() {
        let registry = apply(json!({
            "x": {
                "Code": {
                    "$Kind": "TypeDefinition",
                    "$UnderlyingType": "Edm.String",
                    "@Core.Description": "A short code"
                }
            }
        }))
        .unwrap();
        assert_eq!(registry.property_type("x.Code").unwrap().description(), "A short code");
        assert!(registry.data_models().contains("x"));
    }

    #[test]
    fn alias_qualified_references_resolve() {
        let registry = apply(json!({
            "$EntityContainer": "o.Container",
            "org.OGC": {
                "$Alias": "o",
                "Sensor": {
                    "$Kind": "EntityType",
                    "$Key": ["id"],
                    "id": {"$Type": "Edm.Int64"},
                    "Datastreams": {
                        "$Kind": "NavigationProperty",
                        "$Type": "o.Datastream",
                        "$Collection": true,
                        "$Partner": "Sensor"
                    }
                },
                "Datastream": {
                    "$Kind": "EntityType",
                    "$Key": ["id"],
                    "id": {"$Type": "Edm.Int64"},
                    "Sensor": {"$Kind": "NavigationProperty", "$Type": "o.Sensor", "$Partner": "Datastreams"}
                },
                "Container": {
                    "$Kind": "EntityContainer",
                    "Sensors": {"$Collection": true, "$Type": "o.Sensor"}
                }
            }
        }))
        .unwrap();
        registry.init_finalise().unwrap();
        assert_eq!(registry.entity_type_for_container("Sensors").unwrap().name(), "Sensor");
        let sensor = registry.entity_type("Sensor").unwrap();
        assert_eq!(sensor.to_many_properties()[0].target(), "Datastream");
    }
}
