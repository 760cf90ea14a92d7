//! Registry → document.
//!
//! The reverse of [`CsdlDocument::apply_to`]: custom property types become
//! type definitions, enumerations and complex types; entity types carry
//! their key and navigation partners; the container map becomes a single
//! entity container.
//!
//! What a document recorded on the registry when it was applied (schema
//! aliases and annotations, the container's name and annotations, each
//! declared entity set) is written back as it was. Entity sets without such
//! a record get navigation bindings derived from each navigation target's
//! container.

use sta_model::{
    Annotations, EntityType, ModelRegistry, Property, PropertyType, TypeKind,
};

use crate::apply::DESCRIPTION_TERM;
use crate::document::{
    ComplexTypeItem, CsdlDocument, DEFAULT_VERSION, EntityContainerItem, EntitySetItem,
    EntityTypeItem, EnumTypeItem, NavigationPropertyItem, PropertyItem, SchemaItem,
    StructuralProperty, TypeDefinitionItem, split_qualified, unwrap_collection, wrap_collection,
};

/// Name of the entity container written by [`CsdlDocument::fill_from`] for a
/// registry without a recorded container.
pub const CONTAINER_NAME: &str = "Container";

impl CsdlDocument {
    /// Describe everything in `registry` as a schema document.
    ///
    /// Types without a namespace are placed in `default_namespace`, as is
    /// the entity container.
    #[must_use]
    pub fn fill_from(registry: &ModelRegistry, default_namespace: &str) -> Self {
        let mut document = Self {
            version: DEFAULT_VERSION.to_string(),
            ..Self::default()
        };
        for model in registry.described_data_models() {
            let schema = document.schema_mut(&model.namespace);
            schema.alias.clone_from(&model.alias);
            schema.annotations.clone_from(&model.annotations);
        }

        // Type definitions, then enumerations, then complex types.
        let mut type_items: Vec<(u8, &str, SchemaItem)> = registry
            .custom_property_types()
            .iter()
            .filter_map(|property_type| {
                let (rank, item) = property_type_item(registry, property_type, default_namespace)?;
                let (namespace, _) = qualified_parts(property_type.name(), default_namespace);
                Some((rank, namespace, item))
            })
            .collect();
        type_items.sort_by_key(|(rank, ..)| *rank);
        for (_, namespace, item) in type_items {
            document.schema_mut(namespace).items.push(item);
        }

        for entity_type in registry.entity_types() {
            let namespace = entity_type.namespace().unwrap_or(default_namespace);
            let item = entity_type_item(registry, entity_type, default_namespace);
            document
                .schema_mut(namespace)
                .items
                .push(SchemaItem::EntityType(item));
        }

        let containers = registry.containers();
        let info = registry.container_info();
        if !containers.is_empty() || info.is_some() {
            let entity_sets = containers
                .iter()
                .map(|(name, entity_type)| {
                    match info.and_then(|info| info.entity_sets.get(name)) {
                        Some(declared) => EntitySetItem {
                            name: name.clone(),
                            entity_type: declared.entity_type.clone(),
                            navigation_bindings: declared.navigation_bindings.clone(),
                            annotations: declared.annotations.clone(),
                        },
                        None => EntitySetItem {
                            name: name.clone(),
                            entity_type: written_name(
                                registry,
                                &qualified_name(entity_type, default_namespace),
                            ),
                            navigation_bindings: derived_bindings(registry, entity_type),
                            annotations: Annotations::new(),
                        },
                    }
                })
                .collect();
            let (namespace, name, annotations) = info.map_or_else(
                || (default_namespace, CONTAINER_NAME, Annotations::new()),
                |info| (info.namespace.as_str(), info.name.as_str(), info.annotations.clone()),
            );
            document
                .schema_mut(namespace)
                .items
                .push(SchemaItem::EntityContainer(EntityContainerItem {
                    name: name.to_string(),
                    entity_sets,
                    annotations,
                }));
            document.entity_container = match info {
                Some(info) => info.reference.clone(),
                None => Some(format!("{namespace}.{name}")),
            };
        }

        tracing::debug!(schemas = document.schemas.len(), "filled schema document from registry");
        document
    }
}

fn qualified_parts<'a>(name: &'a str, default_namespace: &'a str) -> (&'a str, &'a str) {
    match split_qualified(name) {
        (Some(namespace), short) => (namespace, short),
        (None, short) => (default_namespace, short),
    }
}

fn derived_bindings(registry: &ModelRegistry, entity_type: &EntityType) -> Vec<(String, String)> {
    entity_type
        .navigation_properties()
        .into_iter()
        .filter_map(|nav| {
            let target = registry.entity_type(nav.target())?;
            Some((nav.name().to_string(), target.container()?.to_string()))
        })
        .collect()
}

/// A namespace-qualified type name the way the registry's documents refer
/// to it. Collection wrappers are kept.
fn written_name(registry: &ModelRegistry, qualified: &str) -> String {
    let (element, collection) = unwrap_collection(qualified);
    let written = match split_qualified(element) {
        (Some(namespace), short) => registry
            .data_model(namespace)
            .map_or_else(|| element.to_string(), |model| model.written_name(short)),
        (None, _) => element.to_string(),
    };
    wrap_collection(&written, collection)
}

fn qualified_name(entity_type: &EntityType, default_namespace: &str) -> String {
    format!(
        "{}.{}",
        entity_type.namespace().unwrap_or(default_namespace),
        entity_type.name()
    )
}

/// Annotations with the description added under the description term, if
/// it is not already there.
fn with_description(property_type: &PropertyType) -> Annotations {
    let mut annotations = property_type.annotations().clone();
    if !property_type.description().is_empty() && !annotations.contains_key(DESCRIPTION_TERM) {
        annotations.insert(
            DESCRIPTION_TERM.to_string(),
            serde_json::Value::String(property_type.description().to_string()),
        );
    }
    annotations
}

/// The schema item for a custom property type and its emission rank.
/// Primitive and collection types have no item of their own.
fn property_type_item(
    registry: &ModelRegistry,
    property_type: &PropertyType,
    default_namespace: &str,
) -> Option<(u8, SchemaItem)> {
    let (_, short) = qualified_parts(property_type.name(), default_namespace);
    let name = short.to_string();
    match property_type.kind() {
        TypeKind::Simple { underlying } => Some((
            0,
            SchemaItem::TypeDefinition(TypeDefinitionItem {
                name,
                underlying_type: underlying.name().to_string(),
                annotations: with_description(property_type),
            }),
        )),
        TypeKind::Enumeration {
            underlying,
            is_flags,
            members,
        } => Some((
            1,
            SchemaItem::EnumType(EnumTypeItem {
                name,
                underlying_type: underlying.name().to_string(),
                is_flags: *is_flags,
                members: members.clone(),
                annotations: with_description(property_type),
            }),
        )),
        TypeKind::Complex { members, open } => Some((
            2,
            SchemaItem::ComplexType(ComplexTypeItem {
                name,
                open: *open,
                properties: members
                    .iter()
                    .map(|member| {
                        let mut property = structural(
                            registry,
                            &member.name,
                            member.property_type.name(),
                            member.nullable,
                        );
                        property.annotations = member.annotations.clone();
                        property
                    })
                    .collect(),
                annotations: with_description(property_type),
            }),
        )),
        TypeKind::Primitive(_) | TypeKind::Collection(_) => None,
    }
}

fn structural(
    registry: &ModelRegistry,
    name: &str,
    type_name: &str,
    nullable: bool,
) -> StructuralProperty {
    let (element, collection) = unwrap_collection(type_name);
    let mut property = StructuralProperty::new(name, written_name(registry, element));
    property.collection = collection;
    property.nullable = nullable;
    property
}

fn entity_type_item(
    registry: &ModelRegistry,
    entity_type: &EntityType,
    default_namespace: &str,
) -> EntityTypeItem {
    let mut item = EntityTypeItem::new(entity_type.name());
    item.annotations = entity_type.annotations().clone();
    item.key = entity_type
        .primary_key()
        .map(|key| key.properties().to_vec())
        .unwrap_or_default();

    for property in entity_type.properties() {
        item.properties.push(match property {
            Property::Entity(p) => {
                let mut built =
                    structural(registry, p.name(), p.property_type().name(), p.is_nullable());
                built.facets = p.facets().clone();
                built.annotations = p.annotations().clone();
                PropertyItem::Structural(built)
            }
            Property::ToOne(nav) | Property::ToMany(nav) => {
                let target = registry.entity_type(nav.target()).map_or_else(
                    || format!("{default_namespace}.{}", nav.target()),
                    |target| written_name(registry, &qualified_name(&target, default_namespace)),
                );
                let mut built = NavigationPropertyItem::new(nav.name(), target);
                built.collection = matches!(property, Property::ToMany(_));
                built.nullable = nav.is_nullable();
                built.partner = nav.inverse().map(str::to_string);
                built.annotations = nav.annotations().clone();
                PropertyItem::Navigation(built)
            }
        });
    }
    item
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use pretty_assertions::assert_eq;
    use sta_model::{EntityProperty, NavigationProperty, PrimaryKey, Primitive};

    fn registry() -> ModelRegistry {
        let mut registry = ModelRegistry::new();
        let int = registry.property_type("Edm.Int64").unwrap();
        registry.register_property_type(
            PropertyType::simple("x.Code", Primitive::String).with_description("A short code"),
        );
        let code = registry.property_type("x.Code").unwrap();
        registry
            .register_entity_type(
                EntityType::new("Sensor")
                    .with_property(EntityProperty::new("id", int).nullable(false))
                    .with_property(EntityProperty::new("code", code))
                    .with_property(Property::ToMany(
                        NavigationProperty::new("Datastreams", "Datastream").with_inverse("Sensor"),
                    ))
                    .with_primary_key(PrimaryKey::single("id")),
            )
            .unwrap();
        registry.register_container("Sensors", "Sensor").unwrap();
        registry
    }

    #[test]
    fn types_without_namespace_use_the_default() {
        let doc = CsdlDocument::fill_from(&registry(), "org.OGC");
        assert_eq!(doc.entity_container.as_deref(), Some("org.OGC.Container"));
        let names: Vec<&str> = doc.schemas.iter().map(|s| s.namespace.as_str()).collect();
        assert_eq!(names, ["x", "org.OGC"]);

        let ogc = doc.schema("org.OGC").unwrap();
        let Some(SchemaItem::EntityType(sensor)) = ogc.item("Sensor") else {
            panic!("Sensor should be an entity type");
        };
        assert_eq!(sensor.key, ["id"]);
        let PropertyItem::Navigation(datastreams) = &sensor.properties[2] else {
            panic!("Datastreams should be a navigation property");
        };
        assert_eq!(datastreams.type_name, "org.OGC.Datastream");
        assert!(datastreams.collection);
        assert_eq!(datastreams.partner.as_deref(), Some("Sensor"));
    }

    #[test]
    fn descriptions_become_annotations() {
        let doc = CsdlDocument::fill_from(&registry(), "org.OGC");
        let Some(SchemaItem::TypeDefinition(code)) = doc.schema("x").unwrap().item("Code") else {
            panic!("Code should be a type definition");
        };
        assert_eq!(
            code.annotations.get(DESCRIPTION_TERM),
            Some(&serde_json::json!("A short code"))
        );
    }

    #[test]
    fn bindings_only_name_targets_with_a_container() {
        let doc = CsdlDocument::fill_from(&registry(), "org.OGC");
        let (_, container) = doc.container().unwrap();
        assert_eq!(container.entity_sets[0].name, "Sensors");
        assert_eq!(container.entity_sets[0].entity_type, "org.OGC.Sensor");
        assert!(container.entity_sets[0].navigation_bindings.is_empty());
    }

    #[test]
    fn collection_members_unwrap_their_element_type() {
        let mut registry = ModelRegistry::new();
        let tags = registry.property_type("Collection(Edm.String)").unwrap();
        registry.register_property_type(
            PropertyType::complex("x.Labels", true)
                .with_member(sta_model::ComplexMember::new("tags", Arc::clone(&tags))),
        );
        let doc = CsdlDocument::fill_from(&registry, "x");
        let Some(SchemaItem::ComplexType(labels)) = doc.schema("x").unwrap().item("Labels") else {
            panic!("Labels should be a complex type");
        };
        assert!(labels.open);
        assert_eq!(labels.properties[0].type_name, "Edm.String");
        assert!(labels.properties[0].collection);
        assert!(doc.entity_container.is_none());
    }
}
