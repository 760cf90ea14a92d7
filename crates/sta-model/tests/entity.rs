//! Entity values, identity, navigation loading and the JSON codec.

mod common;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use pretty_assertions::assert_eq;
use serde_json::json;
use sta_model::{
    Entity, EntityDecoder, Expand, ExpandItem, ModelError, QueryBuilder, ServiceError, Session,
    Value, encode_entity,
};

use common::session;

fn hash_of(entity: &Entity) -> u64 {
    let mut hasher = DefaultHasher::new();
    entity.hash(&mut hasher);
    hasher.finish()
}

#[test]
fn equality_only_looks_at_the_primary_key() {
    let (mock, _) = session();
    let thing = mock.entity_type("Thing");
    let a = Entity::new(thing.clone()).with("id", 1_i64).unwrap().with("name", "a").unwrap();
    let b = Entity::new(thing.clone()).with("id", 1_i64).unwrap().with("name", "b").unwrap();
    let c = Entity::new(thing).with("id", 2_i64).unwrap().with("name", "a").unwrap();

    assert_eq!(a, b);
    assert_eq!(hash_of(&a), hash_of(&b));
    assert_ne!(a, c);
}

#[test]
fn with_only_pk_equals_the_original() {
    let (mock, _) = session();
    let thing = Entity::new(mock.entity_type("Thing"))
        .with("id", 5_i64)
        .unwrap()
        .with("name", "weather station")
        .unwrap()
        .with("description", "roof")
        .unwrap();

    let reference = thing.with_only_pk();
    assert_eq!(reference, thing);
    assert_eq!(reference.get("id").unwrap(), Some(&Value::Int(5)));
    assert_eq!(reference.get("name").unwrap(), None);
}

#[test]
fn undeclared_properties_are_rejected() {
    let (mock, _) = session();
    let mut thing = Entity::new(mock.entity_type("Thing"));
    assert!(matches!(
        thing.set("colour", "red"),
        Err(ModelError::UnknownProperty { .. })
    ));
    assert!(matches!(
        thing.get("colour"),
        Err(ModelError::UnknownProperty { .. })
    ));
    assert!(matches!(
        thing.set("Datastreams", "x"),
        Err(ModelError::PropertyKind { .. })
    ));
}

#[test]
fn set_and_unset_track_explicit_assignment() {
    let (mock, _) = session();
    let mut thing = Entity::new(mock.entity_type("Thing"));
    thing.set("name", "a").unwrap();
    assert!(thing.is_set("name"));
    assert!(!thing.is_set("description"));

    thing.unset("name").unwrap();
    assert!(!thing.is_set("name"));
    assert_eq!(thing.get("name").unwrap(), None);
}

#[test]
fn setting_a_null_link_clears_the_marker() {
    let (mock, _) = session();
    let thing = Entity::new(mock.entity_type("Thing")).with("id", 1_i64).unwrap();
    let mut datastream = Entity::new(mock.entity_type("Datastream"));

    datastream.set_navigation_entity("Thing", Some(thing)).unwrap();
    assert!(datastream.is_set("Thing"));
    datastream.set_navigation_entity("Thing", None).unwrap();
    assert!(!datastream.is_set("Thing"));
    assert!(datastream.navigation("Thing").is_none());
}

#[test]
fn path_uses_container_and_key_literal() {
    let (mock, _) = session();
    let thing = Entity::new(mock.entity_type("Thing")).with("id", 7_i64).unwrap();
    assert_eq!(thing.path().unwrap(), "Things(7)");
    assert_eq!(thing.to_string(), "Thing(7)");

    let unsaved = Entity::new(mock.entity_type("Thing"));
    assert!(matches!(unsaved.path(), Err(ModelError::MissingKey(_))));
}

#[test]
fn to_one_navigation_loads_once_and_caches() {
    let (mock, shared) = session();
    mock.route("Datastreams(7)/Thing", 200, json!({"@iot.id": 1, "name": "station"}));
    let mut datastream = Entity::new(mock.entity_type("Datastream"))
        .with_session(shared)
        .with("id", 7_i64)
        .unwrap();

    let thing = datastream.navigation_entity("Thing", true).unwrap().unwrap();
    assert_eq!(thing.get("name").unwrap(), Some(&Value::from("station")));
    datastream.navigation_entity("Thing", true).unwrap().unwrap();
    assert_eq!(mock.request_count(), 1);
    // Loaded links are not explicit assignments.
    assert!(!datastream.is_set("Thing"));
}

#[test]
fn to_one_navigation_without_auto_load_does_not_fetch() {
    let (mock, shared) = session();
    let mut datastream = Entity::new(mock.entity_type("Datastream"))
        .with_session(shared)
        .with("id", 7_i64)
        .unwrap();
    assert!(datastream.navigation_entity("Thing", false).unwrap().is_none());
    assert_eq!(mock.request_count(), 0);
}

#[test]
fn absent_to_one_navigation_is_none() {
    let (mock, shared) = session();
    mock.route("Datastreams(8)/Thing", 404, serde_json::Value::Null);
    mock.route("Datastreams(9)/Thing", 204, serde_json::Value::Null);
    for id in [8_i64, 9] {
        let mut datastream = Entity::new(mock.entity_type("Datastream"))
            .with_session(shared.clone())
            .with("id", id)
            .unwrap();
        assert!(datastream.navigation_entity("Thing", true).unwrap().is_none());
    }
}

#[test]
fn absent_to_one_answer_is_remembered() {
    let (mock, shared) = session();
    mock.route("Datastreams(8)/Thing", 404, serde_json::Value::Null);
    let mut datastream = Entity::new(mock.entity_type("Datastream"))
        .with_session(shared)
        .with("id", 8_i64)
        .unwrap();

    assert!(datastream.navigation_entity("Thing", true).unwrap().is_none());
    assert!(datastream.navigation_entity("Thing", true).unwrap().is_none());
    assert_eq!(mock.request_count(), 1);

    // Unsetting forgets the answer, so the next access asks again.
    datastream.unset("Thing").unwrap();
    assert!(datastream.navigation_entity("Thing", true).unwrap().is_none());
    assert_eq!(mock.request_count(), 2);
}

#[test]
fn failing_to_one_navigation_propagates() {
    let (mock, shared) = session();
    mock.route("Datastreams(7)/Thing", 500, json!({"message": "boom"}));
    let mut datastream = Entity::new(mock.entity_type("Datastream"))
        .with_session(shared)
        .with("id", 7_i64)
        .unwrap();
    let err = datastream.navigation_entity("Thing", true).unwrap_err();
    assert!(matches!(err, ServiceError::Status { status: 500, .. }));
}

#[test]
fn to_one_navigation_honours_the_loading_expand() {
    let (mock, shared) = session();
    mock.route(
        "Datastreams(7)/Thing?%24select=name",
        200,
        json!({"@iot.id": 1, "name": "station"}),
    );
    let mut datastream = Entity::new(mock.entity_type("Datastream"))
        .with_session(shared)
        .with("id", 7_i64)
        .unwrap();
    datastream.set_expand(Some(
        Expand::new().with_item(ExpandItem::new("Thing").select(["name"])),
    ));
    assert!(datastream.navigation_entity("Thing", true).unwrap().is_some());
}

#[test]
fn to_many_navigation_set_link_derives_from_parent() {
    let (mock, shared) = session();
    let mut thing = Entity::new(mock.entity_type("Thing"))
        .with_session(shared)
        .with("id", 1_i64)
        .unwrap();
    thing.set_expand(Some(
        Expand::new().with_item(ExpandItem::new("Datastreams").top(2)),
    ));

    let set = thing.navigation_set("Datastreams").unwrap();
    assert_eq!(set.entity_type().name(), "Datastream");
    assert_eq!(set.initial_link().unwrap(), "Things(1)/Datastreams?%24top=2");
    assert_eq!(set.parent().map(|(_, r)| r), Some("Datastreams"));
}

#[test]
fn decode_entity_with_inline_navigation() {
    let (mock, shared) = session();
    let thing_type = mock.entity_type("Thing");
    let json = json!({
        "@iot.id": 1,
        "@iot.selfLink": "http://example.org/v1.1/Things(1)",
        "name": "station",
        "properties": {"ignored": true},
        "Datastreams": [
            {
                "@iot.id": 7,
                "name": "temperature",
                "unitOfMeasurement": {"name": "degree Celsius", "symbol": "degC", "definition": "ucum:Cel"},
                "Thing": {"@iot.id": 1, "name": "station"}
            }
        ],
        "Datastreams@iot.count": 3,
        "Datastreams@iot.nextLink": "http://example.org/v1.1/Things(1)/Datastreams?$skip=1"
    });

    let mut thing = EntityDecoder::new(mock.registry())
        .with_session(shared)
        .decode_entity(&thing_type, &json)
        .unwrap();

    assert_eq!(thing.self_link(), Some("http://example.org/v1.1/Things(1)"));
    assert_eq!(thing.get("id").unwrap(), Some(&Value::Int(1)));
    assert!(!thing.is_set("name"));

    let set = thing.navigation_set("Datastreams").unwrap();
    assert_eq!(set.len(), 1);
    assert_eq!(set.count(), Some(3));
    assert_eq!(
        set.next_link(),
        Some("http://example.org/v1.1/Things(1)/Datastreams?$skip=1")
    );
    let datastream = &set.entities()[0];
    let uom = datastream.get("unitOfMeasurement").unwrap().unwrap();
    assert_eq!(
        uom.as_complex().unwrap().get("symbol"),
        Some(&Value::from("degC"))
    );
    assert!(datastream.navigation("Thing").and_then(|n| n.as_entity()).is_some());
}

#[test]
fn decode_rejects_undeclared_members_of_closed_complex_types() {
    let (mock, _) = session();
    let json = json!({
        "@iot.id": 7,
        "unitOfMeasurement": {"name": "degree Celsius", "colour": "red"}
    });
    let err = EntityDecoder::new(mock.registry())
        .decode_entity(&mock.entity_type("Datastream"), &json)
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Model(ModelError::InvalidValue { .. })
    ));
}

#[test]
fn decode_rejects_non_objects() {
    let (mock, _) = session();
    let err = EntityDecoder::new(mock.registry())
        .decode_entity(&mock.entity_type("Thing"), &json!([1, 2]))
        .unwrap_err();
    assert!(matches!(err, ServiceError::Decode(_)));
}

#[test]
fn encode_writes_set_properties_and_references() {
    let (mock, _) = session();
    let registry = mock.registry();
    let uom = registry
        .property_type(sta_model::types::UNIT_OF_MEASUREMENT)
        .unwrap()
        .new_complex_value()
        .unwrap()
        .with("name", "degree Celsius")
        .unwrap()
        .with("symbol", "degC")
        .unwrap();
    let thing = Entity::new(mock.entity_type("Thing"))
        .with("id", 1_i64)
        .unwrap()
        .with("name", "station")
        .unwrap();

    let mut datastream = Entity::new(mock.entity_type("Datastream"))
        .with("name", "temperature")
        .unwrap()
        .with("unitOfMeasurement", uom)
        .unwrap();
    datastream.set_navigation_entity("Thing", Some(thing)).unwrap();

    assert_eq!(
        encode_entity(&datastream),
        json!({
            "name": "temperature",
            "unitOfMeasurement": {"name": "degree Celsius", "symbol": "degC"},
            "Thing": {"@iot.id": 1}
        })
    );
}

#[test]
fn encode_writes_new_linked_entities_in_full() {
    let (mock, _) = session();
    let thing = Entity::new(mock.entity_type("Thing")).with("name", "new station").unwrap();
    let mut datastream = Entity::new(mock.entity_type("Datastream"))
        .with("name", "temperature")
        .unwrap();
    datastream.set_navigation_entity("Thing", Some(thing)).unwrap();

    assert_eq!(
        encode_entity(&datastream),
        json!({"name": "temperature", "Thing": {"name": "new station"}})
    );
}
