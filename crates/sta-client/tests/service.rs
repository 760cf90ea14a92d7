//! Service operations against in-memory transports.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;
use serde_json::json;
use sta_client::{HttpTransport, PubSubError, PubSubTransport, Service, fetch_metadata, load_model};
use sta_config::StaConfig;
use sta_model::{Method, QueryBuilder, Request, Response, ServiceError, Session, Value};

const BASE: &str = "http://example.org/v1.1";
const METADATA: &str = include_str!("fixtures/metadata.json");

#[derive(Default)]
struct MockHttp {
    routes: Mutex<HashMap<(Method, String), Response>>,
    requests: Mutex<Vec<Request>>,
}

impl MockHttp {
    fn with_metadata() -> Arc<Self> {
        let http = Arc::new(Self::default());
        http.route_raw(Method::Get, "$metadata?$format=json", Response::new(200, METADATA));
        http
    }

    fn route_raw(&self, method: Method, path: &str, response: Response) {
        self.routes
            .lock()
            .unwrap()
            .insert((method, format!("{BASE}/{path}")), response);
    }

    fn route(&self, method: Method, path: &str, status: u16, body: serde_json::Value) {
        self.route_raw(method, path, Response::new(status, body.to_string()));
    }

    fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    fn last(&self) -> Request {
        self.requests().pop().unwrap()
    }
}

impl HttpTransport for MockHttp {
    fn send(&self, request: &Request) -> Result<Response, ServiceError> {
        self.requests.lock().unwrap().push(request.clone());
        self.routes
            .lock()
            .unwrap()
            .get(&(request.method, request.url.clone()))
            .cloned()
            .ok_or_else(|| ServiceError::Transport(format!("connection refused: {}", request.url)))
    }
}

#[derive(Default)]
struct MockBroker {
    calls: Mutex<Vec<String>>,
}

impl MockBroker {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl PubSubTransport for MockBroker {
    fn subscribe(&self, topics: &[String]) -> Result<(), PubSubError> {
        self.calls.lock().unwrap().push(format!("subscribe {}", topics.join(" ")));
        Ok(())
    }

    fn unsubscribe(&self, topics: &[String]) -> Result<(), PubSubError> {
        self.calls.lock().unwrap().push(format!("unsubscribe {}", topics.join(" ")));
        Ok(())
    }
}

fn config() -> StaConfig {
    let mut config = StaConfig::default();
    config.service.base_url = format!("{BASE}/");
    config
}

fn connect_with(config: &StaConfig) -> (Arc<MockHttp>, Arc<MockBroker>, Arc<Service>) {
    let http = MockHttp::with_metadata();
    let broker = Arc::new(MockBroker::default());
    let service = Service::connect(config, http.clone(), broker.clone()).unwrap();
    (http, broker, service)
}

fn connect() -> (Arc<MockHttp>, Arc<MockBroker>, Arc<Service>) {
    connect_with(&config())
}

// ---------------------------------------------------------------------------
// Model loading
// ---------------------------------------------------------------------------

#[test]
fn connect_builds_the_model_from_the_schema_document() {
    let (http, _, service) = connect();
    assert_eq!(http.requests()[0].url, format!("{BASE}/$metadata?$format=json"));
    assert_eq!(service.base_url(), BASE);
    assert!(service.registry().is_finalised());

    let thing = service.registry().entity_type_for_container("Things").unwrap();
    assert_eq!(thing.name(), "Thing");
    let datastreams = thing.to_many_properties()[0].target_type().unwrap();
    assert_eq!(datastreams.container(), Some("Datastreams"));
}

#[test]
fn schema_round_trips_the_loaded_model() {
    let (_, _, service) = connect();
    let schema = service.schema();
    assert_eq!(schema.entity_container.as_deref(), Some("org.OGC.Container"));
    assert_eq!(load_model(&schema).unwrap().entity_types().len(), 2);
}

#[test]
fn connect_requires_a_base_url() {
    let http = MockHttp::with_metadata();
    let err = Service::connect(&StaConfig::default(), http.clone(), Arc::new(MockBroker::default()))
        .unwrap_err();
    assert!(matches!(err, ServiceError::Other(_)));
    assert!(http.requests().is_empty());
}

#[test]
fn metadata_status_errors_surface() {
    let http = MockHttp::default();
    http.route(Method::Get, "$metadata?$format=json", 500, json!({"message": "down"}));
    let err = fetch_metadata(&http, &format!("{BASE}/$metadata?$format=json")).unwrap_err();
    assert!(matches!(err, ServiceError::Status { status: 500, .. }));
}

#[test]
fn malformed_schema_documents_are_decode_errors() {
    let http = MockHttp::default();
    http.route(Method::Get, "$metadata?$format=json", 200, json!({"org.OGC": []}));
    let err = fetch_metadata(&http, &format!("{BASE}/$metadata?$format=json")).unwrap_err();
    assert!(matches!(err, ServiceError::Decode(_)));
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

#[test]
fn query_lists_through_the_transport() {
    let (http, _, service) = connect();
    http.route(
        Method::Get,
        "Things?%24top=2",
        200,
        json!({
            "@iot.nextLink": format!("{BASE}/Things?$top=2&$skip=2"),
            "value": [
                {"@iot.id": 1, "name": "roof"},
                {"@iot.id": 2, "name": "cellar"}
            ]
        }),
    );

    let set = service.query("Thing").unwrap().top(2).list().unwrap();
    assert_eq!(set.len(), 2);
    assert_eq!(set.next_link(), Some(format!("{BASE}/Things?$top=2&$skip=2").as_str()));
    let first = &set.entities()[0];
    assert_eq!(first.get("name").unwrap(), Some(&Value::from("roof")));
    assert!(first.session().is_some());
}

#[test]
fn count_by_default_is_applied_to_new_queries() {
    let mut config = config();
    config.service.count_by_default = true;
    let (_, _, service) = connect_with(&config);
    assert_eq!(
        service.query("Datastream").unwrap().url().unwrap(),
        format!("{BASE}/Datastreams?%24count=true")
    );
}

#[test]
fn get_fetches_by_key_and_maps_absence_to_none() {
    let (http, _, service) = connect();
    http.route(Method::Get, "Things(7)", 200, json!({"@iot.id": 7, "name": "mast"}));
    http.route(Method::Get, "Things(8)", 404, json!({"message": "not found"}));

    let thing = service.get("Thing", 7_i64).unwrap().unwrap();
    assert_eq!(thing.primary_key_values(), [Value::Int(7)]);
    assert!(service.get("Thing", 8_i64).unwrap().is_none());
    assert!(matches!(
        service.get("Nope", 1_i64),
        Err(ServiceError::Model(_))
    ));
}

#[test]
fn create_posts_set_properties_and_adopts_the_response() {
    let (http, _, service) = connect();
    http.route(
        Method::Post,
        "Things",
        201,
        json!({"@iot.id": 11, "@iot.selfLink": format!("{BASE}/Things(11)"), "name": "buoy"}),
    );

    let mut thing = service.entity("Thing").unwrap();
    thing.set("name", "buoy").unwrap();
    service.create(&mut thing).unwrap();

    let request = http.last();
    assert_eq!(request.method, Method::Post);
    assert_eq!(request.body, Some(json!({"name": "buoy"})));
    assert_eq!(thing.primary_key_values(), [Value::Int(11)]);
    assert_eq!(thing.path().unwrap(), "Things(11)");
    assert_eq!(thing.url().unwrap(), format!("{BASE}/Things(11)"));
}

#[test]
fn create_without_body_takes_the_location_header() {
    let (http, _, service) = connect();
    http.route_raw(
        Method::Post,
        "Things",
        Response::new(201, "").with_location(format!("{BASE}/Things(12)")),
    );

    let mut thing = service.entity("Thing").unwrap();
    thing.set("name", "pier").unwrap();
    service.create(&mut thing).unwrap();
    assert_eq!(thing.self_link(), Some(format!("{BASE}/Things(12)").as_str()));
    assert_eq!(thing.path().unwrap(), "Things(12)");
}

#[test]
fn update_patches_only_set_properties() {
    let (http, _, service) = connect();
    http.route(Method::Patch, "Things(3)", 200, serde_json::Value::Null);

    let mut thing = service.entity("Thing").unwrap();
    thing.set("id", 3_i64).unwrap();
    thing.set("description", "moved").unwrap();
    service.update(&thing).unwrap();

    let request = http.last();
    assert_eq!(request.method, Method::Patch);
    assert_eq!(request.url, format!("{BASE}/Things(3)"));
    // The key is read-only and never sent.
    assert_eq!(request.body, Some(json!({"description": "moved"})));
}

#[test]
fn delete_surfaces_status_errors() {
    let (http, _, service) = connect();
    http.route(Method::Delete, "Things(4)", 204, serde_json::Value::Null);
    http.route(Method::Delete, "Things(5)", 403, json!({"message": "forbidden"}));

    let mut thing = service.entity("Thing").unwrap();
    thing.set("id", 4_i64).unwrap();
    service.delete(&thing).unwrap();
    assert_eq!(http.last().method, Method::Delete);

    thing.set("id", 5_i64).unwrap();
    assert!(matches!(
        service.delete(&thing),
        Err(ServiceError::Status { status: 403, .. })
    ));
}

// ---------------------------------------------------------------------------
// Pub/sub
// ---------------------------------------------------------------------------

#[test]
fn two_handlers_share_one_network_subscription() {
    let (_, broker, service) = connect();
    let seen: Arc<Mutex<Vec<String>>> = Arc::default();
    let query = service
        .query("Thing")
        .unwrap()
        .select(["name"])
        .filter("name eq 'x'");

    let subscribe = |label: &'static str| {
        let seen = Arc::clone(&seen);
        service
            .subscribe(&query, move |entity| {
                let name = entity.get("name").unwrap().and_then(Value::as_str).unwrap_or_default().to_string();
                seen.lock().unwrap().push(format!("{label}:{name}"));
            })
            .unwrap()
    };
    let first = subscribe("a");
    let second = subscribe("b");

    // Filters are not allowed over pub/sub by default and are dropped.
    let topic = "v1.1/Things?$select=name";
    assert_eq!(broker.calls(), [format!("subscribe {topic}")]);
    assert_eq!(service.subscriptions().handler_count(topic), 2);

    assert_eq!(service.deliver(topic, r#"{"@iot.id": 1, "name": "roof"}"#), 2);
    assert_eq!(*seen.lock().unwrap(), ["a:roof", "b:roof"]);

    service.unsubscribe(first).unwrap();
    assert_eq!(broker.calls().len(), 1);
    service.unsubscribe(second).unwrap();
    assert_eq!(broker.calls().last().unwrap(), &format!("unsubscribe {topic}"));
    assert!(service.subscriptions().is_empty());
}

#[test]
fn topics_follow_configured_capabilities() {
    let mut config = config();
    config.pubsub.filter_allowed = true;
    config.pubsub.topic_prefix = "sta/".into();
    let (_, broker, service) = connect_with(&config);

    let query = service.query("Datastream").unwrap().filter("name eq 'x'");
    service.subscribe(&query, |_| {}).unwrap();
    assert_eq!(broker.calls(), ["subscribe sta/Datastreams?$filter=name eq 'x'"]);
}

#[test]
fn undecodable_messages_are_dropped() {
    let (_, _, service) = connect();
    let calls: Arc<Mutex<usize>> = Arc::default();
    let counter = Arc::clone(&calls);
    service
        .subscribe(&service.query("Thing").unwrap(), move |_| {
            *counter.lock().unwrap() += 1;
        })
        .unwrap();

    assert_eq!(service.deliver("v1.1/Things", "not json"), 1);
    assert_eq!(service.deliver("v1.1/Things", r#"{"@iot.id": "seven"}"#), 1);
    assert_eq!(*calls.lock().unwrap(), 0);

    service.deliver("v1.1/Things", r#"{"@iot.id": 7}"#);
    assert_eq!(*calls.lock().unwrap(), 1);
}

#[test]
fn resubscribe_replays_live_topics() {
    let (_, broker, service) = connect();
    service.subscribe(&service.query("Thing").unwrap(), |_| {}).unwrap();
    service.subscribe(&service.query("Datastream").unwrap(), |_| {}).unwrap();

    assert_eq!(service.subscriptions().resubscribe_all().unwrap(), 2);
    assert_eq!(
        broker.calls().last().unwrap(),
        "subscribe v1.1/Datastreams v1.1/Things"
    );
}
