//! End-to-end pipeline tests over the in-memory store and a loopback
//! webhook receiver.
//!
//! Each test wires an [`EventProcessor`] to a real HTTP endpoint bound on
//! `127.0.0.1:0` so the durability ordering (record first, deliver second,
//! update last) is observable from the receiving side.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;

use vigil_core::change::{ChangeEvent, ChangeType, EntityType};
use vigil_events::{EventProcessor, MemoryEventStore, FAILURE_STATUS};

/// Shared state of the loopback webhook receiver.
struct Hook {
    /// The store the processor writes to, so the handler can observe what is
    /// durable at the moment a request arrives.
    store: Arc<MemoryEventStore>,
    hits: AtomicUsize,
    bodies: Mutex<Vec<serde_json::Value>>,
    /// Unprocessed record count seen at each request's arrival.
    pending_at_receipt: Mutex<Vec<usize>>,
    respond_with: StatusCode,
}

impl Hook {
    fn new(store: Arc<MemoryEventStore>, respond_with: StatusCode) -> Arc<Self> {
        Arc::new(Self {
            store,
            hits: AtomicUsize::new(0),
            bodies: Mutex::new(Vec::new()),
            pending_at_receipt: Mutex::new(Vec::new()),
            respond_with,
        })
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn receive(State(hook): State<Arc<Hook>>, Json(body): Json<serde_json::Value>) -> StatusCode {
    hook.hits.fetch_add(1, Ordering::SeqCst);
    let pending = hook.store.events().iter().filter(|e| !e.processed).count();
    hook.pending_at_receipt.lock().unwrap().push(pending);
    hook.bodies.lock().unwrap().push(body);
    hook.respond_with
}

/// Serve the hook on an ephemeral port and return its URL.
async fn spawn_receiver(hook: Arc<Hook>) -> String {
    let app = Router::new().route("/hook", post(receive)).with_state(hook);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/hook")
}

/// A loopback URL nothing is listening on.
fn refused_endpoint() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}/hook")
}

fn monitor_insert(new_data: serde_json::Value) -> ChangeEvent {
    ChangeEvent {
        entity_type: EntityType::Monitor,
        change_type: ChangeType::Insert,
        old_data: None,
        new_data: Some(new_data.as_object().unwrap().clone()),
        table_name: "monitor".into(),
    }
}

#[tokio::test]
async fn insert_event_flows_end_to_end() {
    let store = Arc::new(MemoryEventStore::new());
    let hook = Hook::new(Arc::clone(&store), StatusCode::OK);
    let endpoint = spawn_receiver(Arc::clone(&hook)).await;

    store.add_trigger(MemoryEventStore::test_trigger(
        1,
        "monitor-inserts",
        "monitor",
        json!(["insert"]),
        None,
        &endpoint,
        true,
    ));

    let processor = EventProcessor::new(store.clone());
    processor
        .process_change_event(&monitor_insert(json!({"id": 7, "name": "n1"})))
        .await;

    // Exactly one audit record, resolved with the observed status.
    let events = store.events();
    assert_eq!(events.len(), 1);
    let record = &events[0];
    assert_eq!(record.trigger_id, 1);
    assert_eq!(record.entity_id, 7);
    assert_eq!(record.change_type, "insert");
    assert!(record.processed);
    assert_eq!(record.response_status, Some(200));
    assert!(record.processed_at.is_some());
    assert!(record.old_data.is_none());
    assert_eq!(record.new_data.as_ref().unwrap()["name"], "n1");

    // Exactly one POST, carrying the notification payload.
    assert_eq!(hook.hits(), 1);
    let bodies = hook.bodies.lock().unwrap();
    assert_eq!(bodies[0]["trigger_name"], "monitor-inserts");
    assert_eq!(bodies[0]["entity_type"], "monitor");
    assert_eq!(bodies[0]["entity_id"], 7);
    assert_eq!(bodies[0]["change_type"], "insert");
    assert_eq!(bodies[0]["new_data"]["id"], 7);

    // The record was already durable, and still unresolved, when the
    // request arrived.
    assert_eq!(*hook.pending_at_receipt.lock().unwrap(), vec![1]);
}

#[tokio::test]
async fn unmatched_event_leaves_no_trace() {
    let store = Arc::new(MemoryEventStore::new());
    let hook = Hook::new(Arc::clone(&store), StatusCode::OK);
    let endpoint = spawn_receiver(Arc::clone(&hook)).await;

    // Wrong entity type and wrong change kind for the event below.
    store.add_trigger(MemoryEventStore::test_trigger(
        1,
        "tag-deletes",
        "tag",
        json!(["delete"]),
        None,
        &endpoint,
        true,
    ));

    let processor = EventProcessor::new(store.clone());
    let event = ChangeEvent {
        entity_type: EntityType::Monitor,
        change_type: ChangeType::Update,
        old_data: Some(json!({"id": 3}).as_object().unwrap().clone()),
        new_data: Some(json!({"id": 3, "name": "renamed"}).as_object().unwrap().clone()),
        table_name: "monitor".into(),
    };
    processor.process_change_event(&event).await;

    assert!(store.events().is_empty());
    assert_eq!(hook.hits(), 0);
}

#[tokio::test]
async fn transport_failure_is_recorded_as_the_fixed_status() {
    let store = Arc::new(MemoryEventStore::new());
    store.add_trigger(MemoryEventStore::test_trigger(
        1,
        "unreachable",
        "monitor",
        json!(["insert"]),
        None,
        &refused_endpoint(),
        true,
    ));

    let processor = EventProcessor::new(store.clone());
    processor
        .process_change_event(&monitor_insert(json!({"id": 1})))
        .await;

    let events = store.events();
    assert_eq!(events.len(), 1);
    assert!(events[0].processed);
    assert_eq!(events[0].response_status, Some(FAILURE_STATUS));
}

#[tokio::test]
async fn non_success_response_is_recorded_verbatim() {
    let store = Arc::new(MemoryEventStore::new());
    let hook = Hook::new(Arc::clone(&store), StatusCode::SERVICE_UNAVAILABLE);
    let endpoint = spawn_receiver(Arc::clone(&hook)).await;

    store.add_trigger(MemoryEventStore::test_trigger(
        1,
        "flaky-consumer",
        "monitor",
        json!(["insert"]),
        None,
        &endpoint,
        true,
    ));

    let processor = EventProcessor::new(store.clone());
    processor
        .process_change_event(&monitor_insert(json!({"id": 1})))
        .await;

    let events = store.events();
    assert_eq!(events.len(), 1);
    assert!(events[0].processed);
    assert_eq!(events[0].response_status, Some(503));
    assert_eq!(hook.hits(), 1);
}

#[tokio::test]
async fn missing_entity_id_abandons_the_pair_without_a_record() {
    let store = Arc::new(MemoryEventStore::new());
    let hook = Hook::new(Arc::clone(&store), StatusCode::OK);
    let endpoint = spawn_receiver(Arc::clone(&hook)).await;

    store.add_trigger(MemoryEventStore::test_trigger(
        1,
        "monitor-inserts",
        "monitor",
        json!(["insert"]),
        None,
        &endpoint,
        true,
    ));

    let processor = EventProcessor::new(store.clone());
    processor
        .process_change_event(&monitor_insert(json!({"name": "anonymous"})))
        .await;

    assert!(store.events().is_empty());
    assert_eq!(hook.hits(), 0);
}

#[tokio::test]
async fn one_failing_pair_does_not_block_the_others() {
    let store = Arc::new(MemoryEventStore::new());
    let hook = Hook::new(Arc::clone(&store), StatusCode::OK);
    let endpoint = spawn_receiver(Arc::clone(&hook)).await;

    store.add_trigger(MemoryEventStore::test_trigger(
        1,
        "dead-endpoint",
        "monitor",
        json!(["insert"]),
        None,
        &refused_endpoint(),
        true,
    ));
    store.add_trigger(MemoryEventStore::test_trigger(
        2,
        "live-endpoint",
        "monitor",
        json!(["insert"]),
        None,
        &endpoint,
        true,
    ));

    let processor = EventProcessor::new(store.clone());
    processor
        .process_change_event(&monitor_insert(json!({"id": 42})))
        .await;

    // One record per matched trigger, each resolved independently.
    let events = store.events();
    assert_eq!(events.len(), 2);
    let by_trigger =
        |id| events.iter().find(|e| e.trigger_id == id).expect("record for trigger");
    assert_eq!(by_trigger(1).response_status, Some(FAILURE_STATUS));
    assert_eq!(by_trigger(2).response_status, Some(200));
    assert!(events.iter().all(|e| e.processed));
    assert_eq!(hook.hits(), 1);
}

#[tokio::test]
async fn filtered_out_candidate_leaves_no_trace() {
    let store = Arc::new(MemoryEventStore::new());
    let hook = Hook::new(Arc::clone(&store), StatusCode::OK);
    let endpoint = spawn_receiver(Arc::clone(&hook)).await;

    store.add_trigger(MemoryEventStore::test_trigger(
        1,
        "active-monitors-only",
        "monitor",
        json!(["insert"]),
        Some(json!({"status": "active"})),
        &endpoint,
        true,
    ));

    let processor = EventProcessor::new(store.clone());
    processor
        .process_change_event(&monitor_insert(json!({"id": 1, "status": "paused"})))
        .await;

    assert!(store.events().is_empty());
    assert_eq!(hook.hits(), 0);
}
