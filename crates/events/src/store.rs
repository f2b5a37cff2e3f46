//! Persistence seam for the event pipeline.
//!
//! [`EventStore`] abstracts the two tables the pipeline touches -- trigger
//! definitions (read) and trigger events (written) -- so the processor can be
//! exercised without a database. Production code uses [`PgEventStore`];
//! [`MemoryEventStore`] backs tests and ephemeral runs.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use vigil_core::types::DbId;
use vigil_db::models::{Trigger, TriggerEvent};
use vigil_db::repositories::{TriggerEventRepo, TriggerRepo};
use vigil_db::DbPool;

/// Storage operations required by the matcher and the dispatcher.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Active triggers eligible for the given entity type and change kind,
    /// in a stable order.
    async fn candidate_triggers(
        &self,
        entity_type: &str,
        change_type: &str,
    ) -> Result<Vec<Trigger>, sqlx::Error>;

    /// Persist an unprocessed audit record. This is the pipeline's
    /// durability point: it happens before any delivery attempt.
    async fn record_event(
        &self,
        trigger_id: DbId,
        entity_id: DbId,
        change_type: &str,
        old_data: Option<&serde_json::Value>,
        new_data: Option<&serde_json::Value>,
    ) -> Result<TriggerEvent, sqlx::Error>;

    /// Mark a record's single delivery attempt as completed.
    async fn complete_event(&self, event_id: DbId, response_status: i32)
        -> Result<(), sqlx::Error>;
}

// ---------------------------------------------------------------------------
// PgEventStore
// ---------------------------------------------------------------------------

/// PostgreSQL-backed store delegating to the repositories.
pub struct PgEventStore {
    pool: DbPool,
}

impl PgEventStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn candidate_triggers(
        &self,
        entity_type: &str,
        change_type: &str,
    ) -> Result<Vec<Trigger>, sqlx::Error> {
        TriggerRepo::find_eligible(&self.pool, entity_type, change_type).await
    }

    async fn record_event(
        &self,
        trigger_id: DbId,
        entity_id: DbId,
        change_type: &str,
        old_data: Option<&serde_json::Value>,
        new_data: Option<&serde_json::Value>,
    ) -> Result<TriggerEvent, sqlx::Error> {
        TriggerEventRepo::insert(&self.pool, trigger_id, entity_id, change_type, old_data, new_data)
            .await
    }

    async fn complete_event(
        &self,
        event_id: DbId,
        response_status: i32,
    ) -> Result<(), sqlx::Error> {
        TriggerEventRepo::mark_processed(&self.pool, event_id, response_status).await
    }
}

// ---------------------------------------------------------------------------
// MemoryEventStore
// ---------------------------------------------------------------------------

/// In-memory store for tests and ephemeral runs.
///
/// Mirrors the eligibility semantics of the SQL query: active triggers with
/// an exact entity-type match whose `change_types` array contains the change
/// kind, ordered by id.
#[derive(Default)]
pub struct MemoryEventStore {
    triggers: Mutex<Vec<Trigger>>,
    events: Mutex<Vec<TriggerEvent>>,
    next_event_id: AtomicI64,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self {
            triggers: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
            next_event_id: AtomicI64::new(1),
        }
    }

    pub fn add_trigger(&self, trigger: Trigger) {
        let mut triggers = self.triggers.lock().expect("trigger lock poisoned");
        triggers.push(trigger);
        triggers.sort_by_key(|t| t.id);
    }

    /// Snapshot of the recorded events.
    pub fn events(&self) -> Vec<TriggerEvent> {
        self.events.lock().expect("event lock poisoned").clone()
    }

    /// Convenience constructor for store-backed tests.
    pub fn test_trigger(
        id: DbId,
        name: &str,
        entity_type: &str,
        change_types: serde_json::Value,
        filter_condition: Option<serde_json::Value>,
        endpoint: &str,
        is_active: bool,
    ) -> Trigger {
        let now = Utc::now();
        Trigger {
            id,
            name: name.into(),
            entity_type: entity_type.into(),
            change_types,
            filter_condition,
            endpoint: endpoint.into(),
            is_active,
            created_at: now,
            updated_at: now,
        }
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn candidate_triggers(
        &self,
        entity_type: &str,
        change_type: &str,
    ) -> Result<Vec<Trigger>, sqlx::Error> {
        let triggers = self.triggers.lock().expect("trigger lock poisoned");
        Ok(triggers
            .iter()
            .filter(|t| {
                t.is_active
                    && t.entity_type == entity_type
                    && t.change_types
                        .as_array()
                        .is_some_and(|kinds| kinds.iter().any(|k| k == change_type))
            })
            .cloned()
            .collect())
    }

    async fn record_event(
        &self,
        trigger_id: DbId,
        entity_id: DbId,
        change_type: &str,
        old_data: Option<&serde_json::Value>,
        new_data: Option<&serde_json::Value>,
    ) -> Result<TriggerEvent, sqlx::Error> {
        let event = TriggerEvent {
            id: self.next_event_id.fetch_add(1, Ordering::SeqCst),
            trigger_id,
            entity_id,
            change_type: change_type.to_string(),
            old_data: old_data.cloned(),
            new_data: new_data.cloned(),
            processed: false,
            response_status: None,
            created_at: Utc::now(),
            processed_at: None,
        };
        self.events
            .lock()
            .expect("event lock poisoned")
            .push(event.clone());
        Ok(event)
    }

    async fn complete_event(
        &self,
        event_id: DbId,
        response_status: i32,
    ) -> Result<(), sqlx::Error> {
        let mut events = self.events.lock().expect("event lock poisoned");
        if let Some(event) = events.iter_mut().find(|e| e.id == event_id) {
            event.processed = true;
            event.response_status = Some(response_status);
            event.processed_at = Some(Utc::now());
        }
        Ok(())
    }
}
