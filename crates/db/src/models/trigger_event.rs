//! Trigger-event audit record model.

use serde::Serialize;
use sqlx::FromRow;
use vigil_core::types::{DbId, Timestamp};

/// A row from the `trigger_events` table.
///
/// Written exclusively by the dispatch pipeline: inserted with
/// `processed = false` before a delivery attempt, updated exactly once after
/// the attempt completes. Never deleted here; retention is external.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TriggerEvent {
    pub id: DbId,
    pub trigger_id: DbId,
    pub entity_id: DbId,
    pub change_type: String,
    pub old_data: Option<serde_json::Value>,
    pub new_data: Option<serde_json::Value>,
    pub processed: bool,
    pub response_status: Option<i32>,
    pub created_at: Timestamp,
    pub processed_at: Option<Timestamp>,
}
