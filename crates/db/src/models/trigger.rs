//! Trigger entity model.

use serde::Serialize;
use sqlx::FromRow;
use vigil_core::types::{DbId, Timestamp};

/// A row from the `triggers` table.
///
/// `change_types` is a JSONB array of change-kind strings; `filter_condition`
/// is an optional JSONB object of field → required literal value. Both are
/// kept as raw JSON here -- interpretation belongs to the matcher, which fails
/// closed on malformed conditions instead of failing row decoding.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Trigger {
    pub id: DbId,
    pub name: String,
    pub entity_type: String,
    pub change_types: serde_json::Value,
    pub filter_condition: Option<serde_json::Value>,
    pub endpoint: String,
    pub is_active: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
