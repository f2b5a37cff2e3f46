//! Change-capture domain types.
//!
//! A [`ChangeEvent`] is one replicated row mutation, already translated from
//! the wire format into the entity/change-kind vocabulary the rest of the
//! pipeline speaks. Events are transient; only matched events leave a durable
//! trace (as `trigger_events` rows).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::DbId;

/// Key-value view of a row snapshot, as decoded from the replication stream.
pub type RowData = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// EntityType
// ---------------------------------------------------------------------------

/// The logical table class a trigger watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Monitor,
    MonitorStatus,
    Tag,
}

impl EntityType {
    /// Resolve a source table name to its entity type.
    ///
    /// Returns `None` for tables outside the watched set; such changes are
    /// discarded before they reach the matcher.
    pub fn from_table(table: &str) -> Option<Self> {
        match table {
            "monitor" => Some(Self::Monitor),
            "monitor_statuses" => Some(Self::MonitorStatus),
            "tags" => Some(Self::Tag),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monitor => "monitor",
            Self::MonitorStatus => "monitor_status",
            Self::Tag => "tag",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ChangeType
// ---------------------------------------------------------------------------

/// The kind of row mutation a change event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Insert,
    Update,
    Delete,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ChangeEvent
// ---------------------------------------------------------------------------

/// One replicated row mutation.
///
/// Structural invariant: `insert` carries only `new_data`, `delete` only
/// `old_data`, and `update` carries both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub entity_type: EntityType,
    pub change_type: ChangeType,
    pub old_data: Option<RowData>,
    pub new_data: Option<RowData>,
    /// Original source table, retained for diagnostics.
    pub table_name: String,
}

impl ChangeEvent {
    /// The snapshot used for filter evaluation and id extraction: the new
    /// state when present, otherwise the old one.
    pub fn snapshot(&self) -> Option<&RowData> {
        self.new_data.as_ref().or(self.old_data.as_ref())
    }

    /// The identifier of the changed entity, when the snapshot carries an
    /// integer `id` field.
    pub fn entity_id(&self) -> Option<DbId> {
        self.snapshot()?.get("id")?.as_i64()
    }
}

// ---------------------------------------------------------------------------
// FilterCondition
// ---------------------------------------------------------------------------

/// A conjunction of equality constraints over a row snapshot.
///
/// Each entry requires the named field to be present with exactly the given
/// literal value. An empty condition matches every snapshot. The `BTreeMap`
/// keeps iteration and serialization order deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterCondition(pub BTreeMap<String, serde_json::Value>);

impl FilterCondition {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Evaluate the condition against a snapshot.
    pub fn matches(&self, data: &RowData) -> bool {
        self.0
            .iter()
            .all(|(field, expected)| data.get(field) == Some(expected))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
