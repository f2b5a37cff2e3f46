//! wal2json payload decoding.
//!
//! Translates one replication message payload -- a wal2json (format-version 1)
//! JSON document describing a committed transaction -- into typed
//! [`ChangeEvent`]s. Pure; no I/O.

use serde::Deserialize;

use vigil_core::change::{ChangeEvent, ChangeType, EntityType, RowData};

/// Top-level wal2json document: one committed transaction.
#[derive(Debug, Deserialize)]
struct WalMessage {
    #[serde(default)]
    change: Vec<WalChange>,
}

/// One row-level change within a transaction.
#[derive(Debug, Deserialize)]
struct WalChange {
    kind: String,
    table: String,
    #[serde(default)]
    columnnames: Vec<String>,
    #[serde(default)]
    columnvalues: Vec<serde_json::Value>,
    oldkeys: Option<OldKeys>,
}

/// Replica-identity columns of the pre-change row (updates and deletes).
#[derive(Debug, Default, Deserialize)]
struct OldKeys {
    #[serde(default)]
    keynames: Vec<String>,
    #[serde(default)]
    keyvalues: Vec<serde_json::Value>,
}

/// Decode one replication payload into change events.
///
/// Entries for unwatched tables and unrecognized kinds are dropped. A payload
/// that is not valid wal2json is an error; the caller skips the whole message
/// and keeps reading.
pub fn decode_payload(payload: &[u8]) -> Result<Vec<ChangeEvent>, serde_json::Error> {
    let message: WalMessage = serde_json::from_slice(payload)?;

    let mut events = Vec::with_capacity(message.change.len());
    for change in message.change {
        let Some(entity_type) = EntityType::from_table(&change.table) else {
            tracing::trace!(table = %change.table, "Ignoring change on unwatched table");
            continue;
        };

        let event = match change.kind.as_str() {
            "insert" => ChangeEvent {
                entity_type,
                change_type: ChangeType::Insert,
                old_data: None,
                new_data: Some(zip_columns(&change.columnnames, &change.columnvalues)),
                table_name: change.table,
            },
            "update" => {
                let old = change.oldkeys.unwrap_or_default();
                ChangeEvent {
                    entity_type,
                    change_type: ChangeType::Update,
                    old_data: Some(zip_columns(&old.keynames, &old.keyvalues)),
                    new_data: Some(zip_columns(&change.columnnames, &change.columnvalues)),
                    table_name: change.table,
                }
            }
            "delete" => {
                let old = change.oldkeys.unwrap_or_default();
                ChangeEvent {
                    entity_type,
                    change_type: ChangeType::Delete,
                    old_data: Some(zip_columns(&old.keynames, &old.keyvalues)),
                    new_data: None,
                    table_name: change.table,
                }
            }
            other => {
                tracing::trace!(kind = %other, table = %change.table, "Ignoring change kind");
                continue;
            }
        };
        events.push(event);
    }
    Ok(events)
}

/// Pair column names with their values. Surplus entries on either side are
/// dropped, mirroring how the plugin emits parallel arrays.
fn zip_columns(names: &[String], values: &[serde_json::Value]) -> RowData {
    names.iter().cloned().zip(values.iter().cloned()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn decode(value: serde_json::Value) -> Vec<ChangeEvent> {
        decode_payload(value.to_string().as_bytes()).expect("valid payload")
    }

    #[test]
    fn insert_zips_column_names_with_values() {
        let events = decode(json!({
            "change": [{
                "kind": "insert",
                "schema": "public",
                "table": "monitor",
                "columnnames": ["id", "name"],
                "columntypes": ["bigint", "text"],
                "columnvalues": [7, "n1"]
            }]
        }));

        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.entity_type, EntityType::Monitor);
        assert_matches!(event.change_type, ChangeType::Insert);
        assert!(event.old_data.is_none());
        let new_data = event.new_data.as_ref().expect("insert has new_data");
        assert_eq!(new_data.get("id"), Some(&json!(7)));
        assert_eq!(new_data.get("name"), Some(&json!("n1")));
        assert_eq!(event.table_name, "monitor");
    }

    #[test]
    fn update_carries_both_snapshots() {
        let events = decode(json!({
            "change": [{
                "kind": "update",
                "schema": "public",
                "table": "monitor_statuses",
                "columnnames": ["id", "status"],
                "columnvalues": [3, "down"],
                "oldkeys": {
                    "keynames": ["id"],
                    "keyvalues": [3]
                }
            }]
        }));

        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.entity_type, EntityType::MonitorStatus);
        assert_matches!(event.change_type, ChangeType::Update);
        assert_eq!(
            event.old_data.as_ref().and_then(|d| d.get("id")),
            Some(&json!(3))
        );
        assert_eq!(
            event.new_data.as_ref().and_then(|d| d.get("status")),
            Some(&json!("down"))
        );
    }

    #[test]
    fn delete_keeps_only_old_keys() {
        let events = decode(json!({
            "change": [{
                "kind": "delete",
                "schema": "public",
                "table": "tags",
                "oldkeys": {
                    "keynames": ["id"],
                    "keyvalues": [11]
                }
            }]
        }));

        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_matches!(event.change_type, ChangeType::Delete);
        assert!(event.new_data.is_none());
        assert_eq!(
            event.old_data.as_ref().and_then(|d| d.get("id")),
            Some(&json!(11))
        );
    }

    #[test]
    fn structural_invariant_holds_for_every_kind() {
        let events = decode(json!({
            "change": [
                {"kind": "insert", "table": "monitor", "columnnames": ["id"], "columnvalues": [1]},
                {"kind": "update", "table": "monitor", "columnnames": ["id"], "columnvalues": [1],
                 "oldkeys": {"keynames": ["id"], "keyvalues": [1]}},
                {"kind": "delete", "table": "monitor",
                 "oldkeys": {"keynames": ["id"], "keyvalues": [1]}}
            ]
        }));

        assert_eq!(events.len(), 3);
        for event in &events {
            match event.change_type {
                ChangeType::Insert => {
                    assert!(event.old_data.is_none() && event.new_data.is_some());
                }
                ChangeType::Update => {
                    assert!(event.old_data.is_some() && event.new_data.is_some());
                }
                ChangeType::Delete => {
                    assert!(event.old_data.is_some() && event.new_data.is_none());
                }
            }
        }
    }

    #[test]
    fn unwatched_tables_are_discarded() {
        let events = decode(json!({
            "change": [
                {"kind": "insert", "table": "monitor_tags",
                 "columnnames": ["monitor_id"], "columnvalues": [1]},
                {"kind": "insert", "table": "users",
                 "columnnames": ["id"], "columnvalues": [1]},
                {"kind": "insert", "table": "tags",
                 "columnnames": ["id"], "columnvalues": [5]}
            ]
        }));

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].entity_type, EntityType::Tag);
    }

    #[test]
    fn unknown_kinds_are_discarded() {
        let events = decode(json!({
            "change": [
                {"kind": "truncate", "table": "monitor"},
                {"kind": "message", "table": "monitor"}
            ]
        }));
        assert!(events.is_empty());
    }

    #[test]
    fn empty_transactions_decode_to_nothing() {
        assert!(decode(json!({"change": []})).is_empty());
        // Commit-only messages may omit the change key entirely.
        assert!(decode(json!({})).is_empty());
    }

    #[test]
    fn malformed_payloads_are_an_error() {
        assert!(decode_payload(b"not json at all").is_err());
        assert!(decode_payload(br#"{"change": "not-a-list"}"#).is_err());
    }

    #[test]
    fn surplus_values_without_names_are_dropped() {
        let events = decode(json!({
            "change": [{
                "kind": "insert",
                "table": "monitor",
                "columnnames": ["id"],
                "columnvalues": [7, "orphan"]
            }]
        }));
        let new_data = events[0].new_data.as_ref().unwrap();
        assert_eq!(new_data.len(), 1);
        assert_eq!(new_data.get("id"), Some(&json!(7)));
    }
}
