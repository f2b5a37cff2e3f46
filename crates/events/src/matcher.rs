//! Trigger matching.
//!
//! Selects the triggers a [`ChangeEvent`] satisfies in two stages: the store
//! narrows candidates by activity, entity type, and change kind; the filter
//! predicate is then evaluated in code against the event's row snapshot.
//! A condition that cannot be interpreted fails closed -- the trigger simply
//! does not match.

use std::sync::Arc;

use vigil_core::change::{ChangeEvent, FilterCondition, RowData};
use vigil_db::models::Trigger;

use crate::store::EventStore;

/// Matches change events against the stored trigger definitions.
pub struct TriggerMatcher {
    store: Arc<dyn EventStore>,
}

impl TriggerMatcher {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    /// All triggers the event satisfies, in the store's stable order.
    ///
    /// An empty result is a normal outcome, not an error.
    pub async fn matching_triggers(
        &self,
        event: &ChangeEvent,
    ) -> Result<Vec<Trigger>, sqlx::Error> {
        let candidates = self
            .store
            .candidate_triggers(event.entity_type.as_str(), event.change_type.as_str())
            .await?;

        Ok(candidates
            .into_iter()
            .filter(|trigger| filter_accepts(trigger, event))
            .collect())
    }
}

/// Evaluate a candidate's filter condition against the event snapshot.
///
/// No condition means an unconditional match. A stored condition that is not
/// a JSON object is treated as a non-match rather than an error.
fn filter_accepts(trigger: &Trigger, event: &ChangeEvent) -> bool {
    let Some(raw) = &trigger.filter_condition else {
        return true;
    };

    let condition: FilterCondition = match serde_json::from_value(raw.clone()) {
        Ok(condition) => condition,
        Err(e) => {
            tracing::warn!(
                trigger_id = trigger.id,
                error = %e,
                "Malformed filter condition, treating as non-match"
            );
            return false;
        }
    };

    let empty = RowData::new();
    let data = event.snapshot().unwrap_or(&empty);
    condition.matches(data)
}
