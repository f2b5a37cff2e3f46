//! Per-event dispatch orchestration.
//!
//! [`EventProcessor`] drives one [`ChangeEvent`] through matching and
//! notification. For every matched trigger it writes the audit record
//! *before* the delivery attempt and updates it exactly once afterwards, so
//! a crash mid-delivery still leaves a durable trace of the unresolved
//! attempt. Failures are contained per (trigger, event) pair: one pair going
//! wrong never aborts the others, and nothing here propagates to the read
//! loop.

use std::sync::Arc;

use vigil_core::change::ChangeEvent;
use vigil_db::models::Trigger;

use crate::delivery::webhook::{ChangeNotification, WebhookNotifier};
use crate::matcher::TriggerMatcher;
use crate::store::EventStore;

/// Matches incoming change events and dispatches notifications for them.
pub struct EventProcessor {
    store: Arc<dyn EventStore>,
    matcher: TriggerMatcher,
    notifier: WebhookNotifier,
}

impl EventProcessor {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            matcher: TriggerMatcher::new(Arc::clone(&store)),
            store,
            notifier: WebhookNotifier::new(),
        }
    }

    /// Process one change event to completion.
    ///
    /// Serial per matched trigger; returns once every pair has either been
    /// fully handled or abandoned with a logged error. Infallible by design --
    /// the caller acknowledges the WAL position when this returns.
    pub async fn process_change_event(&self, event: &ChangeEvent) {
        let triggers = match self.matcher.matching_triggers(event).await {
            Ok(triggers) => triggers,
            Err(e) => {
                tracing::error!(
                    entity_type = %event.entity_type,
                    change_type = %event.change_type,
                    error = %e,
                    "Trigger lookup failed, dropping event"
                );
                return;
            }
        };

        if triggers.is_empty() {
            tracing::debug!(
                entity_type = %event.entity_type,
                change_type = %event.change_type,
                table = %event.table_name,
                "No matching triggers"
            );
            return;
        }

        for trigger in &triggers {
            self.process_trigger(trigger, event).await;
        }
    }

    /// Record and deliver one (trigger, event) pair.
    async fn process_trigger(&self, trigger: &Trigger, event: &ChangeEvent) {
        let Some(entity_id) = event.entity_id() else {
            tracing::error!(
                trigger_id = trigger.id,
                table = %event.table_name,
                "Change payload carries no usable entity id, abandoning trigger"
            );
            return;
        };

        let old_data = event.old_data.clone().map(serde_json::Value::Object);
        let new_data = event.new_data.clone().map(serde_json::Value::Object);

        // Durability point: the record must exist before the network call.
        let record = match self
            .store
            .record_event(
                trigger.id,
                entity_id,
                event.change_type.as_str(),
                old_data.as_ref(),
                new_data.as_ref(),
            )
            .await
        {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(
                    trigger_id = trigger.id,
                    entity_id,
                    error = %e,
                    "Failed to record trigger event, delivery not attempted"
                );
                return;
            }
        };

        let notification = ChangeNotification {
            trigger_name: trigger.name.clone(),
            entity_type: event.entity_type,
            entity_id,
            change_type: event.change_type,
            old_data: event.old_data.clone(),
            new_data: event.new_data.clone(),
            timestamp: record.created_at,
        };

        let status = self.notifier.deliver(&trigger.endpoint, &notification).await;

        if let Err(e) = self.store.complete_event(record.id, status).await {
            tracing::error!(
                trigger_event_id = record.id,
                trigger_id = trigger.id,
                error = %e,
                "Failed to record delivery outcome"
            );
        }
    }
}
