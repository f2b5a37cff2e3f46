//! Single-attempt webhook delivery.
//!
//! [`WebhookNotifier`] POSTs a JSON-encoded [`ChangeNotification`] to a
//! trigger's endpoint exactly once, with a bounded request timeout. Delivery
//! is best-effort: whatever status the attempt produces -- the endpoint's
//! response code, or [`FAILURE_STATUS`] when the request never completed --
//! is returned to the caller to be recorded on the audit row, never raised.

use std::time::Duration;

use serde::Serialize;

use vigil_core::change::{ChangeType, EntityType, RowData};
use vigil_core::types::{DbId, Timestamp};

/// HTTP request timeout for the single delivery attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Status recorded when the attempt could not complete at all (timeout,
/// connection refused, protocol error).
pub const FAILURE_STATUS: i32 = 500;

/// Payload POSTed to a trigger's endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeNotification {
    pub trigger_name: String,
    pub entity_type: EntityType,
    pub entity_id: DbId,
    pub change_type: ChangeType,
    pub old_data: Option<RowData>,
    pub new_data: Option<RowData>,
    /// Creation time of the audit record this delivery belongs to.
    pub timestamp: Timestamp,
}

/// Delivers change notifications to external webhook endpoints.
pub struct WebhookNotifier {
    client: reqwest::Client,
}

impl WebhookNotifier {
    /// Create a notifier with a pre-configured HTTP client.
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build reqwest HTTP client");
        Self { client }
    }

    /// POST the notification to `endpoint` once and report the outcome.
    ///
    /// Returns the endpoint's response status whatever it is; a request that
    /// never completes yields [`FAILURE_STATUS`].
    pub async fn deliver(&self, endpoint: &str, notification: &ChangeNotification) -> i32 {
        match self.client.post(endpoint).json(notification).send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    tracing::info!(
                        endpoint,
                        trigger = %notification.trigger_name,
                        status = status.as_u16(),
                        "Notification delivered"
                    );
                } else {
                    tracing::warn!(
                        endpoint,
                        trigger = %notification.trigger_name,
                        status = status.as_u16(),
                        "Notification rejected by endpoint"
                    );
                }
                i32::from(status.as_u16())
            }
            Err(e) => {
                tracing::error!(
                    endpoint,
                    trigger = %notification.trigger_name,
                    error = %e,
                    "Notification delivery failed"
                );
                FAILURE_STATUS
            }
        }
    }
}

impl Default for WebhookNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn notification() -> ChangeNotification {
        ChangeNotification {
            trigger_name: "t".into(),
            entity_type: EntityType::Monitor,
            entity_id: 1,
            change_type: ChangeType::Insert,
            old_data: None,
            new_data: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn payload_uses_the_wire_field_names() {
        let body = serde_json::to_value(notification()).unwrap();
        let object = body.as_object().unwrap();
        for field in [
            "trigger_name",
            "entity_type",
            "entity_id",
            "change_type",
            "old_data",
            "new_data",
            "timestamp",
        ] {
            assert!(object.contains_key(field), "missing field {field}");
        }
        assert_eq!(body["entity_type"], "monitor");
        assert_eq!(body["change_type"], "insert");
    }

    #[tokio::test]
    async fn unreachable_endpoint_yields_the_failure_status() {
        // Bind and immediately release a port so the connection is refused.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let notifier = WebhookNotifier::new();
        let status = notifier
            .deliver(&format!("http://127.0.0.1:{port}/hook"), &notification())
            .await;
        assert_eq!(status, FAILURE_STATUS);
    }

    #[tokio::test]
    async fn invalid_endpoint_yields_the_failure_status() {
        let notifier = WebhookNotifier::new();
        let status = notifier.deliver("not-a-url", &notification()).await;
        assert_eq!(status, FAILURE_STATUS);
    }
}
