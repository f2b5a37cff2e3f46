//! Service health reporting.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use vigil_cdc::ListenerState;

use crate::state::AppState;

/// Response body of `GET /health`.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub db_healthy: bool,
    /// Lifecycle state of the CDC dispatch loop.
    pub cdc_state: &'static str,
}

/// GET /health
///
/// `ok` only while the database answers and the dispatch loop is running.
/// A stopped loop degrades the report but does not fail the endpoint; the
/// REST surface stays usable for inspecting triggers and recorded events.
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_healthy = vigil_db::health_check(&state.pool).await.is_ok();
    let cdc_state = state.cdc.state();

    Json(HealthResponse {
        status: overall_status(db_healthy, cdc_state),
        version: env!("CARGO_PKG_VERSION"),
        db_healthy,
        cdc_state: cdc_state.as_str(),
    })
}

fn overall_status(db_healthy: bool, cdc_state: ListenerState) -> &'static str {
    if db_healthy && cdc_state == ListenerState::Running {
        "ok"
    } else {
        "degraded"
    }
}

/// Mounted at the root, outside `/api/v1`.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn healthy_requires_db_and_a_running_loop() {
        assert_eq!(overall_status(true, ListenerState::Running), "ok");
        assert_eq!(overall_status(false, ListenerState::Running), "degraded");
        assert_eq!(overall_status(true, ListenerState::Stopped), "degraded");
        assert_eq!(overall_status(true, ListenerState::Starting), "degraded");
    }
}
