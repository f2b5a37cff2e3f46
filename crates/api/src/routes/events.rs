//! Recorded trigger-event read routes.
//!
//! ```text
//! GET /         -> list_events
//! GET /{id}     -> get_event
//! ```
//!
//! Read-only: `trigger_events` rows are written exclusively by the dispatch
//! pipeline. Delivery failures are discoverable here via `response_status`.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use vigil_core::error::CoreError;
use vigil_core::types::DbId;
use vigil_db::repositories::TriggerEventRepo;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Upper bound on one page of results.
const MAX_PAGE_SIZE: i64 = 500;

/// Query parameters for listing recorded events.
#[derive(Debug, Deserialize)]
pub struct ListEventsQuery {
    /// Restrict to one trigger's events.
    pub trigger_id: Option<DbId>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    100
}

/// GET /api/v1/events
async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<ListEventsQuery>,
) -> AppResult<impl IntoResponse> {
    let limit = query.limit.clamp(1, MAX_PAGE_SIZE);
    let offset = query.offset.max(0);

    let events =
        TriggerEventRepo::list_recent(&state.pool, query.trigger_id, limit, offset).await?;

    Ok(Json(events))
}

/// GET /api/v1/events/{id}
async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let event = TriggerEventRepo::get(&state.pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "TriggerEvent",
            id,
        }))?;

    Ok(Json(event))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_events))
        .route("/{id}", get(get_event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn list_query_defaults() {
        let query: ListEventsQuery = serde_json::from_value(json!({})).unwrap();
        assert!(query.trigger_id.is_none());
        assert_eq!(query.limit, 100);
        assert_eq!(query.offset, 0);
    }

    #[test]
    fn page_bounds_are_clamped() {
        assert_eq!(9_999_i64.clamp(1, MAX_PAGE_SIZE), MAX_PAGE_SIZE);
        assert_eq!(0_i64.clamp(1, MAX_PAGE_SIZE), 1);
        assert_eq!((-5_i64).max(0), 0);
    }
}
