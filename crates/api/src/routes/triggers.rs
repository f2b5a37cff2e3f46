//! Trigger definition CRUD routes.
//!
//! ```text
//! GET    /            -> list_triggers
//! POST   /            -> create_trigger
//! GET    /{id}        -> get_trigger
//! PUT    /{id}        -> update_trigger
//! DELETE /{id}        -> delete_trigger
//! ```
//!
//! Trigger rows are read-only to the dispatch pipeline; this surface is the
//! only writer.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

use vigil_core::change::{ChangeType, EntityType};
use vigil_core::error::CoreError;
use vigil_core::types::DbId;
use vigil_db::repositories::TriggerRepo;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Request body for creating a trigger.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateTrigger {
    #[validate(length(min = 1, max = 255, message = "name must be 1-255 characters"))]
    pub name: String,
    pub entity_type: EntityType,
    #[validate(length(min = 1, message = "change_types must not be empty"))]
    pub change_types: Vec<ChangeType>,
    pub filter_condition: Option<serde_json::Map<String, serde_json::Value>>,
    #[validate(url(message = "endpoint must be a valid URL"))]
    pub endpoint: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

/// Request body for partially updating a trigger. Absent fields keep their
/// current value; `filter_condition` can be replaced but not cleared.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTrigger {
    #[validate(length(min = 1, max = 255, message = "name must be 1-255 characters"))]
    pub name: Option<String>,
    pub entity_type: Option<EntityType>,
    #[validate(length(min = 1, message = "change_types must not be empty"))]
    pub change_types: Option<Vec<ChangeType>>,
    pub filter_condition: Option<serde_json::Map<String, serde_json::Value>>,
    #[validate(url(message = "endpoint must be a valid URL"))]
    pub endpoint: Option<String>,
    pub is_active: Option<bool>,
}

fn default_active() -> bool {
    true
}

fn validated<T: Validate>(input: &T) -> AppResult<()> {
    input
        .validate()
        .map_err(|e| AppError::Core(CoreError::Validation(e.to_string())))
}

/// GET /api/v1/triggers
async fn list_triggers(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let triggers = TriggerRepo::list(&state.pool).await?;
    Ok(Json(triggers))
}

/// POST /api/v1/triggers
async fn create_trigger(
    State(state): State<AppState>,
    Json(input): Json<CreateTrigger>,
) -> AppResult<impl IntoResponse> {
    validated(&input)?;

    let change_types = json!(input.change_types);
    let filter_condition = input.filter_condition.map(serde_json::Value::Object);

    let trigger = TriggerRepo::insert(
        &state.pool,
        &input.name,
        input.entity_type.as_str(),
        &change_types,
        filter_condition.as_ref(),
        &input.endpoint,
        input.is_active,
    )
    .await?;

    tracing::info!(
        trigger_id = trigger.id,
        name = %trigger.name,
        entity_type = %trigger.entity_type,
        "Trigger created"
    );

    Ok((StatusCode::CREATED, Json(trigger)))
}

/// GET /api/v1/triggers/{id}
async fn get_trigger(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let trigger = TriggerRepo::get(&state.pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Trigger",
            id,
        }))?;

    Ok(Json(trigger))
}

/// PUT /api/v1/triggers/{id}
async fn update_trigger(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateTrigger>,
) -> AppResult<impl IntoResponse> {
    validated(&input)?;

    let change_types = input.change_types.as_ref().map(|kinds| json!(kinds));
    let filter_condition = input.filter_condition.map(serde_json::Value::Object);

    let trigger = TriggerRepo::update(
        &state.pool,
        id,
        input.name.as_deref(),
        input.entity_type.map(|e| e.as_str()),
        change_types.as_ref(),
        filter_condition.as_ref(),
        input.endpoint.as_deref(),
        input.is_active,
    )
    .await?
    .ok_or(AppError::Core(CoreError::NotFound {
        entity: "Trigger",
        id,
    }))?;

    tracing::info!(trigger_id = id, "Trigger updated");

    Ok(Json(trigger))
}

/// DELETE /api/v1/triggers/{id}
async fn delete_trigger(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let deleted = TriggerRepo::delete(&state.pool, id).await?;

    if !deleted {
        return Err(AppError::Core(CoreError::NotFound {
            entity: "Trigger",
            id,
        }));
    }

    tracing::info!(trigger_id = id, "Trigger deleted");

    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_triggers).post(create_trigger))
        .route(
            "/{id}",
            get(get_trigger).put(update_trigger).delete(delete_trigger),
        )
}
