//! HTTP error mapping.
//!
//! Handlers return [`AppError`]; its [`IntoResponse`] impl renders a
//! `{ "error": …, "code": … }` JSON body with the matching status code.
//! Database internals never reach the response body -- only the unique-name
//! violation is surfaced as a conflict, everything else collapses to a
//! generic 500.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use vigil_core::error::CoreError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.response_parts();
        (status, Json(json!({ "error": message, "code": code }))).into_response()
    }
}

impl AppError {
    fn response_parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Core(CoreError::NotFound { entity, id }) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("{entity} with id {id} not found"),
            ),
            AppError::Core(CoreError::Validation(message)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message.clone())
            }
            AppError::Core(CoreError::Conflict(message)) => {
                (StatusCode::CONFLICT, "CONFLICT", message.clone())
            }
            AppError::Core(CoreError::Internal(message)) => {
                tracing::error!(error = %message, "Internal error");
                sanitized_500()
            }
            AppError::Database(err) => database_parts(err),
        }
    }
}

/// Map a sqlx error: `RowNotFound` is a 404, a 23505 on a `uq_`-prefixed
/// constraint (`uq_triggers_name`) is a user-level conflict, anything else
/// is logged and sanitized to a 500.
fn database_parts(err: &sqlx::Error) -> (StatusCode, &'static str, String) {
    match err {
        sqlx::Error::RowNotFound => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Resource not found".to_string(),
        ),
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            match db.constraint() {
                Some(constraint) if constraint.starts_with("uq_") => (
                    StatusCode::CONFLICT,
                    "CONFLICT",
                    format!("Duplicate value violates unique constraint: {constraint}"),
                ),
                _ => {
                    tracing::error!(error = %db, "Unique violation on unexpected constraint");
                    sanitized_500()
                }
            }
        }
        other => {
            tracing::error!(error = %other, "Database error");
            sanitized_500()
        }
    }
}

fn sanitized_500() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_trigger_maps_to_404() {
        let response = AppError::Core(CoreError::NotFound {
            entity: "Trigger",
            id: 9,
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn validation_failure_maps_to_400() {
        let response =
            AppError::Core(CoreError::Validation("change_types must not be empty".into()))
                .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn row_not_found_maps_to_404() {
        let (status, code, _) = database_parts(&sqlx::Error::RowNotFound);
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(code, "NOT_FOUND");
    }

    #[test]
    fn other_database_errors_stay_out_of_the_body() {
        let (status, _, message) = database_parts(&sqlx::Error::PoolTimedOut);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(message, "An internal error occurred");
    }
}
