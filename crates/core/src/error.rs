use crate::types::DbId;

/// Domain-level failures shared across the workspace.
///
/// The API layer maps these onto HTTP statuses; the pipeline crates mostly
/// log and contain their own failures instead of surfacing them here.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{entity} {id} does not exist")]
    NotFound { entity: &'static str, id: DbId },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}
