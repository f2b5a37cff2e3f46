//! Repository for the `triggers` table.

use sqlx::PgPool;
use vigil_core::types::DbId;

use crate::models::trigger::Trigger;

/// Column list for `triggers` queries.
const TRIGGER_COLUMNS: &str = "id, name, entity_type, change_types, filter_condition, endpoint, \
     is_active, created_at, updated_at";

/// Provides read/write operations for trigger definitions.
pub struct TriggerRepo;

impl TriggerRepo {
    /// Insert a new trigger, returning the stored row.
    pub async fn insert(
        pool: &PgPool,
        name: &str,
        entity_type: &str,
        change_types: &serde_json::Value,
        filter_condition: Option<&serde_json::Value>,
        endpoint: &str,
        is_active: bool,
    ) -> Result<Trigger, sqlx::Error> {
        let query = format!(
            "INSERT INTO triggers \
                (name, entity_type, change_types, filter_condition, endpoint, is_active) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {TRIGGER_COLUMNS}"
        );
        sqlx::query_as::<_, Trigger>(&query)
            .bind(name)
            .bind(entity_type)
            .bind(change_types)
            .bind(filter_condition)
            .bind(endpoint)
            .bind(is_active)
            .fetch_one(pool)
            .await
    }

    /// Find a trigger by id.
    pub async fn get(pool: &PgPool, id: DbId) -> Result<Option<Trigger>, sqlx::Error> {
        let query = format!("SELECT {TRIGGER_COLUMNS} FROM triggers WHERE id = $1");
        sqlx::query_as::<_, Trigger>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List all triggers, newest first.
    pub async fn list(pool: &PgPool) -> Result<Vec<Trigger>, sqlx::Error> {
        let query =
            format!("SELECT {TRIGGER_COLUMNS} FROM triggers ORDER BY created_at DESC, id DESC");
        sqlx::query_as::<_, Trigger>(&query).fetch_all(pool).await
    }

    /// Active triggers eligible for the given entity type and change kind.
    ///
    /// Eligibility is `is_active`, an exact `entity_type` match, and JSONB
    /// containment of the change kind in `change_types`. Ordered by id so
    /// matching output is deterministic.
    pub async fn find_eligible(
        pool: &PgPool,
        entity_type: &str,
        change_type: &str,
    ) -> Result<Vec<Trigger>, sqlx::Error> {
        let query = format!(
            "SELECT {TRIGGER_COLUMNS} FROM triggers \
             WHERE is_active AND entity_type = $1 AND change_types @> $2 \
             ORDER BY id"
        );
        sqlx::query_as::<_, Trigger>(&query)
            .bind(entity_type)
            .bind(serde_json::json!([change_type]))
            .fetch_all(pool)
            .await
    }

    /// Partially update a trigger; absent fields keep their current value.
    ///
    /// Bumps `updated_at`. Returns `None` when the trigger does not exist.
    /// Note that `filter_condition` cannot be cleared through this path, only
    /// replaced.
    #[allow(clippy::too_many_arguments)]
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        name: Option<&str>,
        entity_type: Option<&str>,
        change_types: Option<&serde_json::Value>,
        filter_condition: Option<&serde_json::Value>,
        endpoint: Option<&str>,
        is_active: Option<bool>,
    ) -> Result<Option<Trigger>, sqlx::Error> {
        let query = format!(
            "UPDATE triggers SET \
                name = COALESCE($2, name), \
                entity_type = COALESCE($3, entity_type), \
                change_types = COALESCE($4, change_types), \
                filter_condition = COALESCE($5, filter_condition), \
                endpoint = COALESCE($6, endpoint), \
                is_active = COALESCE($7, is_active), \
                updated_at = now() \
             WHERE id = $1 \
             RETURNING {TRIGGER_COLUMNS}"
        );
        sqlx::query_as::<_, Trigger>(&query)
            .bind(id)
            .bind(name)
            .bind(entity_type)
            .bind(change_types)
            .bind(filter_condition)
            .bind(endpoint)
            .bind(is_active)
            .fetch_optional(pool)
            .await
    }

    /// Delete a trigger. Returns `false` when no row matched.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM triggers WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
