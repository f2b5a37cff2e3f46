//! Repository for the `trigger_events` audit table.

use sqlx::PgPool;
use vigil_core::types::DbId;

use crate::models::trigger_event::TriggerEvent;

/// Column list for `trigger_events` queries.
const EVENT_COLUMNS: &str = "id, trigger_id, entity_id, change_type, old_data, new_data, \
     processed, response_status, created_at, processed_at";

/// Provides read/write operations for recorded trigger events.
pub struct TriggerEventRepo;

impl TriggerEventRepo {
    /// Insert an unprocessed audit record, returning the stored row.
    ///
    /// This is the pipeline's durability point: the row exists before any
    /// delivery attempt is made.
    pub async fn insert(
        pool: &PgPool,
        trigger_id: DbId,
        entity_id: DbId,
        change_type: &str,
        old_data: Option<&serde_json::Value>,
        new_data: Option<&serde_json::Value>,
    ) -> Result<TriggerEvent, sqlx::Error> {
        let query = format!(
            "INSERT INTO trigger_events \
                (trigger_id, entity_id, change_type, old_data, new_data) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {EVENT_COLUMNS}"
        );
        sqlx::query_as::<_, TriggerEvent>(&query)
            .bind(trigger_id)
            .bind(entity_id)
            .bind(change_type)
            .bind(old_data)
            .bind(new_data)
            .fetch_one(pool)
            .await
    }

    /// Record the outcome of the record's single delivery attempt.
    pub async fn mark_processed(
        pool: &PgPool,
        id: DbId,
        response_status: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE trigger_events \
             SET processed = TRUE, response_status = $2, processed_at = now() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(response_status)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Find a recorded event by id.
    pub async fn get(pool: &PgPool, id: DbId) -> Result<Option<TriggerEvent>, sqlx::Error> {
        let query = format!("SELECT {EVENT_COLUMNS} FROM trigger_events WHERE id = $1");
        sqlx::query_as::<_, TriggerEvent>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List recorded events newest-first, optionally scoped to one trigger.
    pub async fn list_recent(
        pool: &PgPool,
        trigger_id: Option<DbId>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<TriggerEvent>, sqlx::Error> {
        let query = format!(
            "SELECT {EVENT_COLUMNS} FROM trigger_events \
             WHERE ($1::bigint IS NULL OR trigger_id = $1) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, TriggerEvent>(&query)
            .bind(trigger_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }
}
