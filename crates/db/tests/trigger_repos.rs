//! DB-backed repository tests.
//!
//! These run against a real PostgreSQL instance (DATABASE_URL) and are
//! ignored by default; run with `cargo test -- --ignored` when one is up.

use serde_json::json;
use sqlx::PgPool;
use vigil_db::repositories::{TriggerEventRepo, TriggerRepo};

async fn seed_trigger(pool: &PgPool, name: &str, entity_type: &str, active: bool) -> i64 {
    TriggerRepo::insert(
        pool,
        name,
        entity_type,
        &json!(["insert", "update"]),
        None,
        "http://localhost:9/hook",
        active,
    )
    .await
    .expect("insert trigger")
    .id
}

#[sqlx::test]
#[ignore = "requires a PostgreSQL instance"]
async fn insert_and_get_round_trip(pool: PgPool) {
    let id = seed_trigger(&pool, "t1", "monitor", true).await;

    let trigger = TriggerRepo::get(&pool, id).await.unwrap().expect("row");
    assert_eq!(trigger.name, "t1");
    assert_eq!(trigger.entity_type, "monitor");
    assert_eq!(trigger.change_types, json!(["insert", "update"]));
    assert!(trigger.filter_condition.is_none());
    assert!(trigger.is_active);
}

#[sqlx::test]
#[ignore = "requires a PostgreSQL instance"]
async fn duplicate_name_violates_unique_constraint(pool: PgPool) {
    seed_trigger(&pool, "dup", "monitor", true).await;
    let err = TriggerRepo::insert(
        &pool,
        "dup",
        "monitor",
        &json!(["insert"]),
        None,
        "http://localhost:9/hook",
        true,
    )
    .await
    .unwrap_err();

    match err {
        sqlx::Error::Database(db) => {
            assert_eq!(db.constraint(), Some("uq_triggers_name"));
        }
        other => panic!("expected a database error, got {other:?}"),
    }
}

#[sqlx::test]
#[ignore = "requires a PostgreSQL instance"]
async fn find_eligible_filters_on_activity_entity_and_kind(pool: PgPool) {
    let a = seed_trigger(&pool, "active-monitor", "monitor", true).await;
    seed_trigger(&pool, "inactive-monitor", "monitor", false).await;
    seed_trigger(&pool, "active-tag", "tag", true).await;

    let eligible = TriggerRepo::find_eligible(&pool, "monitor", "insert")
        .await
        .unwrap();
    assert_eq!(eligible.len(), 1);
    assert_eq!(eligible[0].id, a);

    // "delete" is not in the seeded change_types.
    let eligible = TriggerRepo::find_eligible(&pool, "monitor", "delete")
        .await
        .unwrap();
    assert!(eligible.is_empty());
}

#[sqlx::test]
#[ignore = "requires a PostgreSQL instance"]
async fn partial_update_keeps_unset_fields(pool: PgPool) {
    let id = seed_trigger(&pool, "before", "monitor", true).await;

    let updated = TriggerRepo::update(&pool, id, Some("after"), None, None, None, None, Some(false))
        .await
        .unwrap()
        .expect("row");
    assert_eq!(updated.name, "after");
    assert_eq!(updated.entity_type, "monitor");
    assert!(!updated.is_active);
    assert!(updated.updated_at >= updated.created_at);
}

#[sqlx::test]
#[ignore = "requires a PostgreSQL instance"]
async fn event_lifecycle_insert_then_mark_processed(pool: PgPool) {
    let trigger_id = seed_trigger(&pool, "audited", "monitor", true).await;

    let event = TriggerEventRepo::insert(
        &pool,
        trigger_id,
        7,
        "insert",
        None,
        Some(&json!({"id": 7, "name": "n1"})),
    )
    .await
    .unwrap();
    assert!(!event.processed);
    assert!(event.response_status.is_none());
    assert!(event.processed_at.is_none());

    TriggerEventRepo::mark_processed(&pool, event.id, 204)
        .await
        .unwrap();

    let event = TriggerEventRepo::get(&pool, event.id).await.unwrap().expect("row");
    assert!(event.processed);
    assert_eq!(event.response_status, Some(204));
    assert!(event.processed_at.is_some());
}

#[sqlx::test]
#[ignore = "requires a PostgreSQL instance"]
async fn list_recent_scopes_to_trigger(pool: PgPool) {
    let a = seed_trigger(&pool, "scope-a", "monitor", true).await;
    let b = seed_trigger(&pool, "scope-b", "monitor", true).await;

    for entity_id in 1..=3 {
        TriggerEventRepo::insert(&pool, a, entity_id, "insert", None, None)
            .await
            .unwrap();
    }
    TriggerEventRepo::insert(&pool, b, 4, "insert", None, None)
        .await
        .unwrap();

    let scoped = TriggerEventRepo::list_recent(&pool, Some(a), 10, 0).await.unwrap();
    assert_eq!(scoped.len(), 3);
    assert!(scoped.iter().all(|e| e.trigger_id == a));

    let all = TriggerEventRepo::list_recent(&pool, None, 2, 0).await.unwrap();
    assert_eq!(all.len(), 2);
}
