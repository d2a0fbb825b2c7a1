//! Postgres dispatch queue and device registry tests.
//!
//! Require a live database; run with `cargo test -p huddle-db -- --ignored`.

use std::collections::BTreeMap;
use std::time::Duration;

use huddle_core::{
    DeviceRegistry, DispatchQueue, DispatchTask, IntentRepository, IntentStatus,
    NotificationType,
};
use huddle_db::test_fixtures::test_database_url;
use huddle_db::{PgDeviceRegistry, PgDispatchQueue, PgIntentRepository};
use sqlx::PgPool;
use uuid::Uuid;

async fn setup_test_db() -> PgPool {
    dotenvy::dotenv().ok();
    let pool = PgPool::connect(&test_database_url())
        .await
        .expect("Failed to connect to test database");
    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_dispatch_lease_and_redelivery() {
    let pool = setup_test_db().await;
    let intents = PgIntentRepository::new(pool.clone());
    let queue = PgDispatchQueue::new(pool).with_visibility_timeout(Duration::from_secs(1));

    let intent = intents
        .ensure_starting(Uuid::new_v4(), Uuid::new_v4())
        .await
        .unwrap();
    let mut data = BTreeMap::new();
    data.insert("intent_id".to_string(), intent.id.to_string());
    let task = DispatchTask {
        intent_id: intent.id,
        user_id: intent.user_id,
        meeting_id: intent.meeting_id,
        notification_type: NotificationType::Starting,
        title: "Meeting starting".to_string(),
        body: "Weekly sync starts in 5 minutes".to_string(),
        data,
    };
    let delivery_id = queue.enqueue(task.clone()).await.unwrap();

    // Other suites may share the table; receive until our entry shows up.
    let mut leased = None;
    for _ in 0..100 {
        match queue.receive().await.unwrap() {
            Some(entry) if entry.delivery_id == delivery_id => {
                leased = Some(entry);
                break;
            }
            Some(_) => continue,
            None => break,
        }
    }
    let leased = leased.expect("enqueued entry should be receivable");
    assert_eq!(leased.task, task);
    assert_eq!(leased.attempts, 1);

    tokio::time::sleep(Duration::from_millis(1_200)).await;

    let mut again = None;
    for _ in 0..100 {
        match queue.receive().await.unwrap() {
            Some(entry) if entry.delivery_id == delivery_id => {
                again = Some(entry);
                break;
            }
            Some(_) => continue,
            None => break,
        }
    }
    let again = again.expect("expired lease should be redelivered");
    assert_eq!(again.attempts, 2);

    queue.ack(delivery_id).await.unwrap();
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_device_registry_register_and_remove() {
    let pool = setup_test_db().await;
    let devices = PgDeviceRegistry::new(pool);
    let user = Uuid::new_v4();

    devices.register(user, "ExponentPushToken[one]", Some("ios")).await.unwrap();
    devices.register(user, "ExponentPushToken[two]", None).await.unwrap();
    devices.register(user, "ExponentPushToken[one]", Some("ios")).await.unwrap();

    let tokens = devices.tokens_for_user(user).await.unwrap();
    assert_eq!(tokens.len(), 2);

    assert!(devices.remove_token(user, "ExponentPushToken[one]").await.unwrap());
    assert!(!devices.remove_token(user, "ExponentPushToken[one]").await.unwrap());
    assert_eq!(
        devices.tokens_for_user(user).await.unwrap(),
        vec!["ExponentPushToken[two]".to_string()]
    );
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_unreadable_payload_fails_intent_and_drops_entry() {
    let pool = setup_test_db().await;
    let intents = PgIntentRepository::new(pool.clone());
    let queue = PgDispatchQueue::new(pool.clone()).with_visibility_timeout(Duration::from_secs(60));

    let intent = intents
        .ensure_starting(Uuid::new_v4(), Uuid::new_v4())
        .await
        .unwrap();
    assert!(intents.claim(intent.id).await.unwrap());

    let delivery_id = Uuid::now_v7();
    sqlx::query(
        "INSERT INTO notification_dispatch (id, intent_id, payload, attempts, available_at, created_at)
         VALUES ($1, $2, '{\"not\": \"a task\"}'::jsonb, 0, now() - interval '1 second', now())",
    )
    .bind(delivery_id)
    .bind(intent.id)
    .execute(&pool)
    .await
    .unwrap();

    // Receiving never surfaces the bad entry, even while others share the table.
    for _ in 0..100 {
        match queue.receive().await.unwrap() {
            Some(entry) => assert_ne!(entry.delivery_id, delivery_id),
            None => break,
        }
    }

    let failed = intents.get(intent.id).await.unwrap().unwrap();
    assert_eq!(failed.status, IntentStatus::Failed);
    assert!(failed.sent_at.is_none());
    assert!(failed
        .error_message
        .unwrap_or_default()
        .starts_with("unreadable dispatch payload"));

    let remaining: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM notification_dispatch WHERE id = $1")
            .bind(delivery_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(remaining.0, 0);
}
