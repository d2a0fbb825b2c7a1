//! Postgres-backed dispatch queue.
//!
//! Entries are leased rather than locked: `receive` pushes `available_at`
//! forward by the visibility timeout, so a worker that dies mid-task lets
//! the entry reappear for another worker. `ack` deletes it. An entry whose
//! payload no longer decodes is dropped on receive and its intent failed.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, Row};
use tokio::sync::Notify;
use tracing::{debug, warn};
use uuid::Uuid;

use huddle_core::defaults::{DISPATCH_VISIBILITY_TIMEOUT_SECS, ENV_DISPATCH_VISIBILITY_TIMEOUT_SECS};
use huddle_core::{DispatchQueue, DispatchTask, Error, QueuedDispatch, Result};

/// PostgreSQL implementation of DispatchQueue.
#[derive(Clone)]
pub struct PgDispatchQueue {
    pool: Pool<Postgres>,
    visibility_timeout: Duration,
    /// Woken on every enqueue so idle workers in this process skip their poll sleep.
    notify: Arc<Notify>,
}

impl PgDispatchQueue {
    /// Create a queue with the default visibility timeout.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            pool,
            visibility_timeout: Duration::from_secs(DISPATCH_VISIBILITY_TIMEOUT_SECS as u64),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Create a queue reading `DISPATCH_VISIBILITY_TIMEOUT_SECS`.
    pub fn from_env(pool: Pool<Postgres>) -> Self {
        let secs = std::env::var(ENV_DISPATCH_VISIBILITY_TIMEOUT_SECS)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|s| *s > 0)
            .unwrap_or(DISPATCH_VISIBILITY_TIMEOUT_SECS as u64);
        Self::new(pool).with_visibility_timeout(Duration::from_secs(secs))
    }

    /// Set how long a received entry stays invisible before redelivery.
    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    pub fn visibility_timeout(&self) -> Duration {
        self.visibility_timeout
    }

    /// Handle notified on every enqueue.
    pub fn dispatch_notify(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    /// Fail the claimed intent behind an entry whose payload cannot be
    /// decoded, and drop the entry. Redelivering it would never succeed.
    async fn discard_unreadable(
        &self,
        delivery_id: Uuid,
        intent_id: Uuid,
        reason: &str,
    ) -> Result<()> {
        let message = format!("unreadable dispatch payload: {reason}");
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        sqlx::query(
            "UPDATE notification_intent
             SET status = 'failed'::notification_status, error_message = $2, updated_at = $3
             WHERE id = $1
               AND status IN ('pending'::notification_status, 'sent'::notification_status)
               AND sent_at IS NULL",
        )
        .bind(intent_id)
        .bind(&message)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        sqlx::query("DELETE FROM notification_dispatch WHERE id = $1")
            .bind(delivery_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;

        warn!(
            subsystem = "dispatch",
            component = "queue",
            op = "receive",
            delivery_id = %delivery_id,
            intent_id = %intent_id,
            error = %message,
            "Discarded unreadable dispatch entry"
        );
        Ok(())
    }
}

#[async_trait]
impl DispatchQueue for PgDispatchQueue {
    async fn enqueue(&self, task: DispatchTask) -> Result<Uuid> {
        let id = Uuid::now_v7();
        let now = Utc::now();
        let payload = serde_json::to_value(&task)?;

        sqlx::query(
            "INSERT INTO notification_dispatch (id, intent_id, payload, attempts, available_at, created_at)
             VALUES ($1, $2, $3, 0, $4, $4)",
        )
        .bind(id)
        .bind(task.intent_id)
        .bind(&payload)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(
            subsystem = "dispatch",
            component = "queue",
            op = "enqueue",
            delivery_id = %id,
            intent_id = %task.intent_id,
            "Dispatch task enqueued"
        );
        self.notify.notify_one();
        Ok(id)
    }

    async fn receive(&self) -> Result<Option<QueuedDispatch>> {
        let now = Utc::now();
        let lease = chrono::Duration::from_std(self.visibility_timeout)
            .map_err(|e| Error::Config(format!("visibility timeout out of range: {e}")))?;

        loop {
            let row = sqlx::query(
                "UPDATE notification_dispatch
                 SET attempts = attempts + 1, available_at = $2
                 WHERE id = (
                     SELECT id FROM notification_dispatch
                     WHERE available_at <= $1
                     ORDER BY available_at ASC, created_at ASC
                     LIMIT 1
                     FOR UPDATE SKIP LOCKED
                 )
                 RETURNING id, intent_id, payload, attempts",
            )
            .bind(now)
            .bind(now + lease)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

            let Some(row) = row else {
                return Ok(None);
            };

            let delivery_id: Uuid = row.try_get("id")?;
            let intent_id: Uuid = row.try_get("intent_id")?;
            let payload: serde_json::Value = row.try_get("payload")?;
            let attempts: i32 = row.try_get("attempts")?;

            match serde_json::from_value::<DispatchTask>(payload) {
                Ok(task) => {
                    return Ok(Some(QueuedDispatch {
                        delivery_id,
                        task,
                        attempts,
                    }));
                }
                Err(e) => {
                    self.discard_unreadable(delivery_id, intent_id, &e.to_string())
                        .await?;
                }
            }
        }
    }

    async fn ack(&self, delivery_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM notification_dispatch WHERE id = $1")
            .bind(delivery_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn pending_count(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM notification_dispatch")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(count.0)
    }
}
