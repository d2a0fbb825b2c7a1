//! Device token registry.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres};
use tracing::info;
use uuid::Uuid;

use huddle_core::{DeviceRegistry, Error, Result};

/// PostgreSQL implementation of DeviceRegistry.
#[derive(Clone)]
pub struct PgDeviceRegistry {
    pool: Pool<Postgres>,
}

impl PgDeviceRegistry {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Register a token for a user. Re-registering is a no-op.
    pub async fn register(&self, user_id: Uuid, token: &str, platform: Option<&str>) -> Result<()> {
        sqlx::query(
            "INSERT INTO device_token (user_id, token, platform, created_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (user_id, token) DO NOTHING",
        )
        .bind(user_id)
        .bind(token)
        .bind(platform)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }
}

#[async_trait]
impl DeviceRegistry for PgDeviceRegistry {
    async fn tokens_for_user(&self, user_id: Uuid) -> Result<Vec<String>> {
        let tokens = sqlx::query_scalar::<_, String>(
            "SELECT token FROM device_token WHERE user_id = $1 ORDER BY created_at ASC, token ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(tokens)
    }

    async fn remove_token(&self, user_id: Uuid, token: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM device_token WHERE user_id = $1 AND token = $2")
            .bind(user_id)
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        let removed = result.rows_affected() > 0;
        if removed {
            info!(
                subsystem = "database",
                component = "devices",
                op = "remove_token",
                %user_id,
                "Removed invalid device token"
            );
        }
        Ok(removed)
    }
}
