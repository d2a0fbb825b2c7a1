//! # huddle-db
//!
//! Storage layer for the huddle notification pipeline.
//!
//! This crate provides:
//! - Connection pool management
//! - PostgreSQL implementations of the intent store, meeting source,
//!   device registry and dispatch queue
//! - In-process implementations of the same interfaces (`memory`)
//!
//! ## Example
//!
//! ```rust,ignore
//! use huddle_db::{Database, IntentRepository};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/huddle").await?;
//!     let stats = db.intents.stats().await?;
//!     println!("pending intents: {}", stats.pending);
//!     Ok(())
//! }
//! ```

pub mod devices;
pub mod dispatch;
pub mod intents;
pub mod meetings;
pub mod memory;
pub mod pool;

// Always compiled so integration tests in other crates can share fixtures.
pub mod test_fixtures;

// Re-export core types
pub use huddle_core::*;

pub use devices::PgDeviceRegistry;
pub use dispatch::PgDispatchQueue;
pub use intents::PgIntentRepository;
pub use meetings::PgMeetingRepository;
pub use memory::{MemoryDispatchQueue, MemoryStore};
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Notification intent store.
    pub intents: PgIntentRepository,
    /// Read model of the meeting service's table.
    pub meetings: PgMeetingRepository,
    /// Push endpoint registry.
    pub devices: PgDeviceRegistry,
    /// Scheduler to worker hand-off.
    pub dispatch: PgDispatchQueue,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            intents: PgIntentRepository::new(pool.clone()),
            meetings: PgMeetingRepository::new(pool.clone()),
            devices: PgDeviceRegistry::new(pool.clone()),
            dispatch: PgDispatchQueue::from_env(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
