//! # huddle-jobs
//!
//! Scheduling and delivery for the huddle meeting notification pipeline.
//!
//! This crate provides:
//! - The tick scheduler (starting-soon and reminder sweeps)
//! - Reminder planning at meeting creation
//! - The idempotency guard every dispatch goes through
//! - The dispatch worker that delivers queued tasks to push endpoints
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use huddle_db::Database;
//! use huddle_jobs::{DeliveryConfig, DeliveryWorker, SchedulerConfig, TickScheduler, WorkerBuilder};
//! use huddle_push::ExpoPushTransport;
//!
//! let db = Database::connect("postgres://...").await?;
//! let queue = Arc::new(db.dispatch.clone());
//!
//! let scheduler = TickScheduler::new(
//!     Arc::new(db.intents.clone()),
//!     Arc::new(db.meetings.clone()),
//!     queue.clone(),
//!     SchedulerConfig::from_env()?,
//! );
//! let report = scheduler.run_tick().await?;
//!
//! let delivery = DeliveryWorker::new(
//!     Arc::new(db.intents.clone()),
//!     Arc::new(db.devices.clone()),
//!     Arc::new(ExpoPushTransport::from_env()?),
//!     DeliveryConfig::from_env(),
//! );
//! let handle = WorkerBuilder::new(queue, delivery).build().start();
//! handle.shutdown().await?;
//! ```

pub mod config;
pub mod content;
pub mod delivery;
pub mod guard;
pub mod reminders;
pub mod scheduler;
pub mod ticker;
pub mod worker;

// Re-export core types
pub use huddle_core::*;

pub use config::{RecipientPolicy, SchedulerConfig};
pub use content::{ContentTemplates, Template};
pub use delivery::{DeliveryConfig, DeliveryWorker, NO_ENDPOINTS};
pub use guard::{claim, ClaimOutcome};
pub use reminders::ReminderPlanner;
pub use scheduler::TickScheduler;
pub use ticker::{spawn_ticker, TickerHandle};
pub use worker::{DispatchWorker, WorkerBuilder, WorkerConfig, WorkerEvent, WorkerHandle};
