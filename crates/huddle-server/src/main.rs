//! huddle-server: runs the meeting notification pipeline against Postgres.
//!
//! `tick` is the externally triggered entry point (cron, platform
//! scheduler); `serve` runs the in-process ticker and the delivery worker
//! together.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use huddle_db::{
    Database, DispatchQueue, Error, IntentRepository, IntentStats, MeetingSource,
    NotificationIntent, PoolConfig,
};
use huddle_jobs::{
    spawn_ticker, DeliveryConfig, DeliveryWorker, DispatchWorker, ReminderPlanner,
    SchedulerConfig, TickScheduler, WorkerBuilder, WorkerConfig,
};
use huddle_push::ExpoPushTransport;

#[derive(Parser)]
#[command(name = "huddle-server")]
#[command(author, version, about = "Meeting notification pipeline")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,

    /// Run one scheduler tick and print its report
    Tick {
        /// Evaluate the tick as of this RFC 3339 instant instead of now
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// Run the delivery worker until interrupted
    Work {
        /// Deliver everything currently visible, then exit
        #[arg(long)]
        once: bool,
    },

    /// Run the ticker and the delivery worker until interrupted
    Serve,

    /// Plan reminder notifications for a meeting
    ScheduleReminders {
        /// Meeting id
        #[arg(short, long)]
        meeting: Uuid,
    },

    /// Register a push endpoint token for a user
    RegisterDevice {
        #[arg(long)]
        user: Uuid,

        #[arg(long)]
        token: String,

        /// Device platform label (ios, android, web)
        #[arg(long)]
        platform: Option<String>,
    },

    /// Print intent statistics, and one meeting's intents when given
    Inspect {
        /// Meeting id
        #[arg(short, long)]
        meeting: Option<Uuid>,
    },
}

#[derive(Serialize)]
struct Inspection {
    stats: IntentStats,
    dispatch_pending: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    intents: Option<Vec<NotificationIntent>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let _log_guard = init_logging();

    let cli = Cli::parse();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/huddle".to_string());
    let db = Database::connect_with_config(&database_url, PoolConfig::from_env()).await?;

    match cli.command {
        Commands::Migrate => {
            info!("Running database migrations...");
            db.migrate().await?;
            info!("Database migrations complete");
        }
        Commands::Tick { at } => {
            let scheduler = scheduler(&db)?;
            let report = scheduler.run_tick_at(at.unwrap_or_else(Utc::now)).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Work { once } => {
            let worker = dispatch_worker(&db)?;
            if once {
                let delivered = worker.drain().await;
                println!("{}", serde_json::json!({ "received": delivered }));
            } else {
                let handle = worker.start();
                tokio::signal::ctrl_c().await?;
                info!("Shutdown requested");
                handle.shutdown().await?;
            }
        }
        Commands::Serve => {
            info!("Running database migrations...");
            db.migrate().await?;

            let scheduler = scheduler(&db)?;
            let interval = scheduler.config().tick_interval;
            let ticker = spawn_ticker(Arc::new(scheduler), interval);
            let worker = dispatch_worker(&db)?.start();
            info!(
                tick_interval_secs = interval.as_secs(),
                "Notification pipeline running"
            );

            tokio::signal::ctrl_c().await?;
            info!("Shutdown requested");
            ticker.shutdown().await?;
            worker.shutdown().await?;
        }
        Commands::ScheduleReminders { meeting } => {
            let found = db
                .meetings
                .get_meeting(meeting)
                .await?
                .ok_or(Error::MeetingNotFound(meeting))?;
            let planner = ReminderPlanner::new(Arc::new(db.intents.clone()), SchedulerConfig::from_env()?);
            let created = planner.schedule_reminders(&found).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "meeting_id": meeting,
                    "created": created,
                }))?
            );
        }
        Commands::RegisterDevice {
            user,
            token,
            platform,
        } => {
            db.devices.register(user, &token, platform.as_deref()).await?;
            info!(user_id = %user, "Device registered");
        }
        Commands::Inspect { meeting } => {
            let intents = match meeting {
                Some(id) => Some(db.intents.list_for_meeting(id).await?),
                None => None,
            };
            let inspection = Inspection {
                stats: db.intents.stats().await?,
                dispatch_pending: db.dispatch.pending_count().await?,
                intents,
            };
            println!("{}", serde_json::to_string_pretty(&inspection)?);
        }
    }

    Ok(())
}

fn scheduler(db: &Database) -> anyhow::Result<TickScheduler> {
    Ok(TickScheduler::new(
        Arc::new(db.intents.clone()),
        Arc::new(db.meetings.clone()),
        Arc::new(db.dispatch.clone()),
        SchedulerConfig::from_env()?,
    ))
}

fn dispatch_worker(db: &Database) -> anyhow::Result<DispatchWorker> {
    let transport = ExpoPushTransport::from_env()?;
    let delivery = DeliveryWorker::new(
        Arc::new(db.intents.clone()),
        Arc::new(db.devices.clone()),
        Arc::new(transport),
        DeliveryConfig::from_env(),
    );
    Ok(WorkerBuilder::new(Arc::new(db.dispatch.clone()), delivery)
        .with_config(WorkerConfig::from_env())
        .with_notify(db.dispatch.dispatch_notify())
        .build())
}

/// Install the tracing subscriber.
///
/// Environment variables:
///   LOG_FORMAT  - "json" or "text" (default: "text")
///   LOG_FILE    - path to log file (optional, enables file logging)
///   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
///   RUST_LOG    - standard env filter (default: "huddle_server=info,huddle_jobs=info,huddle_db=info")
///
/// Console logs go to stderr so command output on stdout stays parseable.
fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "huddle_server=info,huddle_jobs=info,huddle_db=info".into());

    let registry = tracing_subscriber::registry().with(env_filter);

    let guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("huddle-server.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stderr)"),
        "Logging initialized"
    );
    guard
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_tick_at() {
        let cli = Cli::try_parse_from(["huddle-server", "tick", "--at", "2025-01-01T16:30:30Z"]).unwrap();
        match cli.command {
            Commands::Tick { at } => {
                assert_eq!(at.unwrap().to_rfc3339(), "2025-01-01T16:30:30+00:00");
            }
            _ => panic!("Wrong subcommand"),
        }
    }

    #[test]
    fn test_parse_inspect_meeting() {
        let id = Uuid::new_v4();
        let cli = Cli::try_parse_from(["huddle-server", "inspect", "--meeting", &id.to_string()]).unwrap();
        assert!(matches!(cli.command, Commands::Inspect { meeting: Some(m) } if m == id));
    }

    #[test]
    fn test_parse_rejects_bad_uuid() {
        assert!(Cli::try_parse_from(["huddle-server", "schedule-reminders", "--meeting", "nope"]).is_err());
    }
}
