//! In-process ticker driving [`TickScheduler`] on a fixed interval.
//!
//! Ticks that fall behind are skipped, not bunched. A tick that fails is
//! logged and the next one runs as usual.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use huddle_core::{Error, Result, TickReport};

use crate::scheduler::TickScheduler;

/// Handle for a running ticker.
pub struct TickerHandle {
    shutdown_tx: mpsc::Sender<()>,
    report_rx: broadcast::Receiver<TickReport>,
}

impl TickerHandle {
    /// Stop ticking after the current tick completes.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send shutdown signal".into()))
    }

    /// Reports of successful ticks.
    pub fn reports(&self) -> broadcast::Receiver<TickReport> {
        self.report_rx.resubscribe()
    }
}

/// Spawn a loop calling `run_tick` every `interval`. The first tick fires immediately.
pub fn spawn_ticker(scheduler: Arc<TickScheduler>, interval: Duration) -> TickerHandle {
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    let (report_tx, report_rx) = broadcast::channel(16);

    tokio::spawn(async move {
        info!(
            subsystem = "scheduler",
            component = "ticker",
            interval_secs = interval.as_secs_f64(),
            "Ticker started"
        );

        let mut ticks = tokio::time::interval(interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = ticks.tick() => {}
            }

            match scheduler.run_tick().await {
                Ok(report) => {
                    let _ = report_tx.send(report);
                }
                Err(e) => error!(
                    subsystem = "scheduler",
                    component = "ticker",
                    error = %e,
                    "Tick failed"
                ),
            }
        }

        info!(subsystem = "scheduler", component = "ticker", "Ticker stopped");
    });

    TickerHandle {
        shutdown_tx,
        report_rx,
    }
}
