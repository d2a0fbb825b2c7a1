//! Dispatch worker: drains the dispatch queue and delivers each task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, Notify};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use huddle_core::defaults::{
    DELIVERY_MAX_ATTEMPTS, DELIVERY_MAX_CONCURRENT, DELIVERY_POLL_INTERVAL_MS,
    ENV_DELIVERY_MAX_ATTEMPTS, ENV_DELIVERY_MAX_CONCURRENT, ENV_DELIVERY_POLL_INTERVAL_MS,
    ENV_DELIVERY_WORKER_ENABLED, EVENT_BUS_CAPACITY,
};
use huddle_core::{DispatchQueue, Finalization, QueuedDispatch, Result};

use crate::delivery::DeliveryWorker;

/// Configuration for the dispatch worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Polling interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Maximum number of concurrent deliveries.
    pub max_concurrent: usize,
    /// Whether to process the queue at all.
    pub enabled: bool,
    /// Receives of one task after which it is abandoned.
    pub max_attempts: i32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DELIVERY_POLL_INTERVAL_MS,
            max_concurrent: DELIVERY_MAX_CONCURRENT,
            enabled: true,
            max_attempts: DELIVERY_MAX_ATTEMPTS,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `DELIVERY_WORKER_ENABLED` | `true` | Enable/disable delivery |
    /// | `DELIVERY_MAX_CONCURRENT` | `4` | Max concurrent deliveries |
    /// | `DELIVERY_POLL_INTERVAL_MS` | `1000` | Polling interval when queue is empty |
    /// | `DELIVERY_MAX_ATTEMPTS` | `5` | Receives before a task is abandoned |
    pub fn from_env() -> Self {
        let enabled = std::env::var(ENV_DELIVERY_WORKER_ENABLED)
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let max_concurrent = std::env::var(ENV_DELIVERY_MAX_CONCURRENT)
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(DELIVERY_MAX_CONCURRENT)
            .max(1);

        let poll_interval_ms = std::env::var(ENV_DELIVERY_POLL_INTERVAL_MS)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DELIVERY_POLL_INTERVAL_MS);

        let max_attempts = std::env::var(ENV_DELIVERY_MAX_ATTEMPTS)
            .ok()
            .and_then(|v| v.parse::<i32>().ok())
            .unwrap_or(DELIVERY_MAX_ATTEMPTS)
            .max(1);

        Self {
            poll_interval_ms,
            max_concurrent,
            enabled,
            max_attempts,
        }
    }

    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_max_attempts(mut self, attempts: i32) -> Self {
        self.max_attempts = attempts;
        self
    }
}

/// Event emitted by the dispatch worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// A task was received and delivery began.
    DeliveryStarted {
        intent_id: Uuid,
        delivery_id: Uuid,
        attempts: i32,
    },
    /// Delivery ran to completion and the task was acknowledged.
    DeliveryFinished {
        intent_id: Uuid,
        finalization: Finalization,
    },
    /// The task exceeded its attempt budget and was finalized failed.
    DeliveryAbandoned { intent_id: Uuid, attempts: i32 },
    /// A store error interrupted delivery; the task stays queued.
    DeliveryErrored { intent_id: Uuid, error: String },
    WorkerStarted,
    WorkerStopped,
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<WorkerEvent>,
}

impl WorkerHandle {
    /// Signal the worker to shut down gracefully.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| huddle_core::Error::Internal("Failed to send shutdown signal".into()))?;
        Ok(())
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }
}

/// Worker that receives dispatch tasks and hands them to a [`DeliveryWorker`].
pub struct DispatchWorker {
    queue: Arc<dyn DispatchQueue>,
    delivery: DeliveryWorker,
    config: WorkerConfig,
    event_tx: broadcast::Sender<WorkerEvent>,
    notify: Option<Arc<Notify>>,
}

impl DispatchWorker {
    pub fn new(queue: Arc<dyn DispatchQueue>, delivery: DeliveryWorker, config: WorkerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self {
            queue,
            delivery,
            config,
            event_tx,
            notify: None,
        }
    }

    /// Wake the idle loop whenever `notify` fires instead of waiting out the poll interval.
    pub fn with_notify(mut self, notify: Arc<Notify>) -> Self {
        self.notify = Some(notify);
        self
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        let worker = Arc::new(self);
        tokio::spawn(async move {
            worker.run(&mut shutdown_rx).await;
        });

        WorkerHandle {
            shutdown_tx,
            event_rx,
        }
    }

    /// Receive up to `max_concurrent` tasks and deliver them concurrently.
    ///
    /// Only sleeps when the queue is empty.
    #[instrument(skip(self, shutdown_rx))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!(
                subsystem = "delivery",
                component = "worker",
                "Dispatch worker is disabled, not starting"
            );
            return;
        }

        info!(
            subsystem = "delivery",
            component = "worker",
            poll_interval_ms = self.config.poll_interval_ms,
            max_concurrent = self.config.max_concurrent,
            max_attempts = self.config.max_attempts,
            "Dispatch worker started"
        );
        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        loop {
            if shutdown_rx.try_recv().is_ok() {
                info!(subsystem = "delivery", component = "worker", "Dispatch worker received shutdown signal");
                break;
            }

            if self.process_batch().await == 0 {
                let wake = async {
                    match &self.notify {
                        Some(notify) => notify.notified().await,
                        None => std::future::pending::<()>().await,
                    }
                };
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!(subsystem = "delivery", component = "worker", "Dispatch worker received shutdown signal");
                        break;
                    }
                    _ = sleep(poll_interval) => {}
                    _ = wake => {}
                }
            }
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!(subsystem = "delivery", component = "worker", "Dispatch worker stopped");
    }

    /// Receive and process one batch. Returns the number of tasks received.
    pub async fn process_batch(&self) -> usize {
        let mut received = 0;
        let mut tasks = tokio::task::JoinSet::new();

        for _ in 0..self.config.max_concurrent.max(1) {
            match self.receive().await {
                Some(entry) => {
                    received += 1;
                    let worker = self.clone_refs();
                    tasks.spawn(async move {
                        worker.handle(entry).await;
                    });
                }
                None => break,
            }
        }

        if received > 0 {
            debug!(subsystem = "delivery", component = "worker", received, "Processing delivery batch");
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    error!(subsystem = "delivery", component = "worker", error = ?e, "Delivery task panicked");
                }
            }
        }
        received
    }

    /// Process batches until nothing visible is left. Returns the total received.
    pub async fn drain(&self) -> usize {
        let mut total = 0;
        loop {
            let received = self.process_batch().await;
            if received == 0 {
                return total;
            }
            total += received;
        }
    }

    async fn receive(&self) -> Option<QueuedDispatch> {
        match self.queue.receive().await {
            Ok(entry) => entry,
            Err(e) => {
                error!(subsystem = "delivery", component = "worker", error = %e, "Failed to receive dispatch task");
                None
            }
        }
    }

    fn clone_refs(&self) -> DispatchWorkerRef {
        DispatchWorkerRef {
            queue: self.queue.clone(),
            delivery: self.delivery.clone(),
            event_tx: self.event_tx.clone(),
            max_attempts: self.config.max_attempts,
        }
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Tasks not yet acknowledged.
    pub async fn pending_count(&self) -> Result<i64> {
        self.queue.pending_count().await
    }
}

/// What a spawned delivery task needs from the worker.
struct DispatchWorkerRef {
    queue: Arc<dyn DispatchQueue>,
    delivery: DeliveryWorker,
    event_tx: broadcast::Sender<WorkerEvent>,
    max_attempts: i32,
}

impl DispatchWorkerRef {
    async fn handle(self, entry: QueuedDispatch) {
        let QueuedDispatch {
            delivery_id,
            task,
            attempts,
        } = entry;
        let intent_id = task.intent_id;

        if attempts > self.max_attempts {
            match self.delivery.abandon(&task, attempts).await {
                Ok(_) => {
                    self.ack(delivery_id, intent_id).await;
                    let _ = self
                        .event_tx
                        .send(WorkerEvent::DeliveryAbandoned { intent_id, attempts });
                }
                Err(e) => self.errored(intent_id, e.to_string()),
            }
            return;
        }

        let _ = self.event_tx.send(WorkerEvent::DeliveryStarted {
            intent_id,
            delivery_id,
            attempts,
        });

        match self.delivery.deliver(&task).await {
            Ok(report) => {
                self.ack(delivery_id, intent_id).await;
                let _ = self.event_tx.send(WorkerEvent::DeliveryFinished {
                    intent_id,
                    finalization: report.finalization,
                });
            }
            Err(e) => self.errored(intent_id, e.to_string()),
        }
    }

    async fn ack(&self, delivery_id: Uuid, intent_id: Uuid) {
        // A lost ack only causes a redelivery, which finds the intent final.
        if let Err(e) = self.queue.ack(delivery_id).await {
            error!(
                subsystem = "delivery",
                component = "worker",
                %delivery_id,
                %intent_id,
                error = %e,
                "Failed to acknowledge dispatch task"
            );
        }
    }

    fn errored(&self, intent_id: Uuid, error: String) {
        warn!(
            subsystem = "delivery",
            component = "worker",
            %intent_id,
            %error,
            "Delivery interrupted, task left for redelivery"
        );
        let _ = self
            .event_tx
            .send(WorkerEvent::DeliveryErrored { intent_id, error });
    }
}

/// Builder for a dispatch worker.
pub struct WorkerBuilder {
    queue: Arc<dyn DispatchQueue>,
    delivery: DeliveryWorker,
    config: WorkerConfig,
    notify: Option<Arc<Notify>>,
}

impl WorkerBuilder {
    pub fn new(queue: Arc<dyn DispatchQueue>, delivery: DeliveryWorker) -> Self {
        Self {
            queue,
            delivery,
            config: WorkerConfig::default(),
            notify: None,
        }
    }

    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_notify(mut self, notify: Arc<Notify>) -> Self {
        self.notify = Some(notify);
        self
    }

    pub fn build(self) -> DispatchWorker {
        let worker = DispatchWorker::new(self.queue, self.delivery, self.config);
        match self.notify {
            Some(notify) => worker.with_notify(notify),
            None => worker,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_config_default() {
        let config = WorkerConfig::default();
        assert_eq!(config.poll_interval_ms, DELIVERY_POLL_INTERVAL_MS);
        assert_eq!(config.max_concurrent, 4);
        assert_eq!(config.max_attempts, 5);
        assert!(config.enabled);
    }

    #[test]
    fn test_worker_config_builder() {
        let config = WorkerConfig::default()
            .with_poll_interval(250)
            .with_max_concurrent(8)
            .with_max_attempts(2)
            .with_enabled(false);

        assert_eq!(config.poll_interval_ms, 250);
        assert_eq!(config.max_concurrent, 8);
        assert_eq!(config.max_attempts, 2);
        assert!(!config.enabled);
    }

    #[test]
    fn test_worker_config_with_poll_interval_preserves_defaults() {
        let config = WorkerConfig::default().with_poll_interval(100);
        assert_eq!(config.poll_interval_ms, 100);
        assert_eq!(config.max_concurrent, 4);
        assert!(config.enabled);
    }

    #[test]
    fn test_worker_config_chaining_order_independence() {
        let a = WorkerConfig::default()
            .with_enabled(false)
            .with_max_concurrent(10)
            .with_poll_interval(3000);
        let b = WorkerConfig::default()
            .with_poll_interval(3000)
            .with_enabled(false)
            .with_max_concurrent(10);

        assert_eq!(a.poll_interval_ms, b.poll_interval_ms);
        assert_eq!(a.max_concurrent, b.max_concurrent);
        assert_eq!(a.enabled, b.enabled);
    }

    #[test]
    fn test_worker_event_delivery_finished() {
        let intent_id = Uuid::new_v4();
        let event = WorkerEvent::DeliveryFinished {
            intent_id,
            finalization: Finalization::Delivered,
        };

        match event {
            WorkerEvent::DeliveryFinished {
                intent_id: id,
                finalization,
            } => {
                assert_eq!(id, intent_id);
                assert_eq!(finalization, Finalization::Delivered);
            }
            _ => panic!("Wrong event variant"),
        }
    }

    #[test]
    fn test_worker_event_delivery_abandoned() {
        let intent_id = Uuid::new_v4();
        let event = WorkerEvent::DeliveryAbandoned {
            intent_id,
            attempts: 6,
        };
        assert!(matches!(event, WorkerEvent::DeliveryAbandoned { attempts: 6, .. }));
    }

    #[test]
    fn test_worker_event_debug() {
        let event = WorkerEvent::DeliveryErrored {
            intent_id: Uuid::new_v4(),
            error: "pool timed out".to_string(),
        };
        let debug_str = format!("{:?}", event);
        assert!(debug_str.contains("DeliveryErrored"));
        assert!(debug_str.contains("pool timed out"));
    }

    #[test]
    fn test_worker_config_debug() {
        let debug_str = format!("{:?}", WorkerConfig::default());
        assert!(debug_str.contains("WorkerConfig"));
        assert!(debug_str.contains("max_attempts"));
    }
}
