//! Delivery of one dispatch task to every endpoint of its recipient.
//!
//! Delivery is at-least-once from the queue's point of view, so every write
//! here is conditional: a redelivered task for an intent that is already
//! confirmed or failed sends nothing and changes nothing.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, info, warn};

use huddle_core::defaults::{ENV_PUSH_SEND_TIMEOUT_SECS, PUSH_SEND_TIMEOUT_SECS};
use huddle_core::{
    DeliveryError, DeliveryReport, DeviceRegistry, DispatchTask, Finalization, IntentRepository,
    IntentStatus, PushMessage, PushTransport, Result,
};

/// Error recorded when the recipient has no endpoints at all.
pub const NO_ENDPOINTS: &str = "no registered push endpoints";

/// Configuration for push delivery.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Upper bound on one transport call.
    pub send_timeout: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_secs(PUSH_SEND_TIMEOUT_SECS),
        }
    }
}

impl DeliveryConfig {
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `PUSH_SEND_TIMEOUT_SECS` | `10` | Timeout per endpoint send |
    pub fn from_env() -> Self {
        let secs = std::env::var(ENV_PUSH_SEND_TIMEOUT_SECS)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(PUSH_SEND_TIMEOUT_SECS)
            .max(1);
        Self {
            send_timeout: Duration::from_secs(secs),
        }
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }
}

/// Sends dispatch tasks and finalizes their intents.
#[derive(Clone)]
pub struct DeliveryWorker {
    intents: Arc<dyn IntentRepository>,
    devices: Arc<dyn DeviceRegistry>,
    transport: Arc<dyn PushTransport>,
    config: DeliveryConfig,
}

impl DeliveryWorker {
    pub fn new(
        intents: Arc<dyn IntentRepository>,
        devices: Arc<dyn DeviceRegistry>,
        transport: Arc<dyn PushTransport>,
        config: DeliveryConfig,
    ) -> Self {
        Self {
            intents,
            devices,
            transport,
            config,
        }
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    /// Deliver `task` and write the intent's final state.
    ///
    /// Endpoint failures are reported, not returned. An `Err` means a store
    /// call failed and the task should stay on the queue for redelivery.
    pub async fn deliver(&self, task: &DispatchTask) -> Result<DeliveryReport> {
        let start = Instant::now();
        let intent_id = task.intent_id;
        let mut report = DeliveryReport {
            intent_id,
            endpoints: 0,
            succeeded: 0,
            failed: 0,
            pruned: 0,
            finalization: Finalization::Unchanged,
            error: None,
        };

        match self.intents.get(intent_id).await? {
            None => {
                warn!(
                    subsystem = "delivery",
                    component = "deliver",
                    %intent_id,
                    "Intent not found, dropping task"
                );
                return Ok(report);
            }
            Some(intent) if intent.is_delivered() || intent.status == IntentStatus::Failed => {
                debug!(
                    subsystem = "delivery",
                    component = "deliver",
                    %intent_id,
                    status = %intent.status,
                    "Intent already final, not sending again"
                );
                return Ok(report);
            }
            Some(_) => {}
        }

        let tokens = self.devices.tokens_for_user(task.user_id).await?;
        report.endpoints = tokens.len();

        if tokens.is_empty() {
            report.error = Some(NO_ENDPOINTS.to_string());
            if self.intents.mark_failed(intent_id, NO_ENDPOINTS).await? {
                report.finalization = Finalization::Failed;
            }
            warn!(
                subsystem = "delivery",
                component = "deliver",
                %intent_id,
                user_id = %task.user_id,
                "No push endpoints registered for recipient"
            );
            return Ok(report);
        }

        let message = task.message();
        let results = join_all(tokens.iter().map(|token| self.send_one(token, &message))).await;

        let mut errors = Vec::new();
        for (index, (token, result)) in tokens.iter().zip(results).enumerate() {
            let Err(e) = result else {
                report.succeeded += 1;
                continue;
            };
            report.failed += 1;
            errors.push(format!("endpoint {}: {e}", index + 1));

            if e.is_invalid_endpoint() {
                match self.devices.remove_token(task.user_id, token).await {
                    Ok(true) => report.pruned += 1,
                    Ok(false) => {}
                    Err(err) => warn!(
                        subsystem = "delivery",
                        component = "prune",
                        %intent_id,
                        endpoint = index + 1,
                        error = %err,
                        "Failed to remove rejected endpoint"
                    ),
                }
            }
        }
        if !errors.is_empty() {
            report.error = Some(errors.join("; "));
        }

        if report.succeeded > 0 {
            if self.intents.mark_delivered(intent_id, Utc::now()).await? {
                report.finalization = Finalization::Delivered;
            }
        } else {
            let reason = report.error.clone().unwrap_or_default();
            if self.intents.mark_failed(intent_id, &reason).await? {
                report.finalization = Finalization::Failed;
            }
        }

        info!(
            subsystem = "delivery",
            component = "deliver",
            op = "finalize",
            %intent_id,
            transport = self.transport.name(),
            endpoints = report.endpoints,
            succeeded = report.succeeded,
            failed = report.failed,
            pruned = report.pruned,
            finalization = ?report.finalization,
            duration_ms = start.elapsed().as_millis() as u64,
            "Delivery finished"
        );
        Ok(report)
    }

    /// Give up on a task the queue has handed out too many times.
    pub async fn abandon(&self, task: &DispatchTask, attempts: i32) -> Result<bool> {
        let reason = format!("abandoned after {attempts} delivery attempts");
        let changed = self.intents.mark_failed(task.intent_id, &reason).await?;
        warn!(
            subsystem = "delivery",
            component = "deliver",
            op = "abandon",
            intent_id = %task.intent_id,
            attempts,
            changed,
            "Dispatch task abandoned"
        );
        Ok(changed)
    }

    async fn send_one(
        &self,
        token: &str,
        message: &PushMessage,
    ) -> std::result::Result<(), DeliveryError> {
        let timeout = self.config.send_timeout;
        match tokio::time::timeout(timeout, self.transport.send(token, message)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout(timeout)),
        }
    }
}
