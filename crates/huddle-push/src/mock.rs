//! Mock push transport for deterministic testing.
//!
//! Outcomes are scripted per token; unscripted tokens succeed. Every call is
//! logged so tests can assert on exactly what was sent.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use huddle_push::mock::{MockOutcome, MockPushTransport};
//!
//! let push = MockPushTransport::new()
//!     .with_outcome("ExponentPushToken[dead]", MockOutcome::InvalidEndpoint)
//!     .with_latency_for("ExponentPushToken[slow]", Duration::from_secs(30));
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use huddle_core::{DeliveryError, PushMessage, PushTransport};

/// Scripted result of a send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOutcome {
    Accept,
    Transient(String),
    InvalidEndpoint,
}

/// One recorded send.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub token: String,
    pub message: PushMessage,
    pub timestamp: std::time::Instant,
}

#[derive(Debug, Clone, Default)]
struct MockConfig {
    outcomes: HashMap<String, MockOutcome>,
    latencies: HashMap<String, Duration>,
    default_latency: Duration,
}

/// Mock push transport for testing.
#[derive(Clone, Default)]
pub struct MockPushTransport {
    config: Arc<MockConfig>,
    call_log: Arc<Mutex<Vec<MockCall>>>,
}

impl MockPushTransport {
    /// Create a transport that accepts every send.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the outcome for one token.
    pub fn with_outcome(mut self, token: impl Into<String>, outcome: MockOutcome) -> Self {
        Arc::make_mut(&mut self.config)
            .outcomes
            .insert(token.into(), outcome);
        self
    }

    /// Delay sends to one token, e.g. to exceed the caller's timeout.
    pub fn with_latency_for(mut self, token: impl Into<String>, latency: Duration) -> Self {
        Arc::make_mut(&mut self.config)
            .latencies
            .insert(token.into(), latency);
        self
    }

    /// Delay every send that has no per-token latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        Arc::make_mut(&mut self.config).default_latency = latency;
        self
    }

    /// All logged calls, in call order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.call_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of sends to one token.
    pub fn calls_to(&self, token: &str) -> usize {
        self.call_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| c.token == token)
            .count()
    }

    pub fn call_count(&self) -> usize {
        self.call_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn log_call(&self, token: &str, message: &PushMessage) {
        self.call_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(MockCall {
                token: token.to_string(),
                message: message.clone(),
                timestamp: std::time::Instant::now(),
            });
    }
}

#[async_trait]
impl PushTransport for MockPushTransport {
    async fn send(&self, token: &str, message: &PushMessage) -> Result<(), DeliveryError> {
        self.log_call(token, message);

        let latency = self
            .config
            .latencies
            .get(token)
            .copied()
            .unwrap_or(self.config.default_latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        match self.config.outcomes.get(token) {
            None | Some(MockOutcome::Accept) => Ok(()),
            Some(MockOutcome::Transient(reason)) => Err(DeliveryError::Transient(reason.clone())),
            Some(MockOutcome::InvalidEndpoint) => {
                Err(DeliveryError::InvalidEndpoint(format!("{token} is not registered")))
            }
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn message() -> PushMessage {
        PushMessage {
            title: "Meeting starting".to_string(),
            body: "Standup starts in 5 minutes".to_string(),
            data: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_unscripted_tokens_succeed() {
        let push = MockPushTransport::new();
        assert!(push.send("a", &message()).await.is_ok());
        assert_eq!(push.call_count(), 1);
    }

    #[tokio::test]
    async fn test_scripted_outcomes() {
        let push = MockPushTransport::new()
            .with_outcome("dead", MockOutcome::InvalidEndpoint)
            .with_outcome("flaky", MockOutcome::Transient("503".to_string()));

        assert!(push.send("dead", &message()).await.unwrap_err().is_invalid_endpoint());
        assert_eq!(
            push.send("flaky", &message()).await.unwrap_err(),
            DeliveryError::Transient("503".to_string())
        );
        assert_eq!(push.calls_to("dead"), 1);
        assert_eq!(push.calls()[1].token, "flaky");
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_is_simulated() {
        let push = MockPushTransport::new().with_latency_for("slow", Duration::from_secs(30));
        let start = tokio::time::Instant::now();
        push.send("slow", &message()).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(30));
    }
}
