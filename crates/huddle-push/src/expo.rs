//! Expo push service transport.
//!
//! One HTTP request per endpoint token. The service answers with a push
//! ticket; a ticket error of `DeviceNotRegistered` means the token is dead
//! and should be pruned, every other failure is treated as transient.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use huddle_core::defaults::{
    ENV_EXPO_ACCESS_TOKEN, ENV_EXPO_PUSH_URL, ENV_PUSH_SEND_TIMEOUT_SECS,
    EXPO_DEVICE_NOT_REGISTERED, EXPO_PUSH_URL, PUSH_SEND_TIMEOUT_SECS,
};
use huddle_core::{DeliveryError, Error, PushMessage, PushTransport, Result};

/// Path of the send endpoint, relative to the base URL.
pub const SEND_PATH: &str = "/--/api/v2/push/send";

/// Expo transport configuration.
#[derive(Debug, Clone)]
pub struct ExpoConfig {
    /// Base URL of the push service (no trailing path).
    pub base_url: String,
    /// Optional access token sent as a bearer credential.
    pub access_token: Option<String>,
    /// HTTP client timeout. The delivery worker applies its own per-send
    /// timeout as well; this one bounds the connection itself.
    pub timeout: Duration,
}

impl Default for ExpoConfig {
    fn default() -> Self {
        Self {
            base_url: EXPO_PUSH_URL.to_string(),
            access_token: None,
            timeout: Duration::from_secs(PUSH_SEND_TIMEOUT_SECS),
        }
    }
}

impl ExpoConfig {
    /// Read `EXPO_PUSH_URL`, `EXPO_ACCESS_TOKEN` and `PUSH_SEND_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let base_url =
            std::env::var(ENV_EXPO_PUSH_URL).unwrap_or_else(|_| EXPO_PUSH_URL.to_string());
        let access_token = std::env::var(ENV_EXPO_ACCESS_TOKEN)
            .ok()
            .filter(|t| !t.trim().is_empty());
        let timeout_secs = std::env::var(ENV_PUSH_SEND_TIMEOUT_SECS)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|s| *s > 0)
            .unwrap_or(PUSH_SEND_TIMEOUT_SECS);

        Self {
            base_url,
            access_token,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Full send URL.
    pub fn send_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), SEND_PATH)
    }
}

#[derive(Debug, Serialize)]
struct ExpoMessage<'a> {
    to: &'a str,
    title: &'a str,
    body: &'a str,
    data: &'a std::collections::BTreeMap<String, String>,
    sound: &'static str,
}

#[derive(Debug, Deserialize)]
struct ExpoResponse {
    #[serde(default)]
    data: Option<TicketData>,
    #[serde(default)]
    errors: Vec<ExpoRequestError>,
}

/// A single message yields one ticket; batches yield an array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TicketData {
    One(Ticket),
    Many(Vec<Ticket>),
}

#[derive(Debug, Deserialize)]
struct Ticket {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<TicketDetails>,
}

#[derive(Debug, Deserialize)]
struct TicketDetails {
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExpoRequestError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Push transport over the Expo HTTP API.
pub struct ExpoPushTransport {
    client: Client,
    config: ExpoConfig,
}

impl ExpoPushTransport {
    /// Create a transport with the given configuration.
    pub fn new(config: ExpoConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "push",
            component = "expo",
            op = "init",
            url = %config.send_url(),
            authenticated = config.access_token.is_some(),
            "Initializing Expo push transport"
        );

        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(ExpoConfig::from_env())
    }

    pub fn config(&self) -> &ExpoConfig {
        &self.config
    }
}

/// Map a ticket to the transport outcome.
fn classify_ticket(ticket: &Ticket) -> std::result::Result<(), DeliveryError> {
    if ticket.status == "ok" {
        return Ok(());
    }
    let code = ticket.details.as_ref().and_then(|d| d.error.as_deref());
    let message = ticket
        .message
        .clone()
        .unwrap_or_else(|| format!("ticket status {}", ticket.status));

    match code {
        Some(EXPO_DEVICE_NOT_REGISTERED) => Err(DeliveryError::InvalidEndpoint(message)),
        Some(code) => Err(DeliveryError::Transient(format!("{code}: {message}"))),
        None => Err(DeliveryError::Transient(message)),
    }
}

#[async_trait]
impl PushTransport for ExpoPushTransport {
    async fn send(&self, token: &str, message: &PushMessage) -> std::result::Result<(), DeliveryError> {
        let start = Instant::now();
        let payload = ExpoMessage {
            to: token,
            title: &message.title,
            body: &message.body,
            data: &message.data,
            sound: "default",
        };

        let mut request = self.client.post(self.config.send_url()).json(&payload);
        if let Some(access_token) = &self.config.access_token {
            request = request.bearer_auth(access_token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                DeliveryError::Timeout(self.config.timeout)
            } else {
                DeliveryError::Transient(format!("request failed: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                subsystem = "push",
                component = "expo",
                op = "send",
                http_status = status.as_u16(),
                "Push service returned an error status"
            );
            return Err(match status {
                StatusCode::TOO_MANY_REQUESTS => {
                    DeliveryError::Transient("rate limited by push service".to_string())
                }
                _ => DeliveryError::Transient(format!("HTTP {}: {}", status.as_u16(), body)),
            });
        }

        let parsed: ExpoResponse = response
            .json()
            .await
            .map_err(|e| DeliveryError::Transient(format!("unreadable push response: {e}")))?;

        if let Some(err) = parsed.errors.first() {
            return Err(DeliveryError::Transient(format!(
                "{}: {}",
                err.code.as_deref().unwrap_or("request error"),
                err.message.as_deref().unwrap_or("no message")
            )));
        }

        let outcome = match parsed.data {
            Some(TicketData::One(ticket)) => classify_ticket(&ticket),
            Some(TicketData::Many(tickets)) => match tickets.first() {
                Some(ticket) => classify_ticket(ticket),
                None => Err(DeliveryError::Transient("empty ticket list".to_string())),
            },
            None => Err(DeliveryError::Transient("response carried no ticket".to_string())),
        };

        debug!(
            subsystem = "push",
            component = "expo",
            op = "send",
            ok = outcome.is_ok(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Push ticket received"
        );
        outcome
    }

    fn name(&self) -> &str {
        "expo"
    }
}
