//! Error types for the huddle notification pipeline.

use std::time::Duration;

use thiserror::Error;

/// Result type alias using huddle's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for store, queue and scheduling operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Meeting not found
    #[error("Meeting not found: {0}")]
    MeetingNotFound(uuid::Uuid),

    /// Notification intent not found
    #[error("Notification intent not found: {0}")]
    IntentNotFound(uuid::Uuid),

    /// Stored meeting date/time could not be combined into an instant
    #[error(transparent)]
    MalformedMeetingTime(#[from] MalformedMeetingTime),

    /// Dispatch queue error
    #[error("Queue error: {0}")]
    Queue(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

/// A meeting's stored start date and time do not form a valid instant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Malformed meeting time: date={date:?} time={time:?}: {reason}")]
pub struct MalformedMeetingTime {
    pub date: String,
    pub time: String,
    pub reason: String,
}

/// Failure of a single push-transport call for one endpoint.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// Network or upstream failure; the endpoint may still be valid.
    #[error("Transient delivery error: {0}")]
    Transient(String),

    /// The send did not complete within the transport timeout.
    #[error("Delivery timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The transport reports the endpoint as permanently unusable.
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

impl DeliveryError {
    /// Whether the endpoint registration should be removed from the registry.
    pub fn is_invalid_endpoint(&self) -> bool {
        matches!(self, DeliveryError::InvalidEndpoint(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("device".to_string());
        assert_eq!(err.to_string(), "Not found: device");
    }

    #[test]
    fn test_error_display_meeting_not_found() {
        let id = Uuid::nil();
        let err = Error::MeetingNotFound(id);
        assert_eq!(err.to_string(), format!("Meeting not found: {}", id));
    }

    #[test]
    fn test_error_display_intent_not_found() {
        let id = Uuid::new_v4();
        let err = Error::IntentNotFound(id);
        assert!(err.to_string().contains(&id.to_string()));
    }

    #[test]
    fn test_error_display_queue() {
        let err = Error::Queue("lease expired".to_string());
        assert_eq!(err.to_string(), "Queue error: lease expired");
    }

    #[test]
    fn test_error_display_config() {
        let err = Error::Config("bad offset".to_string());
        assert_eq!(err.to_string(), "Configuration error: bad offset");
    }

    #[test]
    fn test_malformed_meeting_time_is_transparent() {
        let malformed = MalformedMeetingTime {
            date: "2025-13-01".to_string(),
            time: "16:40".to_string(),
            reason: "invalid date".to_string(),
        };
        let err: Error = malformed.clone().into();
        assert_eq!(err.to_string(), malformed.to_string());
        assert!(err.to_string().contains("2025-13-01"));
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
        assert!(err.to_string().starts_with("Serialization error:"));
    }

    #[test]
    fn test_delivery_error_classification() {
        assert!(DeliveryError::InvalidEndpoint("DeviceNotRegistered".into()).is_invalid_endpoint());
        assert!(!DeliveryError::Transient("503".into()).is_invalid_endpoint());
        assert!(!DeliveryError::Timeout(Duration::from_secs(10)).is_invalid_endpoint());
    }

    #[test]
    fn test_delivery_timeout_display() {
        let err = DeliveryError::Timeout(Duration::from_millis(1500));
        assert_eq!(err.to_string(), "Delivery timed out after 1500ms");
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
        assert_send::<DeliveryError>();
    }
}
