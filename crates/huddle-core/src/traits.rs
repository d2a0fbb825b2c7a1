//! Core traits for the notification pipeline.
//!
//! The scheduler and delivery worker only see these interfaces. Postgres
//! implementations live in `huddle-db`, the in-process ones in
//! `huddle_db::memory`, and push transports in `huddle-push`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::{DeliveryError, Result};
use crate::models::*;

// =============================================================================
// INTENT STORE
// =============================================================================

/// Persistent store of notification intents. The single source of truth
/// for delivery state; every status change goes through a conditional write.
#[async_trait]
pub trait IntentRepository: Send + Sync {
    /// Insert one pending reminder per `scheduled_at`, skipping any that
    /// already exist for `(meeting_id, user_id, scheduled_at)`.
    /// Returns the ids of the rows actually inserted.
    async fn create_reminders(
        &self,
        meeting_id: Uuid,
        user_id: Uuid,
        scheduled_at: &[DateTime<Utc>],
    ) -> Result<Vec<Uuid>>;

    /// Return the starting intent for `(meeting_id, user_id)`, inserting a
    /// pending one if none exists. Concurrent callers get the same row.
    async fn ensure_starting(&self, meeting_id: Uuid, user_id: Uuid)
        -> Result<NotificationIntent>;

    /// Whether an intent of this type has already reached `Sent`.
    async fn has_sent(
        &self,
        meeting_id: Uuid,
        user_id: Uuid,
        notification_type: NotificationType,
    ) -> Result<bool>;

    /// Pending reminders with `scheduled_at <= horizon` whose meeting is not
    /// cancelled, oldest first, at most `limit`.
    async fn due_reminders(&self, horizon: DateTime<Utc>, limit: i64) -> Result<Vec<DueReminder>>;

    /// Fetch an intent by id.
    async fn get(&self, id: Uuid) -> Result<Option<NotificationIntent>>;

    /// Conditional write `Pending → Sent`. Returns whether this call made
    /// the transition; exactly one concurrent caller observes `true`.
    async fn claim(&self, id: Uuid) -> Result<bool>;

    /// Confirm delivery: status `Sent`, `sent_at` set if unset. Applies to
    /// pending or sent intents only. Returns whether a row was updated.
    async fn mark_delivered(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool>;

    /// Record failure. Applies only while the intent is pending or sent
    /// without a confirmed `sent_at`. Returns whether a row was updated.
    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<bool>;

    /// All intents for a meeting, oldest first.
    async fn list_for_meeting(&self, meeting_id: Uuid) -> Result<Vec<NotificationIntent>>;

    /// Counts by status and type.
    async fn stats(&self) -> Result<IntentStats>;
}

// =============================================================================
// EXTERNAL COLLABORATORS
// =============================================================================

/// Read access to the meeting service's data.
#[async_trait]
pub trait MeetingSource: Send + Sync {
    /// Meetings whose stored start date is `date` and that are not cancelled.
    async fn meetings_on(&self, date: NaiveDate) -> Result<Vec<Meeting>>;

    /// Fetch a meeting by id.
    async fn get_meeting(&self, id: Uuid) -> Result<Option<Meeting>>;
}

/// Registry of push endpoint tokens per user.
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// All registered endpoint tokens for a user.
    async fn tokens_for_user(&self, user_id: Uuid) -> Result<Vec<String>>;

    /// Delete one token registration. Returns whether it existed.
    async fn remove_token(&self, user_id: Uuid, token: &str) -> Result<bool>;
}

/// Outbound push delivery to a single endpoint.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Send one message to one endpoint token.
    async fn send(&self, token: &str, message: &PushMessage) -> std::result::Result<(), DeliveryError>;

    /// Transport name for logs.
    fn name(&self) -> &str;
}

// =============================================================================
// DISPATCH QUEUE
// =============================================================================

/// Asynchronous at-least-once queue between scheduler and delivery workers.
///
/// A received entry is leased: it stays invisible until acknowledged or
/// until its lease expires, after which it is delivered again.
#[async_trait]
pub trait DispatchQueue: Send + Sync {
    /// Add a task. Returns the queue entry id.
    async fn enqueue(&self, task: DispatchTask) -> Result<Uuid>;

    /// Lease the next visible entry, if any.
    async fn receive(&self) -> Result<Option<QueuedDispatch>>;

    /// Remove an entry after processing.
    async fn ack(&self, delivery_id: Uuid) -> Result<()>;

    /// Entries not yet acknowledged (leased or visible).
    async fn pending_count(&self) -> Result<i64>;
}
