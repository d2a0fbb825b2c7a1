//! Data models for notification intents, meetings and dispatch tasks.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

// =============================================================================
// NOTIFICATION INTENT
// =============================================================================

/// Kind of notification an intent represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    /// The meeting is about to start (created lazily by the scheduler).
    Starting,
    /// A pre-scheduled reminder at a fixed offset before the start.
    Reminder,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Starting => "starting",
            NotificationType::Reminder => "reminder",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "starting" => Ok(NotificationType::Starting),
            "reminder" => Ok(NotificationType::Reminder),
            other => Err(Error::InvalidInput(format!(
                "unknown notification type: {other}"
            ))),
        }
    }
}

/// Lifecycle status of an intent.
///
/// `Pending → Sent | Failed`. `Sent` is written at claim time; `sent_at`
/// is only set once a push has actually been accepted by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentStatus {
    Pending,
    Sent,
    Failed,
}

impl IntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentStatus::Pending => "pending",
            IntentStatus::Sent => "sent",
            IntentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntentStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(IntentStatus::Pending),
            "sent" => Ok(IntentStatus::Sent),
            "failed" => Ok(IntentStatus::Failed),
            other => Err(Error::InvalidInput(format!("unknown intent status: {other}"))),
        }
    }
}

/// A persisted record meaning "this recipient should receive this notification".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationIntent {
    pub id: Uuid,
    pub meeting_id: Uuid,
    pub user_id: Uuid,
    pub notification_type: NotificationType,
    pub status: IntentStatus,
    /// `meeting_start - offset` for reminders, `None` for starting intents.
    pub scheduled_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NotificationIntent {
    /// A fresh pending intent.
    pub fn pending(
        meeting_id: Uuid,
        user_id: Uuid,
        notification_type: NotificationType,
        scheduled_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            meeting_id,
            user_id,
            notification_type,
            status: IntentStatus::Pending,
            scheduled_at,
            sent_at: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Claimed by a scheduler but delivery not yet confirmed.
    pub fn is_claimed(&self) -> bool {
        self.status == IntentStatus::Sent && self.sent_at.is_none()
    }

    /// At least one endpoint accepted the push.
    pub fn is_delivered(&self) -> bool {
        self.status == IntentStatus::Sent && self.sent_at.is_some()
    }
}

/// Counts of intents by status and type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentStats {
    pub pending: i64,
    /// Sent and confirmed by the delivery worker.
    pub delivered: i64,
    /// Sent at claim time, not yet confirmed.
    pub claimed: i64,
    pub failed: i64,
    pub starting: i64,
    pub reminder: i64,
}

impl IntentStats {
    pub fn total(&self) -> i64 {
        self.pending + self.delivered + self.claimed + self.failed
    }
}

// =============================================================================
// MEETING (read model of the meeting collaborator)
// =============================================================================

/// Lifecycle status of a meeting as stored by the meeting service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
    /// Any status value this pipeline does not know; treated as active.
    Other(String),
}

impl MeetingStatus {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "scheduled" => MeetingStatus::Scheduled,
            "in_progress" => MeetingStatus::InProgress,
            "completed" => MeetingStatus::Completed,
            "cancelled" | "canceled" => MeetingStatus::Cancelled,
            _ => MeetingStatus::Other(s.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MeetingStatus::Scheduled => "scheduled",
            MeetingStatus::InProgress => "in_progress",
            MeetingStatus::Completed => "completed",
            MeetingStatus::Cancelled => "cancelled",
            MeetingStatus::Other(s) => s.as_str(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, MeetingStatus::Cancelled)
    }
}

/// Meeting attributes consumed by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meeting {
    pub id: Uuid,
    pub creator_id: Uuid,
    pub attendee_ids: Vec<Uuid>,
    pub title: String,
    /// Stored calendar date, `YYYY-MM-DD`.
    pub start_date: String,
    /// Stored wall-clock time, `HH:MM` or `HH:MM:SS`.
    pub start_time: String,
    pub status: MeetingStatus,
}

/// A pending reminder intent joined with its (non-cancelled) meeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueReminder {
    pub intent: NotificationIntent,
    pub meeting: Meeting,
}

// =============================================================================
// DISPATCH
// =============================================================================

/// Unit of work handed from the scheduler to the delivery worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchTask {
    pub intent_id: Uuid,
    pub user_id: Uuid,
    pub meeting_id: Uuid,
    pub notification_type: NotificationType,
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
}

impl DispatchTask {
    /// The message sent to each of the recipient's endpoints.
    pub fn message(&self) -> PushMessage {
        PushMessage {
            title: self.title.clone(),
            body: self.body.clone(),
            data: self.data.clone(),
        }
    }
}

/// A leased queue entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedDispatch {
    /// Queue entry id, used to acknowledge.
    pub delivery_id: Uuid,
    pub task: DispatchTask,
    /// Number of times this entry has been received, including this one.
    pub attempts: i32,
}

/// Payload for one push-transport call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
}

// =============================================================================
// REPORTS
// =============================================================================

/// Counters for one tick, returned to the invoker and logged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    /// Meetings on the sweep dates that fell inside the starting window.
    pub starting_matched: usize,
    /// Reminder candidates returned by the buffered selection.
    pub reminder_candidates: usize,
    /// Intents claimed and enqueued this tick.
    pub dispatched: usize,
    /// Already sent, no longer pending, or not yet strictly due.
    pub skipped: usize,
    /// Claims that another scheduler won.
    pub race_lost: usize,
    /// Meetings excluded because their start could not be parsed.
    pub malformed: usize,
    /// Per-item errors absorbed by the sweep.
    pub errors: usize,
}

/// Final state written by the delivery worker for one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Finalization {
    /// At least one endpoint succeeded; intent confirmed sent.
    Delivered,
    /// No endpoint succeeded; intent marked failed.
    Failed,
    /// Nothing written: the intent was already final or its condition no
    /// longer held.
    Unchanged,
}

/// Outcome of delivering one dispatch task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReport {
    pub intent_id: Uuid,
    pub endpoints: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Endpoint registrations deleted because the transport rejected them.
    pub pruned: usize,
    pub finalization: Finalization,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_type_round_trip_str() {
        for t in [NotificationType::Starting, NotificationType::Reminder] {
            assert_eq!(t.as_str().parse::<NotificationType>().unwrap(), t);
        }
        assert!("digest".parse::<NotificationType>().is_err());
    }

    #[test]
    fn test_intent_status_parse_rejects_unknown() {
        assert_eq!("sent".parse::<IntentStatus>().unwrap(), IntentStatus::Sent);
        assert!("claimed".parse::<IntentStatus>().is_err());
    }

    #[test]
    fn test_notification_type_serde_lowercase() {
        let json = serde_json::to_string(&NotificationType::Reminder).unwrap();
        assert_eq!(json, "\"reminder\"");
    }

    #[test]
    fn test_meeting_status_parse() {
        assert_eq!(MeetingStatus::parse("Cancelled"), MeetingStatus::Cancelled);
        assert_eq!(MeetingStatus::parse("canceled"), MeetingStatus::Cancelled);
        assert_eq!(MeetingStatus::parse("scheduled"), MeetingStatus::Scheduled);
        assert!(!MeetingStatus::parse("rescheduled").is_cancelled());
        assert_eq!(MeetingStatus::parse("rescheduled").as_str(), "rescheduled");
    }

    #[test]
    fn test_intent_claimed_vs_delivered() {
        let now = Utc::now();
        let mut intent = NotificationIntent::pending(
            Uuid::new_v4(),
            Uuid::new_v4(),
            NotificationType::Starting,
            None,
            now,
        );
        assert!(!intent.is_claimed());

        intent.status = IntentStatus::Sent;
        assert!(intent.is_claimed());
        assert!(!intent.is_delivered());

        intent.sent_at = Some(now);
        assert!(!intent.is_claimed());
        assert!(intent.is_delivered());
    }

    #[test]
    fn test_dispatch_task_message_carries_data() {
        let mut data = BTreeMap::new();
        data.insert("intent_id".to_string(), "abc".to_string());
        let task = DispatchTask {
            intent_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            meeting_id: Uuid::new_v4(),
            notification_type: NotificationType::Reminder,
            title: "Upcoming meeting".to_string(),
            body: "Standup starts in 5 minutes".to_string(),
            data,
        };
        let msg = task.message();
        assert_eq!(msg.title, task.title);
        assert_eq!(msg.data.get("intent_id").map(String::as_str), Some("abc"));
    }

    #[test]
    fn test_intent_stats_total() {
        let stats = IntentStats {
            pending: 1,
            delivered: 2,
            claimed: 3,
            failed: 4,
            starting: 6,
            reminder: 4,
        };
        assert_eq!(stats.total(), 10);
    }
}
