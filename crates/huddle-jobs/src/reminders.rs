//! Reminder planning.
//!
//! Called when a meeting is created. Writes one pending reminder intent per
//! (recipient, offset) with `scheduled_at = start - offset`. Planning again
//! for the same meeting is a no-op.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use huddle_core::{meeting_start, IntentRepository, Meeting, Result};

use crate::config::SchedulerConfig;

/// Plans reminder intents for newly created meetings.
pub struct ReminderPlanner {
    intents: Arc<dyn IntentRepository>,
    config: SchedulerConfig,
}

impl ReminderPlanner {
    pub fn new(intents: Arc<dyn IntentRepository>, config: SchedulerConfig) -> Self {
        Self { intents, config }
    }

    /// Reminder instants for a meeting starting at `start`, largest offset first.
    pub fn reminder_times(&self, start: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        self.config
            .reminder_offsets_minutes
            .iter()
            .map(|m| start - chrono::Duration::minutes(*m))
            .collect()
    }

    /// Insert pending reminders for every recipient of `meeting`.
    ///
    /// Returns the ids of the intents actually created. Cancelled meetings
    /// get none; a malformed start is an error.
    pub async fn schedule_reminders(&self, meeting: &Meeting) -> Result<Vec<Uuid>> {
        if meeting.status.is_cancelled() {
            debug!(
                subsystem = "scheduler",
                component = "reminders",
                meeting_id = %meeting.id,
                "Meeting cancelled, no reminders planned"
            );
            return Ok(Vec::new());
        }

        let start = meeting_start(
            &meeting.start_date,
            &meeting.start_time,
            self.config.meeting_utc_offset,
        )?;
        let times = self.reminder_times(start);
        if times.is_empty() {
            return Ok(Vec::new());
        }

        let mut created = Vec::new();
        for user_id in self.config.recipients.recipients(meeting) {
            created.extend(
                self.intents
                    .create_reminders(meeting.id, user_id, &times)
                    .await?,
            );
        }

        info!(
            subsystem = "scheduler",
            component = "reminders",
            op = "schedule",
            meeting_id = %meeting.id,
            meeting_start = %start,
            offsets = ?self.config.reminder_offsets_minutes,
            created = created.len(),
            "Reminders planned"
        );
        Ok(created)
    }
}
