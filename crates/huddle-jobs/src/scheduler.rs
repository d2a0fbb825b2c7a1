//! Tick scheduler.
//!
//! One tick runs two sweeps against the intent store:
//!
//! 1. **Starting soon**: meetings whose start lies in `[now, now + window]`
//!    get a starting intent per recipient (insert-if-absent), which is then
//!    claimed and enqueued.
//! 2. **Reminders**: pending reminders selected with the buffered predicate
//!    are re-read and re-checked with the strict predicate before claiming.
//!
//! The scheduler keeps no state between ticks. Overlapping ticks are safe
//! because the claim is a single conditional write.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use huddle_core::{
    is_due, is_starting_soon, is_strictly_due, meeting_start, sweep_dates, DispatchQueue, DueReminder,
    IntentRepository, IntentStatus, Meeting, MeetingSource, NotificationIntent, NotificationType,
    Result, TickReport,
};

use crate::config::SchedulerConfig;
use crate::guard::{self, ClaimOutcome};

/// What happened to one (intent, recipient) item in a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Dispatched,
    Skipped,
    RaceLost,
}

/// Periodic detector of starting meetings and due reminders.
pub struct TickScheduler {
    intents: Arc<dyn IntentRepository>,
    meetings: Arc<dyn MeetingSource>,
    queue: Arc<dyn DispatchQueue>,
    config: SchedulerConfig,
}

impl TickScheduler {
    pub fn new(
        intents: Arc<dyn IntentRepository>,
        meetings: Arc<dyn MeetingSource>,
        queue: Arc<dyn DispatchQueue>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            intents,
            meetings,
            queue,
            config,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run one tick at the current wall-clock time.
    pub async fn run_tick(&self) -> Result<TickReport> {
        self.run_tick_at(Utc::now()).await
    }

    /// Run one tick as of `now`.
    ///
    /// Per-item failures are logged and counted; only a failure to fetch a
    /// candidate set is returned as an error.
    pub async fn run_tick_at(&self, now: DateTime<Utc>) -> Result<TickReport> {
        let start = Instant::now();
        let mut report = TickReport::default();

        self.sweep_starting(now, &mut report).await.map_err(|e| {
            error!(
                subsystem = "scheduler",
                component = "tick",
                op = "sweep_starting",
                error = %e,
                "Failed to fetch meetings for starting sweep"
            );
            e
        })?;

        self.sweep_reminders(now, &mut report).await.map_err(|e| {
            error!(
                subsystem = "scheduler",
                component = "tick",
                op = "sweep_reminders",
                error = %e,
                "Failed to fetch due reminders"
            );
            e
        })?;

        info!(
            subsystem = "scheduler",
            component = "tick",
            op = "complete",
            now = %now,
            starting_matched = report.starting_matched,
            reminder_candidates = report.reminder_candidates,
            dispatched = report.dispatched,
            skipped = report.skipped,
            race_lost = report.race_lost,
            malformed = report.malformed,
            errors = report.errors,
            duration_ms = start.elapsed().as_millis() as u64,
            "Tick complete"
        );
        Ok(report)
    }

    fn record(report: &mut TickReport, outcome: Result<ItemOutcome>, intent_hint: &str) {
        match outcome {
            Ok(ItemOutcome::Dispatched) => report.dispatched += 1,
            Ok(ItemOutcome::Skipped) => report.skipped += 1,
            Ok(ItemOutcome::RaceLost) => report.race_lost += 1,
            Err(e) => {
                report.errors += 1;
                warn!(
                    subsystem = "scheduler",
                    component = "tick",
                    item = intent_hint,
                    error = %e,
                    "Failed to process sweep item"
                );
            }
        }
    }

    // -------------------------------------------------------------------------
    // Starting soon
    // -------------------------------------------------------------------------

    async fn sweep_starting(&self, now: DateTime<Utc>, report: &mut TickReport) -> Result<()> {
        let window = self.config.starting_window;
        let offset = self.config.meeting_utc_offset;

        let mut meetings: Vec<Meeting> = Vec::new();
        for date in sweep_dates(now, window, offset) {
            meetings.extend(self.meetings.meetings_on(date).await?);
        }

        for meeting in meetings {
            if meeting.status.is_cancelled() {
                continue;
            }
            let start = match meeting_start(&meeting.start_date, &meeting.start_time, offset) {
                Ok(start) => start,
                Err(e) => {
                    report.malformed += 1;
                    warn!(
                        subsystem = "scheduler",
                        component = "starting",
                        meeting_id = %meeting.id,
                        error = %e,
                        "Skipping meeting with malformed start"
                    );
                    continue;
                }
            };
            if !is_starting_soon(start, now, window) {
                continue;
            }
            report.starting_matched += 1;

            for user_id in self.config.recipients.recipients(&meeting) {
                let outcome = self.dispatch_starting(&meeting, user_id, start, now).await;
                Self::record(report, outcome, "starting");
            }
        }
        Ok(())
    }

    async fn dispatch_starting(
        &self,
        meeting: &Meeting,
        user_id: Uuid,
        start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<ItemOutcome> {
        if self
            .intents
            .has_sent(meeting.id, user_id, NotificationType::Starting)
            .await?
        {
            debug!(
                subsystem = "scheduler",
                component = "starting",
                meeting_id = %meeting.id,
                %user_id,
                "Starting notification already sent"
            );
            return Ok(ItemOutcome::Skipped);
        }

        let intent = self.intents.ensure_starting(meeting.id, user_id).await?;
        if intent.status != IntentStatus::Pending {
            debug!(
                subsystem = "scheduler",
                component = "starting",
                intent_id = %intent.id,
                status = %intent.status,
                "Starting intent no longer pending"
            );
            return Ok(ItemOutcome::Skipped);
        }

        self.claim_and_enqueue(&intent, meeting, Some(start), now).await
    }

    // -------------------------------------------------------------------------
    // Reminders
    // -------------------------------------------------------------------------

    async fn sweep_reminders(&self, now: DateTime<Utc>, report: &mut TickReport) -> Result<()> {
        let buffer = self.config.reminder_buffer;
        let candidates: Vec<DueReminder> = self
            .intents
            .due_reminders(now + buffer, self.config.sweep_batch_limit)
            .await?
            .into_iter()
            .filter(|c| c.intent.scheduled_at.is_some_and(|at| is_due(at, now, buffer)))
            .collect();
        report.reminder_candidates = candidates.len();

        for DueReminder { intent, meeting } in candidates {
            let outcome = self.dispatch_reminder(&intent, &meeting, now).await;
            Self::record(report, outcome, "reminder");
        }
        Ok(())
    }

    async fn dispatch_reminder(
        &self,
        candidate: &NotificationIntent,
        meeting: &Meeting,
        now: DateTime<Utc>,
    ) -> Result<ItemOutcome> {
        // Selection was permissive; re-read and apply the strict check before mutating.
        let Some(intent) = self.intents.get(candidate.id).await? else {
            return Ok(ItemOutcome::Skipped);
        };
        if intent.status != IntentStatus::Pending {
            return Ok(ItemOutcome::Skipped);
        }
        let Some(scheduled_at) = intent.scheduled_at else {
            return Ok(ItemOutcome::Skipped);
        };
        if !is_strictly_due(scheduled_at, now) {
            debug!(
                subsystem = "scheduler",
                component = "reminder",
                intent_id = %intent.id,
                scheduled_at = %scheduled_at,
                "Reminder selected but not yet strictly due"
            );
            return Ok(ItemOutcome::Skipped);
        }

        let start = match meeting_start(
            &meeting.start_date,
            &meeting.start_time,
            self.config.meeting_utc_offset,
        ) {
            Ok(start) => Some(start),
            Err(e) => {
                warn!(
                    subsystem = "scheduler",
                    component = "reminder",
                    meeting_id = %meeting.id,
                    error = %e,
                    "Meeting start unreadable, sending reminder with fallback content"
                );
                None
            }
        };

        self.claim_and_enqueue(&intent, meeting, start, now).await
    }

    // -------------------------------------------------------------------------
    // Shared claim path
    // -------------------------------------------------------------------------

    async fn claim_and_enqueue(
        &self,
        intent: &NotificationIntent,
        meeting: &Meeting,
        start: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<ItemOutcome> {
        if guard::claim(self.intents.as_ref(), intent.id).await? == ClaimOutcome::RaceLost {
            return Ok(ItemOutcome::RaceLost);
        }

        let task = self.config.content.build_task(intent, meeting, start, now);
        match self.queue.enqueue(task).await {
            Ok(delivery_id) => {
                info!(
                    subsystem = "scheduler",
                    component = "dispatch",
                    op = "enqueue",
                    intent_id = %intent.id,
                    meeting_id = %meeting.id,
                    user_id = %intent.user_id,
                    notification_type = %intent.notification_type,
                    %delivery_id,
                    "Notification dispatched"
                );
                Ok(ItemOutcome::Dispatched)
            }
            Err(e) => {
                // Claimed but never handed off: record the failure so the
                // intent does not sit in Sent without a task.
                let message = format!("enqueue failed: {e}");
                if let Err(mark_err) = self.intents.mark_failed(intent.id, &message).await {
                    error!(
                        subsystem = "scheduler",
                        component = "dispatch",
                        intent_id = %intent.id,
                        error = %mark_err,
                        "Failed to record enqueue failure"
                    );
                }
                Err(e)
            }
        }
    }
}
