//! Scheduler configuration.

use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use uuid::Uuid;

use huddle_core::defaults::{
    ENV_MEETING_UTC_OFFSET_MINUTES, ENV_NOTIFY_ATTENDEES, ENV_REMINDER_BUFFER_SECS,
    ENV_REMINDER_OFFSETS_MINUTES, ENV_STARTING_WINDOW_SECS, ENV_SWEEP_BATCH_LIMIT,
    ENV_TICK_INTERVAL_SECS, MEETING_UTC_OFFSET_MINUTES, REMINDER_BUFFER_SECS,
    REMINDER_OFFSETS_MINUTES, STARTING_WINDOW_SECS, SWEEP_BATCH_LIMIT, TICK_INTERVAL_SECS,
};
use huddle_core::{Error, Meeting, Result};

use crate::content::ContentTemplates;

/// Who receives a meeting's notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecipientPolicy {
    /// Only the meeting creator.
    #[default]
    CreatorOnly,
    /// The creator and every attendee.
    CreatorAndAttendees,
}

impl RecipientPolicy {
    /// Recipients of `meeting`, creator first, without duplicates.
    pub fn recipients(&self, meeting: &Meeting) -> Vec<Uuid> {
        let mut users = vec![meeting.creator_id];
        if *self == RecipientPolicy::CreatorAndAttendees {
            for attendee in &meeting.attendee_ids {
                if !users.contains(attendee) {
                    users.push(*attendee);
                }
            }
        }
        users
    }
}

/// Configuration for the tick scheduler and reminder planner.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval of the in-process ticker.
    pub tick_interval: Duration,
    /// Width of the starting-soon window.
    pub starting_window: chrono::Duration,
    /// Selection buffer for due reminders.
    pub reminder_buffer: chrono::Duration,
    /// Reminder offsets in minutes, positive, unique, largest first.
    pub reminder_offsets_minutes: Vec<i64>,
    /// Offset the meeting service stores wall-clock values in.
    pub meeting_utc_offset: FixedOffset,
    pub recipients: RecipientPolicy,
    /// Upper bound on reminder candidates per tick.
    pub sweep_batch_limit: i64,
    pub content: ContentTemplates,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(TICK_INTERVAL_SECS),
            starting_window: chrono::Duration::seconds(STARTING_WINDOW_SECS),
            reminder_buffer: chrono::Duration::seconds(REMINDER_BUFFER_SECS),
            reminder_offsets_minutes: REMINDER_OFFSETS_MINUTES.to_vec(),
            meeting_utc_offset: FixedOffset::east_opt(MEETING_UTC_OFFSET_MINUTES * 60)
                .unwrap_or_else(|| Utc.fix()),
            recipients: RecipientPolicy::CreatorOnly,
            sweep_batch_limit: SWEEP_BATCH_LIMIT,
            content: ContentTemplates::default(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("{name} has an invalid value: {raw:?}"))),
        _ => Ok(None),
    }
}

/// Parse a comma-separated minute list such as `"10,5"`.
pub fn parse_offsets(raw: &str) -> Result<Vec<i64>> {
    let offsets = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| Error::Config(format!("reminder offset {s:?} is not a number")))
        })
        .collect::<Result<Vec<_>>>()?;
    normalize_offsets(&offsets)
}

/// Reject non-positive offsets, drop duplicates, order largest first.
pub fn normalize_offsets(offsets: &[i64]) -> Result<Vec<i64>> {
    if let Some(bad) = offsets.iter().find(|m| **m <= 0) {
        return Err(Error::Config(format!(
            "reminder offsets must be positive minutes, got {bad}"
        )));
    }
    let mut normalized = offsets.to_vec();
    normalized.sort_unstable_by(|a, b| b.cmp(a));
    normalized.dedup();
    Ok(normalized)
}

impl SchedulerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `TICK_INTERVAL_SECS` | `60` | In-process ticker interval |
    /// | `STARTING_WINDOW_SECS` | `300` | Starting-soon window width |
    /// | `REMINDER_BUFFER_SECS` | `60` | Reminder selection buffer |
    /// | `REMINDER_OFFSETS_MINUTES` | `10,5` | Reminder offsets before start |
    /// | `MEETING_UTC_OFFSET_MINUTES` | `0` | Offset of stored meeting times |
    /// | `NOTIFY_ATTENDEES` | `false` | Also notify attendees |
    /// | `SWEEP_BATCH_LIMIT` | `500` | Max reminder candidates per tick |
    ///
    /// Content templates are read by [`ContentTemplates::from_env`].
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(secs) = env_parse::<u64>(ENV_TICK_INTERVAL_SECS)? {
            config = config.with_tick_interval(Duration::from_secs(secs.max(1)));
        }
        if let Some(secs) = env_parse::<i64>(ENV_STARTING_WINDOW_SECS)? {
            config = config.with_starting_window(chrono::Duration::seconds(secs.max(0)));
        }
        if let Some(secs) = env_parse::<i64>(ENV_REMINDER_BUFFER_SECS)? {
            config = config.with_reminder_buffer(chrono::Duration::seconds(secs.max(0)));
        }
        if let Ok(raw) = std::env::var(ENV_REMINDER_OFFSETS_MINUTES) {
            config.reminder_offsets_minutes = parse_offsets(&raw)?;
        }
        if let Some(minutes) = env_parse::<i32>(ENV_MEETING_UTC_OFFSET_MINUTES)? {
            config = config.with_meeting_utc_offset_minutes(minutes)?;
        }
        if let Ok(raw) = std::env::var(ENV_NOTIFY_ATTENDEES) {
            let on = matches!(raw.trim(), "1" | "true" | "yes" | "on");
            config.recipients = if on {
                RecipientPolicy::CreatorAndAttendees
            } else {
                RecipientPolicy::CreatorOnly
            };
        }
        if let Some(limit) = env_parse::<i64>(ENV_SWEEP_BATCH_LIMIT)? {
            config = config.with_sweep_batch_limit(limit);
        }
        config.content = ContentTemplates::from_env();

        Ok(config)
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_starting_window(mut self, window: chrono::Duration) -> Self {
        self.starting_window = window;
        self
    }

    pub fn with_reminder_buffer(mut self, buffer: chrono::Duration) -> Self {
        self.reminder_buffer = buffer;
        self
    }

    /// Set reminder offsets. Fails on non-positive values.
    pub fn with_reminder_offsets(mut self, minutes: &[i64]) -> Result<Self> {
        self.reminder_offsets_minutes = normalize_offsets(minutes)?;
        Ok(self)
    }

    /// Set the stored-time offset. Fails outside ±24h.
    pub fn with_meeting_utc_offset_minutes(mut self, minutes: i32) -> Result<Self> {
        self.meeting_utc_offset = FixedOffset::east_opt(minutes.saturating_mul(60))
            .ok_or_else(|| Error::Config(format!("UTC offset of {minutes} minutes is out of range")))?;
        Ok(self)
    }

    pub fn with_recipients(mut self, policy: RecipientPolicy) -> Self {
        self.recipients = policy;
        self
    }

    pub fn with_sweep_batch_limit(mut self, limit: i64) -> Self {
        self.sweep_batch_limit = limit.max(1);
        self
    }

    pub fn with_content(mut self, content: ContentTemplates) -> Self {
        self.content = content;
        self
    }
}
