//! Notification title and body templates.
//!
//! Only three placeholders exist: `{title}` (meeting title), `{time}`
//! (stored start time, `HH:MM`) and `{minutes}` (whole minutes until the
//! start, rounded, never negative).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use huddle_core::{DispatchTask, Meeting, NotificationIntent, NotificationType};

pub const ENV_CONTENT_STARTING_TITLE: &str = "CONTENT_STARTING_TITLE";
pub const ENV_CONTENT_STARTING_BODY: &str = "CONTENT_STARTING_BODY";
pub const ENV_CONTENT_REMINDER_TITLE: &str = "CONTENT_REMINDER_TITLE";
pub const ENV_CONTENT_REMINDER_BODY: &str = "CONTENT_REMINDER_BODY";

/// Title/body template pair for one notification type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub title: String,
    pub body: String,
}

/// Templates for every notification type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentTemplates {
    pub starting: Template,
    pub reminder: Template,
    /// Body used when the meeting start cannot be resolved, so `{minutes}` has no value.
    pub fallback_body: String,
}

impl Default for ContentTemplates {
    fn default() -> Self {
        Self {
            starting: Template {
                title: "Meeting starting soon".to_string(),
                body: "{title} starts in {minutes} minutes ({time})".to_string(),
            },
            reminder: Template {
                title: "Upcoming meeting".to_string(),
                body: "{title} starts in {minutes} minutes".to_string(),
            },
            fallback_body: "{title} is coming up soon".to_string(),
        }
    }
}

impl ContentTemplates {
    /// Defaults, with any `CONTENT_*` variable overriding its template.
    pub fn from_env() -> Self {
        let mut templates = Self::default();
        let read = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        if let Some(v) = read(ENV_CONTENT_STARTING_TITLE) {
            templates.starting.title = v;
        }
        if let Some(v) = read(ENV_CONTENT_STARTING_BODY) {
            templates.starting.body = v;
        }
        if let Some(v) = read(ENV_CONTENT_REMINDER_TITLE) {
            templates.reminder.title = v;
        }
        if let Some(v) = read(ENV_CONTENT_REMINDER_BODY) {
            templates.reminder.body = v;
        }
        templates
    }

    fn template(&self, notification_type: NotificationType) -> &Template {
        match notification_type {
            NotificationType::Starting => &self.starting,
            NotificationType::Reminder => &self.reminder,
        }
    }

    /// Build the dispatch task for a claimed intent.
    ///
    /// `start` is the resolved meeting start; `None` selects the fallback body.
    pub fn build_task(
        &self,
        intent: &NotificationIntent,
        meeting: &Meeting,
        start: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> DispatchTask {
        let template = self.template(intent.notification_type);
        let time = display_time(&meeting.start_time);

        let (title, body) = match start {
            Some(start) => {
                let minutes = minutes_until(start, now).to_string();
                (
                    render(&template.title, &meeting.title, &time, &minutes),
                    render(&template.body, &meeting.title, &time, &minutes),
                )
            }
            None => (
                render(&template.title, &meeting.title, &time, ""),
                render(&self.fallback_body, &meeting.title, &time, ""),
            ),
        };

        let mut data = BTreeMap::new();
        data.insert("intent_id".to_string(), intent.id.to_string());
        data.insert("meeting_id".to_string(), meeting.id.to_string());
        data.insert("type".to_string(), intent.notification_type.to_string());
        if let Some(scheduled_at) = intent.scheduled_at {
            data.insert("scheduled_at".to_string(), scheduled_at.to_rfc3339());
        }

        DispatchTask {
            intent_id: intent.id,
            user_id: intent.user_id,
            meeting_id: meeting.id,
            notification_type: intent.notification_type,
            title,
            body,
            data,
        }
    }
}

/// Substitute the three supported placeholders.
pub fn render(template: &str, title: &str, time: &str, minutes: &str) -> String {
    template
        .replace("{title}", title)
        .replace("{time}", time)
        .replace("{minutes}", minutes)
}

/// Whole minutes from `now` until `start`, rounded to nearest, floored at zero.
pub fn minutes_until(start: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let secs = (start - now).num_seconds().max(0);
    (secs + 30) / 60
}

fn display_time(stored: &str) -> String {
    let stored = stored.trim();
    stored.get(..5).unwrap_or(stored).to_string()
}
