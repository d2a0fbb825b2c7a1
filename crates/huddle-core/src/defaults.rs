//! Centralized default constants for the notification pipeline.
//!
//! Config structs in other crates read these as their fallbacks, so a value
//! changed here changes every consumer.

// =============================================================================
// TIME WINDOWS
// =============================================================================

/// Width of the "starting soon" window: a meeting matches when its start lies
/// in `[now, now + STARTING_WINDOW_SECS]`.
pub const STARTING_WINDOW_SECS: i64 = 300;

/// Selection buffer for due reminders. Candidates are fetched up to
/// `now + REMINDER_BUFFER_SECS`; acting still requires `scheduled_at <= now`.
pub const REMINDER_BUFFER_SECS: i64 = 60;

/// Minute offsets before meeting start at which reminders are planned.
pub const REMINDER_OFFSETS_MINUTES: &[i64] = &[10, 5];

/// UTC offset (minutes) in which meeting dates and times are stored.
pub const MEETING_UTC_OFFSET_MINUTES: i32 = 0;

// =============================================================================
// SCHEDULER
// =============================================================================

/// Interval between ticks when the in-process ticker is used.
pub const TICK_INTERVAL_SECS: u64 = 60;

/// Upper bound on reminder candidates fetched per tick.
pub const SWEEP_BATCH_LIMIT: i64 = 500;

// =============================================================================
// DELIVERY
// =============================================================================

/// Timeout for one push-transport call (one endpoint).
pub const PUSH_SEND_TIMEOUT_SECS: u64 = 10;

/// Maximum concurrent delivery tasks per worker.
pub const DELIVERY_MAX_CONCURRENT: usize = 4;

/// Poll interval when the dispatch queue is empty (milliseconds).
pub const DELIVERY_POLL_INTERVAL_MS: u64 = 1_000;

/// Receives of the same task after which it is abandoned and finalized failed.
pub const DELIVERY_MAX_ATTEMPTS: i32 = 5;

/// How long a received dispatch task stays invisible before redelivery.
pub const DISPATCH_VISIBILITY_TIMEOUT_SECS: i64 = 120;

/// Capacity of the worker event broadcast channel.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// PUSH TRANSPORT
// =============================================================================

/// Base URL of the Expo push service.
pub const EXPO_PUSH_URL: &str = "https://exp.host";

/// Expo ticket error code for an unregistered device token.
pub const EXPO_DEVICE_NOT_REGISTERED: &str = "DeviceNotRegistered";

// =============================================================================
// ENVIRONMENT VARIABLES
// =============================================================================

pub const ENV_TICK_INTERVAL_SECS: &str = "TICK_INTERVAL_SECS";
pub const ENV_STARTING_WINDOW_SECS: &str = "STARTING_WINDOW_SECS";
pub const ENV_REMINDER_BUFFER_SECS: &str = "REMINDER_BUFFER_SECS";
pub const ENV_REMINDER_OFFSETS_MINUTES: &str = "REMINDER_OFFSETS_MINUTES";
pub const ENV_MEETING_UTC_OFFSET_MINUTES: &str = "MEETING_UTC_OFFSET_MINUTES";
pub const ENV_NOTIFY_ATTENDEES: &str = "NOTIFY_ATTENDEES";
pub const ENV_SWEEP_BATCH_LIMIT: &str = "SWEEP_BATCH_LIMIT";
pub const ENV_DELIVERY_WORKER_ENABLED: &str = "DELIVERY_WORKER_ENABLED";
pub const ENV_DELIVERY_MAX_CONCURRENT: &str = "DELIVERY_MAX_CONCURRENT";
pub const ENV_DELIVERY_POLL_INTERVAL_MS: &str = "DELIVERY_POLL_INTERVAL_MS";
pub const ENV_DELIVERY_MAX_ATTEMPTS: &str = "DELIVERY_MAX_ATTEMPTS";
pub const ENV_PUSH_SEND_TIMEOUT_SECS: &str = "PUSH_SEND_TIMEOUT_SECS";
pub const ENV_DISPATCH_VISIBILITY_TIMEOUT_SECS: &str = "DISPATCH_VISIBILITY_TIMEOUT_SECS";
pub const ENV_EXPO_PUSH_URL: &str = "EXPO_PUSH_URL";
pub const ENV_EXPO_ACCESS_TOKEN: &str = "EXPO_ACCESS_TOKEN";
