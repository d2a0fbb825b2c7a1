/// Default values the scheduler and worker configs fall back to.
///
/// Reminder offsets must be positive and ordered largest first, since the
/// config layer normalizes to that shape and planning relies on it.
use huddle_core::defaults::*;

#[test]
fn test_reminder_offsets_are_positive_and_descending() {
    assert!(REMINDER_OFFSETS_MINUTES.iter().all(|m| *m > 0));
    assert!(
        REMINDER_OFFSETS_MINUTES.windows(2).all(|w| w[0] > w[1]),
        "REMINDER_OFFSETS_MINUTES should be unique and largest first"
    );
    assert_eq!(REMINDER_OFFSETS_MINUTES, &[10, 5]);
}

#[test]
fn test_window_defaults() {
    assert_eq!(STARTING_WINDOW_SECS, 300, "starting window is five minutes");
    assert_eq!(REMINDER_BUFFER_SECS, 60, "reminder buffer is one minute");
    assert_eq!(TICK_INTERVAL_SECS, 60);
}

#[test]
fn test_buffer_does_not_exceed_tick_interval() {
    // A larger buffer would select reminders more than one tick ahead.
    assert!(REMINDER_BUFFER_SECS as u64 <= TICK_INTERVAL_SECS);
}

#[test]
fn test_visibility_timeout_covers_a_full_send() {
    assert!(
        DISPATCH_VISIBILITY_TIMEOUT_SECS as u64 > PUSH_SEND_TIMEOUT_SECS,
        "a lease must outlive one transport timeout"
    );
}

#[test]
fn test_delivery_defaults() {
    assert_eq!(DELIVERY_MAX_CONCURRENT, 4);
    assert_eq!(DELIVERY_MAX_ATTEMPTS, 5);
    assert_eq!(EXPO_PUSH_URL, "https://exp.host");
    assert_eq!(EXPO_DEVICE_NOT_REGISTERED, "DeviceNotRegistered");
}
