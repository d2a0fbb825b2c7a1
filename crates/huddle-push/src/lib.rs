//! # huddle-push
//!
//! Push transports for the huddle notification pipeline.
//!
//! - `expo`: the Expo push HTTP API
//! - `mock`: scripted in-process transport (feature `mock`)

pub mod expo;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use expo::{ExpoConfig, ExpoPushTransport};

#[cfg(any(test, feature = "mock"))]
pub use mock::{MockCall, MockOutcome, MockPushTransport};
