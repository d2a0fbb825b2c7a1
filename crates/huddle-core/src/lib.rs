//! # huddle-core
//!
//! Core types, traits, and time-window logic for the huddle meeting
//! notification pipeline.
//!
//! This crate provides the data model shared by the scheduler, the dispatch
//! queue and the delivery worker, plus the store and transport interfaces
//! that concrete backends implement.

pub mod defaults;
pub mod error;
pub mod models;
pub mod traits;
pub mod window;

// Re-export commonly used types at crate root
pub use error::{DeliveryError, Error, MalformedMeetingTime, Result};
pub use models::*;
pub use traits::*;
pub use window::{is_due, is_starting_soon, is_strictly_due, meeting_start, sweep_dates};
