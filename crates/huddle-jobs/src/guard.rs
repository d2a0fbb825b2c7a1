//! Idempotency guard.
//!
//! The only coordination point between overlapping ticks: a single
//! conditional `Pending -> Sent` write. Whoever sees the write take effect
//! owns the intent and is the only one allowed to enqueue it.

use tracing::debug;
use uuid::Uuid;

use huddle_core::{IntentRepository, Result};

/// Result of attempting to claim an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This caller moved the intent to `Sent` and must enqueue it.
    Claimed,
    /// The intent was no longer pending; another caller owns it.
    RaceLost,
}

impl ClaimOutcome {
    pub fn is_claimed(&self) -> bool {
        matches!(self, ClaimOutcome::Claimed)
    }
}

/// Claim `intent_id` for dispatch.
pub async fn claim(intents: &dyn IntentRepository, intent_id: Uuid) -> Result<ClaimOutcome> {
    if intents.claim(intent_id).await? {
        Ok(ClaimOutcome::Claimed)
    } else {
        debug!(
            subsystem = "scheduler",
            component = "guard",
            %intent_id,
            "Claim lost, intent no longer pending"
        );
        Ok(ClaimOutcome::RaceLost)
    }
}
