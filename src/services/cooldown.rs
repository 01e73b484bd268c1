//! Cooldown gate for reward payouts
//!
//! Enforces a minimum interval between successful payouts regardless of how
//! many streaks fire inside it. The only place a `RewardEvent` is created.

use crate::domain::reward::{RewardEvent, Rejection};
use crate::domain::types::{FiredObservation, Timestamp};
use crate::services::reward_classifier::RewardClassifier;
use std::time::Duration;
use tracing::{debug, info};

/// Pays out fired observations at most once per cooldown window
#[derive(Debug)]
pub struct CooldownGate {
    classifier: RewardClassifier,
    cooldown: Duration,
    /// Updated only on a successful payout
    last_awarded_at: Option<Timestamp>,
}

impl CooldownGate {
    pub fn new(classifier: RewardClassifier, cooldown: Duration) -> Self {
        Self { classifier, cooldown, last_awarded_at: None }
    }

    /// Decide whether `candidate` pays out at `now`
    ///
    /// Unmatched labels are rejected before the cooldown is consulted, so
    /// they never consume the window. Elapsed time must strictly exceed
    /// the cooldown.
    pub fn try_award(
        &mut self,
        candidate: &FiredObservation,
        now: Timestamp,
    ) -> Result<RewardEvent, Rejection> {
        let Some(category) = self.classifier.category_of(&candidate.label) else {
            debug!(label = %candidate.label, "reward_no_category");
            return Err(Rejection::NoCategory);
        };

        if let Some(last) = self.last_awarded_at {
            let elapsed = now.saturating_duration_since(last);
            if elapsed <= self.cooldown {
                let remaining = self.cooldown - elapsed;
                debug!(
                    label = %candidate.label,
                    elapsed_ms = %elapsed.as_millis(),
                    remaining_ms = %remaining.as_millis(),
                    "reward_cooldown_active"
                );
                return Err(Rejection::Cooldown { remaining });
            }
        }

        self.last_awarded_at = Some(now);
        let event = RewardEvent::new(&candidate.label, category.name(), category.points(), now);

        info!(
            id = %event.id(),
            label = %event.label(),
            category = %event.category(),
            points = %event.points_delta(),
            awarded_at = %now,
            "reward_awarded"
        );

        Ok(event)
    }

    /// Pull a future award time back to `now` after the stream clock moved back
    ///
    /// The window then restarts at `now` instead of blocking until the old
    /// clock catches up.
    pub fn clamp_to(&mut self, now: Timestamp) {
        if let Some(last) = self.last_awarded_at {
            if last > now {
                debug!(last_awarded_at = %last, now = %now, "cooldown_clamped");
                self.last_awarded_at = Some(now);
            }
        }
    }

    pub fn last_awarded_at(&self) -> Option<Timestamp> {
        self.last_awarded_at
    }

    pub fn classifier(&self) -> &RewardClassifier {
        &self.classifier
    }
}
