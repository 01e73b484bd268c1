//! Recognition-to-reward pipeline
//!
//! One synchronous pass per classification event:
//! validate → frame timeline → consensus tracker → (on fire) cooldown gate → outcome.
//! Not internally synchronized; callers deliver events one at a time.

use crate::domain::reward::{RewardEvent, Rejection};
use crate::domain::types::{ClassificationEvent, FiredObservation, InvalidInput, Timestamp};
use crate::infra::config::EngineConfig;
use crate::infra::metrics::Metrics;
use crate::services::consensus::ConsensusTracker;
use crate::services::cooldown::CooldownGate;
use crate::services::reward_classifier::RewardClassifier;
use crate::services::timeline::{Admission, FrameTimeline};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Result of feeding one event through the pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Frame accepted, no streak completed
    Pending,
    Awarded(RewardEvent),
    Rejected(Rejection),
    /// Frame dropped by validation; engine state untouched
    Invalid(InvalidInput),
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Pending => "pending",
            Outcome::Awarded(_) => "awarded",
            Outcome::Rejected(r) => r.as_str(),
            Outcome::Invalid(_) => "invalid",
        }
    }

    pub fn reward(&self) -> Option<&RewardEvent> {
        match self {
            Outcome::Awarded(event) => Some(event),
            _ => None,
        }
    }

    pub fn into_reward(self) -> Option<RewardEvent> {
        match self {
            Outcome::Awarded(event) => Some(event),
            _ => None,
        }
    }
}

/// The consolidation engine: consensus, classification and cooldown
pub struct RewardEngine {
    tracker: ConsensusTracker,
    gate: CooldownGate,
    timeline: FrameTimeline,
    metrics: Arc<Metrics>,
    /// Consensus the cooldown turned down while its label is still in view
    held: Option<FiredObservation>,
}

impl RewardEngine {
    /// Build an engine from a validated decision table
    pub fn new(config: &EngineConfig, metrics: Arc<Metrics>) -> anyhow::Result<Self> {
        config.validate()?;

        let tracker = ConsensusTracker::new(
            config.confidence_threshold,
            config.required_streak_length,
            config.session_gap,
        );
        let gate = CooldownGate::new(RewardClassifier::new(&config.categories), config.cooldown);
        let timeline = FrameTimeline::new(config.max_forward_jump);

        Ok(Self { tracker, gate, timeline, metrics, held: None })
    }

    /// Process one classification event
    pub fn on_classification(&mut self, event: ClassificationEvent) -> Outcome {
        let process_start = Instant::now();

        if let Err(reason) = event.validate() {
            return self.reject_frame(&event, reason);
        }

        let fresh_baseline = self.timeline.last_seen_at().is_none();
        match self.timeline.admit(event.observed_at) {
            Ok(Admission::InOrder) => {
                if fresh_baseline {
                    self.gate.clamp_to(event.observed_at);
                }
            }
            Ok(Admission::Rebased { previous }) => {
                warn!(previous = %previous, observed_at = %event.observed_at, "timeline_rebased");
                self.tracker.reset();
                self.held = None;
                self.gate.clamp_to(event.observed_at);
                self.metrics.record_timeline_rebased();
            }
            Err(reason) => return self.reject_frame(&event, reason),
        }

        let session_break = self.tracker.breaks_session(event.observed_at);
        let fired = self.tracker.observe(&event);

        if let Some(held) = &self.held {
            if session_break || self.tracker.current_label() != Some(held.label.as_str()) {
                debug!(label = %held.label, "held_consensus_dropped");
                self.held = None;
            }
        }

        let outcome = match fired {
            None => Outcome::Pending,
            Some(fired) => {
                self.metrics.record_streak_fired();
                let now = fired.observed_at;
                self.pay_out(fired, now)
            }
        };

        let latency_us = process_start.elapsed().as_micros() as u64;
        self.metrics.record_frame_processed(latency_us);

        outcome
    }

    /// User confirmation of the item currently in view
    ///
    /// A confirmation adds no streak progress. It only retries a consensus
    /// that the cooldown turned down, as long as the same label is still in
    /// view and the last frame is within the session gap of `at`. Without
    /// `at` the time of the latest frame is used.
    pub fn manual_confirm(&mut self, at: Option<Timestamp>) -> Outcome {
        let Some(last_seen_at) = self.timeline.last_seen_at() else {
            return self.refuse_confirm(at, InvalidInput::NothingToConfirm);
        };
        let at = at.unwrap_or(last_seen_at);

        if let Err(reason) = self.timeline.check(at) {
            return self.refuse_confirm(Some(at), reason);
        }

        let stale = self
            .tracker
            .session_gap()
            .is_some_and(|gap| at.saturating_duration_since(last_seen_at) > gap);

        let Some(held) = self.held.take().filter(|_| !stale) else {
            return self.refuse_confirm(Some(at), InvalidInput::NothingToConfirm);
        };

        debug!(label = %held.label, at = %at, "manual_confirm");
        self.pay_out(FiredObservation { label: held.label, observed_at: at }, at)
    }

    /// Drop any in-progress streak and the timeline baseline; the cooldown window is kept
    pub fn reset_session(&mut self) {
        info!(
            label = ?self.tracker.current_label(),
            streak = %self.tracker.streak_count(),
            "session_reset"
        );
        self.tracker.reset();
        self.timeline.reset();
        self.held = None;
        self.metrics.record_session_reset();
    }

    fn pay_out(&mut self, fired: FiredObservation, now: Timestamp) -> Outcome {
        match self.gate.try_award(&fired, now) {
            Ok(reward) => {
                self.held = None;
                self.metrics.record_award(reward.points_delta());
                Outcome::Awarded(reward)
            }
            Err(rejection) => {
                info!(
                    label = %fired.label,
                    observed_at = %fired.observed_at,
                    reason = %rejection,
                    "reward_rejected"
                );
                self.metrics.record_rejection(rejection);
                if let Rejection::Cooldown { .. } = rejection {
                    self.held = Some(fired);
                }
                Outcome::Rejected(rejection)
            }
        }
    }

    fn reject_frame(&self, event: &ClassificationEvent, reason: InvalidInput) -> Outcome {
        warn!(
            label = %event.label,
            confidence = %event.confidence,
            observed_at = %event.observed_at,
            reason = %reason,
            "classification_invalid"
        );
        self.metrics.record_invalid();
        Outcome::Invalid(reason)
    }

    fn refuse_confirm(&self, at: Option<Timestamp>, reason: InvalidInput) -> Outcome {
        debug!(at = ?at, reason = %reason, "manual_confirm_refused");
        self.metrics.record_invalid();
        Outcome::Invalid(reason)
    }

    pub fn tracker(&self) -> &ConsensusTracker {
        &self.tracker
    }

    pub fn gate(&self) -> &CooldownGate {
        &self.gate
    }

    pub fn timeline(&self) -> &FrameTimeline {
        &self.timeline
    }

    /// Whether a manual confirmation could currently pay out
    pub fn has_held_consensus(&self) -> bool {
        self.held.is_some()
    }

    /// Points the configured table assigns to `label`
    pub fn value_of(&self, label: &str) -> u32 {
        self.gate.classifier().value_of(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn engine() -> RewardEngine {
        let config = EngineConfig::default().with_session_gap(None);
        RewardEngine::new(&config, Arc::new(Metrics::new())).unwrap()
    }

    fn frame(label: &str, confidence: f32, ms: u64) -> ClassificationEvent {
        ClassificationEvent::new(label, confidence, Timestamp(ms))
    }

    /// Feed 8 frames 100ms apart and return the last outcome
    fn streak(engine: &mut RewardEngine, label: &str, start_ms: u64) -> Outcome {
        let mut last = Outcome::Pending;
        for i in 0..8 {
            last = engine.on_classification(frame(label, 0.9, start_ms + i * 100));
        }
        last
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = EngineConfig::default().with_required_streak_length(0);
        assert!(RewardEngine::new(&config, Arc::new(Metrics::new())).is_err());
    }

    #[test]
    fn test_streak_awards_points() {
        let mut engine = engine();
        let outcome = streak(&mut engine, "plastic_bottle", 0);
        let reward = outcome.into_reward().unwrap();
        assert_eq!(reward.points_delta(), 10);
        assert_eq!(reward.awarded_at(), Timestamp(700));
    }

    #[test]
    fn test_pending_before_streak_completes() {
        let mut engine = engine();
        for i in 0..7 {
            assert_eq!(engine.on_classification(frame("glass_jar", 0.9, i * 100)), Outcome::Pending);
        }
    }

    #[test]
    fn test_invalid_frame_does_not_reset_streak() {
        let mut engine = engine();
        for i in 0..7 {
            engine.on_classification(frame("metal_can", 0.9, i * 100));
        }

        let outcome = engine.on_classification(frame("metal_can", 1.5, 650));
        assert!(matches!(outcome, Outcome::Invalid(InvalidInput::ConfidenceOutOfRange(_))));
        assert_eq!(engine.tracker().streak_count(), 7);

        let outcome = engine.on_classification(frame("metal_can", 0.9, 700));
        assert_eq!(outcome.reward().map(|r| r.points_delta()), Some(20));
    }

    #[test]
    fn test_regressed_timestamp_rejected() {
        let mut engine = engine();
        engine.on_classification(frame("glass_jar", 0.9, 1000));
        let outcome = engine.on_classification(frame("glass_jar", 0.9, 900));
        assert!(matches!(outcome, Outcome::Invalid(InvalidInput::TimestampRegressed { .. })));
        assert_eq!(engine.tracker().streak_count(), 1);
    }

    #[test]
    fn test_cooldown_rejection_outcome() {
        let mut engine = engine();
        assert!(streak(&mut engine, "plastic_bottle", 0).reward().is_some());

        let outcome = streak(&mut engine, "plastic_bottle", 1000);
        assert_eq!(
            outcome,
            Outcome::Rejected(Rejection::Cooldown { remaining: Duration::from_millis(4000) })
        );
        assert_eq!(outcome.as_str(), "cooldown");
    }

    /// Award one streak at 0..700 and have a second one at 1000..1700 turned down
    fn hold_rejected_consensus(engine: &mut RewardEngine, label: &str) {
        assert!(streak(engine, label, 0).reward().is_some());
        assert!(matches!(
            streak(engine, label, 1000),
            Outcome::Rejected(Rejection::Cooldown { .. })
        ));
        assert!(engine.has_held_consensus());
    }

    #[test]
    fn test_manual_confirm_without_history() {
        let mut engine = engine();
        assert_eq!(engine.manual_confirm(None), Outcome::Invalid(InvalidInput::NothingToConfirm));
        assert_eq!(
            engine.manual_confirm(Some(Timestamp(0))),
            Outcome::Invalid(InvalidInput::NothingToConfirm)
        );
    }

    #[test]
    fn test_single_frame_plus_confirms_never_pays() {
        let metrics = Arc::new(Metrics::new());
        let config = EngineConfig::default().with_session_gap(None);
        let mut engine = RewardEngine::new(&config, metrics.clone()).unwrap();
        engine.on_classification(frame("plastic_bottle", 0.99, 0));

        for i in 1..50 {
            assert_eq!(
                engine.manual_confirm(Some(Timestamp(i * 100))),
                Outcome::Invalid(InvalidInput::NothingToConfirm)
            );
        }
        assert_eq!(engine.tracker().streak_count(), 1);
        assert_eq!(metrics.rewards_awarded(), 0);
    }

    #[test]
    fn test_confirm_pays_held_consensus_once_cooldown_allows() {
        let mut engine = engine();
        hold_rejected_consensus(&mut engine, "plastic_bottle");
        engine.on_classification(frame("plastic_bottle", 0.9, 1800));

        // Exactly 5s after the award at 700
        assert_eq!(
            engine.manual_confirm(Some(Timestamp(5700))),
            Outcome::Rejected(Rejection::Cooldown { remaining: Duration::ZERO })
        );

        let reward = engine.manual_confirm(Some(Timestamp(5800))).into_reward().unwrap();
        assert_eq!(reward.points_delta(), 10);
        assert_eq!(reward.awarded_at(), Timestamp(5800));
        assert_eq!(engine.tracker().streak_count(), 1);

        // Paid out: a second tap has nothing left to confirm
        assert_eq!(
            engine.manual_confirm(Some(Timestamp(5900))),
            Outcome::Invalid(InvalidInput::NothingToConfirm)
        );
    }

    #[test]
    fn test_confirm_defaults_to_latest_frame() {
        let mut engine = engine();
        hold_rejected_consensus(&mut engine, "glass_jar");

        assert_eq!(
            engine.manual_confirm(None),
            Outcome::Rejected(Rejection::Cooldown { remaining: Duration::from_millis(4000) })
        );
        assert!(engine.has_held_consensus());
        assert_eq!(engine.gate().last_awarded_at(), Some(Timestamp(700)));
    }

    #[test]
    fn test_confirm_needs_label_in_view() {
        let mut engine = engine();
        hold_rejected_consensus(&mut engine, "plastic_bottle");
        engine.on_classification(frame("metal_can", 0.9, 1800));
        assert!(!engine.has_held_consensus());
        assert_eq!(
            engine.manual_confirm(Some(Timestamp(6000))),
            Outcome::Invalid(InvalidInput::NothingToConfirm)
        );

        let mut engine = self::engine();
        hold_rejected_consensus(&mut engine, "plastic_bottle");
        engine.on_classification(frame("plastic_bottle", 0.3, 1800));
        assert!(!engine.has_held_consensus());
    }

    #[test]
    fn test_stale_confirm_refused() {
        let config = EngineConfig::default().with_session_gap(Some(Duration::from_secs(2)));
        let mut engine = RewardEngine::new(&config, Arc::new(Metrics::new())).unwrap();
        hold_rejected_consensus(&mut engine, "plastic_bottle");

        // 2.3s after the last frame at 1700
        assert_eq!(
            engine.manual_confirm(Some(Timestamp(4000))),
            Outcome::Invalid(InvalidInput::NothingToConfirm)
        );
        assert!(!engine.has_held_consensus());
    }

    #[test]
    fn test_confirm_out_of_line_time_keeps_held_consensus() {
        let mut engine = engine();
        hold_rejected_consensus(&mut engine, "plastic_bottle");

        assert!(matches!(
            engine.manual_confirm(Some(Timestamp(100))),
            Outcome::Invalid(InvalidInput::TimestampRegressed { .. })
        ));
        assert!(matches!(
            engine.manual_confirm(Some(Timestamp(u64::MAX))),
            Outcome::Invalid(InvalidInput::TimestampJumped { .. })
        ));
        assert!(engine.has_held_consensus());
    }

    #[test]
    fn test_far_future_frame_does_not_stall_stream() {
        let metrics = Arc::new(Metrics::new());
        let mut engine = RewardEngine::new(&EngineConfig::default(), metrics.clone()).unwrap();
        for ms in [0, 100, 200] {
            engine.on_classification(frame("plastic_bottle", 0.9, ms));
        }

        assert!(matches!(
            engine.on_classification(frame("plastic_bottle", 0.9, u64::MAX)),
            Outcome::Invalid(InvalidInput::TimestampJumped { .. })
        ));
        assert_eq!(engine.timeline().last_seen_at(), Some(Timestamp(200)));

        // The streak carries on as if the outlier never arrived
        let outcomes: Vec<Outcome> = (3..8)
            .map(|i| engine.on_classification(frame("plastic_bottle", 0.9, i * 100)))
            .collect();
        assert!(outcomes.iter().all(|o| !matches!(o, Outcome::Invalid(_))));
        assert_eq!(outcomes[4].reward().map(|r| r.points_delta()), Some(10));
        assert_eq!(metrics.frames_invalid(), 1);
    }

    #[test]
    fn test_far_future_first_frame_is_rebased_away() {
        let metrics = Arc::new(Metrics::new());
        let mut engine = RewardEngine::new(&EngineConfig::default(), metrics.clone()).unwrap();
        engine.on_classification(frame("glass_jar", 0.9, u64::MAX - 1));

        assert!(matches!(
            engine.on_classification(frame("glass_jar", 0.9, 0)),
            Outcome::Invalid(InvalidInput::TimestampRegressed { .. })
        ));
        assert_eq!(engine.on_classification(frame("glass_jar", 0.9, 100)), Outcome::Pending);
        assert_eq!(engine.timeline().last_seen_at(), Some(Timestamp(100)));
        assert_eq!(engine.tracker().streak_count(), 1);
        assert_eq!(metrics.timeline_rebases(), 1);

        let outcomes: Vec<Outcome> = (2..9)
            .map(|i| engine.on_classification(frame("glass_jar", 0.9, i * 100)))
            .collect();
        assert_eq!(outcomes[6].reward().map(|r| r.points_delta()), Some(30));
    }

    #[test]
    fn test_rebase_restarts_cooldown_window() {
        let mut engine = engine();
        assert!(streak(&mut engine, "metal_can", 100_000).reward().is_some());

        engine.on_classification(frame("metal_can", 0.9, 0));
        engine.on_classification(frame("metal_can", 0.9, 100));
        assert_eq!(engine.gate().last_awarded_at(), Some(Timestamp(100)));

        // Fires at 800, still inside the restarted window
        let outcomes: Vec<Outcome> =
            (2..9).map(|i| engine.on_classification(frame("metal_can", 0.9, i * 100))).collect();
        assert!(matches!(outcomes[6], Outcome::Rejected(Rejection::Cooldown { .. })));
    }

    #[test]
    fn test_reset_session_clears_timeline() {
        let mut engine = engine();
        engine.on_classification(frame("glass_jar", 0.9, 50_000));
        engine.reset_session();
        assert_eq!(engine.timeline().last_seen_at(), None);

        // A restarted camera clock is accepted straight away
        assert_eq!(engine.on_classification(frame("glass_jar", 0.9, 0)), Outcome::Pending);
        assert_eq!(engine.tracker().streak_count(), 1);
    }

    #[test]
    fn test_reset_session_keeps_cooldown() {
        let mut engine = engine();
        hold_rejected_consensus(&mut engine, "glass_jar");

        engine.reset_session();
        assert_eq!(engine.tracker().streak_count(), 0);
        assert!(!engine.has_held_consensus());
        assert_eq!(engine.gate().last_awarded_at(), Some(Timestamp(700)));
        assert_eq!(
            engine.manual_confirm(Some(Timestamp(6000))),
            Outcome::Invalid(InvalidInput::NothingToConfirm)
        );

        // Cooldown still runs from the award at 700
        let outcomes: Vec<Outcome> = (0..8)
            .map(|i| engine.on_classification(frame("glass_jar", 0.9, 2000 + i * 100)))
            .collect();
        assert!(matches!(outcomes[7], Outcome::Rejected(Rejection::Cooldown { .. })));
    }

    #[test]
    fn test_value_of_uses_config_table() {
        let engine = engine();
        assert_eq!(engine.value_of("metal_can"), 20);
        assert_eq!(engine.value_of("unknown_item"), 0);
    }
}
