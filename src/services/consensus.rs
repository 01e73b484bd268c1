//! Consensus tracking over per-frame classifications
//!
//! Turns a noisy per-frame signal into at most one fired observation per
//! qualifying streak. A streak is a run of consecutive frames with the same
//! label and confidence strictly above the threshold:
//! - weak frame: streak and current label are cleared
//! - label change: streak restarts at 1 for the new label
//! - streak reaches the required length: fire once, streak back to 0

use crate::domain::types::{ClassificationEvent, FiredObservation, Timestamp};
use std::time::Duration;
use tracing::debug;

/// Tracks the current streak of confident, same-label frames
#[derive(Debug)]
pub struct ConsensusTracker {
    confidence_threshold: f32,
    required_streak_length: u32,
    /// Frames further apart than this belong to different sessions
    session_gap: Option<Duration>,
    current_label: Option<String>,
    streak_count: u32,
    last_frame_at: Option<Timestamp>,
}

impl ConsensusTracker {
    pub fn new(
        confidence_threshold: f32,
        required_streak_length: u32,
        session_gap: Option<Duration>,
    ) -> Self {
        Self {
            confidence_threshold,
            required_streak_length,
            session_gap,
            current_label: None,
            streak_count: 0,
            last_frame_at: None,
        }
    }

    /// Feed one frame; returns an observation when the streak completes
    pub fn observe(&mut self, event: &ClassificationEvent) -> Option<FiredObservation> {
        if self.breaks_session(event.observed_at) {
            debug!(
                label = ?self.current_label,
                streak = %self.streak_count,
                "consensus_session_gap_reset"
            );
            self.reset();
        }
        self.last_frame_at = Some(event.observed_at);

        if event.confidence <= self.confidence_threshold {
            if self.streak_count > 0 {
                debug!(
                    label = %event.label,
                    confidence = %event.confidence,
                    streak = %self.streak_count,
                    "consensus_streak_broken"
                );
            }
            self.current_label = None;
            self.streak_count = 0;
            return None;
        }

        if self.current_label.as_deref() == Some(event.label.as_str()) {
            self.streak_count += 1;
        } else {
            self.current_label = Some(event.label.clone());
            self.streak_count = 1;
        }

        if self.streak_count < self.required_streak_length {
            return None;
        }

        self.streak_count = 0;
        debug!(label = %event.label, observed_at = %event.observed_at, "consensus_fired");
        Some(FiredObservation { label: event.label.clone(), observed_at: event.observed_at })
    }

    /// Drop any in-progress streak (session pause/resume)
    pub fn reset(&mut self) {
        self.current_label = None;
        self.streak_count = 0;
        self.last_frame_at = None;
    }

    /// True when a frame at `at` would start a new session
    #[inline]
    pub fn breaks_session(&self, at: Timestamp) -> bool {
        match (self.session_gap, self.last_frame_at) {
            (Some(gap), Some(last)) => at.saturating_duration_since(last) > gap,
            _ => false,
        }
    }

    pub fn current_label(&self) -> Option<&str> {
        self.current_label.as_deref()
    }

    pub fn streak_count(&self) -> u32 {
        self.streak_count
    }

    pub fn session_gap(&self) -> Option<Duration> {
        self.session_gap
    }
}
