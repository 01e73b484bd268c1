//! Shared types for the reward pipeline

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Newtype wrapper for event timestamps (epoch milliseconds)
///
/// The engine never samples the wall clock itself; every time-sensitive
/// operation receives one of these from the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    #[inline]
    pub fn as_millis(self) -> u64 {
        self.0
    }

    /// Time elapsed since `earlier`, zero if `earlier` is in the future
    #[inline]
    pub fn saturating_duration_since(self, earlier: Timestamp) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One per-frame result from the external image classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationEvent {
    pub label: String,
    /// Top-1 confidence, expected in [0, 1]
    pub confidence: f32,
    pub observed_at: Timestamp,
}

impl ClassificationEvent {
    pub fn new(label: impl Into<String>, confidence: f32, observed_at: Timestamp) -> Self {
        Self { label: label.into(), confidence, observed_at }
    }

    /// Check the label and confidence are well-formed
    ///
    /// Timestamp ordering is checked separately by the frame timeline.
    pub fn validate(&self) -> Result<(), InvalidInput> {
        if self.label.trim().is_empty() {
            return Err(InvalidInput::EmptyLabel);
        }
        // NaN fails the range check as well
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(InvalidInput::ConfidenceOutOfRange(self.confidence));
        }
        Ok(())
    }
}

/// A streak that reached the required length
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiredObservation {
    pub label: String,
    pub observed_at: Timestamp,
}

/// A malformed classification event, dropped without touching engine state
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InvalidInput {
    EmptyLabel,
    ConfidenceOutOfRange(f32),
    TimestampRegressed { previous: Timestamp, observed: Timestamp },
    /// Further ahead of the previous frame than the stream allows
    TimestampJumped { previous: Timestamp, observed: Timestamp },
    /// Manual confirm with no held consensus to pay out
    NothingToConfirm,
}

impl InvalidInput {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvalidInput::EmptyLabel => "empty_label",
            InvalidInput::ConfidenceOutOfRange(_) => "confidence_out_of_range",
            InvalidInput::TimestampRegressed { .. } => "timestamp_regressed",
            InvalidInput::TimestampJumped { .. } => "timestamp_jumped",
            InvalidInput::NothingToConfirm => "nothing_to_confirm",
        }
    }
}

impl std::fmt::Display for InvalidInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidInput::EmptyLabel => write!(f, "empty label"),
            InvalidInput::ConfidenceOutOfRange(c) => {
                write!(f, "confidence {} outside [0, 1]", c)
            }
            InvalidInput::TimestampRegressed { previous, observed } => {
                write!(f, "timestamp {} before previous frame {}", observed, previous)
            }
            InvalidInput::TimestampJumped { previous, observed } => {
                write!(f, "timestamp {} too far ahead of previous frame {}", observed, previous)
            }
            InvalidInput::NothingToConfirm => write!(f, "nothing to confirm"),
        }
    }
}
