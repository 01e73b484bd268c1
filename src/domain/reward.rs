//! Reward payout model

use crate::domain::types::Timestamp;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

/// Generate a new UUIDv7 (time-sortable)
pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}

/// A successful payout, produced only by the cooldown gate
///
/// Fields are private so nothing outside the gate can mint one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewardEvent {
    id: String,
    label: String,
    category: String,
    points_delta: u32,
    awarded_at: Timestamp,
}

impl RewardEvent {
    pub(crate) fn new(label: &str, category: &str, points_delta: u32, awarded_at: Timestamp) -> Self {
        debug_assert!(points_delta > 0);
        Self {
            id: new_uuid_v7(),
            label: label.to_string(),
            category: category.to_string(),
            points_delta,
            awarded_at,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Name of the reward category the label matched
    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn points_delta(&self) -> u32 {
        self.points_delta
    }

    pub fn awarded_at(&self) -> Timestamp {
        self.awarded_at
    }

    /// Serialize to a single JSON line
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Why a fired observation did not pay out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Label matched no reward category; cooldown untouched
    NoCategory,
    /// Inside the cooldown window of the previous payout
    Cooldown { remaining: Duration },
}

impl Rejection {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::NoCategory => "no_category",
            Rejection::Cooldown { .. } => "cooldown",
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::NoCategory => write!(f, "no reward category matched"),
            Rejection::Cooldown { remaining } => {
                write!(f, "cooldown, try again in {:.1}s", remaining.as_secs_f64())
            }
        }
    }
}
