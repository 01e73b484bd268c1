//! Running points total shared between the engine worker and readers
//!
//! The total is updated with a single atomic add-and-read so a display
//! thread can read it while the worker applies rewards.

use crate::domain::reward::RewardEvent;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe points ledger
pub struct PointsLedger {
    total: AtomicU64,
    /// Points per reward category (reporting only)
    by_category: parking_lot::Mutex<FxHashMap<String, u64>>,
}

impl PointsLedger {
    pub fn new() -> Self {
        Self::with_totals(0, FxHashMap::default())
    }

    /// Restore a ledger from persisted totals
    pub fn with_totals(total: u64, by_category: FxHashMap<String, u64>) -> Self {
        Self { total: AtomicU64::new(total), by_category: parking_lot::Mutex::new(by_category) }
    }

    /// Apply a reward delta, returning the new running total
    pub fn apply(&self, event: &RewardEvent) -> u64 {
        let delta = event.points_delta() as u64;
        let new_total = self.total.fetch_add(delta, Ordering::AcqRel) + delta;

        *self.by_category.lock().entry(event.category().to_string()).or_insert(0) += delta;

        new_total
    }

    #[inline]
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Acquire)
    }

    pub fn category_total(&self, category: &str) -> u64 {
        self.by_category.lock().get(category).copied().unwrap_or(0)
    }

    /// Snapshot of per-category totals sorted by name
    pub fn category_totals(&self) -> Vec<(String, u64)> {
        let mut totals: Vec<(String, u64)> =
            self.by_category.lock().iter().map(|(k, v)| (k.clone(), *v)).collect();
        totals.sort();
        totals
    }
}

impl Default for PointsLedger {
    fn default() -> Self {
        Self::new()
    }
}
