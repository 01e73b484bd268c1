//! Domain models - core types flowing through the reward pipeline
//!
//! This module contains the canonical data types used throughout the system:
//! - `ClassificationEvent` - one per-frame result from the image classifier
//! - `FiredObservation` - a sustained recognition emitted by the consensus tracker
//! - `RewardEvent` - a successful payout handed to the points ledger
//! - `Rejection` / `InvalidInput` - non-fatal outcomes of a pipeline pass

pub mod reward;
pub mod types;

// Re-export commonly used types at module level
pub use reward::{RewardEvent, Rejection};
pub use types::{ClassificationEvent, FiredObservation, InvalidInput, Timestamp};
