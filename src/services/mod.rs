//! Services - the reward decision core
//!
//! This module contains the pipeline stages and their orchestration:
//! - `consensus` - Turns per-frame classifications into fired observations
//! - `reward_classifier` - Maps observed labels to point values
//! - `cooldown` - Rate-limits payouts and mints reward events
//! - `timeline` - Keeps frame timestamps monotonic
//! - `engine` - Runs one classification through all stages
//! - `engine_worker` - Async worker feeding the engine and the ledger

pub mod consensus;
pub mod cooldown;
pub mod engine;
pub mod engine_worker;
pub mod reward_classifier;
pub mod timeline;

// Re-export commonly used types
pub use engine::{Outcome, RewardEngine};
pub use engine_worker::{create_engine_worker, EngineCmd, EngineWorker};
