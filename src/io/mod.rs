//! IO modules - boundaries around the reward engine
//!
//! This module contains the thread-safe handoffs and persistence:
//! - `classification_source` - JSON Lines reader feeding the engine worker
//! - `ledger` - Atomic running points total shared with readers
//! - `ledger_store` - Awarded rewards persisted to file (JSONL format)

pub mod classification_source;
pub mod ledger;
pub mod ledger_store;

// Re-export commonly used types
pub use classification_source::run_source;
pub use ledger::PointsLedger;
pub use ledger_store::LedgerStore;
