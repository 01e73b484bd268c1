//! Ledger persistence - appends awarded rewards to file
//!
//! Rewards are written in JSONL format (one JSON object per line) after the
//! engine has returned. On start the file is replayed to restore the
//! running total; lines that fail to parse are skipped and duplicate
//! reward ids are counted once.

use crate::domain::reward::RewardEvent;
use anyhow::Context;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Deserialize;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Subset of a persisted reward needed to rebuild totals
#[derive(Debug, Deserialize)]
struct StoredReward {
    id: String,
    category: String,
    points_delta: u32,
}

/// Totals rebuilt from the ledger file
#[derive(Debug, Default)]
pub struct LedgerSnapshot {
    pub total: u64,
    pub by_category: FxHashMap<String, u64>,
    pub entries: usize,
}

/// File-backed store for awarded rewards
pub struct LedgerStore {
    file_path: String,
}

impl LedgerStore {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "ledger_store_initialized");
        Self { file_path: file_path.to_string() }
    }

    /// Append a reward to the ledger file
    /// Returns true if successful, false otherwise
    pub fn append(&self, event: &RewardEvent) -> bool {
        match self.append_line(&event.to_json()) {
            Ok(()) => {
                debug!(id = %event.id(), points = %event.points_delta(), "ledger_appended");
                true
            }
            Err(e) => {
                error!(id = %event.id(), error = %e, "ledger_append_failed");
                false
            }
        }
    }

    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", line)?;

        Ok(())
    }

    /// Rebuild totals from the ledger file; a missing file is an empty ledger
    pub fn restore(&self) -> anyhow::Result<LedgerSnapshot> {
        let path = Path::new(&self.file_path);
        if !path.exists() {
            info!(file_path = %self.file_path, "ledger_store_empty");
            return Ok(LedgerSnapshot::default());
        }

        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open ledger file {}", path.display()))?;

        let mut snapshot = LedgerSnapshot::default();
        let mut seen_ids = FxHashSet::default();

        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line
                .with_context(|| format!("Failed to read ledger file {}", path.display()))?;
            if line.trim().is_empty() {
                continue;
            }

            let stored: StoredReward = match serde_json::from_str(&line) {
                Ok(stored) => stored,
                Err(e) => {
                    warn!(line = %(line_no + 1), error = %e, "ledger_line_skipped");
                    continue;
                }
            };

            if !seen_ids.insert(stored.id) {
                warn!(line = %(line_no + 1), "ledger_duplicate_skipped");
                continue;
            }

            let points = stored.points_delta as u64;
            snapshot.total += points;
            *snapshot.by_category.entry(stored.category).or_insert(0) += points;
            snapshot.entries += 1;
        }

        info!(
            file_path = %self.file_path,
            entries = %snapshot.entries,
            total = %snapshot.total,
            "ledger_restored"
        );

        Ok(snapshot)
    }
}
