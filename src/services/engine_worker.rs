//! Engine worker - runs the reward pipeline on a single task
//!
//! The classification source enqueues commands via a bounded mpsc channel;
//! the worker feeds them through the engine strictly in order and publishes
//! awards to the shared ledger. Ledger file IO happens after the engine
//! call returns; a failed write is counted so the file falling behind the
//! in-memory total shows up in metrics.

use crate::domain::types::{ClassificationEvent, Timestamp};
use crate::infra::metrics::Metrics;
use crate::io::ledger::PointsLedger;
use crate::io::ledger_store::LedgerStore;
use crate::services::engine::{Outcome, RewardEngine};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// A command for the engine worker
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCmd {
    /// One frame from the classifier
    Classification(ClassificationEvent),
    /// User pressed confirm; `None` means the time of the latest frame
    ManualConfirm { at: Option<Timestamp> },
    /// Camera stream stopped
    SessionPaused,
    /// Camera stream restarted
    SessionResumed,
}

/// Worker that owns the engine and applies its rewards
pub struct EngineWorker {
    engine: RewardEngine,
    cmd_rx: mpsc::Receiver<EngineCmd>,
    ledger: Arc<PointsLedger>,
    store: Option<LedgerStore>,
    metrics: Arc<Metrics>,
}

impl EngineWorker {
    pub fn new(
        engine: RewardEngine,
        cmd_rx: mpsc::Receiver<EngineCmd>,
        ledger: Arc<PointsLedger>,
        store: Option<LedgerStore>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { engine, cmd_rx, ledger, store, metrics }
    }

    /// Run the worker until the channel closes, then hand the engine back
    pub async fn run(mut self) -> RewardEngine {
        info!("engine_worker_started");

        while let Some(cmd) = self.cmd_rx.recv().await {
            self.handle(cmd);
        }

        info!(ledger_total = %self.ledger.total(), "engine_worker_stopped");
        self.engine
    }

    fn handle(&mut self, cmd: EngineCmd) {
        let outcome = match cmd {
            EngineCmd::Classification(event) => self.engine.on_classification(event),
            EngineCmd::ManualConfirm { at } => self.engine.manual_confirm(at),
            EngineCmd::SessionPaused => {
                debug!("session_paused");
                self.engine.reset_session();
                return;
            }
            EngineCmd::SessionResumed => {
                debug!("session_resumed");
                self.engine.reset_session();
                return;
            }
        };

        let Outcome::Awarded(reward) = outcome else {
            return;
        };

        let new_total = self.ledger.apply(&reward);
        info!(
            id = %reward.id(),
            points = %reward.points_delta(),
            ledger_total = %new_total,
            "ledger_updated"
        );

        if let Some(ref store) = self.store {
            if !store.append(&reward) {
                warn!(id = %reward.id(), ledger_total = %new_total, "ledger_file_behind_memory");
                self.metrics.record_ledger_write_failed();
            }
        }
    }
}

/// Create an engine command channel and worker
///
/// Returns the sender (for the classification source) and the worker (to be spawned)
pub fn create_engine_worker(
    engine: RewardEngine,
    ledger: Arc<PointsLedger>,
    store: Option<LedgerStore>,
    metrics: Arc<Metrics>,
    buffer_size: usize,
) -> (mpsc::Sender<EngineCmd>, EngineWorker) {
    let (cmd_tx, cmd_rx) = mpsc::channel(buffer_size);
    let worker = EngineWorker::new(engine, cmd_rx, ledger, store, metrics);
    (cmd_tx, worker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::config::EngineConfig;
    use tempfile::tempdir;

    fn test_engine(metrics: &Arc<Metrics>) -> RewardEngine {
        let config = EngineConfig::default().with_session_gap(None);
        RewardEngine::new(&config, metrics.clone()).unwrap()
    }

    fn frame(label: &str, ms: u64) -> EngineCmd {
        EngineCmd::Classification(ClassificationEvent::new(label, 0.9, Timestamp(ms)))
    }

    fn spawn_worker(
        ledger: &Arc<PointsLedger>,
        store: Option<LedgerStore>,
        metrics: &Arc<Metrics>,
    ) -> (mpsc::Sender<EngineCmd>, tokio::task::JoinHandle<RewardEngine>) {
        let (tx, worker) =
            create_engine_worker(test_engine(metrics), ledger.clone(), store, metrics.clone(), 64);
        (tx, tokio::spawn(worker.run()))
    }

    #[tokio::test]
    async fn test_worker_applies_rewards_to_ledger() {
        let metrics = Arc::new(Metrics::new());
        let ledger = Arc::new(PointsLedger::new());
        let (tx, handle) = spawn_worker(&ledger, None, &metrics);

        for i in 0..8 {
            tx.send(frame("glass_jar", i * 100)).await.unwrap();
        }
        drop(tx);

        let engine = handle.await.unwrap();
        assert_eq!(ledger.total(), 30);
        assert_eq!(engine.gate().last_awarded_at(), Some(Timestamp(700)));
    }

    #[tokio::test]
    async fn test_session_pause_discards_streak() {
        let metrics = Arc::new(Metrics::new());
        let ledger = Arc::new(PointsLedger::new());
        let (tx, handle) = spawn_worker(&ledger, None, &metrics);

        for i in 0..4 {
            tx.send(frame("plastic_bottle", i * 100)).await.unwrap();
        }
        tx.send(EngineCmd::SessionPaused).await.unwrap();
        tx.send(EngineCmd::SessionResumed).await.unwrap();
        for i in 4..8 {
            tx.send(frame("plastic_bottle", i * 100)).await.unwrap();
        }
        drop(tx);

        let engine = handle.await.unwrap();
        assert_eq!(ledger.total(), 0);
        assert_eq!(engine.tracker().streak_count(), 4);
    }

    #[tokio::test]
    async fn test_confirm_pays_held_consensus_and_persists() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("ledger.jsonl");
        let store = LedgerStore::new(file_path.to_str().unwrap());

        let metrics = Arc::new(Metrics::new());
        let ledger = Arc::new(PointsLedger::new());
        let (tx, handle) = spawn_worker(&ledger, Some(store), &metrics);

        // Awarded at 700, turned down by the cooldown at 1700
        for i in (0..8).chain(10..18) {
            tx.send(frame("metal_can", i * 100)).await.unwrap();
        }
        tx.send(EngineCmd::ManualConfirm { at: None }).await.unwrap();
        tx.send(EngineCmd::ManualConfirm { at: Some(Timestamp(5800)) }).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        let snapshot = LedgerStore::new(file_path.to_str().unwrap()).restore().unwrap();
        assert_eq!(snapshot.total, 40);
        assert_eq!(snapshot.entries, 2);
        assert_eq!(ledger.total(), 40);
        assert_eq!(metrics.ledger_write_failures(), 0);
    }

    #[tokio::test]
    async fn test_confirms_alone_never_credit() {
        let metrics = Arc::new(Metrics::new());
        let ledger = Arc::new(PointsLedger::new());
        let (tx, handle) = spawn_worker(&ledger, None, &metrics);

        tx.send(frame("metal_can", 0)).await.unwrap();
        for i in 1..20 {
            tx.send(EngineCmd::ManualConfirm { at: Some(Timestamp(i * 100)) }).await.unwrap();
        }
        drop(tx);
        handle.await.unwrap();

        assert_eq!(ledger.total(), 0);
        assert_eq!(metrics.frames_invalid(), 19);
    }

    #[tokio::test]
    async fn test_failed_ledger_write_is_counted() {
        let dir = tempdir().unwrap();
        // A directory where the ledger file should be
        let store = LedgerStore::new(dir.path().to_str().unwrap());

        let metrics = Arc::new(Metrics::new());
        let ledger = Arc::new(PointsLedger::new());
        let (tx, handle) = spawn_worker(&ledger, Some(store), &metrics);

        for i in 0..8 {
            tx.send(frame("glass_jar", i * 100)).await.unwrap();
        }
        drop(tx);
        handle.await.unwrap();

        assert_eq!(ledger.total(), 30);
        assert_eq!(metrics.ledger_write_failures(), 1);
        assert_eq!(metrics.report(ledger.total()).ledger_write_failures, 1);
    }
}
