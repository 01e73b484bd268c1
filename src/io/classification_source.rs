//! JSON Lines classification source
//!
//! Each line is either a classifier frame:
//!   {"label":"plastic_bottle","confidence":0.91,"observed_at":1767617600000}
//! or a control record:
//!   {"control":"pause"|"resume"|"confirm","at":1767617600000}
//!
//! Lines are forwarded to the engine worker in order. Malformed lines are
//! logged, counted and skipped so one bad record never stops the stream.

use crate::domain::types::{ClassificationEvent, Timestamp};
use crate::infra::metrics::Metrics;
use crate::services::engine_worker::EngineCmd;
use serde::Deserialize;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ControlKind {
    Pause,
    Resume,
    Confirm,
}

#[derive(Debug, Deserialize)]
struct ControlRecord {
    control: ControlKind,
    /// Confirm without `at` uses the time of the latest frame
    #[serde(default)]
    at: Option<Timestamp>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SourceRecord {
    Control(ControlRecord),
    Frame(ClassificationEvent),
}

/// Parse one source line; blank lines and `#` comments yield `None`
pub fn parse_line(line: &str) -> Result<Option<EngineCmd>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let cmd = match serde_json::from_str::<SourceRecord>(line)? {
        SourceRecord::Frame(event) => EngineCmd::Classification(event),
        SourceRecord::Control(ControlRecord { control, at }) => match control {
            ControlKind::Pause => EngineCmd::SessionPaused,
            ControlKind::Resume => EngineCmd::SessionResumed,
            ControlKind::Confirm => EngineCmd::ManualConfirm { at },
        },
    };
    Ok(Some(cmd))
}

/// Read commands from `reader` and forward them to the engine worker
///
/// Returns the number of commands forwarded. Stops at end of input, when
/// the worker goes away, or on shutdown.
pub async fn run_source<R>(
    reader: R,
    cmd_tx: mpsc::Sender<EngineCmd>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut line_no: u64 = 0;
    let mut forwarded: u64 = 0;

    loop {
        let line = tokio::select! {
            changed = shutdown.changed() => {
                // A dropped sender counts as shutdown
                if changed.is_err() || *shutdown.borrow() {
                    info!(forwarded = %forwarded, "source_shutdown");
                    return Ok(forwarded);
                }
                continue;
            }
            line = lines.next_line() => line?,
        };

        let Some(line) = line else {
            break;
        };
        line_no += 1;

        let cmd = match parse_line(&line) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => continue,
            Err(e) => {
                warn!(line = %line_no, error = %e, "source_line_malformed");
                metrics.record_malformed_line();
                continue;
            }
        };

        if cmd_tx.send(cmd).await.is_err() {
            debug!(line = %line_no, "source_worker_gone");
            break;
        }
        forwarded += 1;
    }

    info!(lines = %line_no, forwarded = %forwarded, "source_finished");
    Ok(forwarded)
}
