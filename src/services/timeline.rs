//! Frame timeline - keeps the stream clock monotonic
//!
//! A frame whose timestamp goes backwards, or leaps further ahead than
//! `max_forward_jump`, is out of line and gets rejected. A single outlier never
//! becomes the new baseline. The timeline only re-bases once a second
//! out-of-line frame follows on from the first one, which means the source
//! clock really did move (camera restart, device clock change).

use crate::domain::types::{InvalidInput, Timestamp};
use std::time::Duration;
use tracing::debug;

/// How a frame was admitted to the timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    InOrder,
    /// Two consecutive out-of-line frames agreed; the old baseline is gone
    Rebased { previous: Timestamp },
}

#[derive(Debug)]
pub struct FrameTimeline {
    /// `None` disables the forward jump check
    max_forward_jump: Option<Duration>,
    last_seen_at: Option<Timestamp>,
    /// Rejected timestamp waiting for a second frame to agree with it
    candidate: Option<Timestamp>,
}

impl FrameTimeline {
    pub fn new(max_forward_jump: Option<Duration>) -> Self {
        Self { max_forward_jump, last_seen_at: None, candidate: None }
    }

    /// Admit a frame timestamp, advancing the baseline on success
    pub fn admit(&mut self, at: Timestamp) -> Result<Admission, InvalidInput> {
        let Err(reason) = self.check(at) else {
            self.last_seen_at = Some(at);
            self.candidate = None;
            return Ok(Admission::InOrder);
        };

        match (self.candidate, self.last_seen_at) {
            (Some(candidate), Some(previous)) if self.follows(candidate, at) => {
                debug!(
                    previous = %previous,
                    candidate = %candidate,
                    at = %at,
                    "timeline_candidate_confirmed"
                );
                self.last_seen_at = Some(at);
                self.candidate = None;
                Ok(Admission::Rebased { previous })
            }
            _ => {
                self.candidate = Some(at);
                Err(reason)
            }
        }
    }

    /// Check `at` against the baseline without moving it
    pub fn check(&self, at: Timestamp) -> Result<(), InvalidInput> {
        let Some(previous) = self.last_seen_at else {
            return Ok(());
        };
        if at < previous {
            return Err(InvalidInput::TimestampRegressed { previous, observed: at });
        }
        if !self.within_jump(previous, at) {
            return Err(InvalidInput::TimestampJumped { previous, observed: at });
        }
        Ok(())
    }

    #[inline]
    fn within_jump(&self, from: Timestamp, to: Timestamp) -> bool {
        self.max_forward_jump.map_or(true, |limit| to.saturating_duration_since(from) <= limit)
    }

    #[inline]
    fn follows(&self, candidate: Timestamp, at: Timestamp) -> bool {
        at >= candidate && self.within_jump(candidate, at)
    }

    pub fn last_seen_at(&self) -> Option<Timestamp> {
        self.last_seen_at
    }

    /// Forget the baseline (new camera session)
    pub fn reset(&mut self) {
        self.last_seen_at = None;
        self.candidate = None;
    }
}
