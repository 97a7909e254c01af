//! Progress callbacks and cooperative cancellation
//!
//! Progress is reported at fixed phase boundaries: decomposition 5%, each
//! research/reflect pass a share of 5-90% proportional to `max_iterations`,
//! synthesis 90%, completion 100%.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

use super::state::RunPhase;

pub const DECOMPOSED_PERCENT: u8 = 5;
pub const SYNTHESIZING_PERCENT: u8 = 90;
pub const COMPLETE_PERCENT: u8 = 100;

/// A progress callback payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub run_id: String,
    pub phase: RunPhase,
    pub percent: u8,
    pub iteration: usize,
    pub message: String,
}

/// Progress after research pass `iteration` of `max_iterations`
pub fn research_progress(iteration: usize, max_iterations: usize) -> u8 {
    let span = usize::from(SYNTHESIZING_PERCENT - DECOMPOSED_PERCENT);
    let done = iteration.min(max_iterations.max(1));
    let percent = usize::from(DECOMPOSED_PERCENT) + span * done / max_iterations.max(1);
    percent.min(usize::from(SYNTHESIZING_PERCENT)) as u8
}

/// Receives progress callbacks from the controller
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);
}

/// Logs progress through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn on_progress(&self, event: &ProgressEvent) {
        info!(
            run_id = %event.run_id,
            phase = event.phase.as_str(),
            percent = event.percent,
            iteration = event.iteration,
            "{}",
            event.message
        );
    }
}

/// Forwards progress to a channel, e.g. a scheduler's status reporter
impl ProgressSink for UnboundedSender<ProgressEvent> {
    fn on_progress(&self, event: &ProgressEvent) {
        if self.send(event.clone()).is_err() {
            debug!(run_id = %event.run_id, "Progress receiver dropped");
        }
    }
}

/// Shared cancellation flag, observed at phase boundaries
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
