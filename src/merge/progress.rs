//! Progress reporting and cancellation hooks for the host application.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Optional progress sink. Every method has a no-op default.
pub trait ProgressReporter: Send + Sync {
    /// A task with `total` steps is starting.
    fn begin(&self, _task: &str, _total: usize) {}

    /// Step `step` of the current task is done.
    fn step(&self, _task: &str, _step: usize) {}

    /// Polled between materials and between charts.
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Reports nothing and never cancels.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {}

/// Forwards progress to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn begin(&self, task: &str, total: usize) {
        log::info!("{}: {} steps", task, total);
    }

    fn step(&self, task: &str, step: usize) {
        log::trace!("{}: step {}", task, step);
    }
}

/// A shareable cancel flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the running merge to stop at its next check.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

impl ProgressReporter for CancelToken {
    fn is_cancelled(&self) -> bool {
        CancelToken::is_cancelled(self)
    }
}
