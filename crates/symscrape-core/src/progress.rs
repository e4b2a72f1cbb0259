use std::fmt;
use std::path::Path;

/// Lifecycle of a single gather run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Walking,
    Dispatching,
    Draining,
    Done,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Idle => "idle",
            RunPhase::Walking => "walking",
            RunPhase::Dispatching => "dispatching",
            RunPhase::Draining => "draining",
            RunPhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Trait for reporting gather progress.
///
/// The CLI implements it with indicatif; library users and tests use
/// [`SilentReporter`]. All methods have default no-op implementations.
/// Walking callbacks arrive from the walker thread, job callbacks from the
/// draining thread.
pub trait ProgressReporter: Send + Sync {
    fn on_phase(&self, _phase: RunPhase) {}
    fn on_candidate(&self, _candidates_found: usize, _path: &Path) {}
    fn on_job_submitted(&self, _jobs_submitted: usize) {}
    fn on_job_complete(&self, _jobs_done: usize, _jobs_submitted: usize) {}
    fn on_complete(&self, _accepted: usize, _duration_secs: f64) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
