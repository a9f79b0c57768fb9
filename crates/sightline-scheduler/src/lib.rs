//! Task scheduling for Sightline.
//!
//! - [`Scheduler`]: bounded rayon pools for blocking work plus a tokio runtime for
//!   orchestration and periodic maintenance.
//! - [`KeyedDebouncer`]: latest-wins task slots keyed by file.
//! - [`ResilientExecutor`]: bounded retries for scans racing a live editor.
//!
//! Cancellation is cooperative via [`CancellationToken`] and is never an error.

mod clock;
mod debouncer;
mod resilient;
mod scheduler;
mod task;

pub use clock::{Clock, ManualClock, SystemClock};
pub use debouncer::{KeyedDebouncedHandle, KeyedDebouncer};
pub use resilient::{
    AttemptError, Blackout, CancelCause, MutationDecision, ResilientExecutor, RetryPolicy,
    RunReport, RunStatus,
};
pub use scheduler::{PeriodicHandle, PoolKind, Scheduler, SchedulerConfig};
pub use task::BlockingTask;
pub use tokio_util::sync::CancellationToken;

/// Returned by cooperative tasks that observed cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cancelled")]
pub struct Cancelled;

impl Cancelled {
    /// Convenience checkpoint: `Cancelled::check(&token)?`.
    pub fn check(token: &CancellationToken) -> Result<(), Cancelled> {
        if token.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("task cancelled")]
    Cancelled,
    #[error("task panicked")]
    Panicked,
}

impl From<Cancelled> for TaskError {
    fn from(_: Cancelled) -> Self {
        TaskError::Cancelled
    }
}
