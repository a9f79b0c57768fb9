use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use sightline_core::{panic_payload_to_str, FileId};

use crate::{CancellationToken, Cancelled, Clock, SystemClock};

/// How often and how patiently a task is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one. Zero is treated as one.
    pub max_attempts: u32,
    /// Linear backoff step applied after each ordinary failure.
    pub backoff_increment: Duration,
    /// Whether edits to the file cancel a running (non-final) attempt.
    pub cancel_on_mutation: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_increment: Duration::from_millis(50),
            cancel_on_mutation: true,
        }
    }
}

/// Why an attempt (or the whole run) was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCause {
    /// The file was edited while the attempt was running.
    Mutation,
    /// The caller's token was cancelled; a newer run replaced this one.
    Superseded,
    /// The task itself reported cancellation without any signal from us.
    Task,
}

/// Outcome of a single attempt as reported by the task.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttemptError {
    #[error("attempt cancelled")]
    Cancelled,
    #[error("attempt failed: {0}")]
    Failed(String),
}

impl From<Cancelled> for AttemptError {
    fn from(_: Cancelled) -> Self {
        AttemptError::Cancelled
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Succeeded,
    /// Cancelled by the caller, or every attempt ended cancelled.
    Canceled,
    /// Every attempt failed (or the final one did).
    Failed,
}

#[derive(Debug)]
pub struct RunReport<T> {
    pub status: RunStatus,
    pub value: Option<T>,
    pub attempts: u32,
    pub elapsed: Duration,
    pub last_error: Option<String>,
    pub cancel_cause: Option<CancelCause>,
}

impl<T> RunReport<T> {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }
}

/// What [`ResilientExecutor::notify_mutation`] did with an edit signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationDecision {
    /// Nothing cancellable was running for the file.
    Idle,
    /// Running attempts were cancelled and a blackout window opened.
    Cancelled { attempts: usize },
    /// A blackout window was already open; it was extended instead.
    Coalesced,
}

/// Monotonic "no more cancellations until" marker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Blackout {
    until: Option<Instant>,
}

impl Blackout {
    pub fn is_active(&self, now: Instant) -> bool {
        self.until.is_some_and(|until| now < until)
    }

    /// Opens the window, or pushes its end out to `now + window`. Never shortens it.
    pub fn extend(&mut self, now: Instant, window: Duration) {
        let candidate = now + window;
        self.until = Some(match self.until {
            Some(until) if until > candidate => until,
            _ => candidate,
        });
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.until
            .map(|until| until.saturating_duration_since(now))
            .unwrap_or_default()
    }
}

#[derive(Default)]
struct FileState {
    blackout: Blackout,
    active: Vec<(u64, CancellationToken)>,
}

struct Shared {
    clock: Arc<dyn Clock>,
    blackout_window: Duration,
    next_attempt: AtomicU64,
    files: Mutex<HashMap<FileId, FileState>>,
}

/// Runs blocking work against a file that a live editor may be changing.
///
/// Each call to [`ResilientExecutor::run`] executes the task on the calling
/// thread up to `max_attempts` times. Edits reported through
/// [`ResilientExecutor::notify_mutation`] cancel the running attempt, after
/// which further edits are coalesced for the blackout window so that typing
/// does not cause a cancel/retry storm. The final attempt is never
/// registered for mutation cancellation, so a run always reaches a definite
/// result.
#[derive(Clone)]
pub struct ResilientExecutor {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for ResilientExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientExecutor")
            .field("blackout_window", &self.shared.blackout_window)
            .finish_non_exhaustive()
    }
}

struct AttemptGuard<'a> {
    shared: &'a Shared,
    file: FileId,
    id: u64,
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        let now = self.shared.clock.now();
        let mut files = self.shared.files.lock();
        if let Some(state) = files.get_mut(&self.file) {
            state.active.retain(|(id, _)| *id != self.id);
            if state.active.is_empty() && !state.blackout.is_active(now) {
                files.remove(&self.file);
            }
        }
    }
}

impl ResilientExecutor {
    pub fn new(blackout_window: Duration) -> Self {
        Self::with_clock(blackout_window, Arc::new(SystemClock))
    }

    pub fn with_clock(blackout_window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            shared: Arc::new(Shared {
                clock,
                blackout_window,
                next_attempt: AtomicU64::new(1),
                files: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn blackout_window(&self) -> Duration {
        self.shared.blackout_window
    }

    /// Signals that `file` changed underneath any running attempt.
    pub fn notify_mutation(&self, file: FileId) -> MutationDecision {
        let now = self.shared.clock.now();
        let mut files = self.shared.files.lock();
        let Some(state) = files.get_mut(&file) else {
            return MutationDecision::Idle;
        };

        if state.blackout.is_active(now) {
            state.blackout.extend(now, self.shared.blackout_window);
            return MutationDecision::Coalesced;
        }
        if state.active.is_empty() {
            return MutationDecision::Idle;
        }

        for (_, token) in &state.active {
            token.cancel();
        }
        let attempts = state.active.len();
        state.blackout.extend(now, self.shared.blackout_window);
        tracing::debug!(
            target = "sightline.scheduler",
            file = %file,
            attempts,
            "mutation cancelled running attempts"
        );
        MutationDecision::Cancelled { attempts }
    }

    pub fn blackout(&self, file: FileId) -> Blackout {
        self.shared
            .files
            .lock()
            .get(&file)
            .map(|state| state.blackout)
            .unwrap_or_default()
    }

    /// Number of mutation-cancellable attempts currently running for `file`.
    pub fn active_attempts(&self, file: FileId) -> usize {
        self.shared
            .files
            .lock()
            .get(&file)
            .map_or(0, |state| state.active.len())
    }

    /// Runs `task` under `policy`. Per-file bookkeeping is released when the
    /// run returns, whichever way it ends.
    pub fn run<T, F>(
        &self,
        file: FileId,
        policy: &RetryPolicy,
        parent: &CancellationToken,
        task: F,
    ) -> RunReport<T>
    where
        F: FnMut(&CancellationToken) -> Result<T, AttemptError>,
    {
        let report = self.run_attempts(file, policy, parent, task);
        self.release(file);
        report
    }

    /// Number of files with blackout or attempt bookkeeping.
    pub fn tracked_files(&self) -> usize {
        self.shared.files.lock().len()
    }

    fn run_attempts<T, F>(
        &self,
        file: FileId,
        policy: &RetryPolicy,
        parent: &CancellationToken,
        mut task: F,
    ) -> RunReport<T>
    where
        F: FnMut(&CancellationToken) -> Result<T, AttemptError>,
    {
        let clock = &self.shared.clock;
        let started = clock.now();
        let max_attempts = policy.max_attempts.max(1);

        let mut attempts = 0;
        let mut delay = Duration::ZERO;
        let mut last_error = None;
        let mut cancel_cause = None;
        let mut last_was_cancelled = false;

        let finish = |status, value, attempts, last_error, cancel_cause| RunReport {
            status,
            value,
            attempts,
            elapsed: clock.now().saturating_duration_since(started),
            last_error,
            cancel_cause,
        };

        while attempts < max_attempts {
            if parent.is_cancelled() {
                return finish(
                    RunStatus::Canceled,
                    None,
                    attempts,
                    last_error,
                    Some(CancelCause::Superseded),
                );
            }

            attempts += 1;
            let is_last = attempts == max_attempts;
            let token = parent.child_token();
            let guard = (policy.cancel_on_mutation && !is_last).then(|| self.register(file, &token));

            let outcome = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| task(&token))) {
                Ok(outcome) => outcome,
                Err(panic) => Err(AttemptError::Failed(format!(
                    "panicked: {}",
                    panic_payload_to_str(&*panic)
                ))),
            };
            drop(guard);

            let cause = match outcome {
                Ok(value) if !token.is_cancelled() => {
                    return finish(
                        RunStatus::Succeeded,
                        Some(value),
                        attempts,
                        last_error,
                        cancel_cause,
                    );
                }
                Ok(_) | Err(AttemptError::Cancelled) => {
                    if parent.is_cancelled() {
                        CancelCause::Superseded
                    } else if token.is_cancelled() {
                        CancelCause::Mutation
                    } else {
                        CancelCause::Task
                    }
                }
                Err(AttemptError::Failed(message)) => {
                    tracing::debug!(
                        target = "sightline.scheduler",
                        file = %file,
                        attempt = attempts,
                        error = %message,
                        "attempt failed"
                    );
                    last_error = Some(message);
                    last_was_cancelled = false;
                    if is_last {
                        break;
                    }
                    delay += policy.backoff_increment;
                    if !clock.sleep(delay, parent) {
                        return finish(
                            RunStatus::Canceled,
                            None,
                            attempts,
                            last_error,
                            Some(CancelCause::Superseded),
                        );
                    }
                    continue;
                }
            };

            cancel_cause = Some(cause);
            last_was_cancelled = true;
            if cause == CancelCause::Superseded {
                return finish(RunStatus::Canceled, None, attempts, last_error, cancel_cause);
            }
            if is_last {
                break;
            }
            tracing::trace!(
                target = "sightline.scheduler",
                file = %file,
                attempt = attempts,
                cause = ?cause,
                "attempt cancelled; retrying after blackout"
            );
            if !self.wait_for_blackout(file, parent) {
                return finish(
                    RunStatus::Canceled,
                    None,
                    attempts,
                    last_error,
                    Some(CancelCause::Superseded),
                );
            }
        }

        let status = if last_was_cancelled {
            RunStatus::Canceled
        } else {
            RunStatus::Failed
        };
        finish(status, None, attempts, last_error, cancel_cause)
    }

    /// Forgets `file` once no attempt of any run is registered for it. A
    /// blackout left behind by a finished run no longer guards anything.
    fn release(&self, file: FileId) {
        let mut files = self.shared.files.lock();
        if files.get(&file).is_some_and(|state| state.active.is_empty()) {
            files.remove(&file);
        }
    }

    fn register(&self, file: FileId, token: &CancellationToken) -> AttemptGuard<'_> {
        let id = self.shared.next_attempt.fetch_add(1, Ordering::Relaxed);
        self.shared
            .files
            .lock()
            .entry(file)
            .or_default()
            .active
            .push((id, token.clone()));
        AttemptGuard {
            shared: &self.shared,
            file,
            id,
        }
    }

    /// Blocks until the file's blackout window has closed. The window may be
    /// extended while waiting, so the remaining time is re-read after every sleep.
    fn wait_for_blackout(&self, file: FileId, parent: &CancellationToken) -> bool {
        loop {
            let now = self.shared.clock.now();
            let remaining = self.blackout(file).remaining(now);
            if remaining.is_zero() {
                return !parent.is_cancelled();
            }
            if !self.shared.clock.sleep(remaining, parent) {
                return false;
            }
        }
    }
}
