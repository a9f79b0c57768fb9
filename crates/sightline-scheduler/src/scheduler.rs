use std::{sync::Arc, time::Duration};

use rayon::ThreadPool;
use tokio::runtime::Runtime;
use tokio::sync::oneshot;

use sightline_core::panic_payload_to_str;

use crate::{task::BlockingTask, CancellationToken, Cancelled, TaskError};

enum BlockingPool {
    Rayon(ThreadPool),
    Inline,
}

impl BlockingPool {
    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match self {
            BlockingPool::Rayon(pool) => pool.spawn(job),
            BlockingPool::Inline => job(),
        }
    }
}

fn build_rayon_pool(prefix: &'static str, threads: usize) -> BlockingPool {
    // Thread creation can fail in constrained environments (low RLIMIT_NPROC,
    // `EAGAIN`). Degrade to a smaller pool, then to inline execution.
    let mut threads = threads.max(1);
    loop {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(move |idx| format!("{prefix}-{idx}"))
            .build()
        {
            Ok(pool) => return BlockingPool::Rayon(pool),
            Err(_) if threads > 1 => {
                threads = (threads / 2).max(1);
            }
            Err(err) => {
                tracing::warn!(
                    target = "sightline.scheduler",
                    pool = prefix,
                    error = %err,
                    "failed to start worker threads; running jobs inline"
                );
                return BlockingPool::Inline;
            }
        }
    }
}

fn build_io_runtime(threads: usize) -> Runtime {
    let mut threads = threads.max(1);
    loop {
        match tokio::runtime::Builder::new_multi_thread()
            .worker_threads(threads)
            .enable_time()
            .thread_name("sightline-io")
            .build()
        {
            Ok(rt) => return rt,
            Err(_) if threads > 1 => {
                threads = 1;
            }
            Err(err) => {
                return tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                    .unwrap_or_else(|_| panic!("failed to build IO runtime: {err}"));
            }
        }
    }
}

/// Which rayon pool a blocking job runs on.
///
/// Discovery runs on `Compute`; insight fetches and maintenance sweeps run on
/// `Background` so a slow backend never starves scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    Compute,
    Background,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub compute_threads: usize,
    pub background_threads: usize,
    pub io_threads: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            // `available_parallelism()` can report the host CPU count inside
            // cgroup-limited containers; keep the defaults conservative.
            compute_threads: available.saturating_sub(1).clamp(1, 4),
            background_threads: available.clamp(1, 2),
            io_threads: 1,
        }
    }
}

#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    compute_pool: BlockingPool,
    background_pool: BlockingPool,
    io_runtime: Option<Runtime>,
    io_handle: tokio::runtime::Handle,
}

/// Keeps a periodic task alive; dropping it stops the task after the current tick.
#[derive(Debug)]
pub struct PeriodicHandle {
    name: &'static str,
    token: CancellationToken,
}

impl PeriodicHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn stop(&self) {
        self.token.cancel();
    }
}

impl Drop for PeriodicHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let io_runtime = build_io_runtime(config.io_threads);
        let io_handle = io_runtime.handle().clone();
        Self::build(config, Some(io_runtime), io_handle)
    }

    /// Build a scheduler that reuses an existing tokio runtime for async work.
    ///
    /// Useful when the host is already inside `#[tokio::main]` and does not want
    /// a second runtime.
    pub fn new_with_io_handle(config: SchedulerConfig, io_handle: tokio::runtime::Handle) -> Self {
        Self::build(config, None, io_handle)
    }

    fn build(
        config: SchedulerConfig,
        io_runtime: Option<Runtime>,
        io_handle: tokio::runtime::Handle,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                compute_pool: build_rayon_pool("sightline-compute", config.compute_threads),
                background_pool: build_rayon_pool(
                    "sightline-background",
                    config.background_threads,
                ),
                io_runtime,
                io_handle,
            }),
        }
    }

    pub fn io_handle(&self) -> tokio::runtime::Handle {
        self.inner.io_handle.clone()
    }

    pub fn spawn_blocking_on<T, F>(
        &self,
        pool: PoolKind,
        token: CancellationToken,
        f: F,
    ) -> BlockingTask<T>
    where
        T: Send + 'static,
        F: FnOnce(CancellationToken) -> Result<T, Cancelled> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        if token.is_cancelled() {
            let _ = tx.send(Err(TaskError::Cancelled));
            return BlockingTask::new(token, rx);
        }

        let token_for_job = token.clone();
        let job = move || {
            let result =
                match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(token_for_job))) {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(err)) => Err(TaskError::from(err)),
                    Err(panic) => {
                        let message = panic_payload_to_str(&*panic);
                        tracing::error!(
                            target = "sightline.scheduler",
                            pool = ?pool,
                            panic = %message,
                            "task panicked"
                        );
                        Err(TaskError::Panicked)
                    }
                };
            let _ = tx.send(result);
        };

        match pool {
            PoolKind::Compute => self.inner.compute_pool.spawn(job),
            PoolKind::Background => self.inner.background_pool.spawn(job),
        }

        BlockingTask::new(token, rx)
    }

    pub fn spawn_compute_with_token<T, F>(&self, token: CancellationToken, f: F) -> BlockingTask<T>
    where
        T: Send + 'static,
        F: FnOnce(CancellationToken) -> Result<T, Cancelled> + Send + 'static,
    {
        self.spawn_blocking_on(PoolKind::Compute, token, f)
    }

    pub fn spawn_background<T, F>(&self, f: F) -> BlockingTask<T>
    where
        T: Send + 'static,
        F: FnOnce(CancellationToken) -> Result<T, Cancelled> + Send + 'static,
    {
        self.spawn_background_with_token(CancellationToken::new(), f)
    }

    pub fn spawn_background_with_token<T, F>(
        &self,
        token: CancellationToken,
        f: F,
    ) -> BlockingTask<T>
    where
        T: Send + 'static,
        F: FnOnce(CancellationToken) -> Result<T, Cancelled> + Send + 'static,
    {
        self.spawn_blocking_on(PoolKind::Background, token, f)
    }

    /// Runs `f` on `pool` every `period`, measured from the end of the previous run.
    ///
    /// A panicking run is logged and the task keeps ticking.
    pub fn spawn_periodic<F>(
        &self,
        name: &'static str,
        pool: PoolKind,
        period: Duration,
        f: F,
    ) -> PeriodicHandle
    where
        F: Fn(CancellationToken) -> Result<(), Cancelled> + Send + Sync + 'static,
    {
        let token = CancellationToken::new();
        let period = period.max(Duration::from_millis(1));
        let f = Arc::new(f);
        // The task lives on our own runtime; holding a strong reference would keep
        // the scheduler alive forever.
        let weak = Arc::downgrade(&self.inner);
        let task_token = token.clone();

        self.io_handle().spawn(async move {
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = tokio::time::sleep(period) => {}
                }

                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let scheduler = Scheduler { inner };
                let f = Arc::clone(&f);
                let job = scheduler.spawn_blocking_on(pool, task_token.child_token(), move |token| {
                    f(token)
                });
                drop(scheduler);
                match job.join().await {
                    Ok(()) | Err(TaskError::Cancelled) => {}
                    Err(TaskError::Panicked) => {
                        tracing::error!(
                            target = "sightline.scheduler",
                            task = name,
                            "periodic task panicked; retrying on next tick"
                        );
                    }
                }
            }
            tracing::debug!(target = "sightline.scheduler", task = name, "periodic task stopped");
        });

        PeriodicHandle { name, token }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl Drop for SchedulerInner {
    fn drop(&mut self) {
        if let Some(runtime) = self.io_runtime.take() {
            runtime.shutdown_background();
        }
    }
}
