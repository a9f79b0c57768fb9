use std::{
    collections::HashMap,
    hash::Hash,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::{CancellationToken, Cancelled, PoolKind, Scheduler};

struct DebounceEntry {
    id: u64,
    token: CancellationToken,
}

struct DebouncerInner<K> {
    scheduler: Scheduler,
    pool: PoolKind,
    delay: Duration,
    next_id: AtomicU64,
    entries: Mutex<HashMap<K, DebounceEntry>>,
}

/// Latest-wins task slots.
///
/// Scheduling work for a key cancels whatever is pending or running for that key,
/// so at most one job per key makes progress and a later request always
/// supersedes an earlier one.
#[derive(Clone)]
pub struct KeyedDebouncer<K> {
    inner: Arc<DebouncerInner<K>>,
}

pub struct KeyedDebouncedHandle {
    token: CancellationToken,
    done: oneshot::Receiver<()>,
}

impl KeyedDebouncedHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Resolves once the job has run to completion or was dropped because it was
    /// superseded.
    pub async fn finished(self) {
        let _ = self.done.await;
    }
}

impl<K> KeyedDebouncer<K>
where
    K: Clone + Eq + Hash + Send + 'static,
{
    pub fn new(scheduler: Scheduler, pool: PoolKind, delay: Duration) -> Self {
        Self {
            inner: Arc::new(DebouncerInner {
                scheduler,
                pool,
                delay,
                next_id: AtomicU64::new(1),
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn debounce<F>(&self, key: K, f: F) -> KeyedDebouncedHandle
    where
        F: FnOnce(CancellationToken) -> Result<(), Cancelled> + Send + 'static,
    {
        self.debounce_with_delay(key, self.inner.delay, f)
    }

    pub fn debounce_with_delay<F>(&self, key: K, delay: Duration, f: F) -> KeyedDebouncedHandle
    where
        F: FnOnce(CancellationToken) -> Result<(), Cancelled> + Send + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let (done_tx, done_rx) = oneshot::channel();

        // Swap the slot under one lock so two concurrent callers cannot both
        // believe they are the current job.
        if let Some(previous) = self.inner.entries.lock().insert(
            key.clone(),
            DebounceEntry {
                id,
                token: token.clone(),
            },
        ) {
            previous.token.cancel();
        }

        let inner = Arc::clone(&self.inner);
        let token_for_task = token.clone();

        self.inner.scheduler.io_handle().spawn(async move {
            let ready = delay.is_zero()
                || tokio::select! {
                    _ = token_for_task.cancelled() => false,
                    _ = tokio::time::sleep(delay) => true,
                };
            if ready {
                let task =
                    inner
                        .scheduler
                        .spawn_blocking_on(inner.pool, token_for_task.clone(), f);
                let _ = task.join().await;
            }

            {
                let mut entries = inner.entries.lock();
                if entries.get(&key).is_some_and(|current| current.id == id) {
                    entries.remove(&key);
                }
            }
            let _ = done_tx.send(());
        });

        KeyedDebouncedHandle {
            token,
            done: done_rx,
        }
    }

    pub fn cancel(&self, key: &K) -> bool {
        let Some(entry) = self.inner.entries.lock().remove(key) else {
            return false;
        };
        entry.token.cancel();
        true
    }

    pub fn cancel_all(&self) {
        for (_, entry) in self.inner.entries.lock().drain() {
            entry.token.cancel();
        }
    }

    pub fn pending(&self) -> usize {
        self.inner.entries.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SchedulerConfig;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test(flavor = "current_thread")]
    async fn later_requests_supersede_earlier_ones() {
        let scheduler = Scheduler::new(SchedulerConfig {
            compute_threads: 1,
            background_threads: 1,
            io_threads: 1,
        });
        let debouncer = KeyedDebouncer::new(scheduler, PoolKind::Compute, Duration::from_millis(20));
        let ran = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for n in 0..5 {
            let ran = Arc::clone(&ran);
            handles.push(debouncer.debounce("A.kt", move |_| {
                ran.lock().push(n);
                Ok(())
            }));
        }

        let last = handles.pop().unwrap();
        assert!(handles.iter().all(KeyedDebouncedHandle::is_cancelled));
        tokio::time::timeout(Duration::from_secs(5), last.finished())
            .await
            .expect("last job should finish");

        assert_eq!(*ran.lock(), vec![4]);
        assert_eq!(debouncer.pending(), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn cancel_drops_pending_job() {
        let scheduler = Scheduler::new(SchedulerConfig {
            compute_threads: 1,
            background_threads: 1,
            io_threads: 1,
        });
        let debouncer = KeyedDebouncer::new(scheduler, PoolKind::Compute, Duration::from_millis(50));
        let ran = Arc::new(AtomicUsize::new(0));
        let ran_for_job = Arc::clone(&ran);
        let handle = debouncer.debounce(1_u32, move |_| {
            ran_for_job.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert!(debouncer.cancel(&1));
        tokio::time::timeout(Duration::from_secs(5), handle.finished())
            .await
            .expect("cancelled job should resolve");
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }
}
