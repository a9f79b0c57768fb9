use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use sightline_core::FileId;
use sightline_scheduler::Clock;

/// Logs build failures at most once per `interval` per file.
#[derive(Debug)]
pub struct FailureReporter {
    clock: Arc<dyn Clock>,
    interval: Duration,
    last: Mutex<HashMap<FileId, Instant>>,
}

impl FailureReporter {
    pub fn new(clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            clock,
            interval,
            last: Mutex::new(HashMap::new()),
        }
    }

    /// Returns whether the failure was logged.
    pub fn report(&self, file: FileId, error: &dyn std::fmt::Display) -> bool {
        let now = self.clock.now();
        {
            let mut last = self.last.lock();
            if let Some(at) = last.get(&file) {
                if now.saturating_duration_since(*at) < self.interval {
                    return false;
                }
            }
            last.insert(file, now);
        }
        tracing::warn!(target = "sightline.lens", %file, error = %error, "lens build failed; keeping previous lenses");
        true
    }

    pub fn forget(&self, file: FileId) {
        self.last.lock().remove(&file);
    }
}
