use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use sightline_core::FileId;

/// Tracks which files are currently members of the workspace.
///
/// Location entries are only valid while their file is tracked here.
#[derive(Debug, Default)]
pub struct TrackedFiles {
    inner: Mutex<HashSet<FileId>>,
}

impl TrackedFiles {
    #[track_caller]
    fn lock_inner(&self) -> MutexGuard<'_, HashSet<FileId>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(err) => {
                let loc = std::panic::Location::caller();
                tracing::error!(
                    target = "sightline.vfs",
                    file = loc.file(),
                    line = loc.line(),
                    column = loc.column(),
                    error = %err,
                    "mutex poisoned; continuing with recovered guard"
                );
                err.into_inner()
            }
        }
    }

    pub fn track(&self, file: FileId) -> bool {
        self.lock_inner().insert(file)
    }

    pub fn untrack(&self, file: FileId) -> bool {
        self.lock_inner().remove(&file)
    }

    pub fn is_tracked(&self, file: FileId) -> bool {
        self.lock_inner().contains(&file)
    }

    pub fn len(&self) -> usize {
        self.lock_inner().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_inner().is_empty()
    }

    pub fn snapshot(&self) -> HashSet<FileId> {
        self.lock_inner().clone()
    }
}
