//! Virtual file system layer for Sightline.
//!
//! The VFS is responsible for:
//! - Stable `FileId` allocation and reverse mapping to paths.
//! - Tracking which files are currently members of the workspace, including
//!   which of them were loaded from disk and must still exist there.
//! - Holding the latest editor text per file and handing out immutable,
//!   versioned snapshots to background scanners.

mod document;
mod file_id;
mod tracked;

pub use document::{Document, DocumentError, DocumentStore, SourceSnapshot};
pub use file_id::{normalize_local_path, FileIdRegistry};
pub use sightline_core::FileId;
pub use tracked::TrackedFiles;

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

/// Facade bundling path interning, tracking and document storage.
#[derive(Debug, Default)]
pub struct Vfs {
    registry: Mutex<FileIdRegistry>,
    tracked: TrackedFiles,
    /// Subset of `tracked` loaded from disk rather than handed over by an editor.
    on_disk: TrackedFiles,
    documents: DocumentStore,
}

impl Vfs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file_id(&self, path: impl AsRef<Path>) -> FileId {
        self.registry.lock().file_id(path.as_ref())
    }

    pub fn get_id(&self, path: impl AsRef<Path>) -> Option<FileId> {
        self.registry.lock().get_id(path.as_ref())
    }

    pub fn path(&self, file: FileId) -> Option<Arc<Path>> {
        self.registry.lock().get_path(file).cloned()
    }

    /// Opens (or re-opens) a document and marks it as tracked. The editor owns
    /// the text from now on, even if it was loaded from disk before.
    pub fn open(&self, path: impl AsRef<Path>, text: impl Into<Arc<str>>, version: i32) -> FileId {
        let path = path.as_ref();
        let file = self.file_id(path);
        let path = self.path(file).unwrap_or_else(|| Arc::from(path));
        self.documents.set(file, path, text.into(), version);
        self.on_disk.untrack(file);
        self.tracked.track(file);
        file
    }

    /// Like [`Vfs::open`] for text read from `path`; the file stays a member
    /// only while `path` exists.
    pub fn open_on_disk(
        &self,
        path: impl AsRef<Path>,
        text: impl Into<Arc<str>>,
        version: i32,
    ) -> FileId {
        let file = self.open(path, text, version);
        self.on_disk.track(file);
        file
    }

    pub fn update(
        &self,
        file: FileId,
        text: impl Into<Arc<str>>,
        version: i32,
    ) -> Result<(), DocumentError> {
        if !self.tracked.is_tracked(file) {
            return Err(DocumentError::NotTracked(file));
        }
        self.documents.replace(file, text.into(), version)
    }

    /// Stops tracking `file` and drops its text. Returns whether it was tracked.
    pub fn close(&self, file: FileId) -> bool {
        self.documents.remove(file);
        self.on_disk.untrack(file);
        self.tracked.untrack(file)
    }

    pub fn snapshot(&self, file: FileId) -> Option<SourceSnapshot> {
        self.documents.snapshot(file)
    }

    pub fn is_tracked(&self, file: FileId) -> bool {
        self.tracked.is_tracked(file)
    }

    /// Tracked, and for disk-backed files still present on disk.
    pub fn is_member(&self, file: FileId) -> bool {
        if !self.tracked.is_tracked(file) {
            return false;
        }
        if !self.on_disk.is_tracked(file) {
            return true;
        }
        self.path(file).is_some_and(|path| path.exists())
    }

    /// Disk-backed files whose path no longer exists, sorted.
    pub fn missing_on_disk(&self) -> Vec<FileId> {
        let mut files: Vec<_> = self
            .on_disk
            .snapshot()
            .into_iter()
            .filter(|file| !self.is_member(*file))
            .collect();
        files.sort();
        files
    }

    pub fn tracked(&self) -> &TrackedFiles {
        &self.tracked
    }
}
