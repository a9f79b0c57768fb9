use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use sightline_core::FileId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocumentError {
    #[error("{0} is not tracked")]
    NotTracked(FileId),
    #[error("{0} has no document")]
    Missing(FileId),
}

/// Latest known text of a file.
#[derive(Debug, Clone)]
pub struct Document {
    path: Arc<Path>,
    text: Arc<str>,
    version: i32,
}

impl Document {
    pub fn new(path: Arc<Path>, text: Arc<str>, version: i32) -> Self {
        Self {
            path,
            text,
            version,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn version(&self) -> i32 {
        self.version
    }
}

/// Immutable view of a document at one version.
///
/// Background scanners work exclusively on snapshots, so a concurrent edit never
/// changes the text under a running scan; it only makes the snapshot stale.
#[derive(Debug, Clone)]
pub struct SourceSnapshot {
    file: FileId,
    path: Arc<Path>,
    text: Arc<str>,
    version: i32,
}

impl SourceSnapshot {
    pub fn new(file: FileId, path: impl Into<Arc<Path>>, text: impl Into<Arc<str>>, version: i32) -> Self {
        Self {
            file,
            path: path.into(),
            text: text.into(),
            version,
        }
    }

    pub fn file(&self) -> FileId {
        self.file
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn extension(&self) -> Option<&str> {
        self.path.extension().and_then(|ext| ext.to_str())
    }
}

/// Per-file document storage.
#[derive(Debug, Default)]
pub struct DocumentStore {
    docs: RwLock<HashMap<FileId, Document>>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, file: FileId, path: Arc<Path>, text: Arc<str>, version: i32) {
        self.docs
            .write()
            .insert(file, Document::new(path, text, version));
    }

    pub fn replace(&self, file: FileId, text: Arc<str>, version: i32) -> Result<(), DocumentError> {
        let mut docs = self.docs.write();
        let doc = docs.get_mut(&file).ok_or(DocumentError::Missing(file))?;
        doc.text = text;
        doc.version = version;
        Ok(())
    }

    pub fn remove(&self, file: FileId) -> Option<Document> {
        self.docs.write().remove(&file)
    }

    pub fn snapshot(&self, file: FileId) -> Option<SourceSnapshot> {
        let docs = self.docs.read();
        let doc = docs.get(&file)?;
        Some(SourceSnapshot {
            file,
            path: Arc::clone(&doc.path),
            text: Arc::clone(&doc.text),
            version: doc.version,
        })
    }

    pub fn version(&self, file: FileId) -> Option<i32> {
        self.docs.read().get(&file).map(Document::version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshots_are_unaffected_by_later_edits() {
        let store = DocumentStore::new();
        let file = FileId::from_raw(0);
        store.set(file, Arc::from(Path::new("/a/A.java")), Arc::from("v1"), 1);

        let before = store.snapshot(file).unwrap();
        store.replace(file, Arc::from("v2"), 2).unwrap();

        assert_eq!(before.text(), "v1");
        assert_eq!(before.version(), 1);
        assert_eq!(before.extension(), Some("java"));
        assert_eq!(store.snapshot(file).unwrap().text(), "v2");
        assert_eq!(store.version(file), Some(2));
    }

    #[test]
    fn replacing_unknown_document_fails() {
        let store = DocumentStore::new();
        let file = FileId::from_raw(9);
        assert_eq!(
            store.replace(file, Arc::from(""), 1),
            Err(DocumentError::Missing(file))
        );
    }
}
