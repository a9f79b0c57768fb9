use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use sightline_core::FileId;

/// Allocates stable `FileId`s for paths and supports reverse lookup.
///
/// Paths are normalized lexically first so `src/./A.kt` and `src/A.kt` share an id.
#[derive(Debug, Default)]
pub struct FileIdRegistry {
    path_to_id: HashMap<Arc<Path>, FileId>,
    id_to_path: Vec<Arc<Path>>,
}

impl FileIdRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stable id for `path`, allocating a new one if necessary.
    pub fn file_id(&mut self, path: &Path) -> FileId {
        let path = normalize_local_path(path);
        if let Some(&id) = self.path_to_id.get(path.as_path()) {
            return id;
        }

        let raw = u32::try_from(self.id_to_path.len()).unwrap_or_else(|_| {
            tracing::error!(target = "sightline.vfs", "file id space exhausted");
            u32::MAX
        });
        let id = FileId::from_raw(raw);
        let path: Arc<Path> = Arc::from(path);
        self.id_to_path.push(Arc::clone(&path));
        self.path_to_id.insert(path, id);
        id
    }

    /// Returns the id for `path` if it has been interned.
    pub fn get_id(&self, path: &Path) -> Option<FileId> {
        let path = normalize_local_path(path);
        self.path_to_id.get(path.as_path()).copied()
    }

    /// Returns the path for `id`.
    pub fn get_path(&self, id: FileId) -> Option<&Arc<Path>> {
        self.id_to_path.get(id.to_raw() as usize)
    }

    pub fn len(&self) -> usize {
        self.id_to_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_path.is_empty()
    }
}

/// Lexically normalizes a path: drops `.` segments and folds `..` where possible.
///
/// This does not hit the filesystem and does not resolve symlinks.
pub fn normalize_local_path(path: &Path) -> PathBuf {
    let mut prefix: Option<OsString> = None;
    let mut has_root = false;
    let mut stack: Vec<OsString> = Vec::new();

    for component in path.components() {
        match component {
            Component::Prefix(prefix_component) => {
                prefix = Some(prefix_component.as_os_str().to_owned());
            }
            Component::RootDir => has_root = true,
            Component::CurDir => {}
            Component::ParentDir => {
                if stack.last().is_some_and(|last| last != "..") {
                    stack.pop();
                } else if !has_root {
                    stack.push(OsString::from(".."));
                }
            }
            Component::Normal(segment) => stack.push(segment.to_owned()),
        }
    }

    let mut out = PathBuf::new();
    match (prefix, has_root) {
        (Some(mut prefix), true) => {
            prefix.push(std::path::MAIN_SEPARATOR.to_string());
            out.push(prefix);
        }
        (Some(prefix), false) => out.push(prefix),
        (None, true) => out.push(std::path::MAIN_SEPARATOR.to_string()),
        (None, false) => {}
    }
    out.extend(stack);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_id_is_stable_across_lookups() {
        let mut registry = FileIdRegistry::new();
        let path = Path::new("/tmp/A.kt");
        let id1 = registry.file_id(path);
        let id2 = registry.file_id(path);

        assert_eq!(id1, id2);
        assert_eq!(registry.get_id(path), Some(id1));
        assert_eq!(registry.get_path(id1).map(|p| p.as_ref()), Some(path));
    }

    #[test]
    fn file_id_is_stable_across_equivalent_spellings() {
        let mut registry = FileIdRegistry::new();
        let id1 = registry.file_id(Path::new("/tmp/src/./A.kt"));
        let id2 = registry.file_id(Path::new("/tmp/src/main/../A.kt"));

        assert_eq!(id1, id2);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn relative_parent_segments_are_kept() {
        assert_eq!(
            normalize_local_path(Path::new("../a/./b/../c")),
            PathBuf::from("../a/c")
        );
    }
}
