use std::sync::Arc;

use sightline_index::{LocationEntry, Liveness};
use sightline_prefilter::CandidatePrefilterIndex;
use sightline_vfs::Vfs;

/// An entry is alive while its file is a workspace member (tracked and, when
/// loaded from disk, still on disk) and still a candidate for the entry's
/// kind. Methods only need the file to be a candidate for some kind.
pub(crate) struct WorkspaceLiveness {
    vfs: Arc<Vfs>,
    prefilter: Arc<CandidatePrefilterIndex>,
}

impl WorkspaceLiveness {
    pub(crate) fn new(vfs: Arc<Vfs>, prefilter: Arc<CandidatePrefilterIndex>) -> Self {
        Self { vfs, prefilter }
    }
}

impl Liveness for WorkspaceLiveness {
    fn is_alive(&self, entry: &LocationEntry) -> bool {
        if !self.vfs.is_member(entry.file) {
            return false;
        }
        match entry.kind.candidate_kind() {
            Some(kind) => self.prefilter.is_candidate(entry.file, kind),
            None => !self.prefilter.kinds(entry.file).is_empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use sightline_core::{CandidateKind, CodeObjectId, CodeObjectKind, EventBus, FileId, TextSize};
    use sightline_prefilter::{MarkerPair, MarkerTables};

    use super::*;

    fn entry(file: FileId, kind: CodeObjectKind) -> LocationEntry {
        LocationEntry {
            file,
            offset: TextSize::from(0),
            owning_method: CodeObjectId::method::<&str>(None, Some("A"), "foo", &[]),
            kind,
        }
    }

    #[test]
    fn entries_follow_tracking_and_candidacy() {
        let mut tables = MarkerTables::new();
        tables.add(CandidateKind::Span, MarkerPair::new("io.opentelemetry", "WithSpan"));
        let vfs = Arc::new(Vfs::new());
        let prefilter = Arc::new(CandidatePrefilterIndex::new(tables, EventBus::new()));
        let liveness = WorkspaceLiveness::new(Arc::clone(&vfs), Arc::clone(&prefilter));

        let text = "import io.opentelemetry.WithSpan";
        let file = vfs.open("/src/A.kt", text, 1);
        prefilter.on_file_changed(file, text);
        assert!(liveness.is_alive(&entry(file, CodeObjectKind::Method)));
        assert!(liveness.is_alive(&entry(file, CodeObjectKind::Span)));
        assert!(!liveness.is_alive(&entry(file, CodeObjectKind::Endpoint)));

        prefilter.on_file_changed(file, "class A");
        assert!(!liveness.is_alive(&entry(file, CodeObjectKind::Method)));

        prefilter.on_file_changed(file, text);
        vfs.close(file);
        assert!(!liveness.is_alive(&entry(file, CodeObjectKind::Span)));
    }

    #[test]
    fn disk_backed_entries_die_with_their_file() {
        let mut tables = MarkerTables::new();
        tables.add(CandidateKind::Span, MarkerPair::new("io.opentelemetry", "WithSpan"));
        let vfs = Arc::new(Vfs::new());
        let prefilter = Arc::new(CandidatePrefilterIndex::new(tables, EventBus::new()));
        let liveness = WorkspaceLiveness::new(Arc::clone(&vfs), Arc::clone(&prefilter));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("A.kt");
        let text = "import io.opentelemetry.WithSpan";
        std::fs::write(&path, text).unwrap();
        let file = vfs.open_on_disk(&path, text, 0);
        prefilter.on_file_changed(file, text);
        assert!(liveness.is_alive(&entry(file, CodeObjectKind::Span)));

        std::fs::remove_file(&path).unwrap();
        assert!(!liveness.is_alive(&entry(file, CodeObjectKind::Span)));
        assert!(!liveness.is_alive(&entry(file, CodeObjectKind::Method)));
    }
}
