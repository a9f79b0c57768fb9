//! Cheap token-presence prefilter.
//!
//! Before any structural parse, every changed file is checked against
//! per-kind [`MarkerTable`]s. Discovery only runs the scanners for kinds the
//! file is a candidate for, and the location index treats candidacy as part of
//! an entry's liveness.

mod fingerprint;
mod markers;

use std::collections::HashMap;

use parking_lot::RwLock;
use sightline_core::{CandidateKind, CandidateKinds, EngineEvent, EventBus, FileId};

pub use fingerprint::Fingerprint;
pub use markers::{MarkerPair, MarkerTable, MarkerTables};

/// Result of re-evaluating one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateUpdate {
    pub file: FileId,
    /// Kinds the file is a candidate for after the update.
    pub kinds: CandidateKinds,
    pub added: CandidateKinds,
    pub removed: CandidateKinds,
}

impl CandidateUpdate {
    fn unchanged(file: FileId, kinds: CandidateKinds) -> Self {
        Self {
            file,
            kinds,
            added: CandidateKinds::NONE,
            removed: CandidateKinds::NONE,
        }
    }

    pub fn is_changed(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }
}

#[derive(Debug, Clone)]
struct PrefilterEntry {
    fingerprint: Fingerprint,
    kinds: CandidateKinds,
}

#[derive(Debug)]
pub struct CandidatePrefilterIndex {
    tables: MarkerTables,
    entries: RwLock<HashMap<FileId, PrefilterEntry>>,
    events: EventBus,
}

impl CandidatePrefilterIndex {
    pub fn new(tables: MarkerTables, events: EventBus) -> Self {
        Self {
            tables,
            entries: RwLock::new(HashMap::new()),
            events,
        }
    }

    pub fn tables(&self) -> &MarkerTables {
        &self.tables
    }

    pub fn is_candidate(&self, file: FileId, kind: CandidateKind) -> bool {
        self.kinds(file).contains(kind)
    }

    pub fn kinds(&self, file: FileId) -> CandidateKinds {
        self.entries
            .read()
            .get(&file)
            .map_or(CandidateKinds::NONE, |entry| entry.kinds)
    }

    /// Whether the file has been evaluated at all (it may be a candidate for nothing).
    pub fn contains(&self, file: FileId) -> bool {
        self.entries.read().contains_key(&file)
    }

    /// Re-evaluates `file` against the marker tables.
    ///
    /// Unchanged text is detected by fingerprint and skipped. A
    /// [`EngineEvent::CandidateFileUpdated`] is published only when the set of
    /// kinds actually changes.
    pub fn on_file_changed(&self, file: FileId, text: &str) -> CandidateUpdate {
        let fingerprint = Fingerprint::of_text(text);
        if let Some(entry) = self.entries.read().get(&file) {
            if entry.fingerprint == fingerprint {
                return CandidateUpdate::unchanged(file, entry.kinds);
            }
        }

        let kinds = self.tables.evaluate(text);
        let previous = self
            .entries
            .write()
            .insert(file, PrefilterEntry { fingerprint, kinds })
            .map_or(CandidateKinds::NONE, |entry| entry.kinds);

        let update = CandidateUpdate {
            file,
            kinds,
            added: kinds.difference(previous),
            removed: previous.difference(kinds),
        };
        if update.is_changed() {
            tracing::debug!(
                target = "sightline.prefilter",
                file = %file,
                kinds = ?kinds,
                added = ?update.added,
                removed = ?update.removed,
                "candidate kinds changed"
            );
            self.events
                .publish(EngineEvent::CandidateFileUpdated { file, kinds });
        }
        update
    }

    /// Forgets `file`; all of its kinds are reported as removed.
    pub fn remove_file(&self, file: FileId) -> CandidateUpdate {
        let Some(entry) = self.entries.write().remove(&file) else {
            return CandidateUpdate::unchanged(file, CandidateKinds::NONE);
        };
        let update = CandidateUpdate {
            file,
            kinds: CandidateKinds::NONE,
            added: CandidateKinds::NONE,
            removed: entry.kinds,
        };
        if update.is_changed() {
            self.events.publish(EngineEvent::CandidateFileUpdated {
                file,
                kinds: CandidateKinds::NONE,
            });
        }
        update
    }

    /// Files that are a candidate for at least one kind, sorted.
    pub fn candidate_files(&self) -> Vec<FileId> {
        let mut files: Vec<_> = self
            .entries
            .read()
            .iter()
            .filter(|(_, entry)| !entry.kinds.is_empty())
            .map(|(file, _)| *file)
            .collect();
        files.sort();
        files
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> (CandidatePrefilterIndex, EventBus) {
        let mut tables = MarkerTables::new();
        tables.add(CandidateKind::Span, MarkerPair::new("io.opentelemetry", "WithSpan"));
        tables.add(CandidateKind::Endpoint, MarkerPair::new("io.ktor", "routing"));
        let events = EventBus::new();
        (CandidatePrefilterIndex::new(tables, events.clone()), events)
    }

    #[test]
    fn kinds_are_added_and_removed_as_text_changes() {
        let (index, events) = index();
        let rx = events.subscribe();
        let file = FileId::from_raw(1);

        let update = index.on_file_changed(file, "import io.opentelemetry.WithSpan");
        assert_eq!(update.added, CandidateKinds::only(CandidateKind::Span));
        assert!(index.is_candidate(file, CandidateKind::Span));
        assert!(!index.is_candidate(file, CandidateKind::Endpoint));

        let update = index.on_file_changed(file, "import io.ktor.server.routing");
        assert_eq!(update.added, CandidateKinds::only(CandidateKind::Endpoint));
        assert_eq!(update.removed, CandidateKinds::only(CandidateKind::Span));

        assert_eq!(
            rx.try_recv().unwrap(),
            EngineEvent::CandidateFileUpdated {
                file,
                kinds: CandidateKinds::only(CandidateKind::Span)
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            EngineEvent::CandidateFileUpdated {
                file,
                kinds: CandidateKinds::only(CandidateKind::Endpoint)
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn unchanged_text_and_unchanged_kinds_publish_nothing() {
        let (index, events) = index();
        let file = FileId::from_raw(2);
        index.on_file_changed(file, "import io.opentelemetry.WithSpan");

        let rx = events.subscribe();
        assert!(!index.on_file_changed(file, "import io.opentelemetry.WithSpan").is_changed());
        assert!(!index
            .on_file_changed(file, "import io.opentelemetry.WithSpan // edited")
            .is_changed());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn non_candidates_are_tracked_but_not_listed() {
        let (index, _events) = index();
        let plain = FileId::from_raw(3);
        let traced = FileId::from_raw(4);
        index.on_file_changed(plain, "class Plain {}");
        index.on_file_changed(traced, "io.opentelemetry WithSpan");

        assert!(index.contains(plain));
        assert_eq!(index.kinds(plain), CandidateKinds::NONE);
        assert_eq!(index.candidate_files(), vec![traced]);

        let update = index.remove_file(traced);
        assert_eq!(update.removed, CandidateKinds::only(CandidateKind::Span));
        assert!(!index.is_candidate(traced, CandidateKind::Span));
        assert!(!index.remove_file(traced).is_changed());
    }
}
