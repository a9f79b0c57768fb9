//! Location index: code-object id to its current source location.
//!
//! Reads go straight to a sharded [`DashMap`] and never wait on writers.
//! Writes (per-file replacement, removal, maintenance sweeps) are serialized
//! by a single mutex so a file's entry set is always replaced atomically with
//! respect to other writers.
//!
//! Whether an entry is still *alive* is decided by an injected [`Liveness`]
//! oracle. Dead entries are filtered from lookups immediately and evicted by
//! the next [`LocationIndex::sweep`].

use std::collections::BTreeSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sightline_core::{panic_payload_to_str, CodeObjectId, CodeObjectKind, DocumentFacts, FileId, TextSize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationEntry {
    pub file: FileId,
    pub offset: TextSize,
    pub owning_method: CodeObjectId,
    pub kind: CodeObjectKind,
}

/// Decides whether an indexed entry may still be returned.
pub trait Liveness: Send + Sync {
    fn is_alive(&self, entry: &LocationEntry) -> bool;
}

impl<F> Liveness for F
where
    F: Fn(&LocationEntry) -> bool + Send + Sync,
{
    fn is_alive(&self, entry: &LocationEntry) -> bool {
        self(entry)
    }
}

/// Oracle that keeps every entry.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysAlive;

impl Liveness for AlwaysAlive {
    fn is_alive(&self, _entry: &LocationEntry) -> bool {
        true
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub evicted: usize,
    /// Entries whose liveness check panicked; they are kept for the next sweep.
    pub failed: usize,
}

/// Flattens a file's facts into index entries.
///
/// Spans and endpoints point at their owning method's declaration.
pub fn entries_from_facts(facts: &DocumentFacts) -> Vec<(CodeObjectId, LocationEntry)> {
    let mut out = Vec::new();
    for method in facts.methods.values() {
        let entry = |kind| LocationEntry {
            file: facts.file,
            offset: method.offset,
            owning_method: method.id.clone(),
            kind,
        };
        out.push((method.id.clone(), entry(CodeObjectKind::Method)));
        for id in method.spans.keys() {
            out.push((id.clone(), entry(CodeObjectKind::Span)));
        }
        for id in method.endpoints.keys() {
            out.push((id.clone(), entry(CodeObjectKind::Endpoint)));
        }
    }
    out
}

pub struct LocationIndex {
    entries: DashMap<CodeObjectId, LocationEntry>,
    /// Reverse map; only touched while holding `write`.
    by_file: DashMap<FileId, BTreeSet<CodeObjectId>>,
    write: Mutex<()>,
    liveness: Arc<dyn Liveness>,
}

impl LocationIndex {
    pub fn new(liveness: Arc<dyn Liveness>) -> Self {
        Self {
            entries: DashMap::new(),
            by_file: DashMap::new(),
            write: Mutex::new(()),
            liveness,
        }
    }

    /// Replaces every entry owned by `file` with `entries`.
    ///
    /// An id currently owned by another file moves to `file`.
    pub fn upsert_for_file<I>(&self, file: FileId, entries: I)
    where
        I: IntoIterator<Item = (CodeObjectId, LocationEntry)>,
    {
        let _guard = self.write.lock();
        let removed = self.remove_file_locked(file);

        let mut owned = BTreeSet::new();
        for (id, entry) in entries {
            debug_assert_eq!(entry.file, file);
            if let Some(previous) = self.entries.insert(id.clone(), entry) {
                if previous.file != file {
                    self.unlink(previous.file, &id);
                    tracing::debug!(
                        target = "sightline.index",
                        id = %id,
                        from = %previous.file,
                        to = %file,
                        "code object moved between files"
                    );
                }
            }
            owned.insert(id);
        }

        tracing::trace!(
            target = "sightline.index",
            %file,
            removed,
            inserted = owned.len(),
            "replaced file entries"
        );
        if !owned.is_empty() {
            self.by_file.insert(file, owned);
        }
    }

    pub fn remove(&self, id: &CodeObjectId) -> Option<LocationEntry> {
        let _guard = self.write.lock();
        let (_, entry) = self.entries.remove(id)?;
        self.unlink(entry.file, id);
        Some(entry)
    }

    /// Removes every entry owned by `file`, returning how many were removed.
    pub fn remove_all_for_file(&self, file: FileId) -> usize {
        let _guard = self.write.lock();
        self.remove_file_locked(file)
    }

    /// Drops `id` from `file`'s id set, and the set itself once empty. Caller
    /// holds the write lock.
    fn unlink(&self, file: FileId, id: &CodeObjectId) {
        if let Some(mut ids) = self.by_file.get_mut(&file) {
            ids.remove(id);
        }
        self.by_file.remove_if(&file, |_, ids| ids.is_empty());
    }

    fn remove_file_locked(&self, file: FileId) -> usize {
        let Some((_, ids)) = self.by_file.remove(&file) else {
            return 0;
        };
        let mut removed = 0;
        for id in ids {
            if self.entries.remove_if(&id, |_, entry| entry.file == file).is_some() {
                removed += 1;
            }
        }
        removed
    }

    /// Returns the entry for `id` if it exists and is alive.
    pub fn get(&self, id: &CodeObjectId) -> Option<LocationEntry> {
        // Clone out of the shard so the oracle never runs under a shard lock.
        let entry = self.entries.get(id).map(|entry| entry.value().clone())?;
        self.check_alive(id, &entry).unwrap_or(false).then_some(entry)
    }

    pub fn contains(&self, id: &CodeObjectId) -> bool {
        self.get(id).is_some()
    }

    /// Ids currently owned by `file`, dead or alive.
    pub fn ids_for_file(&self, file: FileId) -> Vec<CodeObjectId> {
        self.by_file
            .get(&file)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Evicts every dead entry.
    ///
    /// A panicking liveness check keeps its entry and is reported in
    /// [`SweepReport::failed`].
    pub fn sweep(&self) -> SweepReport {
        let _guard = self.write.lock();
        let snapshot: Vec<(CodeObjectId, LocationEntry)> = self
            .entries
            .iter()
            .map(|item| (item.key().clone(), item.value().clone()))
            .collect();

        let mut report = SweepReport {
            examined: snapshot.len(),
            ..SweepReport::default()
        };
        for (id, entry) in snapshot {
            match self.check_alive(&id, &entry) {
                Some(true) => {}
                Some(false) => {
                    self.entries.remove(&id);
                    self.unlink(entry.file, &id);
                    report.evicted += 1;
                }
                None => report.failed += 1,
            }
        }

        tracing::debug!(
            target = "sightline.index",
            examined = report.examined,
            evicted = report.evicted,
            failed = report.failed,
            "location index sweep finished"
        );
        report
    }

    fn check_alive(&self, id: &CodeObjectId, entry: &LocationEntry) -> Option<bool> {
        match catch_unwind(AssertUnwindSafe(|| self.liveness.is_alive(entry))) {
            Ok(alive) => Some(alive),
            Err(panic) => {
                tracing::error!(
                    target = "sightline.index",
                    id = %id,
                    panic = %panic_payload_to_str(&*panic),
                    "liveness check panicked"
                );
                None
            }
        }
    }

    /// Number of stored entries, including dead ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn file_count(&self) -> usize {
        self.by_file.len()
    }
}

impl std::fmt::Debug for LocationIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationIndex")
            .field("entries", &self.entries.len())
            .field("files", &self.by_file.len())
            .finish_non_exhaustive()
    }
}
