use std::sync::Arc;
use std::time::Duration;

use sightline_core::{DocumentFacts, EngineEvent, FileId};
use sightline_framework::DiscoveryError;
use sightline_index::{entries_from_facts, SweepReport};
use sightline_scheduler::{
    AttemptError, Cancelled, CancellationToken, KeyedDebouncedHandle, RunStatus,
};

use crate::WorkspaceInner;

impl WorkspaceInner {
    pub(crate) fn schedule_scan(self: &Arc<Self>, file: FileId) -> KeyedDebouncedHandle {
        self.schedule_scan_after(file, self.config.discovery.debounce())
    }

    pub(crate) fn scan_now(self: &Arc<Self>, file: FileId) -> KeyedDebouncedHandle {
        self.schedule_scan_after(file, Duration::ZERO)
    }

    fn schedule_scan_after(self: &Arc<Self>, file: FileId, delay: Duration) -> KeyedDebouncedHandle {
        let weak = Arc::downgrade(self);
        self.debouncer.debounce_with_delay(file, delay, move |token| match weak.upgrade() {
            Some(inner) => inner.scan_file(file, &token),
            None => Ok(()),
        })
    }

    /// Prefilter, discover and commit one file. Runs on the compute pool.
    fn scan_file(&self, file: FileId, token: &CancellationToken) -> Result<(), Cancelled> {
        let Some(path) = self.vfs.path(file) else {
            return Ok(());
        };
        if !self.languages.supports(&path) {
            tracing::trace!(target = "sightline.workspace", path = %path.display(), "no structural model; skipping");
            return Ok(());
        }

        let policy = self.config.discovery.retry_policy();
        let report = self
            .executor
            .run(file, &policy, token, |attempt| self.discover_once(file, attempt));

        match report.status {
            RunStatus::Succeeded => {
                Cancelled::check(token)?;
                match report.value.flatten() {
                    Some(facts) => self.apply_facts(file, facts),
                    None => self.drop_facts(file),
                }
            }
            RunStatus::Canceled => {
                tracing::debug!(
                    target = "sightline.workspace",
                    %file,
                    attempts = report.attempts,
                    cause = ?report.cancel_cause,
                    "scan cancelled"
                );
            }
            RunStatus::Failed => {
                tracing::warn!(
                    target = "sightline.workspace",
                    %file,
                    attempts = report.attempts,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    error = report.last_error.as_deref().unwrap_or("unknown"),
                    "scan failed; keeping previous facts"
                );
            }
        }
        Ok(())
    }

    /// One attempt. `Ok(None)` means the file has nothing to discover.
    fn discover_once(
        &self,
        file: FileId,
        token: &CancellationToken,
    ) -> Result<Option<DocumentFacts>, AttemptError> {
        // Re-read on every attempt; an edit may have cancelled the previous one.
        let snapshot = self.vfs.snapshot(file).ok_or(AttemptError::Cancelled)?;
        let kinds = self.prefilter.on_file_changed(file, snapshot.text()).kinds;
        if kinds.is_empty() {
            return Ok(None);
        }

        match self.discovery.discover(&snapshot, kinds, token) {
            Ok(facts) => Ok(Some(facts)),
            Err(DiscoveryError::Cancelled) => Err(AttemptError::Cancelled),
            Err(DiscoveryError::Structural(err)) if err.is_transient() => {
                Err(AttemptError::Failed(err.to_string()))
            }
            Err(DiscoveryError::Structural(err)) => {
                tracing::debug!(target = "sightline.workspace", %file, error = %err, "file cannot be indexed");
                Ok(None)
            }
        }
    }

    /// Replaces the file's facts. Equal facts are a no-op: no index write, no
    /// events, no lens rebuild.
    pub(crate) fn apply_facts(&self, file: FileId, facts: DocumentFacts) {
        if !self.vfs.is_member(file) {
            return;
        }
        if self.facts.get(file).is_some_and(|current| *current == facts) {
            tracing::trace!(target = "sightline.workspace", %file, "facts unchanged");
            return;
        }

        let facts = Arc::new(facts);
        self.index.upsert_for_file(file, entries_from_facts(&facts));
        self.facts.insert(file, Arc::clone(&facts));
        tracing::debug!(
            target = "sightline.workspace",
            %file,
            methods = facts.methods.len(),
            "facts updated"
        );
        self.events.publish(EngineEvent::DocumentFactsChanged { file, facts });
        self.lenses.invalidate(file);
    }

    pub(crate) fn drop_facts(&self, file: FileId) {
        let removed_entries = self.index.remove_all_for_file(file);
        if self.facts.remove(file).is_none() {
            return;
        }
        tracing::debug!(target = "sightline.workspace", %file, removed_entries, "facts removed");
        self.events.publish(EngineEvent::DocumentFactsRemoved { file });
        self.lenses.remove(file);
    }

    pub(crate) fn close_file(&self, file: FileId) -> bool {
        let was_tracked = self.vfs.close(file);
        self.debouncer.cancel(&file);
        self.prefilter.remove_file(file);
        self.drop_facts(file);
        self.lenses.remove(file);
        if was_tracked {
            tracing::debug!(target = "sightline.workspace", %file, "document closed");
        }
        was_tracked
    }

    pub(crate) fn run_maintenance(&self) -> SweepReport {
        let report = self.index.sweep();
        for file in self.vfs.missing_on_disk() {
            tracing::debug!(target = "sightline.workspace", %file, "file deleted on disk");
            self.close_file(file);
        }
        for file in self.facts.files() {
            let alive = self.vfs.is_member(file) && !self.prefilter.kinds(file).is_empty();
            if !alive {
                self.drop_facts(file);
            }
        }
        if report.failed > 0 {
            tracing::warn!(
                target = "sightline.workspace",
                failed = report.failed,
                "maintenance could not check every entry; retrying next tick"
            );
        }
        report
    }
}
