//! The Sightline engine as a host embeds it.
//!
//! [`Workspace`] owns every component and wires the pipeline:
//!
//! 1. a file event (open, edit, close) updates the VFS,
//! 2. a debounced scan re-evaluates the candidate prefilter and, for candidate
//!    files, runs discovery under the resilient executor,
//! 3. new facts replace the file's entries in the location index and
//!    invalidate its lenses.
//!
//! Reads (`locate`, `lenses`, `document_facts`) never trigger a scan.
//!
//! An edit both notifies the executor and re-debounces the file's scan, and
//! the re-debounce cancels the running scan outright. In this pipeline an edit
//! therefore always supersedes the scan that saw the old text; the executor's
//! retry after the blackout applies to runs nothing has superseded, such as
//! hosts driving [`ResilientExecutor`] directly. The latest text always gets
//! its own scan.

mod facts;
mod liveness;
mod pipeline;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use anyhow::Context;
use async_channel::Receiver;
use parking_lot::Mutex;
use serde::Serialize;
use sightline_config::EngineConfig;
use sightline_core::{CodeObjectId, DocumentFacts, EngineEvent, EventBus, FileId, LensFact, TextSize};
use sightline_framework::{DiscoveryEngine, ScannerRegistry};
use sightline_index::{LocationIndex, SweepReport};
use sightline_lens::{FailureReporter, InsightProvider, LensCache, LensState, NoInsights};
use sightline_prefilter::CandidatePrefilterIndex;
use sightline_scheduler::{
    Cancelled, CancellationToken, Clock, KeyedDebouncer, PeriodicHandle, PoolKind,
    ResilientExecutor, Scheduler, SystemClock,
};
use sightline_syntax::LanguageModels;
use sightline_vfs::{DocumentError, Vfs};

use crate::facts::FactsStore;
use crate::liveness::WorkspaceLiveness;

pub use sightline_index::LocationEntry;

/// Where a code object currently lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    pub file: FileId,
    pub path: PathBuf,
    pub offset: TextSize,
    pub owning_method: CodeObjectId,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkspaceStats {
    pub tracked_files: usize,
    pub candidate_files: usize,
    pub fact_files: usize,
    pub indexed_ids: usize,
    pub lens_files: usize,
    pub pending_scans: usize,
}

/// Startup-time configuration of a [`Workspace`].
pub struct WorkspaceBuilder {
    config: EngineConfig,
    registry: Option<ScannerRegistry>,
    languages: Option<LanguageModels>,
    insights: Option<Arc<dyn InsightProvider>>,
    clock: Option<Arc<dyn Clock>>,
    io_handle: Option<tokio::runtime::Handle>,
}

impl WorkspaceBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            registry: None,
            languages: None,
            insights: None,
            clock: None,
            io_handle: None,
        }
    }

    /// Replaces the built-in scanner providers.
    pub fn registry(mut self, registry: ScannerRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn languages(mut self, languages: LanguageModels) -> Self {
        self.languages = Some(languages);
        self
    }

    pub fn insights(mut self, insights: Arc<dyn InsightProvider>) -> Self {
        self.insights = Some(insights);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Runs async orchestration on an existing runtime instead of a private one.
    pub fn io_handle(mut self, handle: tokio::runtime::Handle) -> Self {
        self.io_handle = Some(handle);
        self
    }

    pub fn build(self) -> Workspace {
        let config = self.config;
        let scheduler_config = config.scheduler.scheduler_config();
        let scheduler = match self.io_handle {
            Some(handle) => Scheduler::new_with_io_handle(scheduler_config, handle),
            None => Scheduler::new(scheduler_config),
        };
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let registry = self
            .registry
            .unwrap_or_else(sightline_framework_builtins::builtin_registry);
        let languages = Arc::new(self.languages.unwrap_or_else(LanguageModels::jvm));
        let insights = self.insights.unwrap_or_else(|| Arc::new(NoInsights));

        let events = EventBus::new();
        let vfs = Arc::new(Vfs::new());
        let prefilter = Arc::new(CandidatePrefilterIndex::new(
            registry.markers().clone(),
            events.clone(),
        ));
        let index = LocationIndex::new(Arc::new(WorkspaceLiveness::new(
            Arc::clone(&vfs),
            Arc::clone(&prefilter),
        )));
        let facts = Arc::new(FactsStore::default());
        let lenses = LensCache::new(
            scheduler.clone(),
            facts.clone(),
            insights,
            events.clone(),
            FailureReporter::new(Arc::clone(&clock), config.lens.failure_report_interval()),
        );
        let executor = ResilientExecutor::with_clock(config.discovery.mutation_blackout(), clock);
        let debouncer = KeyedDebouncer::new(scheduler.clone(), PoolKind::Compute, config.discovery.debounce());
        let discovery = DiscoveryEngine::new(registry, languages.clone());

        tracing::info!(
            target = "sightline.workspace",
            version = sightline_core::SIGHTLINE_VERSION,
            providers = ?discovery.registry().provider_ids(),
            "workspace started"
        );

        Workspace {
            inner: Arc::new(WorkspaceInner {
                config,
                scheduler,
                vfs,
                events,
                languages,
                prefilter,
                discovery,
                executor,
                debouncer,
                index,
                facts,
                lenses,
                background: Mutex::new(Vec::new()),
            }),
        }
    }
}

#[derive(Clone)]
pub struct Workspace {
    inner: Arc<WorkspaceInner>,
}

pub(crate) struct WorkspaceInner {
    pub(crate) config: EngineConfig,
    pub(crate) scheduler: Scheduler,
    pub(crate) vfs: Arc<Vfs>,
    pub(crate) events: EventBus,
    pub(crate) languages: Arc<LanguageModels>,
    pub(crate) prefilter: Arc<CandidatePrefilterIndex>,
    pub(crate) discovery: DiscoveryEngine,
    pub(crate) executor: ResilientExecutor,
    pub(crate) debouncer: KeyedDebouncer<FileId>,
    pub(crate) index: LocationIndex,
    pub(crate) facts: Arc<FactsStore>,
    pub(crate) lenses: LensCache,
    background: Mutex<Vec<PeriodicHandle>>,
}

impl Workspace {
    /// A workspace with the built-in scanners and no insight service.
    pub fn new(config: EngineConfig) -> Self {
        WorkspaceBuilder::new(config).build()
    }

    pub fn builder(config: EngineConfig) -> WorkspaceBuilder {
        WorkspaceBuilder::new(config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn subscribe(&self) -> Receiver<EngineEvent> {
        self.inner.events.subscribe()
    }

    pub fn file_id(&self, path: impl AsRef<Path>) -> Option<FileId> {
        self.inner.vfs.get_id(path)
    }

    pub fn path(&self, file: FileId) -> Option<PathBuf> {
        self.inner.vfs.path(file).map(|path| path.to_path_buf())
    }

    /// Opens (or re-opens) a document and schedules a scan.
    pub fn open_document(&self, path: impl AsRef<Path>, text: impl Into<Arc<str>>, version: i32) -> FileId {
        let file = self.inner.vfs.open(path, text, version);
        tracing::debug!(target = "sightline.workspace", %file, version, "document opened");
        self.inner.schedule_scan(file);
        file
    }

    /// Reads `path` from disk and opens it as a document. Unlike editor
    /// documents, it leaves the workspace at the next maintenance run once
    /// `path` is deleted.
    pub fn open_path(&self, path: impl AsRef<Path>) -> anyhow::Result<FileId> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let file = self.inner.vfs.open_on_disk(path, text, 0);
        tracing::debug!(target = "sightline.workspace", %file, path = %path.display(), "document loaded from disk");
        self.inner.schedule_scan(file);
        Ok(file)
    }

    /// Replaces the document text. The in-flight scan of the file is
    /// superseded and a new scan is scheduled for the new text.
    pub fn update_document(
        &self,
        file: FileId,
        text: impl Into<Arc<str>>,
        version: i32,
    ) -> Result<(), DocumentError> {
        self.inner.vfs.update(file, text, version)?;
        let decision = self.inner.executor.notify_mutation(file);
        tracing::trace!(target = "sightline.workspace", %file, version, ?decision, "document changed");
        self.inner.schedule_scan(file);
        Ok(())
    }

    /// Removes the file from the workspace along with its facts and lenses.
    pub fn close_document(&self, file: FileId) -> bool {
        self.inner.close_file(file)
    }

    /// Same as [`Workspace::close_document`] for a path; used for deletions on disk.
    pub fn remove_path(&self, path: impl AsRef<Path>) -> bool {
        match self.inner.vfs.get_id(path) {
            Some(file) => self.close_document(file),
            None => false,
        }
    }

    /// Runs a scan of `file` right away and waits for it to finish.
    pub async fn rescan(&self, file: FileId) {
        self.inner.scan_now(file).finished().await;
    }

    pub fn locate(&self, id: &CodeObjectId) -> Option<Location> {
        let entry = self.inner.index.get(id)?;
        let path = self.inner.vfs.path(entry.file)?;
        Some(Location {
            file: entry.file,
            path: path.to_path_buf(),
            offset: entry.offset,
            owning_method: entry.owning_method,
        })
    }

    pub fn can_locate(&self, id: &CodeObjectId) -> bool {
        self.inner.index.contains(id)
    }

    pub fn document_facts(&self, file: FileId) -> Option<Arc<DocumentFacts>> {
        self.inner.facts.get(file)
    }

    pub fn lenses(&self, file: FileId) -> Arc<[LensFact]> {
        self.inner.lenses.get(file)
    }

    pub fn lens_state(&self, file: FileId) -> LensState {
        self.inner.lenses.state(file)
    }

    /// Sweeps dead location entries, closes disk-backed files that were deleted
    /// and drops facts of files that left the workspace.
    pub fn run_maintenance(&self) -> SweepReport {
        self.inner.run_maintenance()
    }

    /// Insight data may have changed (new environment, reconnect): rebuild every lens.
    pub fn environment_changed(&self) -> usize {
        self.inner.lenses.refresh_all()
    }

    /// Starts the periodic index maintenance and lens refresh. Calling it again
    /// restarts both tasks.
    pub fn start_background_tasks(&self) {
        let weak = Arc::downgrade(&self.inner);
        let maintenance = self.inner.scheduler.spawn_periodic(
            "location-index-maintenance",
            PoolKind::Background,
            self.inner.config.index.maintenance_interval(),
            periodic(weak.clone(), |inner| {
                inner.run_maintenance();
            }),
        );
        let refresh = self.inner.scheduler.spawn_periodic(
            "lens-refresh",
            PoolKind::Background,
            self.inner.config.lens.refresh_interval(),
            periodic(weak, |inner| {
                inner.lenses.refresh_all();
            }),
        );
        let mut background = self.inner.background.lock();
        background.clear();
        background.extend([maintenance, refresh]);
    }

    pub fn stop_background_tasks(&self) {
        self.inner.background.lock().clear();
    }

    pub fn stats(&self) -> WorkspaceStats {
        WorkspaceStats {
            tracked_files: self.inner.vfs.tracked().len(),
            candidate_files: self.inner.prefilter.candidate_files().len(),
            fact_files: self.inner.facts.len(),
            indexed_ids: self.inner.index.len(),
            lens_files: self.inner.lenses.len(),
            pending_scans: self.inner.debouncer.pending(),
        }
    }
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// Periodic tasks only hold a weak reference so dropping the workspace stops them.
fn periodic(
    inner: Weak<WorkspaceInner>,
    f: impl Fn(&WorkspaceInner) + Send + Sync + 'static,
) -> impl Fn(CancellationToken) -> Result<(), Cancelled> + Send + Sync + 'static {
    move |token| {
        Cancelled::check(&token)?;
        if let Some(inner) = inner.upgrade() {
            f(&inner);
        }
        Ok(())
    }
}
