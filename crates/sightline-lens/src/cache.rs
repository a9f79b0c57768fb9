use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use sightline_core::{CodeObjectId, DocumentFacts, EngineEvent, EventBus, FileId, LensFact};
use sightline_scheduler::{Cancelled, CancellationToken, Scheduler, TaskError};
use tokio::sync::oneshot;

use crate::insight::{InsightError, InsightProvider};
use crate::reporter::FailureReporter;

/// Read access to the current facts of a file.
pub trait FactsSource: Send + Sync {
    fn document_facts(&self, file: FileId) -> Option<Arc<DocumentFacts>>;

    /// Every file that currently has facts.
    fn files(&self) -> Vec<FileId>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LensState {
    Empty,
    Building,
    Ready,
}

/// How one build ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    /// Committed a new value and published `LensChanged`.
    Changed,
    /// Committed a value equal to the cached one; nothing was published.
    Unchanged,
    /// A newer trigger (or removal) took over before this build committed.
    Superseded,
    /// The insight fetch failed; the previous value was kept.
    Failed,
}

/// Handle to a scheduled lens build.
#[derive(Debug)]
pub struct LensBuild {
    file: FileId,
    token: CancellationToken,
    done: oneshot::Receiver<BuildOutcome>,
}

impl LensBuild {
    pub fn file(&self) -> FileId {
        self.file
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub async fn finished(self) -> BuildOutcome {
        self.done.await.unwrap_or(BuildOutcome::Superseded)
    }
}

struct BuildSlot {
    id: u64,
    token: CancellationToken,
}

/// Cache of lens values per file.
///
/// Reads never block on builds. Every trigger for a file cancels that file's
/// running build; a build commits only while it is still the file's current
/// one.
#[derive(Clone)]
pub struct LensCache {
    inner: Arc<Inner>,
}

struct Inner {
    scheduler: Scheduler,
    facts: Arc<dyn FactsSource>,
    insights: Arc<dyn InsightProvider>,
    events: EventBus,
    values: DashMap<FileId, Arc<[LensFact]>>,
    builds: Mutex<HashMap<FileId, BuildSlot>>,
    next_build: AtomicU64,
    failures: FailureReporter,
}

impl LensCache {
    pub fn new(
        scheduler: Scheduler,
        facts: Arc<dyn FactsSource>,
        insights: Arc<dyn InsightProvider>,
        events: EventBus,
        failures: FailureReporter,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                scheduler,
                facts,
                insights,
                events,
                values: DashMap::new(),
                builds: Mutex::new(HashMap::new()),
                next_build: AtomicU64::new(1),
                failures,
            }),
        }
    }

    /// Current lenses for `file`; empty until a build has committed.
    pub fn get(&self, file: FileId) -> Arc<[LensFact]> {
        self.inner
            .values
            .get(&file)
            .map(|value| Arc::clone(value.value()))
            .unwrap_or_else(|| Arc::from(Vec::new()))
    }

    pub fn state(&self, file: FileId) -> LensState {
        if self.inner.builds.lock().contains_key(&file) {
            LensState::Building
        } else if self.inner.values.contains_key(&file) {
            LensState::Ready
        } else {
            LensState::Empty
        }
    }

    /// Schedules a rebuild of `file`, superseding any build in flight.
    pub fn invalidate(&self, file: FileId) -> LensBuild {
        let id = self.inner.next_build.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        {
            let mut builds = self.inner.builds.lock();
            let previous = builds.insert(
                file,
                BuildSlot {
                    id,
                    token: token.clone(),
                },
            );
            if let Some(previous) = previous {
                previous.token.cancel();
            }
        }

        let (tx, done) = oneshot::channel();
        let inner = Arc::clone(&self.inner);
        let build_token = token.clone();
        self.inner.scheduler.io_handle().spawn(async move {
            let outcome = inner.run_build(file, id, build_token).await;
            let _ = tx.send(outcome);
        });

        LensBuild { file, token, done }
    }

    /// Rebuilds every file that has facts, lenses or a build in flight, so a
    /// file whose first build failed is retried too.
    pub fn refresh_all(&self) -> usize {
        let mut files: Vec<FileId> = self.inner.values.iter().map(|item| *item.key()).collect();
        files.extend(self.inner.builds.lock().keys().copied());
        files.extend(self.inner.facts.files());
        files.sort();
        files.dedup();
        for file in &files {
            self.invalidate(*file);
        }
        tracing::debug!(target = "sightline.lens", files = files.len(), "refreshing all lenses");
        files.len()
    }

    /// Drops the file's lenses and cancels its build.
    pub fn remove(&self, file: FileId) {
        let build = self.inner.builds.lock().remove(&file);
        let had_build = build.is_some();
        if let Some(build) = build {
            build.token.cancel();
        }
        let had_value = self.inner.values.remove(&file).is_some();
        self.inner.failures.forget(file);
        if had_build || had_value {
            self.inner.events.publish(EngineEvent::LensRemoved { file });
        }
    }

    /// Drops every file's lenses and cancels all builds.
    pub fn clear(&self) {
        {
            let mut builds = self.inner.builds.lock();
            for (_, build) in builds.drain() {
                build.token.cancel();
            }
        }
        self.inner.values.clear();
        self.inner.events.publish(EngineEvent::LensCleared);
    }

    pub fn len(&self) -> usize {
        self.inner.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.values.is_empty()
    }
}

impl std::fmt::Debug for LensCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LensCache")
            .field("files", &self.inner.values.len())
            .field("building", &self.inner.builds.lock().len())
            .finish()
    }
}

impl Inner {
    async fn run_build(&self, file: FileId, id: u64, token: CancellationToken) -> BuildOutcome {
        let facts = Arc::clone(&self.facts);
        let insights = Arc::clone(&self.insights);
        let task = self
            .scheduler
            .spawn_background_with_token(token, move |token| {
                build_lenses(file, facts.as_ref(), insights.as_ref(), &token)
            });

        match task.join().await {
            Ok(Ok(lenses)) => self.commit(file, id, lenses),
            Ok(Err(err)) => {
                if !self.release(file, id) {
                    return BuildOutcome::Superseded;
                }
                self.failures.report(file, &err);
                BuildOutcome::Failed
            }
            Err(TaskError::Cancelled) => {
                // Frees the slot when the handle itself was cancelled.
                self.release(file, id);
                BuildOutcome::Superseded
            }
            Err(TaskError::Panicked) => {
                if !self.release(file, id) {
                    return BuildOutcome::Superseded;
                }
                self.failures.report(file, &"lens build panicked");
                BuildOutcome::Failed
            }
        }
    }

    /// Clears the slot if build `id` still owns it.
    fn release(&self, file: FileId, id: u64) -> bool {
        let mut builds = self.builds.lock();
        match builds.get(&file) {
            Some(slot) if slot.id == id => {
                builds.remove(&file);
                true
            }
            _ => false,
        }
    }

    fn commit(&self, file: FileId, id: u64, lenses: Vec<LensFact>) -> BuildOutcome {
        let mut builds = self.builds.lock();
        match builds.get(&file) {
            Some(slot) if slot.id == id => {}
            _ => return BuildOutcome::Superseded,
        }
        builds.remove(&file);

        let unchanged = self
            .values
            .get(&file)
            .is_some_and(|current| current.value().as_ref() == lenses.as_slice());
        if unchanged {
            return BuildOutcome::Unchanged;
        }
        let was_empty = self.values.get(&file).map_or(true, |current| current.is_empty());
        let now_empty = lenses.is_empty();
        self.values.insert(file, Arc::from(lenses));
        drop(builds);

        if was_empty && now_empty {
            // First build of a file without lenses: readers already saw an empty value.
            return BuildOutcome::Unchanged;
        }
        tracing::trace!(target = "sightline.lens", %file, "lenses changed");
        self.events.publish(EngineEvent::LensChanged { file });
        BuildOutcome::Changed
    }
}

enum BuildError {
    Cancelled,
    Insight(InsightError),
}

impl From<Cancelled> for BuildError {
    fn from(_: Cancelled) -> Self {
        BuildError::Cancelled
    }
}

/// Maps the file's facts and their insights to sorted lens values.
fn build_lenses(
    file: FileId,
    facts: &dyn FactsSource,
    insights: &dyn InsightProvider,
    token: &CancellationToken,
) -> Result<Result<Vec<LensFact>, InsightError>, Cancelled> {
    match try_build_lenses(file, facts, insights, token) {
        Ok(lenses) => Ok(Ok(lenses)),
        Err(BuildError::Cancelled) => Err(Cancelled),
        Err(BuildError::Insight(err)) => Ok(Err(err)),
    }
}

fn try_build_lenses(
    file: FileId,
    facts: &dyn FactsSource,
    insights: &dyn InsightProvider,
    token: &CancellationToken,
) -> Result<Vec<LensFact>, BuildError> {
    Cancelled::check(token)?;
    let Some(facts) = facts.document_facts(file) else {
        return Ok(Vec::new());
    };

    // id -> owning method
    let scopes: BTreeMap<&CodeObjectId, &CodeObjectId> = facts
        .methods
        .values()
        .flat_map(|method| {
            std::iter::once(&method.id)
                .chain(method.spans.keys())
                .chain(method.endpoints.keys())
                .map(move |id| (id, &method.id))
        })
        .collect();
    if scopes.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<CodeObjectId> = scopes.keys().map(|id| (*id).clone()).collect();
    let fetched = match insights.fetch_insights(&ids, token) {
        Ok(fetched) => fetched,
        Err(InsightError::Cancelled) => return Err(BuildError::Cancelled),
        Err(err) => return Err(BuildError::Insight(err)),
    };
    Cancelled::check(token)?;

    let mut lenses = Vec::new();
    for insight in fetched {
        let Some(scope) = scopes.get(&insight.id) else {
            continue;
        };
        for decorator in insight.decorators {
            lenses.push(LensFact {
                scope: (*scope).clone(),
                importance: decorator.importance,
                title: decorator.title,
                code_object: insight.id.clone(),
                description: decorator.description,
                more_info: decorator.more_info,
            });
        }
    }
    lenses.sort();
    lenses.dedup();
    Ok(lenses)
}
