use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use sightline_core::CodeObjectId;
use sightline_syntax::{
    JvmSourceModel, Language, LanguageModels, StructuralError, StructuralModel, SyntaxView,
};
use sightline_vfs::SourceSnapshot;
use sightline_workspace::Workspace;

use super::{test_config, A_KT};

/// Kotlin model that reports itself unavailable a set number of times.
struct WarmingUp {
    failures_left: AtomicUsize,
    parses: AtomicUsize,
    inner: JvmSourceModel,
}

impl WarmingUp {
    fn new(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            failures_left: AtomicUsize::new(failures),
            parses: AtomicUsize::new(0),
            inner: JvmSourceModel::new(Language::Kotlin),
        })
    }

    fn fail_next(&self, failures: usize) {
        self.failures_left.store(failures, Ordering::SeqCst);
    }

    fn parses(&self) -> usize {
        self.parses.load(Ordering::SeqCst)
    }
}

impl StructuralModel for WarmingUp {
    fn parse(&self, snapshot: &SourceSnapshot) -> Result<SyntaxView, StructuralError> {
        self.parses.fetch_add(1, Ordering::SeqCst);
        let fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(StructuralError::Unavailable("warming up".to_string()));
        }
        self.inner.parse(snapshot)
    }
}

fn workspace_with(model: &Arc<WarmingUp>) -> Workspace {
    let mut languages = LanguageModels::new();
    let model: Arc<dyn StructuralModel> = Arc::clone(model) as Arc<dyn StructuralModel>;
    languages.register("kt", Language::Kotlin, model);
    Workspace::builder(test_config()).languages(languages).build()
}

#[tokio::test(flavor = "current_thread")]
async fn transient_failures_are_retried() {
    let model = WarmingUp::new(2);
    let workspace = workspace_with(&model);

    let file = workspace.open_document("/src/A.kt", A_KT, 1);
    workspace.rescan(file).await;

    assert_eq!(model.parses(), 3);
    assert!(workspace
        .locate(&CodeObjectId::span("lib", "foo-span"))
        .is_some());
}

#[tokio::test(flavor = "current_thread")]
async fn exhausted_retries_keep_previous_facts() {
    let model = WarmingUp::new(0);
    let workspace = workspace_with(&model);

    let file = workspace.open_document("/src/A.kt", A_KT, 1);
    workspace.rescan(file).await;
    let before = workspace.document_facts(file).expect("first scan succeeds");
    assert_eq!(model.parses(), 1);

    model.fail_next(usize::MAX);
    workspace
        .update_document(file, format!("{A_KT}\n// edited\n"), 2)
        .unwrap();
    workspace.rescan(file).await;

    assert_eq!(model.parses(), 1 + workspace.config().discovery.max_attempts as usize);
    let after = workspace.document_facts(file).expect("facts kept");
    assert!(Arc::ptr_eq(&before, &after));
    assert!(workspace
        .locate(&CodeObjectId::endpoint("GET", "/x"))
        .is_some());
}

/// Kotlin model whose first parse blocks until the test releases it.
struct Gated {
    started: Mutex<Option<Sender<()>>>,
    release: Mutex<Option<Receiver<()>>>,
    inner: JvmSourceModel,
}

impl StructuralModel for Gated {
    fn parse(&self, snapshot: &SourceSnapshot) -> Result<SyntaxView, StructuralError> {
        if let Some(started) = self.started.lock().take() {
            started.send(()).unwrap();
            let release = self.release.lock().take().unwrap();
            release.recv_timeout(Duration::from_secs(1)).unwrap();
        }
        self.inner.parse(snapshot)
    }
}

#[tokio::test(flavor = "current_thread")]
async fn edits_supersede_running_scans() {
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let model: Arc<dyn StructuralModel> = Arc::new(Gated {
        started: Mutex::new(Some(started_tx)),
        release: Mutex::new(Some(release_rx)),
        inner: JvmSourceModel::new(Language::Kotlin),
    });
    let mut languages = LanguageModels::new();
    languages.register("kt", Language::Kotlin, model);
    let workspace = Workspace::builder(test_config()).languages(languages).build();

    let file = workspace.open_document("/src/A.kt", A_KT, 1);
    started_rx.recv_timeout(Duration::from_secs(1)).unwrap();

    // The first scan is parsing the old text; the edit moves the route.
    workspace
        .update_document(file, A_KT.replace("/x", "/y"), 2)
        .unwrap();
    release_tx.send(()).unwrap();
    workspace.rescan(file).await;

    assert!(workspace
        .locate(&CodeObjectId::endpoint("GET", "/y"))
        .is_some());
    assert!(workspace
        .locate(&CodeObjectId::endpoint("GET", "/x"))
        .is_none());
}
