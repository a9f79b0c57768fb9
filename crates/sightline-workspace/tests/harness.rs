use std::sync::Arc;

use pretty_assertions::assert_eq;
use sightline_core::{CodeObjectId, EngineEvent, TextSize};
use sightline_lens::{CodeObjectInsights, Decorator, InsightError, InsightProvider, LensState};
use sightline_scheduler::CancellationToken;
use sightline_workspace::{Workspace, WorkspaceStats};
use tokio::time::Duration;

mod suite;

use suite::{drain, test_config, wait_for, A_KT};

const IDS: [&str; 4] = [
    "method:A.foo",
    "span:lib/foo-span",
    "span:io.opentelemetry.opentelemetry-instrumentation-annotations-1.16/foo-span",
    "endpoint:GET /x",
];

fn id(raw: &str) -> CodeObjectId {
    CodeObjectId::parse(raw).unwrap()
}

/// Reports one "Slow" decorator for every span it is asked about.
struct SlowSpans;

impl InsightProvider for SlowSpans {
    fn fetch_insights(
        &self,
        ids: &[CodeObjectId],
        _token: &CancellationToken,
    ) -> Result<Vec<CodeObjectInsights>, InsightError> {
        Ok(ids
            .iter()
            .filter(|id| id.as_str().starts_with("span:lib/"))
            .map(|id| CodeObjectInsights {
                id: id.clone(),
                decorators: vec![Decorator {
                    title: "Slow".to_string(),
                    description: "p95 above threshold".to_string(),
                    importance: 1,
                    more_info: None,
                }],
            })
            .collect())
    }
}

#[tokio::test(flavor = "current_thread")]
async fn discovered_ids_resolve_to_the_owning_method() {
    let workspace = Workspace::new(test_config());
    let events = workspace.subscribe();

    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("A.kt");
    std::fs::write(&path, A_KT).unwrap();
    let file = workspace.open_path(&path).unwrap();
    workspace.rescan(file).await;

    let event = wait_for(&events, |event| matches!(event, EngineEvent::DocumentFactsChanged { .. })).await;
    let EngineEvent::DocumentFactsChanged { file: changed, facts } = event else {
        unreachable!()
    };
    assert_eq!(changed, file);
    assert_eq!(facts.methods.len(), 1);

    let offset = TextSize::try_from(A_KT.find("foo()").unwrap()).unwrap();
    for raw in IDS {
        let location = workspace.locate(&id(raw)).unwrap_or_else(|| panic!("{raw} not indexed"));
        assert_eq!(location.file, file, "{raw}");
        assert_eq!(location.offset, offset, "{raw}");
        assert_eq!(location.owning_method, id("method:A.foo"), "{raw}");
        assert_eq!(Some(location.path), workspace.path(file));
    }

    assert!(workspace.remove_path(&path));
    workspace.run_maintenance();
    for raw in IDS {
        assert!(workspace.locate(&id(raw)).is_none(), "{raw} still indexed");
        assert!(!workspace.can_locate(&id(raw)));
    }
    assert!(workspace.document_facts(file).is_none());
    wait_for(&events, |event| *event == EngineEvent::DocumentFactsRemoved { file }).await;
}

#[tokio::test(flavor = "current_thread")]
async fn rescanning_unchanged_text_is_silent() {
    let workspace = Workspace::builder(test_config())
        .insights(Arc::new(SlowSpans))
        .build();
    let events = workspace.subscribe();

    let file = workspace.open_document("/src/A.kt", A_KT, 1);
    workspace.rescan(file).await;
    wait_for(&events, |event| *event == EngineEvent::LensChanged { file }).await;
    let before = workspace.document_facts(file).expect("facts after first scan");

    workspace.rescan(file).await;
    workspace.update_document(file, A_KT, 2).unwrap();
    workspace.rescan(file).await;

    let after = workspace.document_facts(file).expect("facts after rescan");
    assert!(Arc::ptr_eq(&before, &after));
    let noise: Vec<_> = drain(&events, Duration::from_millis(100))
        .await
        .into_iter()
        .filter(|event| {
            matches!(
                event,
                EngineEvent::DocumentFactsChanged { .. } | EngineEvent::LensChanged { .. }
            )
        })
        .collect();
    assert_eq!(noise, Vec::new());
}

#[tokio::test(flavor = "current_thread")]
async fn insights_become_lenses_on_the_owning_method() {
    let workspace = Workspace::builder(test_config())
        .insights(Arc::new(SlowSpans))
        .build();
    let events = workspace.subscribe();

    let file = workspace.open_document("/src/A.kt", A_KT, 1);
    workspace.rescan(file).await;
    wait_for(&events, |event| *event == EngineEvent::LensChanged { file }).await;

    assert_eq!(workspace.lens_state(file), LensState::Ready);
    let lenses = workspace.lenses(file);
    assert_eq!(lenses.len(), 1);
    assert_eq!(lenses[0].scope, id("method:A.foo"));
    assert_eq!(lenses[0].code_object, id("span:lib/foo-span"));
    assert_eq!(lenses[0].title, "Slow");

    // Same insights after an environment change: nothing to publish.
    assert_eq!(workspace.environment_changed(), 1);
    let changed: Vec<_> = drain(&events, Duration::from_millis(100))
        .await
        .into_iter()
        .filter(|event| matches!(event, EngineEvent::LensChanged { .. }))
        .collect();
    assert_eq!(changed, Vec::new());

    workspace.close_document(file);
    assert!(workspace.lenses(file).is_empty());
    assert_eq!(workspace.lens_state(file), LensState::Empty);
}

#[tokio::test(flavor = "current_thread")]
async fn missing_files_are_reported_with_context() {
    let workspace = Workspace::new(test_config());
    let tmp = tempfile::tempdir().unwrap();
    let err = workspace.open_path(tmp.path().join("Missing.kt")).unwrap_err();
    assert!(format!("{err:#}").contains("Missing.kt"), "{err:#}");
    assert_eq!(workspace.stats().tracked_files, 0);
}

#[tokio::test(flavor = "current_thread")]
async fn stats_track_the_pipeline() {
    let workspace = Workspace::new(test_config());
    let file = workspace.open_document("/src/A.kt", A_KT, 1);
    workspace.open_document("/src/Plain.kt", "class Plain { fun noop() {} }", 1);
    workspace.rescan(file).await;

    let stats = workspace.stats();
    assert_eq!(
        stats,
        WorkspaceStats {
            tracked_files: 2,
            candidate_files: 1,
            fact_files: 1,
            indexed_ids: IDS.len(),
            lens_files: stats.lens_files,
            pending_scans: stats.pending_scans,
        }
    );

    let json = serde_json::to_value(stats).unwrap();
    assert_eq!(json["tracked_files"], 2);
    assert_eq!(json["indexed_ids"], IDS.len());
}
