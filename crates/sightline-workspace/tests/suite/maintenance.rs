use pretty_assertions::assert_eq;
use sightline_core::{CodeObjectId, EngineEvent};
use sightline_workspace::Workspace;

use super::{test_config, wait_for, A_KT};

const IDS: [&str; 4] = [
    "method:A.foo",
    "span:lib/foo-span",
    "span:io.opentelemetry.opentelemetry-instrumentation-annotations-1.16/foo-span",
    "endpoint:GET /x",
];

fn id(raw: &str) -> CodeObjectId {
    CodeObjectId::parse(raw).unwrap()
}

#[tokio::test(flavor = "current_thread")]
async fn maintenance_evicts_files_deleted_on_disk() {
    let workspace = Workspace::new(test_config());
    let events = workspace.subscribe();

    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("A.kt");
    std::fs::write(&path, A_KT).unwrap();
    let file = workspace.open_path(&path).unwrap();
    workspace.rescan(file).await;
    assert!(IDS.iter().all(|raw| workspace.can_locate(&id(raw))));

    // No close event: the file just disappears.
    std::fs::remove_file(&path).unwrap();

    let report = workspace.run_maintenance();
    assert_eq!(report.evicted, IDS.len());
    assert_eq!(report.failed, 0);
    for raw in IDS {
        assert!(workspace.locate(&id(raw)).is_none(), "{raw} still indexed");
    }
    assert!(workspace.document_facts(file).is_none());
    assert_eq!(workspace.stats().tracked_files, 0);
    assert_eq!(workspace.stats().indexed_ids, 0);
    wait_for(&events, |event| *event == EngineEvent::DocumentFactsRemoved { file }).await;
}

#[tokio::test(flavor = "current_thread")]
async fn maintenance_keeps_editor_documents() {
    let workspace = Workspace::new(test_config());

    // Never written to disk; the editor owns the text.
    let file = workspace.open_document("/nonexistent/src/A.kt", A_KT, 1);
    workspace.rescan(file).await;

    let report = workspace.run_maintenance();
    assert_eq!(report.evicted, 0);
    assert_eq!(report.examined, IDS.len());
    for raw in IDS {
        assert!(workspace.locate(&id(raw)).is_some(), "{raw} evicted");
    }
    assert!(workspace.document_facts(file).is_some());
}
