use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pretty_assertions::assert_eq;
use sightline_core::{CandidateKind, CodeObjectId};
use sightline_framework::ScannerRegistry;
use sightline_prefilter::MarkerPair;
use sightline_workspace::Workspace;

use super::test_config;

const ROUTED: &str = r#"package shop;

import com.acme.web.Route;

public class Orders {
    @Route("/orders")
    public void list() {}

    public void helper() {}
}
"#;

fn acme_registry(span_calls: Arc<AtomicUsize>) -> ScannerRegistry {
    let mut registry = ScannerRegistry::new();
    registry.add_marker(CandidateKind::Span, MarkerPair::new("com.acme.trace", "Traced"));
    registry.add_marker(CandidateKind::Endpoint, MarkerPair::new("com.acme.web", "Route"));
    registry.register_span_scanner_fn("acme-spans", move |_input| {
        span_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    });
    registry.register_endpoint_scanner_fn("acme-endpoints", |input| {
        Ok(input
            .view
            .methods
            .iter()
            .filter_map(|method| {
                let route = method.annotation("Route")?.first_value(&["value"])?;
                Some(input.endpoint_fact(method, "GET", &route, "acme"))
            })
            .collect())
    });
    registry
}

#[tokio::test(flavor = "current_thread")]
async fn only_candidate_kinds_are_scanned() {
    let span_calls = Arc::new(AtomicUsize::new(0));
    let workspace = Workspace::builder(test_config())
        .registry(acme_registry(Arc::clone(&span_calls)))
        .build();

    let file = workspace.open_document("/src/shop/Orders.java", ROUTED, 1);
    workspace.rescan(file).await;

    assert_eq!(span_calls.load(Ordering::SeqCst), 0);
    let location = workspace
        .locate(&CodeObjectId::endpoint("GET", "/orders"))
        .expect("endpoint indexed");
    assert_eq!(location.owning_method.as_str(), "method:shop.Orders.list");
    // Methods of a candidate file are indexed even without facts of their own.
    assert!(workspace.can_locate(&CodeObjectId::parse("method:shop.Orders.helper").unwrap()));

    let traced = ROUTED.replace("import com.acme.web.Route;", "import com.acme.web.Route;\nimport com.acme.trace.Traced;");
    workspace.update_document(file, traced, 2).unwrap();
    workspace.rescan(file).await;
    assert_eq!(span_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "current_thread")]
async fn non_candidates_never_produce_facts() {
    let span_calls = Arc::new(AtomicUsize::new(0));
    let workspace = Workspace::builder(test_config())
        .registry(acme_registry(Arc::clone(&span_calls)))
        .build();

    // Mentions `Route` but not the namespace.
    let plain = "package shop;\n\npublic class Route { public void go() {} }\n";
    let file = workspace.open_document("/src/shop/Route.java", plain, 1);
    workspace.rescan(file).await;

    assert!(workspace.document_facts(file).is_none());
    assert!(!workspace.can_locate(&CodeObjectId::parse("method:shop.Route.go").unwrap()));
    assert_eq!(span_calls.load(Ordering::SeqCst), 0);
    assert_eq!(workspace.stats().candidate_files, 0);
}

#[tokio::test(flavor = "current_thread")]
async fn losing_candidacy_drops_facts() {
    let workspace = Workspace::builder(test_config())
        .registry(acme_registry(Arc::new(AtomicUsize::new(0))))
        .build();
    let file = workspace.open_document("/src/shop/Orders.java", ROUTED, 1);
    workspace.rescan(file).await;
    assert!(workspace.document_facts(file).is_some());

    let stripped = ROUTED.replace("com.acme.web", "org.other");
    workspace.update_document(file, stripped, 2).unwrap();
    workspace.rescan(file).await;

    assert!(workspace.document_facts(file).is_none());
    assert!(workspace.locate(&CodeObjectId::endpoint("GET", "/orders")).is_none());
    assert_eq!(workspace.stats().indexed_ids, 0);
}

#[tokio::test(flavor = "current_thread")]
async fn unsupported_extensions_are_ignored() {
    let workspace = Workspace::new(test_config());
    let file = workspace.open_document("/notes/A.txt", super::A_KT, 1);
    workspace.rescan(file).await;
    assert!(workspace.document_facts(file).is_none());
    assert_eq!(workspace.stats().candidate_files, 0);
}
