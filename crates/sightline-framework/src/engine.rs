use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use sightline_core::{
    panic_payload_to_str, CandidateKind, CandidateKinds, CodeObjectId, DocumentFacts, FileId,
};
use sightline_scheduler::{Cancelled, CancellationToken};
use sightline_syntax::{StructuralError, StructuralModel};
use sightline_vfs::SourceSnapshot;

use crate::registry::ScannerRegistry;
use crate::scanner::{method_fact, ScanError, ScanInput};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiscoveryError {
    #[error("discovery cancelled")]
    Cancelled,
    #[error(transparent)]
    Structural(#[from] StructuralError),
}

impl DiscoveryError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DiscoveryError::Cancelled)
    }
}

impl From<Cancelled> for DiscoveryError {
    fn from(_: Cancelled) -> Self {
        DiscoveryError::Cancelled
    }
}

/// Turns one file snapshot into [`DocumentFacts`].
///
/// Methods come from the structural model; spans and endpoints come from the
/// registered scanners, run only for the candidate kinds the caller passes.
/// A scanner that fails or panics is logged and skipped, the others still
/// contribute.
#[derive(Clone)]
pub struct DiscoveryEngine {
    registry: Arc<ScannerRegistry>,
    model: Arc<dyn StructuralModel>,
}

impl DiscoveryEngine {
    pub fn new(registry: ScannerRegistry, model: Arc<dyn StructuralModel>) -> Self {
        Self {
            registry: Arc::new(registry),
            model,
        }
    }

    pub fn registry(&self) -> &ScannerRegistry {
        &self.registry
    }

    pub fn discover(
        &self,
        snapshot: &SourceSnapshot,
        kinds: CandidateKinds,
        token: &CancellationToken,
    ) -> Result<DocumentFacts, DiscoveryError> {
        let file = snapshot.file();
        let mut facts = DocumentFacts::new(file);
        if kinds.is_empty() {
            return Ok(facts);
        }

        Cancelled::check(token)?;
        let view = self.model.parse(snapshot)?;
        Cancelled::check(token)?;

        for decl in &view.methods {
            let fact = method_fact(decl, file);
            // Keep the first declaration if two collapse onto the same id.
            facts.methods.entry(fact.id.clone()).or_insert(fact);
        }

        let input = ScanInput::new(snapshot, &view);

        if kinds.contains(CandidateKind::Span) {
            let mut spans = BTreeMap::new();
            for scanner in self.registry.span_scanners() {
                Cancelled::check(token)?;
                let found = isolate(scanner.id(), file, || scanner.discover_spans(&input));
                for fact in found {
                    spans.insert(fact.id.clone(), fact);
                }
            }
            for (id, fact) in spans {
                match facts.methods.get_mut(&fact.owning_method) {
                    Some(method) => {
                        method.spans.insert(id, fact);
                    }
                    None => log_orphan(&id, &fact.owning_method, &fact.framework),
                }
            }
        }

        if kinds.contains(CandidateKind::Endpoint) {
            let mut endpoints = BTreeMap::new();
            for scanner in self.registry.endpoint_scanners() {
                Cancelled::check(token)?;
                let found = isolate(scanner.id(), file, || scanner.discover_endpoints(&input));
                for fact in found {
                    endpoints.insert(fact.id.clone(), fact);
                }
            }
            for (id, fact) in endpoints {
                match facts.methods.get_mut(&fact.owning_method) {
                    Some(method) => {
                        method.endpoints.insert(id, fact);
                    }
                    None => log_orphan(&id, &fact.owning_method, &fact.framework),
                }
            }
        }

        Cancelled::check(token)?;
        tracing::debug!(
            target = "sightline.discovery",
            %file,
            ?kinds,
            methods = facts.methods.len(),
            "discovery finished"
        );
        Ok(facts)
    }
}

impl std::fmt::Debug for DiscoveryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryEngine")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

fn isolate<T>(
    scanner: &str,
    file: FileId,
    run: impl FnOnce() -> Result<Vec<T>, ScanError>,
) -> Vec<T> {
    match catch_unwind(AssertUnwindSafe(run)) {
        Ok(Ok(found)) => found,
        Ok(Err(err)) => {
            tracing::warn!(target = "sightline.discovery", scanner, %file, error = %err, "scanner failed");
            Vec::new()
        }
        Err(panic) => {
            tracing::error!(
                target = "sightline.discovery",
                scanner,
                %file,
                panic = %panic_payload_to_str(&*panic),
                "scanner panicked"
            );
            Vec::new()
        }
    }
}

fn log_orphan(id: &CodeObjectId, owner: &CodeObjectId, framework: &str) {
    tracing::debug!(
        target = "sightline.discovery",
        id = %id,
        owner = %owner,
        framework,
        "dropping fact whose owning method was not found"
    );
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use pretty_assertions::assert_eq;
    use sightline_core::{EndpointFact, SpanFact};
    use sightline_syntax::LanguageModels;

    use super::*;

    const SOURCE: &str = r#"class A {
    fun foo() {
    }

    fun bar() {
    }
}
"#;

    fn snapshot() -> SourceSnapshot {
        SourceSnapshot::new(FileId::from_raw(1), std::path::Path::new("/src/A.kt"), SOURCE, 1)
    }

    fn span_for(input: &ScanInput<'_>, method: &str, name: &str) -> SpanFact {
        let decl = input
            .view
            .methods
            .iter()
            .find(|m| m.name == method)
            .expect("method");
        input.span_fact(decl, "lib", name, "test")
    }

    fn engine(registry: ScannerRegistry) -> DiscoveryEngine {
        DiscoveryEngine::new(registry, Arc::new(LanguageModels::jvm()))
    }

    fn span_names(facts: &DocumentFacts, method: &str) -> Vec<String> {
        facts
            .methods
            .values()
            .find(|m| m.display_name == method)
            .map(|m| m.spans.keys().map(|id| id.to_string()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn scanners_attach_facts_to_owning_methods() {
        let mut registry = ScannerRegistry::new();
        registry.register_span_scanner_fn("spans", |input: &ScanInput<'_>| {
            Ok(vec![span_for(input, "foo", "foo-span")])
        });

        let facts = engine(registry)
            .discover(&snapshot(), CandidateKinds::ALL, &CancellationToken::new())
            .unwrap();

        assert_eq!(facts.methods.len(), 2);
        assert_eq!(span_names(&facts, "A.foo"), vec!["span:lib/foo-span"]);
        assert!(span_names(&facts, "A.bar").is_empty());
    }

    #[test]
    fn scanners_for_non_candidate_kinds_never_run() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ScannerRegistry::new();
        let seen = Arc::clone(&calls);
        registry.register_endpoint_scanner_fn("endpoints", move |_: &ScanInput<'_>| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::<EndpointFact>::new())
        });
        let engine = engine(registry);

        let facts = engine
            .discover(
                &snapshot(),
                CandidateKinds::only(CandidateKind::Span),
                &CancellationToken::new(),
            )
            .unwrap();
        assert_eq!(facts.methods.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let facts = engine
            .discover(&snapshot(), CandidateKinds::NONE, &CancellationToken::new())
            .unwrap();
        assert!(facts.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failing_and_panicking_scanners_are_isolated() {
        let mut registry = ScannerRegistry::new();
        registry.register_span_scanner_fn("broken", |_: &ScanInput<'_>| {
            Err(ScanError::Other("bad input".into()))
        });
        registry.register_span_scanner_fn("panicky", |_: &ScanInput<'_>| -> Result<Vec<SpanFact>, ScanError> {
            panic!("scanner bug")
        });
        registry.register_span_scanner_fn("healthy", |input: &ScanInput<'_>| {
            Ok(vec![span_for(input, "bar", "bar-span")])
        });

        let facts = engine(registry)
            .discover(&snapshot(), CandidateKinds::ALL, &CancellationToken::new())
            .unwrap();
        assert_eq!(span_names(&facts, "A.bar"), vec!["span:lib/bar-span"]);
    }

    #[test]
    fn facts_from_several_scanners_are_unioned_by_id() {
        let mut registry = ScannerRegistry::new();
        registry.register_span_scanner_fn("first", |input: &ScanInput<'_>| {
            Ok(vec![span_for(input, "foo", "shared"), span_for(input, "foo", "first-only")])
        });
        registry.register_span_scanner_fn("second", |input: &ScanInput<'_>| {
            Ok(vec![span_for(input, "foo", "shared")])
        });

        let facts = engine(registry)
            .discover(&snapshot(), CandidateKinds::ALL, &CancellationToken::new())
            .unwrap();
        assert_eq!(
            span_names(&facts, "A.foo"),
            vec!["span:lib/first-only", "span:lib/shared"]
        );
    }

    #[test]
    fn orphan_facts_are_dropped() {
        let mut registry = ScannerRegistry::new();
        registry.register_span_scanner_fn("orphans", |input: &ScanInput<'_>| {
            let mut fact = span_for(input, "foo", "lost");
            fact.owning_method = CodeObjectId::method::<&str>(None, Some("Gone"), "nowhere", &[]);
            Ok(vec![fact])
        });

        let facts = engine(registry)
            .discover(&snapshot(), CandidateKinds::ALL, &CancellationToken::new())
            .unwrap();
        assert!(facts.methods.values().all(|m| m.spans.is_empty()));
    }

    #[test]
    fn cancellation_is_observed_between_scanners() {
        let token = CancellationToken::new();
        let mut registry = ScannerRegistry::new();
        let cancel = token.clone();
        registry.register_span_scanner_fn("cancels", move |_: &ScanInput<'_>| {
            cancel.cancel();
            Ok(Vec::new())
        });
        let second = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&second);
        registry.register_span_scanner_fn("after", move |_: &ScanInput<'_>| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        });

        let err = engine(registry)
            .discover(&snapshot(), CandidateKinds::ALL, &token)
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(second.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unsupported_files_surface_structural_errors() {
        let engine = engine(ScannerRegistry::new());
        let snapshot = SourceSnapshot::new(FileId::from_raw(2), std::path::Path::new("/src/a.py"), "x = 1", 1);
        let err = engine
            .discover(&snapshot, CandidateKinds::ALL, &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(
            err,
            DiscoveryError::Structural(StructuralError::UnsupportedLanguage { .. })
        ));
    }
}
