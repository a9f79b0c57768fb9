use std::sync::Arc;

use sightline_core::{EndpointFact, FileId, MethodFact, SpanFact, TextSize};
use sightline_prefilter::MarkerTables;
use sightline_syntax::{MethodDecl, SyntaxView};
use sightline_vfs::SourceSnapshot;

/// Everything a scanner may look at for one file.
#[derive(Debug, Clone, Copy)]
pub struct ScanInput<'a> {
    pub snapshot: &'a SourceSnapshot,
    pub view: &'a SyntaxView,
}

impl<'a> ScanInput<'a> {
    pub fn new(snapshot: &'a SourceSnapshot, view: &'a SyntaxView) -> Self {
        Self { snapshot, view }
    }

    pub fn file(&self) -> FileId {
        self.snapshot.file()
    }

    /// Builds a span fact owned by `method`, located at the method declaration.
    pub fn span_fact(&self, method: &MethodDecl, library: &str, name: &str, framework: &str) -> SpanFact {
        SpanFact {
            id: sightline_core::CodeObjectId::span(library, name),
            owning_method: method.code_object_id(),
            file: self.file(),
            offset: method.offset,
            framework: framework.into(),
        }
    }

    pub fn endpoint_fact(
        &self,
        method: &MethodDecl,
        http_method: &str,
        route: &str,
        framework: &str,
    ) -> EndpointFact {
        EndpointFact {
            id: sightline_core::CodeObjectId::endpoint(http_method, route),
            owning_method: method.code_object_id(),
            file: self.file(),
            offset: method.offset,
            framework: framework.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanError {
    #[error("unsupported construct at offset {offset:?}: {detail}")]
    Unsupported { offset: TextSize, detail: String },
    #[error("{0}")]
    Other(String),
}

pub trait SpanScanner: Send + Sync {
    /// Stable tag used in logs and as the fact's framework tag.
    fn id(&self) -> &str;

    fn discover_spans(&self, input: &ScanInput<'_>) -> Result<Vec<SpanFact>, ScanError>;
}

pub trait EndpointScanner: Send + Sync {
    fn id(&self) -> &str;

    fn discover_endpoints(&self, input: &ScanInput<'_>) -> Result<Vec<EndpointFact>, ScanError>;
}

/// Adapts a closure into a [`SpanScanner`].
pub struct FnSpanScanner<F> {
    id: String,
    f: F,
}

impl<F> FnSpanScanner<F> {
    pub fn new(id: impl Into<String>, f: F) -> Self {
        Self { id: id.into(), f }
    }
}

impl<F> SpanScanner for FnSpanScanner<F>
where
    F: Fn(&ScanInput<'_>) -> Result<Vec<SpanFact>, ScanError> + Send + Sync,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn discover_spans(&self, input: &ScanInput<'_>) -> Result<Vec<SpanFact>, ScanError> {
        (self.f)(input)
    }
}

/// Adapts a closure into an [`EndpointScanner`].
pub struct FnEndpointScanner<F> {
    id: String,
    f: F,
}

impl<F> FnEndpointScanner<F> {
    pub fn new(id: impl Into<String>, f: F) -> Self {
        Self { id: id.into(), f }
    }
}

impl<F> EndpointScanner for FnEndpointScanner<F>
where
    F: Fn(&ScanInput<'_>) -> Result<Vec<EndpointFact>, ScanError> + Send + Sync,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn discover_endpoints(&self, input: &ScanInput<'_>) -> Result<Vec<EndpointFact>, ScanError> {
        (self.f)(input)
    }
}

/// A framework integration: its scanners and the markers that gate them.
pub trait ScannerProvider: Send + Sync {
    fn id(&self) -> &str;

    fn markers(&self) -> MarkerTables {
        MarkerTables::new()
    }

    fn span_scanners(&self) -> Vec<Arc<dyn SpanScanner>> {
        Vec::new()
    }

    fn endpoint_scanners(&self) -> Vec<Arc<dyn EndpointScanner>> {
        Vec::new()
    }
}

/// Kept private to the engine; scanners see method declarations, not facts.
pub(crate) fn method_fact(decl: &MethodDecl, file: FileId) -> MethodFact {
    let mut fact = MethodFact::new(decl.code_object_id(), decl.display_name(), file, decl.offset);
    fact.containing_type = decl.containing_type.clone();
    fact.namespace = decl.namespace.clone();
    fact
}
