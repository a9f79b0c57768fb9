use std::sync::Arc;

use sightline_core::{CandidateKind, EndpointFact, SpanFact};
use sightline_prefilter::{MarkerPair, MarkerTables};

use crate::scanner::{
    EndpointScanner, FnEndpointScanner, FnSpanScanner, ScanError, ScanInput, ScannerProvider,
    SpanScanner,
};

/// Startup-time collection of scanners and prefilter markers.
///
/// Registration order is preserved and is the order in which the discovery
/// engine runs scanners.
#[derive(Clone, Default)]
pub struct ScannerRegistry {
    span_scanners: Vec<Arc<dyn SpanScanner>>,
    endpoint_scanners: Vec<Arc<dyn EndpointScanner>>,
    markers: MarkerTables,
    providers: Vec<String>,
}

impl ScannerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_span_scanner(&mut self, scanner: Arc<dyn SpanScanner>) {
        self.span_scanners.push(scanner);
    }

    pub fn register_endpoint_scanner(&mut self, scanner: Arc<dyn EndpointScanner>) {
        self.endpoint_scanners.push(scanner);
    }

    pub fn register_span_scanner_fn<F>(&mut self, id: impl Into<String>, f: F)
    where
        F: Fn(&ScanInput<'_>) -> Result<Vec<SpanFact>, ScanError> + Send + Sync + 'static,
    {
        self.register_span_scanner(Arc::new(FnSpanScanner::new(id, f)));
    }

    pub fn register_endpoint_scanner_fn<F>(&mut self, id: impl Into<String>, f: F)
    where
        F: Fn(&ScanInput<'_>) -> Result<Vec<EndpointFact>, ScanError> + Send + Sync + 'static,
    {
        self.register_endpoint_scanner(Arc::new(FnEndpointScanner::new(id, f)));
    }

    pub fn add_marker(&mut self, kind: CandidateKind, pair: MarkerPair) {
        self.markers.add(kind, pair);
    }

    /// Registers every scanner and marker a provider contributes.
    pub fn register_provider(&mut self, provider: &dyn ScannerProvider) {
        let spans = provider.span_scanners();
        let endpoints = provider.endpoint_scanners();
        tracing::debug!(
            target = "sightline.framework",
            provider = provider.id(),
            span_scanners = spans.len(),
            endpoint_scanners = endpoints.len(),
            "registering scanner provider"
        );
        self.span_scanners.extend(spans);
        self.endpoint_scanners.extend(endpoints);
        self.markers.merge(provider.markers());
        self.providers.push(provider.id().to_string());
    }

    /// Registers the providers that are present; `None` entries are skipped.
    pub fn register_providers<I>(&mut self, providers: I)
    where
        I: IntoIterator<Item = Option<Box<dyn ScannerProvider>>>,
    {
        for provider in providers.into_iter().flatten() {
            self.register_provider(provider.as_ref());
        }
    }

    pub fn span_scanners(&self) -> &[Arc<dyn SpanScanner>] {
        &self.span_scanners
    }

    pub fn endpoint_scanners(&self) -> &[Arc<dyn EndpointScanner>] {
        &self.endpoint_scanners
    }

    pub fn markers(&self) -> &MarkerTables {
        &self.markers
    }

    pub fn provider_ids(&self) -> &[String] {
        &self.providers
    }

    pub fn is_empty(&self) -> bool {
        self.span_scanners.is_empty() && self.endpoint_scanners.is_empty()
    }
}

impl std::fmt::Debug for ScannerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScannerRegistry")
            .field(
                "span_scanners",
                &self.span_scanners.iter().map(|s| s.id()).collect::<Vec<_>>(),
            )
            .field(
                "endpoint_scanners",
                &self.endpoint_scanners.iter().map(|s| s.id()).collect::<Vec<_>>(),
            )
            .field("providers", &self.providers)
            .finish()
    }
}
