//! HTTP endpoint scanners.
//!
//! Supports:
//! - Spring MVC (`@RequestMapping`, `@GetMapping`, ...) on `@Controller` types,
//! - JAX-RS (`@Path`, `@GET`, ...),
//! - the Ktor routing DSL (`route("/api") { get("/x") { ... } }`) inside
//!   function bodies.
//!
//! Each framework is exposed as its own [`ScannerProvider`] so it can be
//! enabled independently.

mod jaxrs;
mod ktor;
mod paths;
mod spring;

use std::sync::Arc;

use sightline_framework::{EndpointScanner, ScannerProvider};
use sightline_prefilter::MarkerTables;

pub use jaxrs::JaxRsEndpointScanner;
pub use ktor::KtorRoutingScanner;
pub use paths::{join_paths, HTTP_METHODS};
pub use spring::SpringMvcEndpointScanner;

#[derive(Debug, Default, Clone, Copy)]
pub struct SpringMvcProvider;

impl ScannerProvider for SpringMvcProvider {
    fn id(&self) -> &str {
        spring::FRAMEWORK
    }

    fn markers(&self) -> MarkerTables {
        spring::markers()
    }

    fn endpoint_scanners(&self) -> Vec<Arc<dyn EndpointScanner>> {
        vec![Arc::new(SpringMvcEndpointScanner)]
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JaxRsProvider;

impl ScannerProvider for JaxRsProvider {
    fn id(&self) -> &str {
        jaxrs::FRAMEWORK
    }

    fn markers(&self) -> MarkerTables {
        jaxrs::markers()
    }

    fn endpoint_scanners(&self) -> Vec<Arc<dyn EndpointScanner>> {
        vec![Arc::new(JaxRsEndpointScanner)]
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct KtorProvider;

impl ScannerProvider for KtorProvider {
    fn id(&self) -> &str {
        ktor::FRAMEWORK
    }

    fn markers(&self) -> MarkerTables {
        ktor::markers()
    }

    fn endpoint_scanners(&self) -> Vec<Arc<dyn EndpointScanner>> {
        vec![Arc::new(KtorRoutingScanner)]
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::Path;

    use sightline_core::{EndpointFact, FileId};
    use sightline_framework::{EndpointScanner, ScanInput};
    use sightline_syntax::{LanguageModels, StructuralModel};
    use sightline_vfs::SourceSnapshot;

    /// Runs `scanner` over `text` and returns `(endpoint id, owning method id)` pairs.
    pub(crate) fn scan(scanner: &dyn EndpointScanner, path: &str, text: &str) -> Vec<(String, String)> {
        let snapshot = SourceSnapshot::new(FileId::from_raw(1), Path::new(path), text, 1);
        let view = LanguageModels::jvm().parse(&snapshot).unwrap();
        let facts: Vec<EndpointFact> = scanner
            .discover_endpoints(&ScanInput::new(&snapshot, &view))
            .unwrap();
        facts
            .into_iter()
            .map(|fact| (fact.id.to_string(), fact.owning_method.to_string()))
            .collect()
    }
}
