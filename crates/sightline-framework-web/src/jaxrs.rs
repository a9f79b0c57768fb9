use sightline_core::{CandidateKind, EndpointFact};
use sightline_framework::{EndpointScanner, ScanError, ScanInput};
use sightline_prefilter::{MarkerPair, MarkerTables};

use crate::paths::{combine_routes, HTTP_METHODS};

pub(crate) const FRAMEWORK: &str = "jax-rs";

pub(crate) fn markers() -> MarkerTables {
    let mut tables = MarkerTables::new();
    for namespace in ["javax.ws.rs", "jakarta.ws.rs"] {
        tables.add(CandidateKind::Endpoint, MarkerPair::new(namespace, "@Path"));
    }
    tables
}

/// Resource methods annotated with an HTTP method designator (`@GET`, `@POST`, ...).
#[derive(Debug, Default, Clone, Copy)]
pub struct JaxRsEndpointScanner;

impl EndpointScanner for JaxRsEndpointScanner {
    fn id(&self) -> &str {
        FRAMEWORK
    }

    fn discover_endpoints(&self, input: &ScanInput<'_>) -> Result<Vec<EndpointFact>, ScanError> {
        let mut facts = Vec::new();
        for method in &input.view.methods {
            let http_methods: Vec<&str> = method
                .annotations
                .iter()
                .filter_map(|ann| HTTP_METHODS.iter().copied().find(|m| ann.is(m)))
                .collect();
            if http_methods.is_empty() {
                continue;
            }

            let bases = method
                .containing_type
                .as_deref()
                .and_then(|name| input.view.type_decl(name))
                .and_then(|ty| ty.annotation("Path"))
                .map(|ann| ann.values(&["value"]))
                .unwrap_or_default();
            let paths = method
                .annotation("Path")
                .map(|ann| ann.values(&["value"]))
                .unwrap_or_default();

            for route in combine_routes(&bases, &paths) {
                for http_method in &http_methods {
                    facts.push(input.endpoint_fact(method, http_method, &route, FRAMEWORK));
                }
            }
        }
        Ok(facts)
    }
}
