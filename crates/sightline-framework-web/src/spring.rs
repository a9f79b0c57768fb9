use sightline_core::{CandidateKind, EndpointFact};
use sightline_framework::{EndpointScanner, ScanError, ScanInput};
use sightline_prefilter::{MarkerPair, MarkerTables};
use sightline_syntax::{Annotation, MethodDecl};

use crate::paths::{combine_routes, is_http_method, HTTP_METHODS};

pub(crate) const FRAMEWORK: &str = "spring-mvc";

const PATH_KEYS: &[&str] = &["path", "value"];

pub(crate) fn markers() -> MarkerTables {
    let mut tables = MarkerTables::new();
    tables.add(
        CandidateKind::Endpoint,
        MarkerPair::new("org.springframework.web.bind.annotation", "Mapping"),
    );
    tables
}

/// Handler methods of `@Controller` / `@RestController` types.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpringMvcEndpointScanner;

impl EndpointScanner for SpringMvcEndpointScanner {
    fn id(&self) -> &str {
        FRAMEWORK
    }

    fn discover_endpoints(&self, input: &ScanInput<'_>) -> Result<Vec<EndpointFact>, ScanError> {
        let mut facts = Vec::new();
        for method in &input.view.methods {
            let Some(ty) = method
                .containing_type
                .as_deref()
                .and_then(|name| input.view.type_decl(name))
            else {
                continue;
            };
            let is_controller = ty.annotations.iter().any(|ann| {
                matches!(ann.name.as_str(), "RestController" | "Controller" | "RequestMapping")
            });
            if !is_controller {
                continue;
            }
            let Some(mapping) = parse_method_mapping(method) else {
                continue;
            };

            let bases = ty
                .annotation("RequestMapping")
                .map(|ann| ann.values(PATH_KEYS))
                .unwrap_or_default();
            for route in combine_routes(&bases, &mapping.paths) {
                for http_method in &mapping.methods {
                    facts.push(input.endpoint_fact(method, http_method, &route, FRAMEWORK));
                }
            }
        }
        Ok(facts)
    }
}

struct ParsedMapping {
    methods: Vec<String>,
    paths: Vec<String>,
}

fn parse_method_mapping(method: &MethodDecl) -> Option<ParsedMapping> {
    for ann in &method.annotations {
        let http_method = match ann.name.as_str() {
            "GetMapping" => "GET",
            "PostMapping" => "POST",
            "PutMapping" => "PUT",
            "DeleteMapping" => "DELETE",
            "PatchMapping" => "PATCH",
            _ => continue,
        };
        return Some(ParsedMapping {
            methods: vec![http_method.to_string()],
            paths: ann.values(PATH_KEYS),
        });
    }

    let ann = method.annotation("RequestMapping")?;
    Some(ParsedMapping {
        methods: request_mapping_methods(ann),
        paths: ann.values(PATH_KEYS),
    })
}

fn request_mapping_methods(ann: &Annotation) -> Vec<String> {
    let mut methods = Vec::new();
    let mut rest = ann.args.as_deref().unwrap_or("");
    while let Some(pos) = rest.find("RequestMethod.") {
        rest = &rest[pos + "RequestMethod.".len()..];
        let end = rest.bytes().take_while(|b| b.is_ascii_alphabetic()).count();
        let method = rest[..end].to_ascii_uppercase();
        if is_http_method(&method) && !methods.contains(&method) {
            methods.push(method);
        }
        rest = &rest[end..];
    }

    if methods.is_empty() {
        // An unrestricted @RequestMapping handles every method.
        HTTP_METHODS.iter().map(|m| m.to_string()).collect()
    } else {
        methods
    }
}
