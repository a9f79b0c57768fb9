//! OpenTelemetry span scanners.
//!
//! Two sources of spans are recognised:
//! - `@WithSpan` methods from the instrumentation annotations library,
//! - manual spans started with `tracer.spanBuilder("name")`, attributed to the
//!   instrumentation library passed to `getTracer("lib")`.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use sightline_core::{CandidateKind, SpanFact, TextSize};
use sightline_framework::{ScanError, ScanInput, ScannerProvider, SpanScanner};
use sightline_prefilter::{MarkerPair, MarkerTables};
use sightline_syntax::extract_string_literals;

/// Instrumentation library reported for `@WithSpan` spans.
pub const ANNOTATIONS_LIBRARY: &str = "io.opentelemetry.opentelemetry-instrumentation-annotations-1.16";

const ANNOTATION_FRAMEWORK: &str = "otel-annotations";
const TRACER_FRAMEWORK: &str = "otel-tracer";

static GET_TRACER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bgetTracer\s*\(\s*"([^"]+)""#).unwrap());

static SPAN_BUILDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bspanBuilder\s*\(([^)]*)\)"#).unwrap());

#[derive(Debug, Default, Clone, Copy)]
pub struct OtelProvider;

impl ScannerProvider for OtelProvider {
    fn id(&self) -> &str {
        "opentelemetry"
    }

    fn markers(&self) -> MarkerTables {
        let mut tables = MarkerTables::new();
        tables.add(CandidateKind::Span, MarkerPair::new("io.opentelemetry", "WithSpan"));
        tables.add(CandidateKind::Span, MarkerPair::new("io.opentelemetry", "spanBuilder"));
        tables
    }

    fn span_scanners(&self) -> Vec<Arc<dyn SpanScanner>> {
        vec![Arc::new(WithSpanScanner::default()), Arc::new(TracerSpanScanner)]
    }
}

/// Methods annotated with `@WithSpan`.
///
/// The span name is the annotation value, or `Type.method` when none is given.
#[derive(Debug, Clone)]
pub struct WithSpanScanner {
    library: String,
}

impl WithSpanScanner {
    pub fn with_library(library: impl Into<String>) -> Self {
        Self {
            library: library.into(),
        }
    }
}

impl Default for WithSpanScanner {
    fn default() -> Self {
        Self::with_library(ANNOTATIONS_LIBRARY)
    }
}

impl SpanScanner for WithSpanScanner {
    fn id(&self) -> &str {
        ANNOTATION_FRAMEWORK
    }

    fn discover_spans(&self, input: &ScanInput<'_>) -> Result<Vec<SpanFact>, ScanError> {
        let mut facts = Vec::new();
        for method in &input.view.methods {
            let Some(ann) = method.annotation("WithSpan") else {
                continue;
            };
            let name = ann
                .first_value(&["value"])
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| default_span_name(method.containing_type.as_deref(), &method.name));
            facts.push(input.span_fact(method, &self.library, &name, ANNOTATION_FRAMEWORK));
        }
        Ok(facts)
    }
}

fn default_span_name(containing_type: Option<&str>, method: &str) -> String {
    match containing_type.and_then(|ty| ty.rsplit('.').next()) {
        Some(ty) => format!("{ty}.{method}"),
        None => method.to_string(),
    }
}

/// `spanBuilder("name")` calls inside method bodies.
///
/// The library is taken from the closest `getTracer("lib")` declared before
/// the method, or the first one in the file. Spans whose name is not a string
/// literal, and files without a tracer, are skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracerSpanScanner;

impl SpanScanner for TracerSpanScanner {
    fn id(&self) -> &str {
        TRACER_FRAMEWORK
    }

    fn discover_spans(&self, input: &ScanInput<'_>) -> Result<Vec<SpanFact>, ScanError> {
        let code = input.view.code();
        let tracers: Vec<(TextSize, &str)> = GET_TRACER_RE
            .captures_iter(code)
            .filter_map(|caps| {
                let lib = caps.get(1)?;
                let at = TextSize::try_from(lib.start()).ok()?;
                Some((at, lib.as_str()))
            })
            .collect();
        let Some(&(_, first_library)) = tracers.first() else {
            return Ok(Vec::new());
        };

        let mut facts = Vec::new();
        for method in &input.view.methods {
            let Some(body) = input.view.body_code(method) else {
                continue;
            };
            let library = tracers
                .iter()
                .rev()
                .find(|(at, _)| *at < method.offset)
                .map_or(first_library, |(_, lib)| *lib);
            for caps in SPAN_BUILDER_RE.captures_iter(body) {
                let Some(args) = caps.get(1) else { continue };
                let Some(name) = extract_string_literals(args.as_str()).into_iter().next() else {
                    continue;
                };
                facts.push(input.span_fact(method, library, &name, TRACER_FRAMEWORK));
            }
        }
        Ok(facts)
    }
}
