use std::sync::LazyLock;

use regex::Regex;
use sightline_core::{CandidateKind, EndpointFact};
use sightline_framework::{EndpointScanner, ScanError, ScanInput};
use sightline_prefilter::{MarkerPair, MarkerTables};

use crate::paths::join_paths;

pub(crate) const FRAMEWORK: &str = "ktor";

/// `route("/api") {` or `get("/x") {`; the keyword must not be a member call.
static ROUTE_CALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:^|[^\w.])(route|get|post|put|delete|patch|head|options)\s*\(\s*"([^"]*)"\s*\)\s*\{"#)
        .unwrap()
});

pub(crate) fn markers() -> MarkerTables {
    let mut tables = MarkerTables::new();
    tables.add(CandidateKind::Endpoint, MarkerPair::new("io.ktor", "routing"));
    tables.add(CandidateKind::Endpoint, MarkerPair::new("io.ktor", "route("));
    tables
}

/// Routing DSL calls inside function bodies, nested `route` blocks included.
///
/// The endpoint belongs to the function whose body contains the call.
#[derive(Debug, Default, Clone, Copy)]
pub struct KtorRoutingScanner;

impl EndpointScanner for KtorRoutingScanner {
    fn id(&self) -> &str {
        FRAMEWORK
    }

    fn discover_endpoints(&self, input: &ScanInput<'_>) -> Result<Vec<EndpointFact>, ScanError> {
        let mut facts = Vec::new();
        for method in &input.view.methods {
            let Some(body) = input.view.body_code(method) else {
                continue;
            };
            for (http_method, route) in routes_in(body) {
                facts.push(input.endpoint_fact(method, &http_method, &route, FRAMEWORK));
            }
        }
        Ok(facts)
    }
}

struct Call {
    keyword_at: usize,
    /// Offset of the `{` opening the call's lambda.
    brace_at: usize,
    keyword: String,
    path: String,
}

/// Returns `(HTTP method, full route)` for every handler call in `body`.
fn routes_in(body: &str) -> Vec<(String, String)> {
    let calls: Vec<Call> = ROUTE_CALL_RE
        .captures_iter(body)
        .filter_map(|caps| {
            let keyword = caps.get(1)?;
            let whole = caps.get(0)?;
            Some(Call {
                keyword_at: keyword.start(),
                brace_at: whole.end() - 1,
                keyword: keyword.as_str().to_string(),
                path: caps.get(2)?.as_str().to_string(),
            })
        })
        .collect();
    if calls.is_empty() {
        return Vec::new();
    }

    let in_code = code_positions(body);
    let mut out = Vec::new();
    // (prefix, depth inside its block)
    let mut prefixes: Vec<(String, i32)> = Vec::new();
    let mut pending_prefix: Option<(usize, String)> = None;
    let mut next_call = calls.iter().filter(|call| in_code[call.keyword_at]).peekable();
    let mut depth = 0i32;

    for (idx, byte) in body.bytes().enumerate() {
        if let Some(call) = next_call.peek() {
            if call.keyword_at == idx {
                let base = prefixes.last().map(|(p, _)| p.as_str());
                let full = join_paths(base, Some(&call.path));
                if call.keyword == "route" {
                    pending_prefix = Some((call.brace_at, full));
                } else {
                    out.push((call.keyword.to_ascii_uppercase(), full));
                }
                next_call.next();
            }
        }
        if !in_code[idx] {
            continue;
        }
        match byte {
            b'{' => {
                depth += 1;
                if let Some((brace_at, prefix)) = pending_prefix.take() {
                    if brace_at == idx {
                        prefixes.push((prefix, depth));
                    } else {
                        pending_prefix = Some((brace_at, prefix));
                    }
                }
            }
            b'}' => {
                depth -= 1;
                while prefixes.last().is_some_and(|(_, d)| *d > depth) {
                    prefixes.pop();
                }
            }
            _ => {}
        }
    }
    out
}

/// Marks bytes that are outside string and char literals.
fn code_positions(body: &str) -> Vec<bool> {
    let bytes = body.as_bytes();
    let mut out = vec![true; bytes.len()];
    let mut idx = 0;
    while idx < bytes.len() {
        let quote = bytes[idx];
        if quote != b'"' && quote != b'\'' {
            idx += 1;
            continue;
        }
        out[idx] = false;
        idx += 1;
        while idx < bytes.len() {
            out[idx] = false;
            match bytes[idx] {
                b'\\' => {
                    if idx + 1 < bytes.len() {
                        out[idx + 1] = false;
                    }
                    idx += 2;
                }
                b if b == quote => {
                    idx += 1;
                    break;
                }
                _ => idx += 1,
            }
        }
    }
    out
}
