use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

const METHOD_PREFIX: &str = "method:";
const SPAN_PREFIX: &str = "span:";
const ENDPOINT_PREFIX: &str = "endpoint:";

/// The three families of code objects Sightline discovers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeObjectKind {
    Method,
    Span,
    Endpoint,
}

impl CodeObjectKind {
    pub fn prefix(self) -> &'static str {
        match self {
            CodeObjectKind::Method => METHOD_PREFIX,
            CodeObjectKind::Span => SPAN_PREFIX,
            CodeObjectKind::Endpoint => ENDPOINT_PREFIX,
        }
    }

    /// The prefilter kind that must hold for an object of this kind to stay alive.
    ///
    /// Methods are discovered for any candidate file, so they are not tied to one kind.
    pub fn candidate_kind(self) -> Option<CandidateKind> {
        match self {
            CodeObjectKind::Method => None,
            CodeObjectKind::Span => Some(CandidateKind::Span),
            CodeObjectKind::Endpoint => Some(CandidateKind::Endpoint),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid code object id: {0:?}")]
pub struct InvalidCodeObjectId(pub String);

/// Opaque identity of a discovered code object.
///
/// The textual forms are:
/// - `method:<namespace>.<Type>.<name>` with `(<T1>,<T2>)` appended when the
///   method declares parameters,
/// - `span:<instrumentation-library>/<span-name>`,
/// - `endpoint:<HTTP-METHOD> <path>`.
///
/// Every constructor is a pure function of its inputs, so re-scanning an
/// unchanged declaration yields the same id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CodeObjectId(SmolStr);

impl CodeObjectId {
    pub fn method<P: AsRef<str>>(
        namespace: Option<&str>,
        containing_type: Option<&str>,
        name: &str,
        params: &[P],
    ) -> Self {
        let mut out = String::from(METHOD_PREFIX);
        for segment in [namespace, containing_type].into_iter().flatten() {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            out.push_str(segment);
            out.push('.');
        }
        out.push_str(name.trim());
        if !params.is_empty() {
            out.push('(');
            for (idx, param) in params.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                out.extend(param.as_ref().chars().filter(|c| !c.is_whitespace()));
            }
            out.push(')');
        }
        Self(SmolStr::new(out))
    }

    pub fn span(library: &str, name: &str) -> Self {
        Self(SmolStr::new(format!(
            "{SPAN_PREFIX}{}/{}",
            library.trim(),
            name.trim()
        )))
    }

    pub fn endpoint(http_method: &str, path: &str) -> Self {
        Self(SmolStr::new(format!(
            "{ENDPOINT_PREFIX}{} {}",
            http_method.trim().to_ascii_uppercase(),
            normalize_route(path)
        )))
    }

    pub fn parse(raw: &str) -> Result<Self, InvalidCodeObjectId> {
        let valid = [METHOD_PREFIX, SPAN_PREFIX, ENDPOINT_PREFIX]
            .iter()
            .any(|prefix| raw.len() > prefix.len() && raw.starts_with(prefix));
        if valid {
            Ok(Self(SmolStr::new(raw)))
        } else {
            Err(InvalidCodeObjectId(raw.to_string()))
        }
    }

    pub fn kind(&self) -> CodeObjectKind {
        if self.0.starts_with(SPAN_PREFIX) {
            CodeObjectKind::Span
        } else if self.0.starts_with(ENDPOINT_PREFIX) {
            CodeObjectKind::Endpoint
        } else {
            CodeObjectKind::Method
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Routes are compared textually, so the same route written with or without a
/// trailing slash must produce the same id.
fn normalize_route(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    for segment in path.trim().split('/').filter(|s| !s.is_empty()) {
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

impl fmt::Display for CodeObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CodeObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for CodeObjectId {
    type Err = InvalidCodeObjectId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CodeObjectId {
    type Error = InvalidCodeObjectId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CodeObjectId> for String {
    fn from(value: CodeObjectId) -> Self {
        value.0.to_string()
    }
}

/// Kinds tracked by the candidate prefilter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateKind {
    Span,
    Endpoint,
}

impl CandidateKind {
    pub const ALL: [CandidateKind; 2] = [CandidateKind::Span, CandidateKind::Endpoint];

    fn bit(self) -> u8 {
        match self {
            CandidateKind::Span => 0b01,
            CandidateKind::Endpoint => 0b10,
        }
    }
}

/// Small set of [`CandidateKind`]s.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CandidateKinds(u8);

impl CandidateKinds {
    pub const NONE: CandidateKinds = CandidateKinds(0);
    pub const ALL: CandidateKinds = CandidateKinds(0b11);

    pub fn only(kind: CandidateKind) -> Self {
        Self(kind.bit())
    }

    pub fn contains(self, kind: CandidateKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn insert(&mut self, kind: CandidateKind) {
        self.0 |= kind.bit();
    }

    pub fn remove(&mut self, kind: CandidateKind) {
        self.0 &= !kind.bit();
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Kinds present in `self` but not in `other`.
    pub fn difference(self, other: CandidateKinds) -> CandidateKinds {
        CandidateKinds(self.0 & !other.0)
    }

    pub fn iter(self) -> impl Iterator<Item = CandidateKind> {
        CandidateKind::ALL
            .into_iter()
            .filter(move |kind| self.contains(*kind))
    }
}

impl FromIterator<CandidateKind> for CandidateKinds {
    fn from_iter<I: IntoIterator<Item = CandidateKind>>(iter: I) -> Self {
        let mut kinds = CandidateKinds::NONE;
        for kind in iter {
            kinds.insert(kind);
        }
        kinds
    }
}

impl fmt::Debug for CandidateKinds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn method_ids_omit_empty_segments_and_parameters() {
        let id = CodeObjectId::method::<&str>(None, Some("A"), "foo", &[]);
        assert_eq!(id.as_str(), "method:A.foo");

        let id = CodeObjectId::method(Some("com.acme"), Some("Orders"), "find", &["String", "Map<String, Int>"]);
        assert_eq!(id.as_str(), "method:com.acme.Orders.find(String,Map<String,Int>)");
        assert_eq!(id.kind(), CodeObjectKind::Method);
    }

    #[test]
    fn endpoint_ids_normalize_routes() {
        assert_eq!(CodeObjectId::endpoint("get", "/x").as_str(), "endpoint:GET /x");
        assert_eq!(CodeObjectId::endpoint("GET", "x/").as_str(), "endpoint:GET /x");
        assert_eq!(CodeObjectId::endpoint("POST", "").as_str(), "endpoint:POST /");
        assert_eq!(
            CodeObjectId::endpoint("GET", "/api//orders/{id}").as_str(),
            "endpoint:GET /api/orders/{id}"
        );
    }

    #[test]
    fn parse_rejects_unknown_prefixes() {
        assert!(CodeObjectId::parse("span:lib/foo-span").is_ok());
        assert_eq!(
            CodeObjectId::parse("span:lib/foo-span").unwrap().kind(),
            CodeObjectKind::Span
        );
        assert!(CodeObjectId::parse("class:Foo").is_err());
        assert!(CodeObjectId::parse("method:").is_err());
    }

    #[test]
    fn candidate_kinds_set_operations() {
        let mut kinds = CandidateKinds::NONE;
        assert!(kinds.is_empty());
        kinds.insert(CandidateKind::Endpoint);
        assert!(kinds.contains(CandidateKind::Endpoint));
        assert!(!kinds.contains(CandidateKind::Span));
        assert_eq!(
            CandidateKinds::ALL.difference(kinds),
            CandidateKinds::only(CandidateKind::Span)
        );
        kinds.remove(CandidateKind::Endpoint);
        assert!(kinds.is_empty());
    }

    proptest! {
        #[test]
        fn method_ids_are_deterministic(
            ns in "[a-z]{1,6}(\\.[a-z]{1,6}){0,2}",
            ty in "[A-Z][a-zA-Z]{0,8}",
            name in "[a-z][a-zA-Z0-9]{0,8}",
            params in proptest::collection::vec("[A-Z][a-z]{0,5}", 0..4),
        ) {
            let first = CodeObjectId::method(Some(&ns), Some(&ty), &name, &params);
            let second = CodeObjectId::method(Some(&ns), Some(&ty), &name, &params);
            prop_assert_eq!(&first, &second);
            prop_assert_eq!(CodeObjectId::parse(first.as_str()).unwrap(), second);
        }
    }
}
