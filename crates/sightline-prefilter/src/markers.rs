use smol_str::SmolStr;

use sightline_core::{CandidateKind, CandidateKinds};

/// Two tokens that must both occur in a file for it to be a candidate.
///
/// The namespace marker is usually a package or import prefix
/// (`io.opentelemetry`), the symbol marker a type or call name (`WithSpan`).
/// Requiring both keeps the filter cheap but cuts most false positives of a
/// single common word.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MarkerPair {
    pub namespace: SmolStr,
    pub symbol: SmolStr,
}

impl MarkerPair {
    pub fn new(namespace: impl Into<SmolStr>, symbol: impl Into<SmolStr>) -> Self {
        Self {
            namespace: namespace.into(),
            symbol: symbol.into(),
        }
    }

    pub fn matches(&self, text: &str) -> bool {
        text.contains(self.namespace.as_str()) && text.contains(self.symbol.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkerTable {
    pairs: Vec<MarkerPair>,
}

impl MarkerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `pair` unless an identical pair is already present.
    pub fn push(&mut self, pair: MarkerPair) {
        if !self.pairs.contains(&pair) {
            self.pairs.push(pair);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MarkerPair> {
        self.pairs.iter()
    }

    pub fn matches(&self, text: &str) -> bool {
        self.pairs.iter().any(|pair| pair.matches(text))
    }
}

impl Extend<MarkerPair> for MarkerTable {
    fn extend<I: IntoIterator<Item = MarkerPair>>(&mut self, iter: I) {
        for pair in iter {
            self.push(pair);
        }
    }
}

/// One [`MarkerTable`] per [`CandidateKind`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkerTables {
    span: MarkerTable,
    endpoint: MarkerTable,
}

impl MarkerTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, kind: CandidateKind) -> &MarkerTable {
        match kind {
            CandidateKind::Span => &self.span,
            CandidateKind::Endpoint => &self.endpoint,
        }
    }

    pub fn table_mut(&mut self, kind: CandidateKind) -> &mut MarkerTable {
        match kind {
            CandidateKind::Span => &mut self.span,
            CandidateKind::Endpoint => &mut self.endpoint,
        }
    }

    pub fn add(&mut self, kind: CandidateKind, pair: MarkerPair) {
        self.table_mut(kind).push(pair);
    }

    pub fn merge(&mut self, other: MarkerTables) {
        self.span.extend(other.span.pairs);
        self.endpoint.extend(other.endpoint.pairs);
    }

    /// Every kind for which `text` contains at least one complete pair.
    pub fn evaluate(&self, text: &str) -> CandidateKinds {
        CandidateKind::ALL
            .into_iter()
            .filter(|kind| self.table(*kind).matches(text))
            .collect()
    }
}
