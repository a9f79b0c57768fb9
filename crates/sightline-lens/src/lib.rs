//! Per-file lens cache.
//!
//! Lenses are derived from a file's [`DocumentFacts`](sightline_core::DocumentFacts)
//! plus insight data fetched from a remote service. [`LensCache`] keeps the
//! last good value per file and rebuilds it in the background, with at most
//! one build in flight per file.

mod cache;
mod insight;
mod reporter;

pub use cache::{BuildOutcome, FactsSource, LensBuild, LensCache, LensState};
pub use insight::{CodeObjectInsights, Decorator, InsightError, InsightProvider, NoInsights};
pub use reporter::FailureReporter;
