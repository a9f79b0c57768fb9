//! Framework scanner abstraction and the discovery engine.
//!
//! Framework support (OpenTelemetry, Spring, JAX-RS, Ktor, ...) lives in
//! separate `sightline-framework-*` crates. Each exposes a [`ScannerProvider`]
//! that contributes span/endpoint scanners plus the prefilter markers that
//! make a file worth scanning. Providers are collected into a
//! [`ScannerRegistry`] once at startup and handed to the [`DiscoveryEngine`].

mod engine;
mod registry;
mod scanner;

pub use engine::{DiscoveryEngine, DiscoveryError};
pub use registry::ScannerRegistry;
pub use scanner::{
    EndpointScanner, FnEndpointScanner, FnSpanScanner, ScanError, ScanInput, ScannerProvider,
    SpanScanner,
};
