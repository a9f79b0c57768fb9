//! Sightline's built-in scanner providers.
//!
//! Centralizes the list of `sightline-framework-*` providers so the workspace
//! (and tests) don't need to maintain their own. A provider whose feature is
//! disabled resolves to `None` and is skipped at registration.

use sightline_framework::{ScannerProvider, ScannerRegistry};

pub fn otel_provider() -> Option<Box<dyn ScannerProvider>> {
    #[cfg(feature = "otel")]
    {
        Some(Box::new(sightline_framework_otel::OtelProvider))
    }
    #[cfg(not(feature = "otel"))]
    {
        None
    }
}

pub fn spring_provider() -> Option<Box<dyn ScannerProvider>> {
    #[cfg(feature = "spring")]
    {
        Some(Box::new(sightline_framework_web::SpringMvcProvider))
    }
    #[cfg(not(feature = "spring"))]
    {
        None
    }
}

pub fn jaxrs_provider() -> Option<Box<dyn ScannerProvider>> {
    #[cfg(feature = "jaxrs")]
    {
        Some(Box::new(sightline_framework_web::JaxRsProvider))
    }
    #[cfg(not(feature = "jaxrs"))]
    {
        None
    }
}

pub fn ktor_provider() -> Option<Box<dyn ScannerProvider>> {
    #[cfg(feature = "ktor")]
    {
        Some(Box::new(sightline_framework_web::KtorProvider))
    }
    #[cfg(not(feature = "ktor"))]
    {
        None
    }
}

/// Every built-in provider slot, in registration order.
pub fn builtin_providers() -> Vec<Option<Box<dyn ScannerProvider>>> {
    vec![otel_provider(), spring_provider(), jaxrs_provider(), ktor_provider()]
}

/// Register the enabled built-in providers into an existing registry.
pub fn register_builtin_providers(registry: &mut ScannerRegistry) {
    registry.register_providers(builtin_providers());
}

/// Construct a [`ScannerRegistry`] with all enabled built-in providers registered.
pub fn builtin_registry() -> ScannerRegistry {
    let mut registry = ScannerRegistry::new();
    register_builtin_providers(&mut registry);
    registry
}
