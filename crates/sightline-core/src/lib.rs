//! Core shared types for Sightline.
//!
//! This crate is intentionally small: identities, the per-file fact model,
//! lens values and the engine event bus. Everything else builds on top of it.

mod events;
mod facts;
mod id;
mod lens;

pub use events::{EngineEvent, EventBus, EVENT_QUEUE_CAPACITY};
pub use facts::{DocumentFacts, EndpointFact, MethodFact, SpanFact};
pub use id::{CandidateKind, CandidateKinds, CodeObjectId, CodeObjectKind, InvalidCodeObjectId};
pub use lens::LensFact;
pub use text_size::{TextRange, TextSize};

/// Version string stamped into logs.
pub const SIGHTLINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Stable identifier for a file known to the engine.
///
/// Ids are allocated by `sightline-vfs` and never reused for a different path
/// within one engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct FileId(u32);

impl FileId {
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn to_raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "file#{}", self.0)
    }
}

/// Best-effort extraction of a panic payload message.
pub fn panic_payload_to_str(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "<non-string panic payload>".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payload_messages_are_extracted() {
        let payload = std::panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_payload_to_str(&*payload), "boom");

        let payload = std::panic::catch_unwind(|| panic!("{} {}", "formatted", 1)).unwrap_err();
        assert_eq!(panic_payload_to_str(&*payload), "formatted 1");

        let payload = std::panic::catch_unwind(|| std::panic::panic_any(7_u32)).unwrap_err();
        assert_eq!(panic_payload_to_str(&*payload), "<non-string panic payload>");
    }
}
