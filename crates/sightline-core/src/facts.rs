use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use text_size::TextSize;

use crate::{CodeObjectId, FileId};

/// A span emitted by a method, as reported by one framework scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanFact {
    pub id: CodeObjectId,
    pub owning_method: CodeObjectId,
    pub file: FileId,
    pub offset: TextSize,
    /// Tag of the scanner that produced the fact (e.g. `otel-annotations`).
    pub framework: SmolStr,
}

/// An HTTP endpoint handled by a method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointFact {
    pub id: CodeObjectId,
    pub owning_method: CodeObjectId,
    pub file: FileId,
    pub offset: TextSize,
    pub framework: SmolStr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodFact {
    pub id: CodeObjectId,
    pub display_name: String,
    pub containing_type: Option<String>,
    pub namespace: Option<String>,
    pub file: FileId,
    pub offset: TextSize,
    pub spans: BTreeMap<CodeObjectId, SpanFact>,
    pub endpoints: BTreeMap<CodeObjectId, EndpointFact>,
}

impl MethodFact {
    pub fn new(
        id: CodeObjectId,
        display_name: impl Into<String>,
        file: FileId,
        offset: TextSize,
    ) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            containing_type: None,
            namespace: None,
            file,
            offset,
            spans: BTreeMap::new(),
            endpoints: BTreeMap::new(),
        }
    }
}

/// Everything discovery found in one file.
///
/// A `DocumentFacts` value is replaced wholesale on every successful scan; it is
/// never patched in place. Ordered maps keep equality and iteration
/// deterministic so an unchanged file produces an equal value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFacts {
    pub file: FileId,
    pub methods: BTreeMap<CodeObjectId, MethodFact>,
}

impl DocumentFacts {
    pub fn new(file: FileId) -> Self {
        Self {
            file,
            methods: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    pub fn method(&self, id: &CodeObjectId) -> Option<&MethodFact> {
        self.methods.get(id)
    }

    /// All code-object ids owned by this file: methods, then their spans and endpoints.
    pub fn code_object_ids(&self) -> impl Iterator<Item = &CodeObjectId> + '_ {
        self.methods.values().flat_map(|method| {
            std::iter::once(&method.id)
                .chain(method.spans.keys())
                .chain(method.endpoints.keys())
        })
    }

    /// Returns the method that owns `id`, which may be the method itself.
    pub fn owner_of(&self, id: &CodeObjectId) -> Option<&MethodFact> {
        if let Some(method) = self.methods.get(id) {
            return Some(method);
        }
        self.methods
            .values()
            .find(|method| method.spans.contains_key(id) || method.endpoints.contains_key(id))
    }
}
