use serde::{Deserialize, Serialize};

use crate::CodeObjectId;

/// One inline lens rendered next to a method.
///
/// Field order defines the sort order: by scope, then importance (lower is
/// more important), then title.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LensFact {
    /// Method the lens is rendered on.
    pub scope: CodeObjectId,
    pub importance: i32,
    pub title: String,
    pub code_object: CodeObjectId,
    pub description: String,
    pub more_info: Option<String>,
}
