use serde::{Deserialize, Serialize};
use sightline_core::CodeObjectId;
use sightline_scheduler::CancellationToken;

/// One piece of insight attached to a code object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decorator {
    pub title: String,
    pub description: String,
    /// Lower is more important.
    pub importance: i32,
    pub more_info: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeObjectInsights {
    pub id: CodeObjectId,
    pub decorators: Vec<Decorator>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InsightError {
    #[error("insight service unavailable: {0}")]
    Unavailable(String),
    #[error("insight request failed: {0}")]
    Request(String),
    #[error("insight request cancelled")]
    Cancelled,
}

/// Remote source of insights. Called from the background pool; may block.
pub trait InsightProvider: Send + Sync {
    fn fetch_insights(
        &self,
        ids: &[CodeObjectId],
        token: &CancellationToken,
    ) -> Result<Vec<CodeObjectInsights>, InsightError>;
}

/// Provider used when no insight service is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoInsights;

impl InsightProvider for NoInsights {
    fn fetch_insights(
        &self,
        _ids: &[CodeObjectId],
        _token: &CancellationToken,
    ) -> Result<Vec<CodeObjectInsights>, InsightError> {
        Ok(Vec::new())
    }
}
