//! Provider seams. The orchestrator only ever talks to these traits, so the
//! server can plug in HTTP, subprocess or database backends and tests can
//! plug in mocks.

use async_trait::async_trait;
use chess_core::PositionIdentity;

use crate::error::{ProviderError, StoreError};
use crate::result::{AnalysisResult, Score};

/// Search parameters for one evaluation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchParams {
    pub depth: u32,
    /// Number of candidate lines wanted.
    pub multipv: u32,
}

/// Raw answer of an evaluation provider.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineEval {
    /// Score of the best line, White's point of view.
    pub score: Score,
    /// Candidate lines in SAN, best first.
    pub lines: Vec<Vec<String>>,
    /// Depth actually reached, when the provider reports it.
    pub depth: Option<u32>,
}

#[async_trait]
pub trait EvaluationProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn evaluate(
        &self,
        identity: &PositionIdentity,
        params: SearchParams,
    ) -> Result<EngineEval, ProviderError>;
}

#[async_trait]
pub trait ExplanationProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Describe the position. `known` carries whatever analysis is already
    /// cached for it and may be empty.
    async fn explain(
        &self,
        identity: &PositionIdentity,
        known: &AnalysisResult,
    ) -> Result<String, ProviderError>;
}

/// Durable backing tier behind the in-memory cache.
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    async fn load_cached_analysis(
        &self,
        identity: &PositionIdentity,
    ) -> Result<Option<AnalysisResult>, StoreError>;

    /// Persist a result. Implementations merge rather than overwrite.
    async fn save_cached_analysis(
        &self,
        identity: &PositionIdentity,
        result: &AnalysisResult,
    ) -> Result<(), StoreError>;

    /// Forget a position. Returns whether anything was stored.
    async fn delete_cached_analysis(&self, identity: &PositionIdentity) -> Result<bool, StoreError>;
}
