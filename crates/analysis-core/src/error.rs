use std::time::Duration;

use chess_core::IdentityError;
use thiserror::Error;

/// Failure reported by an evaluation or explanation provider.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Provider rate limited")]
    RateLimited { retry_after: Option<Duration> },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Analysis store error: {0}")]
    Backend(String),

    #[error("Stored analysis is malformed: {0}")]
    Malformed(String),
}

/// Failure of an analysis request as seen by callers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("Variation has {len} moves, at most {max} are analysed")]
    VariationTooLong { len: usize, max: usize },

    /// No provider produced anything usable and nothing was cached.
    #[error("No analysis available for {0}")]
    AnalysisUnavailable(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("No candidate continuation #{0} at the current position")]
    NoCandidate(usize),

    #[error(transparent)]
    Identity(#[from] IdentityError),
}
