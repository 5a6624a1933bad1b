//! Analysis orchestration for move-by-move game review.
//!
//! [`Orchestrator`] resolves analysis for a position through the pluggable
//! providers in [`providers`], coalescing concurrent requests and caching the
//! results. [`MoveNavigator`] and [`VariationExplorer`] drive it from user
//! navigation and discard answers that arrive after the user moved on.

pub mod cache;
pub mod config;
pub mod cursor;
pub mod error;
pub mod explorer;
pub mod export;
pub mod fallback;
pub mod navigator;
pub mod orchestrator;
pub mod providers;
pub mod result;
pub mod service;
pub mod session;

pub use cache::{AnalysisCache, Disagreement};
pub use config::OrchestratorConfig;
pub use cursor::{Completion, DisplayState, InterestToken, NavigationCursor};
pub use error::{AnalysisError, ProviderError, SessionError, StoreError};
pub use explorer::{ExplorerState, Variation, VariationExplorer};
pub use export::{annotated_pgn, export_filename};
pub use fallback::TemplateExplainer;
pub use navigator::MoveNavigator;
pub use orchestrator::Orchestrator;
pub use providers::{AnalysisStore, EngineEval, EvaluationProvider, ExplanationProvider, SearchParams};
pub use result::{AnalysisResult, EvalSource, Evaluation, FieldSet, Score, Side};
pub use service::{played_best, AnalysisService, PlyAnalysis, StepAnalysis};
pub use session::ReviewSession;
