#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use analysis_core::{
    AnalysisCache, AnalysisResult, AnalysisStore, EngineEval, EvalSource, Evaluation,
    EvaluationProvider, ExplanationProvider, Orchestrator, OrchestratorConfig, ProviderError,
    Score, SearchParams, StoreError,
};
use async_trait::async_trait;
use chess_core::pgn::parse_pgn;
use chess_core::{Game, PositionIdentity};
use parking_lot::Mutex;

pub const SAMPLE_PGN: &str = r#"[Event "Casual"]
[White "Alice"]
[Black "Bob"]
[Result "*"]

1. e4 e5 2. Nf3 Nc6 3. Bb5 a6 4. Ba4 Nf6 *"#;

/// The Ruy Lopez game above, 8 plies long.
pub fn sample_game() -> Arc<Game> {
    Arc::new(parse_pgn(SAMPLE_PGN).unwrap())
}

/// Default settings with millisecond backoff so rate-limit tests stay fast.
pub fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        rate_limit_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(10),
        ..Default::default()
    }
}

pub fn orchestrator_with_store(
    evaluator: Arc<ScriptedEvaluator>,
    explainer: Arc<ScriptedExplainer>,
    store: Arc<MemoryStore>,
) -> Arc<Orchestrator> {
    Arc::new(
        Orchestrator::new(Arc::new(AnalysisCache::new()), evaluator, explainer, fast_config())
            .with_store(store),
    )
}

pub fn orchestrator(
    evaluator: Arc<ScriptedEvaluator>,
    explainer: Arc<ScriptedExplainer>,
    config: OrchestratorConfig,
) -> Arc<Orchestrator> {
    Arc::new(Orchestrator::new(
        Arc::new(AnalysisCache::new()),
        evaluator,
        explainer,
        config,
    ))
}

pub fn engine_evaluation(pawns: f64) -> Evaluation {
    Evaluation {
        score: Score::Pawns(pawns),
        source: EvalSource::Engine,
        depth: Some(15),
    }
}

/// Evaluation provider that counts calls and answers from a score table.
pub struct ScriptedEvaluator {
    calls: AtomicUsize,
    seen: Mutex<Vec<PositionIdentity>>,
    scores: Mutex<HashMap<PositionIdentity, Score>>,
    failing: AtomicBool,
    rate_limited: AtomicUsize,
    delay: Duration,
}

impl ScriptedEvaluator {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            scores: Mutex::new(HashMap::new()),
            failing: AtomicBool::new(false),
            rate_limited: AtomicUsize::new(0),
            delay,
        })
    }

    pub fn set_score(&self, identity: &PositionIdentity, score: Score) {
        self.scores.lock().insert(identity.clone(), score);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Answer the next `n` calls with a rate-limit error.
    pub fn rate_limit_next(&self, n: usize) {
        self.rate_limited.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, identity: &PositionIdentity) -> usize {
        self.seen.lock().iter().filter(|id| *id == identity).count()
    }
}

#[async_trait]
impl EvaluationProvider for ScriptedEvaluator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn evaluate(
        &self,
        identity: &PositionIdentity,
        params: SearchParams,
    ) -> Result<EngineEval, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push(identity.clone());
        tokio::time::sleep(self.delay).await;

        let limited = self
            .rate_limited
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if limited {
            return Err(ProviderError::RateLimited { retry_after: None });
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProviderError::Unavailable("provider down".to_string()));
        }

        let score = self
            .scores
            .lock()
            .get(identity)
            .copied()
            .unwrap_or(Score::Pawns(0.4));
        Ok(EngineEval {
            score,
            lines: vec![
                vec!["e4".into(), "e5".into(), "Nf3".into()],
                vec!["d4".into(), "d5".into()],
            ],
            depth: Some(params.depth),
        })
    }
}

/// Explanation provider that counts calls, and separately the calls that
/// were given an evaluation to talk about.
pub struct ScriptedExplainer {
    calls: AtomicUsize,
    informed: AtomicUsize,
    failing: AtomicBool,
    delay: Duration,
}

impl ScriptedExplainer {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            informed: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            delay,
        })
    }

    pub fn failing() -> Arc<Self> {
        let explainer = Self::new(Duration::ZERO);
        explainer.set_failing(true);
        explainer
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn informed_calls(&self) -> usize {
        self.informed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExplanationProvider for ScriptedExplainer {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn explain(
        &self,
        identity: &PositionIdentity,
        known: &AnalysisResult,
    ) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if known.evaluation.is_some() {
            self.informed.fetch_add(1, Ordering::SeqCst);
        }
        tokio::time::sleep(self.delay).await;
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProviderError::Unavailable("no model".to_string()));
        }
        Ok(format!("Explanation of {}", identity.short()))
    }
}

/// In-memory store with the same merge-on-save behaviour as the database.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<PositionIdentity, AnalysisResult>>,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn insert(&self, identity: &PositionIdentity, result: AnalysisResult) {
        self.entries.lock().insert(identity.clone(), result);
    }

    pub fn get(&self, identity: &PositionIdentity) -> Option<AnalysisResult> {
        self.entries.lock().get(identity).cloned()
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisStore for MemoryStore {
    async fn load_cached_analysis(
        &self,
        identity: &PositionIdentity,
    ) -> Result<Option<AnalysisResult>, StoreError> {
        Ok(self.get(identity))
    }

    async fn save_cached_analysis(
        &self,
        identity: &PositionIdentity,
        result: &AnalysisResult,
    ) -> Result<(), StoreError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.entries
            .lock()
            .entry(identity.clone())
            .or_default()
            .merge_from(result.clone());
        Ok(())
    }

    async fn delete_cached_analysis(&self, identity: &PositionIdentity) -> Result<bool, StoreError> {
        Ok(self.entries.lock().remove(identity).is_some())
    }
}

/// Poll `check` until it holds, for work that finishes after a response.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}
