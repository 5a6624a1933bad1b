//! Request coalescing and provider fallback.
//!
//! At most one resolution is in flight per position identity. Later callers
//! that want a subset of the fields being resolved join it; callers wanting
//! more wait for it and then resolve whatever is still missing.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chess_core::PositionIdentity;
use parking_lot::Mutex;
use shakmaty::Chess;
use tokio::sync::{oneshot, watch, Semaphore};
use tracing::{debug, info, warn};

use crate::cache::AnalysisCache;
use crate::config::OrchestratorConfig;
use crate::cursor::InterestToken;
use crate::error::{AnalysisError, ProviderError, StoreError};
use crate::fallback;
use crate::providers::{
    AnalysisStore, EngineEval, EvaluationProvider, ExplanationProvider, SearchParams,
};
use crate::result::{AnalysisResult, EvalSource, Evaluation, FieldSet};

type Settlement = Result<AnalysisResult, AnalysisError>;

struct PendingRequest {
    fields: FieldSet,
    waiters: Vec<InterestToken>,
    settled: watch::Receiver<Option<Settlement>>,
}

enum Lookup {
    Ready(AnalysisResult),
    Join {
        settled: watch::Receiver<Option<Settlement>>,
        covers: bool,
    },
    Lead {
        tx: watch::Sender<Option<Settlement>>,
        settled: watch::Receiver<Option<Settlement>>,
        missing: FieldSet,
    },
}

/// Evaluation plus the lines that came with it.
#[derive(Clone)]
struct ResolvedEval {
    evaluation: Evaluation,
    continuations: Vec<Vec<String>>,
}

impl ResolvedEval {
    fn into_partial(self) -> AnalysisResult {
        AnalysisResult {
            best_move: self.continuations.first().and_then(|l| l.first()).cloned(),
            continuations: Some(self.continuations),
            evaluation: Some(self.evaluation),
            explanation: None,
        }
    }
}

pub struct Orchestrator {
    cache: Arc<AnalysisCache>,
    evaluator: Arc<dyn EvaluationProvider>,
    explainer: Arc<dyn ExplanationProvider>,
    store: Option<Arc<dyn AnalysisStore>>,
    config: OrchestratorConfig,
    pending: Mutex<HashMap<PositionIdentity, PendingRequest>>,
    eval_slots: Semaphore,
    explain_slots: Semaphore,
    next_token: AtomicU64,
}

impl Orchestrator {
    pub fn new(
        cache: Arc<AnalysisCache>,
        evaluator: Arc<dyn EvaluationProvider>,
        explainer: Arc<dyn ExplanationProvider>,
        config: OrchestratorConfig,
    ) -> Self {
        let slots = config.max_concurrent_provider_calls.max(1);
        Self {
            cache,
            evaluator,
            explainer,
            store: None,
            config,
            pending: Mutex::new(HashMap::new()),
            eval_slots: Semaphore::new(slots),
            explain_slots: Semaphore::new(slots),
            next_token: AtomicU64::new(1),
        }
    }

    /// Back the in-memory cache with a durable store.
    pub fn with_store(mut self, store: Arc<dyn AnalysisStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn cache(&self) -> &Arc<AnalysisCache> {
        &self.cache
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Fresh token for callers that are not driven by a cursor.
    pub fn next_token(&self) -> InterestToken {
        InterestToken(self.next_token.fetch_add(1, Ordering::Relaxed))
    }

    /// Cached result, only if it already has every requested field. A degraded
    /// evaluation still counts as present here.
    pub fn cached(&self, identity: &PositionIdentity, fields: FieldSet) -> Option<AnalysisResult> {
        self.cache.get(identity).filter(|r| r.has(fields))
    }

    /// Everything known about a position from the cache and the store. Never
    /// calls a provider.
    pub async fn known(&self, identity: &PositionIdentity) -> Option<AnalysisResult> {
        let cached = self.cache.get(identity);
        if cached.as_ref().is_some_and(|r| r.unresolved(FieldSet::ALL).is_empty()) {
            return cached;
        }
        let Some(store) = &self.store else {
            return cached;
        };
        match store.load_cached_analysis(identity).await {
            Ok(Some(stored)) => self.cache.merge(identity, stored),
            Ok(None) => cached,
            Err(e) => {
                warn!(identity = %identity.short(), error = %e, "Analysis store lookup failed");
                cached
            }
        }
    }

    /// Tokens currently waiting on an in-flight resolution.
    pub fn pending_waiters(&self, identity: &PositionIdentity) -> Vec<InterestToken> {
        self.pending
            .lock()
            .get(identity)
            .map(|p| p.waiters.clone())
            .unwrap_or_default()
    }

    pub fn is_pending(&self, identity: &PositionIdentity) -> bool {
        self.pending.lock().contains_key(identity)
    }

    /// Drop a position from the cache and the store. Returns whether either
    /// tier held it.
    pub async fn invalidate(&self, identity: &PositionIdentity) -> Result<bool, StoreError> {
        let cached = self.cache.invalidate(identity);
        let stored = match &self.store {
            Some(store) => store.delete_cached_analysis(identity).await?,
            None => false,
        };
        debug!(identity = %identity.short(), cached, stored, "Invalidated analysis");
        Ok(cached || stored)
    }

    /// Resolve `fields` for `identity`, from cache when possible.
    ///
    /// Returns whatever is known once resolution settles, which may lack some
    /// requested fields if their providers failed. Fails with
    /// `AnalysisUnavailable` only when nothing usable exists at all.
    pub async fn analyze(
        self: &Arc<Self>,
        identity: &PositionIdentity,
        fields: FieldSet,
        token: InterestToken,
    ) -> Result<AnalysisResult, AnalysisError> {
        loop {
            match self.lookup(identity, fields, token) {
                Lookup::Ready(result) => return Ok(result),
                Lookup::Join { settled, covers } => {
                    debug!(identity = %identity.short(), token = token.0, "Joined in-flight analysis");
                    let settlement = wait_settled(settled, identity).await;
                    if covers {
                        return settlement;
                    }
                }
                Lookup::Lead {
                    tx,
                    settled,
                    missing,
                } => {
                    let this = Arc::clone(self);
                    let id = identity.clone();
                    tokio::spawn(async move { this.resolve(id, missing, tx).await });
                    return wait_settled(settled, identity).await;
                }
            }
        }
    }

    /// Drop the cached entry and resolve again.
    pub async fn reanalyze(
        self: &Arc<Self>,
        identity: &PositionIdentity,
        fields: FieldSet,
        token: InterestToken,
    ) -> Result<AnalysisResult, AnalysisError> {
        if let Err(e) = self.invalidate(identity).await {
            warn!(identity = %identity.short(), error = %e, "Failed to drop stored analysis");
        }
        self.analyze(identity, fields, token).await
    }

    fn lookup(&self, identity: &PositionIdentity, fields: FieldSet, token: InterestToken) -> Lookup {
        let known = self.cache.get(identity).unwrap_or_default();
        let missing = known.unresolved(fields);
        if missing.is_empty() {
            return Lookup::Ready(known);
        }

        let mut pending = self.pending.lock();
        if let Some(req) = pending.get_mut(identity) {
            req.waiters.push(token);
            return Lookup::Join {
                settled: req.settled.clone(),
                covers: req.fields.contains(missing),
            };
        }

        let (tx, settled) = watch::channel(None);
        pending.insert(
            identity.clone(),
            PendingRequest {
                fields: missing,
                waiters: vec![token],
                settled: settled.clone(),
            },
        );
        Lookup::Lead {
            tx,
            settled,
            missing,
        }
    }

    async fn resolve(
        self: Arc<Self>,
        identity: PositionIdentity,
        missing: FieldSet,
        tx: watch::Sender<Option<Settlement>>,
    ) {
        let guard = PendingGuard {
            orchestrator: Arc::clone(&self),
            identity: identity.clone(),
        };

        let settlement = self.resolve_fields(&identity, missing).await;
        let waiters = self.pending_waiters(&identity).len();
        match &settlement {
            Ok(result) => debug!(
                identity = %identity.short(),
                waiters,
                evaluation = result.evaluation.is_some(),
                explanation = result.explanation.is_some(),
                "Analysis settled"
            ),
            Err(e) => warn!(identity = %identity.short(), waiters, error = %e, "Analysis settled without a result"),
        }

        // Unregister before waking waiters so none of them rejoins a settled request
        drop(guard);
        let _ = tx.send(Some(settlement.clone()));

        if let (Some(store), Ok(result)) = (&self.store, &settlement) {
            if let Err(e) = store.save_cached_analysis(&identity, result).await {
                warn!(identity = %identity.short(), error = %e, "Failed to persist analysis");
            }
        }
    }

    async fn resolve_fields(&self, identity: &PositionIdentity, mut missing: FieldSet) -> Settlement {
        if let Some(store) = &self.store {
            match store.load_cached_analysis(identity).await {
                Ok(Some(stored)) => {
                    if let Some(merged) = self.cache.merge(identity, stored) {
                        missing = merged.unresolved(missing);
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(identity = %identity.short(), error = %e, "Analysis store lookup failed"),
            }
            if missing.is_empty() {
                debug!(identity = %identity.short(), "Analysis served from store");
                return self
                    .cache
                    .get(identity)
                    .ok_or_else(|| AnalysisError::AnalysisUnavailable(identity.to_string()));
            }
        }

        let position = identity.position()?;
        let known = self.cache.get(identity).unwrap_or_default();

        // A fresh evaluation is handed to the explanation side on `eval_rx`
        let (eval_tx, eval_rx) = oneshot::channel::<ResolvedEval>();
        let engine = async {
            if !missing.intersects(FieldSet::ENGINE) {
                return None;
            }
            let resolved = self.resolve_evaluation(identity, &position).await;
            if let Some(resolved) = &resolved {
                let _ = eval_tx.send(resolved.clone());
            }
            resolved
        };
        let explanation = async {
            if !missing.contains(FieldSet::EXPLANATION) {
                return None;
            }
            let mut basis = known.clone();
            if basis.evaluation.is_none() && missing.intersects(FieldSet::ENGINE) {
                match tokio::time::timeout(self.config.explanation_wait, eval_rx).await {
                    Ok(Ok(resolved)) => {
                        basis.merge_from(resolved.into_partial());
                    }
                    _ => debug!(identity = %identity.short(), "Explaining without an evaluation"),
                }
            }
            self.resolve_explanation(identity, &basis).await
        };
        let (engine, explanation) = tokio::join!(engine, explanation);

        let mut partial = engine.map(ResolvedEval::into_partial).unwrap_or_default();
        partial.explanation = explanation;

        if partial.explanation.is_none()
            && missing.contains(FieldSet::EXPLANATION)
            && self.config.local_fallback
        {
            let mut basis = known;
            basis.merge_from(partial.clone());
            if basis.evaluation.is_some() {
                partial.explanation = Some(fallback::describe(&basis));
            }
        }

        // A failed upgrade still returns the degraded entry
        match self.cache.merge(identity, partial) {
            Some(result) if result.is_usable() => Ok(result),
            _ => Err(AnalysisError::AnalysisUnavailable(identity.to_string())),
        }
    }

    /// Terminal check, full search, shallow retry, then the local heuristic.
    async fn resolve_evaluation(&self, identity: &PositionIdentity, position: &Chess) -> Option<ResolvedEval> {
        if let Some(evaluation) = fallback::terminal_evaluation(position) {
            return Some(ResolvedEval {
                evaluation,
                continuations: Vec::new(),
            });
        }

        let attempts = [
            (self.config.search, EvalSource::Engine),
            (self.config.shallow_search, EvalSource::Shallow),
        ];
        for (params, source) in attempts {
            let started = std::time::Instant::now();
            match self.call_evaluator(identity, params).await {
                Ok(eval) => {
                    info!(
                        identity = %identity.short(),
                        provider = self.evaluator.name(),
                        score = %eval.score,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Evaluation resolved"
                    );
                    return Some(self.engine_result(eval, params, source));
                }
                Err(e) => warn!(
                    identity = %identity.short(),
                    provider = self.evaluator.name(),
                    depth = params.depth,
                    error = %e,
                    "Evaluation failed"
                ),
            }
        }

        if self.config.local_fallback {
            info!(identity = %identity.short(), "Using heuristic evaluation");
            return Some(ResolvedEval {
                evaluation: fallback::heuristic_evaluation(position),
                continuations: fallback::suggested_moves(position, 3),
            });
        }
        None
    }

    fn engine_result(&self, eval: EngineEval, params: SearchParams, source: EvalSource) -> ResolvedEval {
        let continuations = eval
            .lines
            .into_iter()
            .take(params.multipv as usize)
            .map(|mut line| {
                line.truncate(self.config.max_line_moves);
                line
            })
            .filter(|line| !line.is_empty())
            .collect();

        ResolvedEval {
            evaluation: Evaluation {
                score: eval.score,
                source,
                depth: eval.depth.or(Some(params.depth)),
            },
            continuations,
        }
    }

    /// One retry when the explanation provider is unavailable.
    async fn resolve_explanation(&self, identity: &PositionIdentity, known: &AnalysisResult) -> Option<String> {
        for attempt in 1..=2 {
            let result = self
                .with_backoff(&self.explain_slots, || self.explainer.explain(identity, known))
                .await;
            match result {
                Ok(text) if !text.trim().is_empty() => return Some(text.trim().to_string()),
                Ok(_) => warn!(identity = %identity.short(), attempt, "Empty explanation"),
                Err(e) => warn!(
                    identity = %identity.short(),
                    provider = self.explainer.name(),
                    attempt,
                    error = %e,
                    "Explanation failed"
                ),
            }
        }
        None
    }

    async fn call_evaluator(&self, identity: &PositionIdentity, params: SearchParams) -> Result<EngineEval, ProviderError> {
        self.with_backoff(&self.eval_slots, || self.evaluator.evaluate(identity, params))
            .await
    }

    /// Run `call` under a concurrency slot, sleeping and retrying while the
    /// provider reports rate limiting. The slot is released during the sleep.
    async fn with_backoff<T, F, Fut>(&self, slots: &Semaphore, mut call: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 0;
        loop {
            let result = {
                let _permit = slots
                    .acquire()
                    .await
                    .map_err(|_| ProviderError::Unavailable("provider queue closed".to_string()))?;
                call().await
            };

            match result {
                Err(ProviderError::RateLimited { retry_after }) if attempt < self.config.rate_limit_retries => {
                    let delay = self.backoff_delay(attempt, retry_after);
                    warn!(attempt, delay_ms = delay.as_millis() as u64, "Rate limited, backing off");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    fn backoff_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        retry_after
            .unwrap_or_else(|| self.config.rate_limit_backoff * 2u32.saturating_pow(attempt))
            .min(self.config.max_backoff)
    }
}

/// Removes the pending entry when a resolution finishes or its task dies.
struct PendingGuard {
    orchestrator: Arc<Orchestrator>,
    identity: PositionIdentity,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.orchestrator.pending.lock().remove(&self.identity);
    }
}

async fn wait_settled(
    mut settled: watch::Receiver<Option<Settlement>>,
    identity: &PositionIdentity,
) -> Settlement {
    let outcome = match settled.wait_for(Option::is_some).await {
        Ok(value) => (*value).clone(),
        Err(_) => None,
    };
    outcome.unwrap_or_else(|| Err(AnalysisError::AnalysisUnavailable(identity.to_string())))
}
