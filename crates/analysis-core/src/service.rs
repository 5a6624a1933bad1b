//! Request/response entry points for callers that do not hold a cursor,
//! such as the HTTP API.

use std::ops::RangeInclusive;
use std::sync::Arc;

use chess_core::{identity_for_ply, variation_steps, Game, Ply, PositionIdentity};
use serde::Serialize;
use tracing::debug;

use crate::error::AnalysisError;
use crate::orchestrator::Orchestrator;
use crate::result::{AnalysisResult, FieldSet};

/// Analysis of one step of a variation.
#[derive(Debug, Clone, Serialize)]
pub struct StepAnalysis {
    /// 1-based step number.
    pub step: usize,
    pub san: String,
    pub identity: PositionIdentity,
    /// `None` when no analysis could be produced for this step.
    pub analysis: Option<AnalysisResult>,
}

/// Analysis of the position after one main-line ply.
#[derive(Debug, Clone, Serialize)]
pub struct PlyAnalysis {
    pub ply: usize,
    /// Move that led here.
    pub san: String,
    pub identity: PositionIdentity,
    pub analysis: Option<AnalysisResult>,
    /// Whether the game's next move was the suggested best move.
    pub played_best: Option<bool>,
}

/// Compare the move played from `ply` with the best move found there.
/// `None` when either is unknown.
pub fn played_best(game: &Game, ply: usize, analysis: &AnalysisResult) -> Option<bool> {
    let played = game.san_at(ply + 1)?;
    let best = analysis.best_move.as_deref()?;
    Some(strip_check(played) == strip_check(best))
}

fn ply_analysis(game: &Game, ply: &Ply, analysis: Option<AnalysisResult>) -> PlyAnalysis {
    PlyAnalysis {
        ply: ply.number,
        san: ply.san.clone(),
        identity: ply.identity.clone(),
        played_best: analysis.as_ref().and_then(|a| played_best(game, ply.number, a)),
        analysis,
    }
}

fn strip_check(san: &str) -> &str {
    san.trim_end_matches(['+', '#', '!', '?'])
}

#[derive(Clone)]
pub struct AnalysisService {
    orchestrator: Arc<Orchestrator>,
}

impl AnalysisService {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Full analysis of the main line after `ply` half-moves. The next few
    /// plies are warmed in the background.
    pub async fn request_main_analysis(
        &self,
        game: &Game,
        ply: usize,
    ) -> Result<AnalysisResult, AnalysisError> {
        let identity = identity_for_ply(game, ply)?;
        let token = self.orchestrator.next_token();
        self.prefetch(game, ply);
        self.orchestrator.analyze(&identity, FieldSet::ALL, token).await
    }

    fn prefetch(&self, game: &Game, ply: usize) {
        let ahead = (ply + self.orchestrator.config().prefetch_plies).min(game.len());
        for next in ply + 1..=ahead {
            let Some(identity) = game.identity_at(next).cloned() else {
                continue;
            };
            if self.orchestrator.cached(&identity, FieldSet::ENGINE).is_some() {
                continue;
            }
            let orchestrator = Arc::clone(&self.orchestrator);
            let token = orchestrator.next_token();
            tokio::spawn(async move {
                if let Err(e) = orchestrator.analyze(&identity, FieldSet::ENGINE, token).await {
                    debug!(identity = %identity.short(), error = %e, "Prefetch failed");
                }
            });
        }
    }

    /// Engine analysis of every main-line ply in order, with explanations
    /// when `explain` is set. Plies are resolved one at a time so a long game
    /// does not flood the providers.
    pub async fn analyze_game(&self, game: &Game, explain: bool) -> Result<Vec<PlyAnalysis>, AnalysisError> {
        self.analyze_plies(game, 1..=game.len(), explain).await
    }

    /// Like [`analyze_game`](Self::analyze_game) for `start_ply` and the
    /// prefetch window after it.
    pub async fn analyze_window(
        &self,
        game: &Game,
        start_ply: usize,
        explain: bool,
    ) -> Result<Vec<PlyAnalysis>, AnalysisError> {
        let first = start_ply.max(1);
        let last = (start_ply + self.orchestrator.config().prefetch_plies).min(game.len());
        self.analyze_plies(game, first..=last, explain).await
    }

    async fn analyze_plies(
        &self,
        game: &Game,
        plies: RangeInclusive<usize>,
        explain: bool,
    ) -> Result<Vec<PlyAnalysis>, AnalysisError> {
        let fields = if explain { FieldSet::ALL } else { FieldSet::ENGINE };
        let mut analysed = Vec::new();
        for ply in game.plies.iter().filter(|p| plies.contains(&p.number)) {
            let token = self.orchestrator.next_token();
            let analysis = match self.orchestrator.analyze(&ply.identity, fields, token).await {
                Ok(result) => Some(result),
                Err(AnalysisError::AnalysisUnavailable(_)) => None,
                Err(e) => return Err(e),
            };
            analysed.push(ply_analysis(game, ply, analysis));
        }
        debug!(plies = analysed.len(), explain, "Game analysis finished");
        Ok(analysed)
    }

    /// Analysis already on record for each ply, without calling a provider.
    /// Plies nothing is known about are left out.
    pub async fn game_analysis(&self, game: &Game) -> Vec<PlyAnalysis> {
        let mut known = Vec::new();
        for ply in &game.plies {
            if let Some(result) = self.orchestrator.known(&ply.identity).await {
                known.push(ply_analysis(game, ply, Some(result)));
            }
        }
        known
    }

    /// Analyse every step of a variation in order. An illegal move fails the
    /// whole request before any provider is called.
    pub async fn request_variation_analysis<S: AsRef<str>>(
        &self,
        start: &PositionIdentity,
        moves: &[S],
    ) -> Result<Vec<StepAnalysis>, AnalysisError> {
        let limit = self.orchestrator.config().max_variation_moves;
        if moves.len() > limit {
            return Err(AnalysisError::VariationTooLong {
                len: moves.len(),
                max: limit,
            });
        }

        let steps = variation_steps(start, moves)?;
        let mut analysed = Vec::with_capacity(steps.len());
        for (i, step) in steps.into_iter().enumerate() {
            let token = self.orchestrator.next_token();
            let analysis = match self
                .orchestrator
                .analyze(&step.identity, FieldSet::ALL, token)
                .await
            {
                Ok(result) => Some(result),
                Err(AnalysisError::AnalysisUnavailable(_)) => None,
                Err(e) => return Err(e),
            };
            analysed.push(StepAnalysis {
                step: i + 1,
                san: step.san,
                identity: step.identity,
                analysis,
            });
        }
        Ok(analysed)
    }
}
