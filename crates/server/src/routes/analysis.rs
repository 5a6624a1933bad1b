use analysis_core::{
    annotated_pgn, export_filename, played_best, AnalysisError, AnalysisService, PlyAnalysis,
};
use axum::{extract::Path, Extension, Json};
use chess_core::pgn::{headers, split_movetext};
use chess_core::{identity_for_ply, PositionIdentity};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use sqlx::PgPool;

use crate::db::games::{self, StoredGame};
use crate::error::AppError;

#[derive(Deserialize)]
pub struct AnalyseMoveRequest {
    pub game_id: i64,
    /// Ply to analyse; 0 is the start position.
    pub move_index: usize,
}

/// Moves as a list or as movetext ("1. e4 e5 2. Nf3").
#[derive(Deserialize)]
#[serde(untagged)]
pub enum MovesInput {
    List(Vec<String>),
    Text(String),
}

impl MovesInput {
    pub fn into_moves(self) -> Vec<String> {
        match self {
            MovesInput::List(moves) => moves,
            MovesInput::Text(text) => split_movetext(&text),
        }
    }
}

#[derive(Deserialize)]
pub struct ExploreVariationRequest {
    pub start_fen: String,
    pub variation_moves: MovesInput,
}

#[derive(Deserialize)]
pub struct InvalidateRequest {
    pub fen: String,
}

#[derive(Deserialize)]
pub struct GameAnalysisRequest {
    /// Also ask for explanations, not just engine analysis.
    #[serde(default, alias = "use_llm")]
    pub explain: bool,
}

#[derive(Deserialize)]
pub struct LimitedAnalysisRequest {
    /// First ply of the window.
    pub start_move: usize,
    #[serde(default, alias = "use_llm")]
    pub explain: bool,
}

async fn load_game(pool: &PgPool, game_id: i64) -> Result<StoredGame, AppError> {
    games::get_game(pool, game_id)
        .await?
        .ok_or(AppError::NotFound("Game not found".into()))
}

/// POST /api/analyse_move
pub async fn analyse_move(
    Extension(pool): Extension<PgPool>,
    Extension(service): Extension<AnalysisService>,
    Json(body): Json<AnalyseMoveRequest>,
) -> Result<Json<JsonValue>, AppError> {
    let stored = load_game(&pool, body.game_id).await?;
    let game = &stored.game;

    let identity = identity_for_ply(game, body.move_index).map_err(AnalysisError::from)?;
    let outcome = service.request_main_analysis(game, body.move_index).await;

    let (status, analysis, best) = match outcome {
        Ok(result) => {
            let best = played_best(game, body.move_index, &result);
            ("ok", json!(result), best)
        }
        Err(AnalysisError::AnalysisUnavailable(_)) => ("unavailable", JsonValue::Null, None),
        Err(e) => return Err(e.into()),
    };

    Ok(Json(json!({
        "game_id": stored.id,
        "move_index": body.move_index,
        "san": game.san_at(body.move_index),
        "fen": identity,
        "status": status,
        "analysis": analysis,
        "played_best": best,
    })))
}

fn ply_rows(analyses: &[PlyAnalysis]) -> Vec<JsonValue> {
    analyses
        .iter()
        .map(|a| {
            json!({
                "move_number": a.ply,
                "san": a.san,
                "fen": a.identity,
                "status": if a.analysis.is_some() { "ok" } else { "unavailable" },
                "analysis": a.analysis,
                "played_best": a.played_best,
            })
        })
        .collect()
}

/// POST /api/games/{game_id}/analyze
pub async fn analyze_game(
    Extension(pool): Extension<PgPool>,
    Extension(service): Extension<AnalysisService>,
    Path(game_id): Path<i64>,
    Json(body): Json<GameAnalysisRequest>,
) -> Result<Json<JsonValue>, AppError> {
    let explain = body.explain;
    let stored = load_game(&pool, game_id).await?;

    let analyses = service.analyze_game(&stored.game, explain).await?;
    let analysed = analyses.iter().filter(|a| a.analysis.is_some()).count();
    tracing::info!(game_id, plies = analyses.len(), analysed, explain, "Analysed game");

    Ok(Json(json!({
        "game_id": stored.id,
        "analysis_count": analysed,
        "positions": ply_rows(&analyses),
    })))
}

/// POST /api/games/{game_id}/analyze_limited
pub async fn analyze_limited(
    Extension(pool): Extension<PgPool>,
    Extension(service): Extension<AnalysisService>,
    Path(game_id): Path<i64>,
    Json(body): Json<LimitedAnalysisRequest>,
) -> Result<Json<JsonValue>, AppError> {
    let stored = load_game(&pool, game_id).await?;
    if body.start_move > stored.game.len() {
        return Err(AppError::BadRequest(format!(
            "start_move {} is past the end of a {}-ply game",
            body.start_move,
            stored.game.len()
        )));
    }

    let analyses = service
        .analyze_window(&stored.game, body.start_move, body.explain)
        .await?;

    Ok(Json(json!({
        "game_id": stored.id,
        "analysis_count": analyses.iter().filter(|a| a.analysis.is_some()).count(),
        "positions": ply_rows(&analyses),
    })))
}

/// GET /api/games/{game_id}/analysis
pub async fn game_analysis(
    Extension(pool): Extension<PgPool>,
    Extension(service): Extension<AnalysisService>,
    Path(game_id): Path<i64>,
) -> Result<Json<JsonValue>, AppError> {
    let stored = load_game(&pool, game_id).await?;
    let known = service.game_analysis(&stored.game).await;

    Ok(Json(json!({
        "game_id": stored.id,
        "positions": ply_rows(&known),
    })))
}

/// GET /api/games/{game_id}/export
pub async fn export_game(
    Extension(pool): Extension<PgPool>,
    Extension(service): Extension<AnalysisService>,
    Path(game_id): Path<i64>,
) -> Result<Json<JsonValue>, AppError> {
    let stored = load_game(&pool, game_id).await?;
    let known = service.game_analysis(&stored.game).await;

    Ok(Json(json!({
        "pgn": annotated_pgn(&headers(&stored.pgn), &stored.game, &known),
        "filename": export_filename(&stored.game),
    })))
}

/// POST /api/explore_variation
pub async fn explore_variation(
    Extension(service): Extension<AnalysisService>,
    Json(body): Json<ExploreVariationRequest>,
) -> Result<Json<JsonValue>, AppError> {
    let start = PositionIdentity::parse(&body.start_fen).map_err(AnalysisError::from)?;
    let moves = body.variation_moves.into_moves();
    if moves.is_empty() {
        return Err(AppError::BadRequest("No variation moves given".into()));
    }

    let steps = service.request_variation_analysis(&start, &moves).await?;
    let steps: Vec<JsonValue> = steps
        .into_iter()
        .map(|s| {
            json!({
                "step": s.step,
                "san": s.san,
                "fen": s.identity,
                "status": if s.analysis.is_some() { "ok" } else { "unavailable" },
                "analysis": s.analysis,
            })
        })
        .collect();

    Ok(Json(json!({
        "start_fen": start,
        "steps": steps,
    })))
}

/// POST /api/analysis/invalidate
pub async fn invalidate(
    Extension(service): Extension<AnalysisService>,
    Json(body): Json<InvalidateRequest>,
) -> Result<Json<JsonValue>, AppError> {
    let identity = PositionIdentity::parse(&body.fen).map_err(AnalysisError::from)?;

    let invalidated = service
        .orchestrator()
        .invalidate(&identity)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    tracing::info!(identity = %identity.short(), invalidated, "Invalidated analysis");
    Ok(Json(json!({
        "fen": identity,
        "invalidated": invalidated,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_moves_input_accepts_list_or_text() {
        let list: ExploreVariationRequest = serde_json::from_value(json!({
            "start_fen": "startpos",
            "variation_moves": ["e4", "e5"]
        }))
        .unwrap();
        assert_eq!(list.variation_moves.into_moves(), vec!["e4", "e5"]);

        let text: ExploreVariationRequest = serde_json::from_value(json!({
            "start_fen": "startpos",
            "variation_moves": "1. e4 e5 2. Nf3"
        }))
        .unwrap();
        assert_eq!(text.variation_moves.into_moves(), vec!["e4", "e5", "Nf3"]);
    }

    #[test]
    fn test_analysis_requests_accept_use_llm_alias() {
        let body: GameAnalysisRequest = serde_json::from_value(json!({ "use_llm": true })).unwrap();
        assert!(body.explain);
        let body: GameAnalysisRequest = serde_json::from_value(json!({})).unwrap();
        assert!(!body.explain);

        let limited: LimitedAnalysisRequest =
            serde_json::from_value(json!({ "start_move": 4, "explain": true })).unwrap();
        assert_eq!(limited.start_move, 4);
        assert!(limited.explain);
    }
}
