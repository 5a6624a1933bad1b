use axum::{extract::Path, extract::Query, Extension, Json};
use chess_core::pgn::parse_pgn;
use chess_core::Game;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use sqlx::PgPool;

use crate::db::games;
use crate::error::AppError;

#[derive(Deserialize)]
pub struct UploadPgnRequest {
    pub pgn: String,
}

#[derive(Deserialize)]
pub struct ListGamesQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Per-ply view of a game: ply 0 is the start position.
pub fn game_positions(game: &Game) -> Vec<JsonValue> {
    game.identities()
        .iter()
        .enumerate()
        .map(|(ply, identity)| {
            json!({
                "ply": ply,
                "san": game.san_at(ply),
                "fen": identity,
            })
        })
        .collect()
}

fn game_json(id: i64, title: &str, game: &Game) -> JsonValue {
    json!({
        "game_id": id,
        "title": title,
        "metadata": game.metadata,
        "start_fen": game.start,
        "moves": game.plies.iter().map(|p| p.san.as_str()).collect::<Vec<_>>(),
        "move_count": game.len(),
        "positions": game_positions(game),
    })
}

/// POST /api/upload_pgn
pub async fn upload_pgn(
    Extension(pool): Extension<PgPool>,
    Json(body): Json<UploadPgnRequest>,
) -> Result<Json<JsonValue>, AppError> {
    let game = parse_pgn(&body.pgn)?;
    let id = games::insert_game(&pool, &body.pgn, &game).await?;

    tracing::info!(game_id = id, plies = game.len(), "Stored uploaded game");
    Ok(Json(game_json(id, &game.title(), &game)))
}

/// GET /api/games
pub async fn list_games(
    Extension(pool): Extension<PgPool>,
    Query(q): Query<ListGamesQuery>,
) -> Result<Json<JsonValue>, AppError> {
    let limit = q.limit.unwrap_or(50).clamp(1, 500);
    let offset = q.offset.unwrap_or(0).max(0);
    let games_list = games::list_games(&pool, limit, offset).await?;

    Ok(Json(json!({
        "games": games_list,
        "limit": limit,
        "offset": offset,
    })))
}

/// GET /api/games/{game_id}
pub async fn get_game_by_id(
    Extension(pool): Extension<PgPool>,
    Path(game_id): Path<i64>,
) -> Result<Json<JsonValue>, AppError> {
    let stored = games::get_game(&pool, game_id)
        .await?
        .ok_or(AppError::NotFound("Game not found".into()))?;

    let mut body = game_json(stored.id, &stored.title, &stored.game);
    body["created_at"] = json!(stored.created_at.to_rfc3339());
    Ok(Json(body))
}
