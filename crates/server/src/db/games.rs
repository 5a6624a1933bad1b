use chess_core::pgn::parse_pgn;
use chess_core::Game;
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Row};

use crate::error::AppError;

/// A stored game together with its replayed main line.
pub struct StoredGame {
    pub id: i64,
    pub title: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// PGN as uploaded.
    pub pgn: String,
    pub game: Game,
}

pub async fn insert_game(pool: &PgPool, pgn: &str, game: &Game) -> Result<i64, AppError> {
    let moves: Vec<&str> = game.plies.iter().map(|p| p.san.as_str()).collect();

    let row = sqlx::query(
        r#"INSERT INTO games (
            title, pgn, white, black, result, date, event, eco,
            start_fen, moves, move_count
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING id"#,
    )
    .bind(game.title())
    .bind(pgn)
    .bind(&game.metadata.white)
    .bind(&game.metadata.black)
    .bind(&game.metadata.result)
    .bind(&game.metadata.date)
    .bind(&game.metadata.event)
    .bind(&game.metadata.eco)
    .bind(game.start.as_str())
    .bind(serde_json::json!(moves))
    .bind(game.len() as i32)
    .fetch_one(pool)
    .await?;

    Ok(row.try_get("id")?)
}

/// Load a game and replay its PGN.
pub async fn get_game(pool: &PgPool, game_id: i64) -> Result<Option<StoredGame>, AppError> {
    let row = sqlx::query("SELECT id, title, pgn, created_at FROM games WHERE id = $1")
        .bind(game_id)
        .fetch_optional(pool)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let pgn: String = row.try_get("pgn")?;
    let game = parse_pgn(&pgn)
        .map_err(|e| AppError::Internal(format!("Stored game {game_id} no longer parses: {e}")))?;

    Ok(Some(StoredGame {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        created_at: row.try_get("created_at")?,
        pgn,
        game,
    }))
}

pub async fn list_games(pool: &PgPool, limit: i64, offset: i64) -> Result<Vec<JsonValue>, AppError> {
    let rows = sqlx::query(
        r#"SELECT id, title, white, black, result, date, move_count, created_at
           FROM games
           ORDER BY created_at DESC
           LIMIT $1 OFFSET $2"#,
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| -> Result<JsonValue, AppError> {
            let created_at: chrono::DateTime<chrono::Utc> = row.try_get("created_at")?;
            Ok(serde_json::json!({
                "id": row.try_get::<i64, _>("id")?,
                "title": row.try_get::<String, _>("title")?,
                "white": row.try_get::<Option<String>, _>("white")?,
                "black": row.try_get::<Option<String>, _>("black")?,
                "result": row.try_get::<Option<String>, _>("result")?,
                "date": row.try_get::<Option<String>, _>("date")?,
                "move_count": row.try_get::<i32, _>("move_count")?,
                "created_at": created_at.to_rfc3339(),
            }))
        })
        .collect()
}
