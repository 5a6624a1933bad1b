use sqlx::postgres::{PgPool, PgPoolOptions};

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

/// Run the full Postgres schema migration inline.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA_SQL).execute(pool).await?;
    Ok(())
}

const SCHEMA_SQL: &str = r#"
-- Uploaded games
CREATE TABLE IF NOT EXISTS games (
    id          BIGSERIAL PRIMARY KEY,
    title       TEXT NOT NULL,
    pgn         TEXT NOT NULL,
    white       TEXT,
    black       TEXT,
    result      TEXT,
    date        TEXT,
    event       TEXT,
    eco         TEXT,
    start_fen   TEXT NOT NULL,
    moves       JSONB NOT NULL DEFAULT '[]'::jsonb,
    move_count  INTEGER NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_games_created_at
    ON games (created_at DESC);

-- Analysis keyed by canonical FEN, shared across games and variations
CREATE TABLE IF NOT EXISTS position_analysis (
    fen           TEXT PRIMARY KEY,
    evaluation    JSONB,
    explanation   TEXT,
    continuations JSONB,
    best_move     TEXT,
    version       INTEGER NOT NULL DEFAULT 0,
    created_at    TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at    TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
"#;
