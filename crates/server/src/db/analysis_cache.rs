//! Durable per-position analysis behind the in-memory cache.

use analysis_core::{AnalysisResult, AnalysisStore, Evaluation, StoreError};
use async_trait::async_trait;
use chess_core::PositionIdentity;
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Row};

/// Merge semantics match the in-memory cache: fields are only filled, never
/// cleared, and a degraded evaluation gives way to an engine one.
const UPSERT_SQL: &str = r#"
INSERT INTO position_analysis (fen, evaluation, explanation, continuations, best_move)
VALUES ($1, $2, $3, $4, $5)
ON CONFLICT (fen) DO UPDATE SET
    evaluation = CASE
        WHEN position_analysis.evaluation IS NULL THEN EXCLUDED.evaluation
        WHEN position_analysis.evaluation->>'source' IN ('shallow', 'heuristic')
             AND EXCLUDED.evaluation->>'source' = 'engine' THEN EXCLUDED.evaluation
        ELSE position_analysis.evaluation
    END,
    continuations = CASE
        WHEN position_analysis.evaluation->>'source' IN ('shallow', 'heuristic')
             AND EXCLUDED.evaluation->>'source' = 'engine'
             AND EXCLUDED.continuations IS NOT NULL THEN EXCLUDED.continuations
        ELSE COALESCE(position_analysis.continuations, EXCLUDED.continuations)
    END,
    best_move = CASE
        WHEN position_analysis.evaluation->>'source' IN ('shallow', 'heuristic')
             AND EXCLUDED.evaluation->>'source' = 'engine'
             AND EXCLUDED.best_move IS NOT NULL THEN EXCLUDED.best_move
        ELSE COALESCE(position_analysis.best_move, EXCLUDED.best_move)
    END,
    explanation = COALESCE(position_analysis.explanation, EXCLUDED.explanation),
    version = position_analysis.version + 1,
    updated_at = NOW()
"#;

#[derive(Clone)]
pub struct PgAnalysisStore {
    pool: PgPool,
}

impl PgAnalysisStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn malformed(e: serde_json::Error) -> StoreError {
    StoreError::Malformed(e.to_string())
}

/// Convert stored columns back into a result.
pub fn result_from_columns(
    evaluation: Option<JsonValue>,
    explanation: Option<String>,
    continuations: Option<JsonValue>,
    best_move: Option<String>,
) -> Result<AnalysisResult, StoreError> {
    let evaluation = evaluation
        .map(serde_json::from_value::<Evaluation>)
        .transpose()
        .map_err(malformed)?;
    let continuations = continuations
        .map(serde_json::from_value::<Vec<Vec<String>>>)
        .transpose()
        .map_err(malformed)?;

    Ok(AnalysisResult {
        evaluation,
        explanation,
        continuations,
        best_move,
    })
}

#[async_trait]
impl AnalysisStore for PgAnalysisStore {
    async fn load_cached_analysis(
        &self,
        identity: &PositionIdentity,
    ) -> Result<Option<AnalysisResult>, StoreError> {
        let row = sqlx::query(
            r#"SELECT evaluation, explanation, continuations, best_move
               FROM position_analysis WHERE fen = $1"#,
        )
        .bind(identity.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let result = result_from_columns(
            row.try_get("evaluation").map_err(backend)?,
            row.try_get("explanation").map_err(backend)?,
            row.try_get("continuations").map_err(backend)?,
            row.try_get("best_move").map_err(backend)?,
        )?;

        Ok(Some(result).filter(|r| !r.is_empty()))
    }

    async fn save_cached_analysis(
        &self,
        identity: &PositionIdentity,
        result: &AnalysisResult,
    ) -> Result<(), StoreError> {
        if result.is_empty() {
            return Ok(());
        }

        let evaluation = result
            .evaluation
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(malformed)?;
        let continuations = result
            .continuations
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(malformed)?;

        sqlx::query(UPSERT_SQL)
            .bind(identity.as_str())
            .bind(evaluation)
            .bind(&result.explanation)
            .bind(continuations)
            .bind(&result.best_move)
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        tracing::debug!(identity = %identity.short(), "Persisted analysis");
        Ok(())
    }

    async fn delete_cached_analysis(&self, identity: &PositionIdentity) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM position_analysis WHERE fen = $1")
            .bind(identity.as_str())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::{EvalSource, Score};

    #[test]
    fn test_result_from_columns() {
        let evaluation = serde_json::json!({
            "score": { "pawns": 0.4 },
            "source": "engine",
            "depth": 15
        });
        let lines = serde_json::json!([["Nf3", "Nc6"], ["Bc4"]]);

        let result =
            result_from_columns(Some(evaluation), None, Some(lines), Some("Nf3".to_string())).unwrap();
        let eval = result.evaluation.unwrap();
        assert_eq!(eval.score, Score::Pawns(0.4));
        assert_eq!(eval.source, EvalSource::Engine);
        assert_eq!(result.continuations.unwrap()[1], vec!["Bc4".to_string()]);
    }

    #[test]
    fn test_malformed_columns_are_rejected() {
        let err = result_from_columns(Some(serde_json::json!({ "score": 3 })), None, None, None)
            .unwrap_err();
        assert!(matches!(err, StoreError::Malformed(_)));
    }
}
