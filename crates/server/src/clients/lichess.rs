use std::time::Duration;

use analysis_core::{EngineEval, EvaluationProvider, ProviderError, Score, SearchParams};
use async_trait::async_trait;
use chess_core::notation::uci_line_to_san;
use chess_core::PositionIdentity;
use reqwest::{header::RETRY_AFTER, Client, StatusCode};
use serde_json::Value;
use shakmaty::Chess;

/// Lichess cloud evaluation. Only positions someone already analysed on
/// Lichess are known; anything else comes back as unavailable.
pub struct LichessClient {
    client: Client,
    base_url: String,
}

impl LichessClient {
    pub fn new(base_url: &str) -> Self {
        let client = Client::builder()
            .user_agent("MoveReview/1.0")
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Raw cloud-eval JSON for a FEN.
    pub async fn cloud_eval(&self, fen: &str, multipv: u32) -> Result<Value, ProviderError> {
        let url = format!("{}/api/cloud-eval", self.base_url);

        let resp = self
            .client
            .get(&url)
            .query(&[("fen", fen.to_string()), ("multiPv", multipv.to_string())])
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("Request error: {e}")))?;

        match resp.status() {
            StatusCode::NOT_FOUND => {
                return Err(ProviderError::Unavailable("Position not in cloud database".to_string()))
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = resp
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .map(Duration::from_secs);
                return Err(ProviderError::RateLimited { retry_after });
            }
            status if !status.is_success() => {
                return Err(ProviderError::Unavailable(format!("HTTP {status}")))
            }
            _ => {}
        }

        resp.json::<Value>()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("Body read error: {e}")))
    }
}

/// Turn a cloud-eval response into an [`EngineEval`]. Lichess reports scores
/// from White's side already.
pub fn parse_cloud_eval(pos: &Chess, data: &Value) -> Result<EngineEval, ProviderError> {
    let pvs = data
        .get("pvs")
        .and_then(|v| v.as_array())
        .filter(|pvs| !pvs.is_empty())
        .ok_or_else(|| ProviderError::Unavailable("Cloud eval has no lines".to_string()))?;

    let first = &pvs[0];
    let score = if let Some(mate) = first.get("mate").and_then(|v| v.as_i64()) {
        Score::mate_in(mate as i32)
    } else if let Some(cp) = first.get("cp").and_then(|v| v.as_i64()) {
        Score::from_centipawns(cp as i32)
    } else {
        return Err(ProviderError::Unavailable("Cloud eval line has no score".to_string()));
    };

    let lines = pvs
        .iter()
        .filter_map(|pv| pv.get("moves").and_then(|m| m.as_str()))
        .map(|moves| {
            let uci: Vec<&str> = moves.split_whitespace().collect();
            uci_line_to_san(pos, &uci, uci.len())
        })
        .filter(|line| !line.is_empty())
        .collect();

    Ok(EngineEval {
        score,
        lines,
        depth: data.get("depth").and_then(|d| d.as_u64()).map(|d| d as u32),
    })
}

#[async_trait]
impl EvaluationProvider for LichessClient {
    fn name(&self) -> &str {
        "lichess"
    }

    async fn evaluate(
        &self,
        identity: &PositionIdentity,
        params: SearchParams,
    ) -> Result<EngineEval, ProviderError> {
        let pos = identity
            .position()
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;
        // Cloud evals are precomputed, depth cannot be requested
        let data = self.cloud_eval(identity.as_str(), params.multipv).await?;
        parse_cloud_eval(&pos, &data)
    }
}
