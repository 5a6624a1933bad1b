use std::time::Duration;

use analysis_core::{AnalysisResult, ExplanationProvider, ProviderError};
use async_trait::async_trait;
use chess_core::PositionIdentity;
use reqwest::{header::RETRY_AFTER, Client, StatusCode};
use serde_json::{json, Value};

const GROQ_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

/// Short natural-language explanations from the Groq chat-completions API.
pub struct GroqClient {
    client: Client,
    api_key: String,
    model: String,
}

impl GroqClient {
    pub fn new(api_key: &str, model: &str) -> Self {
        let client = Client::builder()
            .user_agent("MoveReview/1.0")
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }
}

/// Prompt for one position, using whatever analysis is already known.
pub fn build_prompt(identity: &PositionIdentity, known: &AnalysisResult) -> String {
    let evaluation = known
        .evaluation
        .as_ref()
        .map(|e| e.score.to_string())
        .unwrap_or_else(|| "not yet available".to_string());

    let degraded = known.is_degraded();

    let line = known
        .continuations
        .as_ref()
        .and_then(|lines| lines.first())
        .map(|line| line.iter().take(4).cloned().collect::<Vec<_>>().join(" "));

    let mut prompt = format!(
        "Chess position analysis (at most 40 words).\n\nPosition: {}\nEvaluation (White's view): {}\n",
        identity, evaluation
    );
    match (line, degraded) {
        (Some(line), false) => prompt.push_str(&format!("Engine best line: {line}\n")),
        (Some(line), true) => prompt.push_str(&format!("Suggested moves: {line}\n")),
        (None, _) => prompt.push_str("No engine lines available\n"),
    }
    if degraded {
        prompt.push_str("The evaluation is a rough material count, not an engine search.\n");
    }
    prompt.push_str("\nExplain what the evaluation means and the key factors in the position.");
    prompt
}

/// Text of the first choice in a chat-completions response.
pub fn parse_completion(data: &Value) -> Option<String> {
    data.get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[async_trait]
impl ExplanationProvider for GroqClient {
    fn name(&self) -> &str {
        "groq"
    }

    async fn explain(
        &self,
        identity: &PositionIdentity,
        known: &AnalysisResult,
    ) -> Result<String, ProviderError> {
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": build_prompt(identity, known) }],
            "max_tokens": 80,
            "temperature": 0.2,
        });

        let resp = self
            .client
            .post(GROQ_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("Request error: {e}")))?;

        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<f64>().ok())
                .filter(|secs| secs.is_finite() && *secs >= 0.0)
                .map(Duration::from_secs_f64);
            return Err(ProviderError::RateLimited { retry_after });
        }
        if !resp.status().is_success() {
            return Err(ProviderError::Unavailable(format!("HTTP {}", resp.status())));
        }

        let data: Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("Body read error: {e}")))?;

        parse_completion(&data)
            .ok_or_else(|| ProviderError::Unavailable("Empty completion".to_string()))
    }
}
