pub mod groq;
pub mod lichess;
pub mod stockfish;

use std::sync::Arc;

use analysis_core::{EvaluationProvider, ExplanationProvider, TemplateExplainer};

use crate::config::{EvalProviderKind, ProviderConfig};

/// Build the evaluation and explanation providers selected by `config`.
pub fn build_providers(
    config: &ProviderConfig,
) -> (Arc<dyn EvaluationProvider>, Arc<dyn ExplanationProvider>) {
    let evaluator: Arc<dyn EvaluationProvider> = match config.eval_provider {
        EvalProviderKind::Lichess => Arc::new(lichess::LichessClient::new(&config.lichess_base_url)),
        EvalProviderKind::Stockfish => Arc::new(stockfish::StockfishProvider::new(&config.stockfish_path)),
    };

    let explainer: Arc<dyn ExplanationProvider> = match &config.groq_api_key {
        Some(key) => Arc::new(groq::GroqClient::new(key, &config.groq_model)),
        None => {
            tracing::info!("GROQ_API_KEY not set, using template explanations");
            Arc::new(TemplateExplainer)
        }
    };

    tracing::info!(
        evaluator = evaluator.name(),
        explainer = explainer.name(),
        "Analysis providers configured"
    );
    (evaluator, explainer)
}
