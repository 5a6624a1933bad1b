use std::env;

use analysis_core::OrchestratorConfig;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EvalProviderKind {
    Lichess,
    Stockfish,
}

/// Provider selection, shared by the server and the CLI.
#[derive(Clone, Debug)]
pub struct ProviderConfig {
    pub eval_provider: EvalProviderKind,
    pub lichess_base_url: String,
    pub stockfish_path: String,
    pub groq_api_key: Option<String>,
    pub groq_model: String,
    pub orchestrator: OrchestratorConfig,
}

impl ProviderConfig {
    pub fn from_env() -> Self {
        let mut orchestrator = OrchestratorConfig::from_env();
        // The server always has something to show unless told otherwise
        if env::var("LOCAL_FALLBACK").is_err() {
            orchestrator.local_fallback = true;
        }

        Self {
            eval_provider: match env::var("EVAL_PROVIDER").as_deref() {
                Ok("stockfish") => EvalProviderKind::Stockfish,
                _ => EvalProviderKind::Lichess,
            },
            lichess_base_url: env::var("LICHESS_BASE_URL")
                .unwrap_or_else(|_| "https://lichess.org".to_string()),
            stockfish_path: env::var("STOCKFISH_PATH")
                .unwrap_or_else(|_| "stockfish".to_string()),
            groq_api_key: env::var("GROQ_API_KEY").ok().filter(|k| !k.is_empty()),
            groq_model: env::var("GROQ_MODEL")
                .unwrap_or_else(|_| "llama-3.1-8b-instant".to_string()),
            orchestrator,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub providers: ProviderConfig,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL")
                .expect("DATABASE_URL must be set"),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8000),
            providers: ProviderConfig::from_env(),
        }
    }
}
