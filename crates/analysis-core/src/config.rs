use std::env;
use std::time::Duration;

use crate::providers::SearchParams;

/// Tunables for the orchestrator and the navigation cursors.
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Full-depth search requested first.
    pub search: SearchParams,
    /// Reduced search used when the full one fails.
    pub shallow_search: SearchParams,
    /// Longest continuation kept per candidate line.
    pub max_line_moves: usize,
    /// Longest variation a single request may replay.
    pub max_variation_moves: usize,
    /// Plies ahead of the current one to warm in the background.
    pub prefetch_plies: usize,
    pub rate_limit_retries: u32,
    pub rate_limit_backoff: Duration,
    pub max_backoff: Duration,
    /// How long an explanation waits for the evaluation of the same position
    /// before asking without one.
    pub explanation_wait: Duration,
    /// Calls allowed in flight per provider.
    pub max_concurrent_provider_calls: usize,
    /// Cache entry limit; `None` keeps everything for the session.
    pub cache_capacity: Option<usize>,
    /// Fall back to a local material count and template explanation.
    pub local_fallback: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            search: SearchParams { depth: 15, multipv: 3 },
            shallow_search: SearchParams { depth: 8, multipv: 1 },
            max_line_moves: 8,
            max_variation_moves: 10,
            prefetch_plies: 2,
            rate_limit_retries: 3,
            rate_limit_backoff: Duration::from_millis(1000),
            max_backoff: Duration::from_secs(30),
            explanation_wait: Duration::from_secs(3),
            max_concurrent_provider_calls: 4,
            cache_capacity: None,
            local_fallback: false,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let depth = env_parse("EVAL_DEPTH").unwrap_or(defaults.search.depth);
        let multipv = env_parse::<u32>("EVAL_MULTIPV")
            .unwrap_or(defaults.search.multipv)
            .clamp(1, 5);
        let shallow_depth = env_parse("SHALLOW_DEPTH").unwrap_or(defaults.shallow_search.depth);

        Self {
            search: SearchParams { depth, multipv },
            shallow_search: SearchParams {
                depth: shallow_depth,
                multipv: 1,
            },
            max_line_moves: env_parse("MAX_LINE_MOVES").unwrap_or(defaults.max_line_moves),
            max_variation_moves: env_parse("MAX_VARIATION_MOVES")
                .unwrap_or(defaults.max_variation_moves),
            prefetch_plies: env_parse("PREFETCH_PLIES").unwrap_or(defaults.prefetch_plies),
            rate_limit_retries: env_parse("RATE_LIMIT_RETRIES")
                .unwrap_or(defaults.rate_limit_retries),
            rate_limit_backoff: env_parse("RATE_LIMIT_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.rate_limit_backoff),
            max_backoff: defaults.max_backoff,
            explanation_wait: env_parse("EXPLANATION_WAIT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.explanation_wait),
            max_concurrent_provider_calls: env_parse::<usize>("MAX_CONCURRENT_PROVIDER_CALLS")
                .unwrap_or(defaults.max_concurrent_provider_calls)
                .max(1),
            cache_capacity: env_parse::<usize>("ANALYSIS_CACHE_CAPACITY").filter(|&n| n > 0),
            local_fallback: env::var("LOCAL_FALLBACK")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .unwrap_or(defaults.local_fallback),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}
