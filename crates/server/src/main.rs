use std::sync::Arc;

use server::clients;
use server::config;
use server::db;
use server::routes;

use analysis_core::{AnalysisCache, AnalysisService, Orchestrator};
use axum::{routing::{get, post}, Extension, Router};
use db::analysis_cache::PgAnalysisStore;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = config::Config::from_env();

    // Connect to Postgres
    tracing::info!("Connecting to database...");
    let pool = db::pool::create_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run schema migrations
    tracing::info!("Running migrations...");
    db::pool::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    // Providers and the shared orchestrator
    let (evaluator, explainer) = clients::build_providers(&config.providers);
    let orchestrator_config = config.providers.orchestrator.clone();
    let cache = Arc::new(AnalysisCache::with_capacity(orchestrator_config.cache_capacity));
    let store = PgAnalysisStore::new(pool.clone());
    let orchestrator = Orchestrator::new(cache, evaluator, explainer, orchestrator_config)
        .with_store(Arc::new(store));
    let service = AnalysisService::new(Arc::new(orchestrator));

    // CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        // Health
        .route("/health", get(routes::health::health_check))
        // Games
        .route("/api/upload_pgn", post(routes::games::upload_pgn))
        .route("/api/games", get(routes::games::list_games))
        .route("/api/games/{game_id}", get(routes::games::get_game_by_id))
        .route("/api/games/{game_id}/analyze", post(routes::analysis::analyze_game))
        .route("/api/games/{game_id}/analyze_limited", post(routes::analysis::analyze_limited))
        .route("/api/games/{game_id}/analysis", get(routes::analysis::game_analysis))
        .route("/api/games/{game_id}/export", get(routes::analysis::export_game))
        // Analysis
        .route("/api/analyse_move", post(routes::analysis::analyse_move))
        .route("/api/explore_variation", post(routes::analysis::explore_variation))
        .route("/api/analysis/invalidate", post(routes::analysis::invalidate))
        // Shared state
        .layer(Extension(pool))
        .layer(Extension(service))
        .layer(cors);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    axum::serve(listener, app).await.expect("Server error");
}
