//! Step through a PGN file move by move and print the analysis of each
//! position, using the same providers as the server.
//!
//! Usage: cargo run --bin review-pgn -- <game.pgn> [--plies N] [--annotate]
//!
//! `--annotate` finishes with the game re-emitted as PGN, one analysis
//! comment per reviewed ply.
//!
//! No database is needed; results are only cached for the run.

use std::env;
use std::fs;
use std::sync::Arc;

use analysis_core::{
    annotated_pgn, AnalysisCache, AnalysisService, DisplayState, MoveNavigator, Orchestrator,
};
use anyhow::{bail, Context};
use chess_core::pgn::{headers, parse_pgn};
use server::clients::build_providers;
use server::config::ProviderConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let args: Vec<String> = env::args().collect();
    let Some(path) = args.get(1) else {
        bail!("usage: review-pgn <game.pgn> [--plies N] [--annotate]");
    };
    let max_plies = match args.iter().position(|a| a == "--plies") {
        Some(i) => Some(
            args.get(i + 1)
                .context("--plies needs a value")?
                .parse::<usize>()
                .context("--plies must be a number")?,
        ),
        None => None,
    };
    let annotate = args.iter().any(|a| a == "--annotate");

    let pgn = fs::read_to_string(path).with_context(|| format!("Failed to read {path}"))?;
    let game = Arc::new(parse_pgn(&pgn)?);

    let config = ProviderConfig::from_env();
    let (evaluator, explainer) = build_providers(&config);
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(AnalysisCache::new()),
        evaluator,
        explainer,
        config.orchestrator.clone(),
    ));

    println!("{}", game.title());
    println!();

    let last = max_plies.map_or(game.len(), |n| n.min(game.len()));
    let mut navigator = MoveNavigator::new(Arc::clone(&game), Arc::clone(&orchestrator));

    for ply in 0..=last {
        navigator.go_to(ply);
        let label = match navigator.current_san() {
            Some(san) if ply % 2 == 1 => format!("{}. {san}", ply.div_ceil(2)),
            Some(san) => format!("{}... {san}", ply / 2),
            None => "start".to_string(),
        };

        match navigator.settle().await {
            DisplayState::Ready(result) => {
                let eval = result
                    .evaluation
                    .as_ref()
                    .map(|e| format!("{} ({:?})", e.score, e.source))
                    .unwrap_or_else(|| "-".to_string());
                println!("{label:<14} {eval}");
                if let Some(best) = &result.best_move {
                    println!("{:<14} best: {best}", "");
                }
                if let Some(text) = &result.explanation {
                    println!("{:<14} {text}", "");
                }
            }
            DisplayState::Unavailable => println!("{label:<14} analysis unavailable"),
            DisplayState::Idle | DisplayState::Loading => println!("{label:<14} ..."),
        }
    }

    if annotate {
        let known = AnalysisService::new(orchestrator).game_analysis(&game).await;
        println!();
        print!("{}", annotated_pgn(&headers(&pgn), &game, &known));
    }

    Ok(())
}
