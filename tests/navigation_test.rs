//! Navigator, variation explorer and review session against scripted
//! providers.

mod common;

use std::sync::Arc;
use std::time::Duration;

use analysis_core::{
    annotated_pgn, AnalysisError, AnalysisResult, AnalysisService, DisplayState, EvalSource,
    Evaluation, FieldSet, MoveNavigator, ReviewSession, Score, SessionError,
};
use chess_core::{identity_for_variation, PositionIdentity};
use common::*;

#[tokio::test]
async fn test_navigator_shows_latest_position_only() {
    let game = sample_game();
    let evaluator = ScriptedEvaluator::new(Duration::from_millis(20));
    evaluator.set_score(&game.plies[2].identity, Score::Pawns(0.3));
    evaluator.set_score(&game.plies[4].identity, Score::Pawns(0.5));
    let orch = orchestrator(evaluator, ScriptedExplainer::new(Duration::ZERO), fast_config());
    let mut navigator = MoveNavigator::new(Arc::clone(&game), orch);

    let stale = navigator.go_to(5);
    let current = navigator.go_to(3);
    assert!(current > stale);
    assert_eq!(navigator.current_ply(), 3);
    assert_eq!(*navigator.display(), DisplayState::Loading);

    let mut saw_stale = false;
    while !saw_stale || *navigator.display() == DisplayState::Loading {
        let completion = navigator.next_completion().await.unwrap();
        let is_stale = completion.token == stale && completion.index == 5;
        let applied = navigator.apply(completion);
        if is_stale {
            assert!(!applied);
            saw_stale = true;
        }
    }

    assert_eq!(navigator.current_ply(), 3);
    assert_eq!(navigator.current_san(), Some("Nf3"));
    let result = navigator.display().result().unwrap();
    assert_eq!(result.evaluation.as_ref().unwrap().score, Score::Pawns(0.3));
}

#[tokio::test]
async fn test_navigator_prefetches_following_plies() {
    let game = sample_game();
    let evaluator = ScriptedEvaluator::new(Duration::ZERO);
    let orch = orchestrator(evaluator.clone(), ScriptedExplainer::new(Duration::ZERO), fast_config());
    let mut navigator = MoveNavigator::new(Arc::clone(&game), Arc::clone(&orch));

    navigator.go_to(2);
    navigator.settle().await;

    let ahead = [game.plies[2].identity.clone(), game.plies[3].identity.clone()];
    assert!(eventually(|| ahead.iter().all(|id| orch.cached(id, FieldSet::ENGINE).is_some())).await);

    // Prefetched plies open without another evaluation
    let before = evaluator.calls_for(&ahead[0]);
    navigator.next();
    navigator.settle().await;
    assert_eq!(evaluator.calls_for(&ahead[0]), before);
    assert!(navigator.display().result().unwrap().explanation.is_some());
}

#[tokio::test]
async fn test_navigator_clamps_to_game_length() {
    let game = sample_game();
    let orch = orchestrator(
        ScriptedEvaluator::new(Duration::ZERO),
        ScriptedExplainer::new(Duration::ZERO),
        fast_config(),
    );
    let mut navigator = MoveNavigator::new(Arc::clone(&game), orch);

    navigator.go_to(100);
    assert_eq!(navigator.current_ply(), game.len());
    navigator.first();
    assert_eq!(navigator.current_ply(), 0);
    assert_eq!(navigator.current_san(), None);
    navigator.previous();
    assert_eq!(navigator.current_ply(), 0);
    assert_eq!(navigator.identity(), &game.start);
}

#[tokio::test]
async fn test_variation_reuses_main_line_analysis() {
    let game = sample_game();
    let evaluator = ScriptedEvaluator::new(Duration::ZERO);
    let orch = orchestrator(evaluator.clone(), ScriptedExplainer::new(Duration::ZERO), fast_config());

    // After 1. e4 e5 2. Nf3 Nc6
    let ply4 = game.plies[3].identity.clone();
    orch.analyze(&ply4, FieldSet::ALL, orch.next_token()).await.unwrap();
    assert_eq!(evaluator.calls_for(&ply4), 1);

    let mut session = ReviewSession::new(Arc::clone(&game), Arc::clone(&orch));
    session.go_to(1);
    session.settle().await;
    session.explore(&["e5", "Nf3", "Nc6"]).unwrap();

    session.step_variation(3);
    let variation = session.explorer().variation().unwrap();
    assert_eq!(variation.identity(), &ply4);
    let DisplayState::Ready(result) = session.visible() else {
        panic!("variation step should be served from cache");
    };
    assert_eq!(result.evaluation.as_ref().unwrap().score, Score::Pawns(0.4));
    assert_eq!(evaluator.calls_for(&ply4), 1);
}

#[tokio::test]
async fn test_session_explores_candidate_and_returns_to_main_line() {
    let game = sample_game();
    let orch = orchestrator(
        ScriptedEvaluator::new(Duration::ZERO),
        ScriptedExplainer::new(Duration::ZERO),
        fast_config(),
    );
    let mut session = ReviewSession::new(Arc::clone(&game), orch);

    session.go_to(0);
    let main = session.settle().await.clone();
    assert!(main.result().is_some());

    // Scripted first candidate is e4 e5 Nf3
    session.explore_candidate(0).unwrap();
    assert!(session.explorer().is_active());
    session.settle().await;
    let variation = session.explorer().variation().unwrap();
    assert_eq!(variation.step(), 1);
    assert_eq!(variation.steps().len(), 3);
    assert_eq!(
        variation.identity(),
        &identity_for_variation(&PositionIdentity::starting(), &["e4"]).unwrap()
    );

    session.step_variation(3);
    session.settle().await;
    assert!(session.visible().result().is_some());

    assert!(session.exit_variation());
    assert!(!session.explorer().is_active());
    assert_eq!(*session.visible(), main);

    let err = session.explore_candidate(7).unwrap_err();
    assert!(matches!(err, SessionError::NoCandidate(7)));
}

#[tokio::test]
async fn test_illegal_variation_keeps_explorer_state() {
    let game = sample_game();
    let orch = orchestrator(
        ScriptedEvaluator::new(Duration::ZERO),
        ScriptedExplainer::new(Duration::ZERO),
        fast_config(),
    );
    let mut session = ReviewSession::new(game, orch);

    session.go_to(0);
    session.explore(&["d4", "d5"]).unwrap();
    assert!(session.explore(&["d4", "Ke7"]).is_err());

    let variation = session.explorer().variation().unwrap();
    assert_eq!(variation.steps()[1].san, "d5");
}

#[tokio::test]
async fn test_main_line_navigation_exits_variation() {
    let game = sample_game();
    let orch = orchestrator(
        ScriptedEvaluator::new(Duration::ZERO),
        ScriptedExplainer::new(Duration::ZERO),
        fast_config(),
    );
    let mut session = ReviewSession::new(game, orch);

    session.go_to(2);
    session.explore(&["Nf3"]).unwrap();
    assert!(session.explorer().is_active());

    session.go_to(4);
    assert!(!session.explorer().is_active());
    assert_eq!(session.navigator().current_ply(), 4);
}

#[tokio::test]
async fn test_service_variation_analysis() {
    let evaluator = ScriptedEvaluator::new(Duration::ZERO);
    let orch = orchestrator(evaluator.clone(), ScriptedExplainer::new(Duration::ZERO), fast_config());
    let service = AnalysisService::new(orch);
    let start = PositionIdentity::starting();

    let steps = service
        .request_variation_analysis(&start, &["e4", "c5", "Nf3"])
        .await
        .unwrap();
    assert_eq!(steps.len(), 3);
    assert_eq!(steps[2].step, 3);
    assert_eq!(steps[2].san, "Nf3");
    assert!(steps.iter().all(|s| s.analysis.is_some()));

    let calls = evaluator.calls();
    let err = service
        .request_variation_analysis(&start, &["e4", "e4"])
        .await
        .unwrap_err();
    assert!(matches!(err, AnalysisError::Identity(_)));
    assert_eq!(evaluator.calls(), calls);

    let long: Vec<&str> = ["Nf3", "Nf6", "Ng1", "Ng8"].repeat(3);
    let err = service.request_variation_analysis(&start, &long).await.unwrap_err();
    assert!(matches!(err, AnalysisError::VariationTooLong { len: 12, max: 10 }));
}

#[tokio::test]
async fn test_service_main_analysis_warms_next_plies() {
    let game = sample_game();
    let evaluator = ScriptedEvaluator::new(Duration::ZERO);
    let orch = orchestrator(evaluator.clone(), ScriptedExplainer::new(Duration::ZERO), fast_config());
    let service = AnalysisService::new(Arc::clone(&orch));

    let result = service.request_main_analysis(&game, 0).await.unwrap();
    assert!(result.has(FieldSet::ALL));

    let next = game.plies[0].identity.clone();
    assert!(eventually(|| orch.cached(&next, FieldSet::ENGINE).is_some()).await);

    let err = service.request_main_analysis(&game, game.len() + 1).await.unwrap_err();
    assert!(matches!(err, AnalysisError::Identity(_)));
}

#[tokio::test]
async fn test_navigator_replaces_degraded_display_with_engine_result() {
    let game = sample_game();
    let evaluator = ScriptedEvaluator::new(Duration::from_millis(20));
    let orch = orchestrator(evaluator.clone(), ScriptedExplainer::new(Duration::ZERO), fast_config());
    let id = game.plies[0].identity.clone();
    orch.cache().merge(
        &id,
        AnalysisResult {
            evaluation: Some(Evaluation {
                score: Score::Pawns(1.0),
                source: EvalSource::Heuristic,
                depth: None,
            }),
            explanation: Some("Material is level".to_string()),
            continuations: Some(vec![vec!["Nc6".to_string()]]),
            best_move: Some("Nc6".to_string()),
        },
    );
    let mut navigator = MoveNavigator::new(Arc::clone(&game), orch);

    navigator.go_to(1);
    let shown = navigator.display().result().unwrap();
    assert_eq!(shown.evaluation.as_ref().unwrap().source, EvalSource::Heuristic);

    loop {
        let completion = navigator.next_completion().await.unwrap();
        if navigator.apply(completion) {
            break;
        }
    }
    let upgraded = navigator.display().result().unwrap();
    assert_eq!(upgraded.evaluation.as_ref().unwrap().source, EvalSource::Engine);
    assert_eq!(upgraded.best_move.as_deref(), Some("e4"));
    assert_eq!(upgraded.explanation.as_deref(), Some("Material is level"));
    assert_eq!(evaluator.calls_for(&id), 1);
}

#[tokio::test]
async fn test_service_analyzes_whole_game_and_window() {
    let game = sample_game();
    let evaluator = ScriptedEvaluator::new(Duration::ZERO);
    let explainer = ScriptedExplainer::new(Duration::ZERO);
    let orch = orchestrator(evaluator.clone(), explainer.clone(), fast_config());
    let service = AnalysisService::new(orch);

    let window = service.analyze_window(&game, 3, false).await.unwrap();
    assert_eq!(window.iter().map(|p| p.ply).collect::<Vec<_>>(), vec![3, 4, 5]);
    assert!(window.iter().all(|p| p.analysis.as_ref().unwrap().explanation.is_none()));
    assert_eq!(explainer.calls(), 0);

    let from_start = service.analyze_window(&game, 0, false).await.unwrap();
    assert_eq!(from_start.iter().map(|p| p.ply).collect::<Vec<_>>(), vec![1, 2]);

    let all = service.analyze_game(&game, true).await.unwrap();
    assert_eq!(all.len(), game.len());
    assert_eq!(all[2].san, "Nf3");
    assert!(all.iter().all(|p| p.analysis.as_ref().unwrap().has(FieldSet::ALL)));
    assert_eq!(evaluator.calls(), game.len());
    assert_eq!(explainer.calls(), game.len());

    // Scripted best move is e4, never the reply here; the last ply has no reply
    assert_eq!(all[0].played_best, Some(false));
    assert_eq!(all[7].played_best, None);
}

#[tokio::test]
async fn test_service_game_analysis_reads_store_without_providers() {
    let game = sample_game();
    let store = Arc::new(MemoryStore::default());
    store.insert(
        &game.plies[1].identity,
        AnalysisResult {
            evaluation: Some(engine_evaluation(0.2)),
            best_move: Some("Nf3+".to_string()),
            ..Default::default()
        },
    );
    let evaluator = ScriptedEvaluator::new(Duration::ZERO);
    let service = AnalysisService::new(orchestrator_with_store(
        evaluator.clone(),
        ScriptedExplainer::new(Duration::ZERO),
        store,
    ));

    let known = service.game_analysis(&game).await;
    assert_eq!(known.len(), 1);
    assert_eq!(known[0].ply, 2);
    assert_eq!(known[0].played_best, Some(true));
    assert_eq!(evaluator.calls(), 0);

    let pgn = annotated_pgn(&[], &game, &known);
    assert!(pgn.contains("1. e4 e5 { [Eval: +0.20] Best: Nf3+ } 2. Nf3 Nc6"));
}
