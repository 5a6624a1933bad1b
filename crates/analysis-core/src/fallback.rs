//! Local analysis used when providers are unreachable or unnecessary.

use async_trait::async_trait;
use chess_core::PositionIdentity;
use shakmaty::san::San;
use shakmaty::{Chess, Color, Position, Role, Square};

use crate::error::ProviderError;
use crate::providers::ExplanationProvider;
use crate::result::{AnalysisResult, EvalSource, Evaluation, Score, Side};

const CENTER: [Square; 4] = [Square::E4, Square::D4, Square::E5, Square::D5];
const MATERIAL: [(Role, f64); 5] = [
    (Role::Pawn, 1.0),
    (Role::Knight, 3.0),
    (Role::Bishop, 3.0),
    (Role::Rook, 5.0),
    (Role::Queen, 9.0),
];

/// Evaluation of a finished game, or `None` if play continues.
pub fn terminal_evaluation(pos: &Chess) -> Option<Evaluation> {
    let score = if pos.is_checkmate() {
        let winner = match pos.turn() {
            Color::White => Side::Black,
            Color::Black => Side::White,
        };
        Score::Mate { moves: 0, winner }
    } else if pos.is_stalemate() || pos.is_insufficient_material() || pos.halfmoves() >= 150 {
        Score::Pawns(0.0)
    } else {
        return None;
    };

    Some(Evaluation {
        score,
        source: EvalSource::Terminal,
        depth: None,
    })
}

/// Material balance plus small centre and king-safety terms.
pub fn heuristic_evaluation(pos: &Chess) -> Evaluation {
    let board = pos.board();

    let mut score = 0.0;
    for (role, value) in MATERIAL {
        let white = (board.by_color(Color::White) & board.by_role(role)).count() as f64;
        let black = (board.by_color(Color::Black) & board.by_role(role)).count() as f64;
        score += (white - black) * value;
    }

    for sq in CENTER {
        match board.piece_at(sq).map(|p| p.color) {
            Some(Color::White) => score += 0.1,
            Some(Color::Black) => score -= 0.1,
            None => {}
        }
    }

    if pos.is_check() {
        score += match pos.turn() {
            Color::White => -0.2,
            Color::Black => 0.2,
        };
    }

    Evaluation {
        score: Score::Pawns((score * 100.0).round() / 100.0),
        source: EvalSource::Heuristic,
        depth: None,
    }
}

/// Up to `count` single-move suggestions: captures, then checks, then moves
/// into the centre.
pub fn suggested_moves(pos: &Chess, count: usize) -> Vec<Vec<String>> {
    let mut ranked: Vec<(String, u8)> = pos
        .legal_moves()
        .iter()
        .map(|m| {
            let priority = if m.is_capture() {
                3
            } else if gives_check(pos, m) {
                2
            } else if CENTER.contains(&m.to()) {
                1
            } else {
                0
            };
            (San::from_move(pos, m.clone()).to_string(), priority)
        })
        .collect();

    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked
        .into_iter()
        .take(count)
        .map(|(san, _)| vec![san])
        .collect()
}

fn gives_check(pos: &Chess, m: &shakmaty::Move) -> bool {
    let mut after = pos.clone();
    after.play_unchecked(m.clone());
    after.is_check()
}

/// Plain-language summary built from whatever analysis is known.
pub fn describe(known: &AnalysisResult) -> String {
    let Some(eval) = &known.evaluation else {
        return "Position analysis unavailable. No engine could evaluate this position.".to_string();
    };

    if eval.source == EvalSource::Terminal {
        return match eval.score {
            Score::Mate { .. } => "Checkmate position reached.".to_string(),
            Score::Pawns(_) => "The game has ended in a draw.".to_string(),
        };
    }

    let mut text = match eval.score {
        Score::Mate { moves, winner } => {
            let side = match winner {
                Side::White => "White",
                Side::Black => "Black",
            };
            format!("{side} has a forced mate in {moves}. ")
        }
        Score::Pawns(p) if p > 2.0 => format!("White has a significant advantage (+{p:.1}). "),
        Score::Pawns(p) if p < -2.0 => format!("Black has a significant advantage ({p:.1}). "),
        Score::Pawns(p) if p > 0.5 => format!("White is slightly better (+{p:.1}). "),
        Score::Pawns(p) if p < -0.5 => format!("Black is slightly better ({p:.1}). "),
        Score::Pawns(p) => format!("Position is roughly equal ({p:.1}). "),
    };

    if let Some(best) = &known.best_move {
        text.push_str(&format!("Best move: {best}."));
    }
    if eval.source.is_degraded() {
        text.push_str(" (Basic analysis, engine evaluation unavailable)");
    }

    text.trim_end().to_string()
}

/// Explanation provider that never leaves the process.
pub struct TemplateExplainer;

#[async_trait]
impl ExplanationProvider for TemplateExplainer {
    fn name(&self) -> &str {
        "template"
    }

    async fn explain(
        &self,
        _identity: &PositionIdentity,
        known: &AnalysisResult,
    ) -> Result<String, ProviderError> {
        Ok(describe(known))
    }
}
