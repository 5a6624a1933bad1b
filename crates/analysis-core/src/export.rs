//! Annotated PGN output.

use std::collections::HashMap;
use std::fmt::Write;

use chess_core::Game;
use shakmaty::{Color, Position};

use crate::result::AnalysisResult;
use crate::service::PlyAnalysis;

const LINE_WIDTH: usize = 80;

/// Comment attached to a ply: evaluation, explanation and best move, in that
/// order. `None` when the result has none of them.
pub fn ply_comment(result: &AnalysisResult) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(eval) = &result.evaluation {
        parts.push(format!("[Eval: {}]", eval.score));
    }
    if let Some(text) = &result.explanation {
        // Braces would end the comment early
        let text = text.replace('{', "(").replace('}', ")");
        parts.extend(text.split_whitespace().map(str::to_string));
    }
    if let Some(best) = &result.best_move {
        parts.push(format!("Best: {best}"));
    }
    (!parts.is_empty()).then(|| parts.join(" "))
}

/// Re-emit `game` with an analysis comment after every analysed ply.
/// `headers` are written as given, in order.
pub fn annotated_pgn(headers: &[(String, String)], game: &Game, analyses: &[PlyAnalysis]) -> String {
    let comments: HashMap<usize, String> = analyses
        .iter()
        .filter_map(|a| a.analysis.as_ref().and_then(ply_comment).map(|c| (a.ply, c)))
        .collect();

    let mut out = String::new();
    for (name, value) in headers {
        let value = value.replace('\\', "\\\\").replace('"', "\\\"");
        let _ = writeln!(out, "[{name} \"{value}\"]");
    }
    if !headers.is_empty() {
        out.push('\n');
    }

    let (mut number, mut white) = game
        .start
        .position()
        .map(|pos| (pos.fullmoves().get(), pos.turn() == Color::White))
        .unwrap_or((1, true));

    let mut tokens = Vec::new();
    let mut numbered = false;
    for ply in &game.plies {
        if white {
            tokens.push(format!("{number}."));
        } else if !numbered {
            tokens.push(format!("{number}..."));
        }
        tokens.push(ply.san.clone());
        numbered = true;

        if let Some(comment) = comments.get(&ply.number) {
            tokens.push("{".to_string());
            tokens.extend(comment.split(' ').map(str::to_string));
            tokens.push("}".to_string());
            // Black's reply needs its number repeated after a comment
            numbered = false;
        }

        if !white {
            number += 1;
        }
        white = !white;
    }
    tokens.push(game.metadata.result.clone().unwrap_or_else(|| "*".to_string()));

    let mut line = String::new();
    for token in tokens {
        if !line.is_empty() && line.len() + 1 + token.len() > LINE_WIDTH {
            out.push_str(&line);
            out.push('\n');
            line.clear();
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(&token);
    }
    out.push_str(&line);
    out.push('\n');
    out
}

/// Download name in the form `analyzed_White_vs_Black.pgn`.
pub fn export_filename(game: &Game) -> String {
    let name = |n: &Option<String>| {
        n.as_deref()
            .map(|s| s.trim().replace(char::is_whitespace, "_"))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "Unknown".to_string())
    };
    format!(
        "analyzed_{}_vs_{}.pgn",
        name(&game.metadata.white),
        name(&game.metadata.black)
    )
}
