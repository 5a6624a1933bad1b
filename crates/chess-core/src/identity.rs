//! Canonical position identities.
//!
//! An identity is the FEN shakmaty produces for a position, so two spellings of
//! the same board state (for example an en-passant square nobody can capture on)
//! always compare equal. Identity depends on the position only, never on which
//! line or ply produced it.

use std::fmt;

use serde::{Deserialize, Serialize};
use shakmaty::fen::Fen;
use shakmaty::san::{San, SanPlus};
use shakmaty::{CastlingMode, Chess, EnPassantMode, Position};
use thiserror::Error;

use crate::game_data::Game;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("Invalid ply {ply}: game has {len} plies")]
    InvalidPly { ply: usize, len: usize },

    #[error("Illegal move '{san}' at step {step}")]
    IllegalMove { step: usize, san: String },

    #[error("Invalid position: {0}")]
    InvalidIdentity(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PositionIdentity(String);

impl PositionIdentity {
    pub fn from_position(pos: &Chess) -> Self {
        Self(Fen::from_position(pos, EnPassantMode::Legal).to_string())
    }

    /// Identity of the standard starting position.
    pub fn starting() -> Self {
        Self::from_position(&Chess::default())
    }

    /// Parse and normalize a FEN string.
    pub fn parse(fen: &str) -> Result<Self, IdentityError> {
        let pos = parse_position(fen)?;
        Ok(Self::from_position(&pos))
    }

    /// Rebuild the position this identity describes.
    pub fn position(&self) -> Result<Chess, IdentityError> {
        parse_position(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Placement and side to move only, for log lines.
    pub fn short(&self) -> &str {
        match self.0.find(' ') {
            Some(idx) => &self.0[..(idx + 2).min(self.0.len())],
            None => &self.0,
        }
    }
}

impl fmt::Display for PositionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PositionIdentity {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PositionIdentity> for String {
    fn from(value: PositionIdentity) -> Self {
        value.0
    }
}

fn parse_position(fen: &str) -> Result<Chess, IdentityError> {
    let invalid = || IdentityError::InvalidIdentity(fen.trim().to_string());
    let parsed: Fen = fen.trim().parse().map_err(|_| invalid())?;
    parsed
        .into_position(CastlingMode::Standard)
        .map_err(|_| invalid())
}

/// One step of a replayed move list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariationStep {
    /// Move in normalized SAN (as the rules engine prints it).
    pub san: String,
    /// Identity of the position after the move.
    pub identity: PositionIdentity,
}

/// Play a SAN move (check suffix optional). `step` is 1-based and only used
/// for the error.
pub fn play_san(pos: Chess, san: &str, step: usize) -> Result<(Chess, String), IdentityError> {
    let illegal = || IdentityError::IllegalMove {
        step,
        san: san.trim().to_string(),
    };

    let parsed: SanPlus = san.trim().parse().map_err(|_| illegal())?;
    let mv = parsed.san.to_move(&pos).map_err(|_| illegal())?;
    let normalized = San::from_move(&pos, mv.clone()).to_string();
    let next = pos.play(mv).map_err(|_| illegal())?;

    Ok((next, normalized))
}

/// Replay `moves` from `start`, returning every intermediate step.
pub fn variation_steps<S: AsRef<str>>(
    start: &PositionIdentity,
    moves: &[S],
) -> Result<Vec<VariationStep>, IdentityError> {
    let mut pos = start.position()?;
    let mut steps = Vec::with_capacity(moves.len());

    for (i, san) in moves.iter().enumerate() {
        let (next, normalized) = play_san(pos, san.as_ref(), i + 1)?;
        steps.push(VariationStep {
            san: normalized,
            identity: PositionIdentity::from_position(&next),
        });
        pos = next;
    }

    Ok(steps)
}

/// Identity after replaying `moves` from `start`. An empty list yields `start`.
pub fn identity_for_variation<S: AsRef<str>>(
    start: &PositionIdentity,
    moves: &[S],
) -> Result<PositionIdentity, IdentityError> {
    let steps = variation_steps(start, moves)?;
    Ok(steps
        .into_iter()
        .last()
        .map(|s| s.identity)
        .unwrap_or_else(|| start.clone()))
}

/// Identity of the main line after `ply` half-moves (0 = initial position).
pub fn identity_for_ply(game: &Game, ply: usize) -> Result<PositionIdentity, IdentityError> {
    if ply > game.len() {
        return Err(IdentityError::InvalidPly {
            ply,
            len: game.len(),
        });
    }

    let moves: Vec<&str> = game.plies[..ply].iter().map(|p| p.san.as_str()).collect();
    identity_for_variation(&game.start, &moves)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_data::GameMetadata;

    fn sample_game() -> Game {
        Game::from_moves(
            GameMetadata::default(),
            PositionIdentity::starting(),
            &["e4", "e5", "Nf3", "Nc6", "Bb5", "a6"],
        )
        .unwrap()
    }

    #[test]
    fn test_parse_normalizes_unusable_en_passant() {
        let id = PositionIdentity::parse(
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1",
        )
        .unwrap();
        assert_eq!(
            id.as_str(),
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1"
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            PositionIdentity::parse("not a fen"),
            Err(IdentityError::InvalidIdentity(_))
        ));
    }

    #[test]
    fn test_ply_zero_is_start() {
        let game = sample_game();
        assert_eq!(identity_for_ply(&game, 0).unwrap(), PositionIdentity::starting());
    }

    #[test]
    fn test_ply_matches_stored_identity() {
        let game = sample_game();
        for ply in 1..=game.len() {
            let replayed = identity_for_ply(&game, ply).unwrap();
            assert_eq!(&replayed, game.identity_at(ply).unwrap());
            // Stable across calls
            assert_eq!(replayed, identity_for_ply(&game, ply).unwrap());
        }
    }

    #[test]
    fn test_ply_out_of_range() {
        let game = sample_game();
        assert_eq!(
            identity_for_ply(&game, 7),
            Err(IdentityError::InvalidPly { ply: 7, len: 6 })
        );
    }

    #[test]
    fn test_variation_from_mid_game_matches_main_line() {
        let game = sample_game();
        let start = identity_for_ply(&game, 1).unwrap();
        let id = identity_for_variation(&start, &["e5", "Nf3", "Nc6"]).unwrap();
        assert_eq!(id, identity_for_ply(&game, 4).unwrap());
    }

    #[test]
    fn test_check_suffix_is_accepted() {
        let start = PositionIdentity::starting();
        let plain = identity_for_variation(&start, &["e4", "f5", "Qh5"]).unwrap();
        let suffixed = identity_for_variation(&start, &["e4", "f5", "Qh5+"]).unwrap();
        assert_eq!(plain, suffixed);
    }

    #[test]
    fn test_illegal_move_reports_step() {
        let start = PositionIdentity::starting();
        let err = identity_for_variation(&start, &["e4", "e5", "Ke3"]).unwrap_err();
        assert_eq!(
            err,
            IdentityError::IllegalMove {
                step: 3,
                san: "Ke3".to_string()
            }
        );
    }

    #[test]
    fn test_variation_steps_normalize_san() {
        let start = PositionIdentity::starting();
        let steps = variation_steps(&start, &["e4", "d5", "exd5"]).unwrap();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[2].san, "exd5");
    }

    #[test]
    fn test_serde_round_trip_normalizes() {
        let json = "\"rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1\"";
        let id: PositionIdentity = serde_json::from_str(json).unwrap();
        assert!(id.as_str().contains(" b KQkq - 0 1"));
    }
}
