use serde::{Deserialize, Serialize};

use crate::identity::{variation_steps, IdentityError, PositionIdentity};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameMetadata {
    pub white: Option<String>,
    pub black: Option<String>,
    pub result: Option<String>, // "1-0", "0-1", "1/2-1/2", "*"
    pub date: Option<String>,
    pub event: Option<String>,
    pub site: Option<String>,
    pub round: Option<String>,
    pub eco: Option<String>,
}

/// A half-move of the main line and the position it leads to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ply {
    /// 1-based ply number.
    pub number: usize,
    pub san: String,
    pub identity: PositionIdentity,
}

/// A parsed game. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub metadata: GameMetadata,
    pub start: PositionIdentity,
    pub plies: Vec<Ply>,
}

impl Game {
    /// Replay SAN moves from `start` and record the identity after each ply.
    pub fn from_moves<S: AsRef<str>>(
        metadata: GameMetadata,
        start: PositionIdentity,
        moves: &[S],
    ) -> Result<Self, IdentityError> {
        let plies = variation_steps(&start, moves)?
            .into_iter()
            .enumerate()
            .map(|(i, step)| Ply {
                number: i + 1,
                san: step.san,
                identity: step.identity,
            })
            .collect();

        Ok(Self {
            metadata,
            start,
            plies,
        })
    }

    /// Number of plies in the main line.
    pub fn len(&self) -> usize {
        self.plies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plies.is_empty()
    }

    /// Stored identity after `ply` half-moves (0 = start).
    pub fn identity_at(&self, ply: usize) -> Option<&PositionIdentity> {
        match ply {
            0 => Some(&self.start),
            n => self.plies.get(n - 1).map(|p| &p.identity),
        }
    }

    /// SAN of the move that produced `ply`. None for the start position.
    pub fn san_at(&self, ply: usize) -> Option<&str> {
        ply.checked_sub(1)
            .and_then(|i| self.plies.get(i))
            .map(|p| p.san.as_str())
    }

    /// Identities for ply 0 through the final ply.
    pub fn identities(&self) -> Vec<PositionIdentity> {
        std::iter::once(self.start.clone())
            .chain(self.plies.iter().map(|p| p.identity.clone()))
            .collect()
    }

    /// Title in the form "White vs Black".
    pub fn title(&self) -> String {
        format!(
            "{} vs {}",
            self.metadata.white.as_deref().unwrap_or("White"),
            self.metadata.black.as_deref().unwrap_or("Black")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identities_cover_start_and_every_ply() {
        let game = Game::from_moves(
            GameMetadata::default(),
            PositionIdentity::starting(),
            &["d4", "d5", "c4"],
        )
        .unwrap();

        let ids = game.identities();
        assert_eq!(ids.len(), 4);
        assert_eq!(ids[0], PositionIdentity::starting());
        assert_eq!(game.san_at(0), None);
        assert_eq!(game.san_at(3), Some("c4"));
        assert_eq!(game.identity_at(4), None);
        assert_eq!(game.title(), "White vs Black");
    }
}
