use std::sync::Arc;

use chess_core::{Game, PositionIdentity};

use crate::cursor::{Completion, DisplayState, InterestToken, NavigationCursor};
use crate::orchestrator::Orchestrator;

/// Steps through the main line of a game. Ply 0 is the initial position.
pub struct MoveNavigator {
    game: Arc<Game>,
    cursor: NavigationCursor,
}

impl MoveNavigator {
    pub fn new(game: Arc<Game>, orchestrator: Arc<Orchestrator>) -> Self {
        let prefetch = orchestrator.config().prefetch_plies;
        let cursor = NavigationCursor::new("main", game.identities(), orchestrator, prefetch);
        Self { game, cursor }
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    pub fn current_ply(&self) -> usize {
        self.cursor.index()
    }

    pub fn identity(&self) -> &PositionIdentity {
        self.cursor.identity()
    }

    /// SAN of the move that led to the current position.
    pub fn current_san(&self) -> Option<&str> {
        self.game.san_at(self.cursor.index())
    }

    pub fn token(&self) -> InterestToken {
        self.cursor.token()
    }

    pub fn display(&self) -> &DisplayState {
        self.cursor.display()
    }

    /// Jump to `ply`, clamped to the game length.
    pub fn go_to(&mut self, ply: usize) -> InterestToken {
        self.cursor.go_to(ply)
    }

    pub fn next(&mut self) -> InterestToken {
        self.go_to(self.current_ply() + 1)
    }

    pub fn previous(&mut self) -> InterestToken {
        self.go_to(self.current_ply().saturating_sub(1))
    }

    pub fn first(&mut self) -> InterestToken {
        self.go_to(0)
    }

    pub fn last(&mut self) -> InterestToken {
        self.go_to(self.game.len())
    }

    pub fn apply(&mut self, completion: Completion) -> bool {
        self.cursor.apply(completion)
    }

    pub fn poll(&mut self) -> usize {
        self.cursor.poll()
    }

    pub async fn next_completion(&mut self) -> Option<Completion> {
        self.cursor.next_completion().await
    }

    pub async fn settle(&mut self) -> &DisplayState {
        self.cursor.settle().await
    }
}
