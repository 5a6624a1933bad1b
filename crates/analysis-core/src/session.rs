use std::sync::Arc;

use chess_core::Game;

use crate::cursor::{DisplayState, InterestToken};
use crate::error::SessionError;
use crate::explorer::VariationExplorer;
use crate::navigator::MoveNavigator;
use crate::orchestrator::Orchestrator;

/// One user's review of one game: the main-line navigator plus an optional
/// variation being explored from it.
pub struct ReviewSession {
    navigator: MoveNavigator,
    explorer: VariationExplorer,
}

impl ReviewSession {
    pub fn new(game: Arc<Game>, orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            navigator: MoveNavigator::new(game, Arc::clone(&orchestrator)),
            explorer: VariationExplorer::new(orchestrator),
        }
    }

    pub fn navigator(&self) -> &MoveNavigator {
        &self.navigator
    }

    pub fn explorer(&self) -> &VariationExplorer {
        &self.explorer
    }

    /// Main-line navigation. Leaves any active variation.
    pub fn go_to(&mut self, ply: usize) -> InterestToken {
        self.explorer.exit();
        self.navigator.go_to(ply)
    }

    /// Explore candidate line `candidate` of the analysis on display.
    pub fn explore_candidate(&mut self, candidate: usize) -> Result<InterestToken, SessionError> {
        self.navigator.poll();
        let line = self
            .navigator
            .display()
            .result()
            .and_then(|r| r.continuations.as_ref())
            .and_then(|lines| lines.get(candidate))
            .cloned()
            .ok_or(SessionError::NoCandidate(candidate))?;
        self.explore(line.as_slice())
    }

    /// Explore arbitrary moves from the current main-line position.
    pub fn explore<S: AsRef<str>>(&mut self, moves: &[S]) -> Result<InterestToken, SessionError> {
        let start = self.navigator.identity().clone();
        Ok(self.explorer.enter(start, moves)?)
    }

    pub fn step_variation(&mut self, step: usize) -> Option<InterestToken> {
        self.explorer.step_to(step)
    }

    /// Leave the variation; the main line shows what it last had.
    pub fn exit_variation(&mut self) -> bool {
        let exited = self.explorer.exit();
        self.navigator.poll();
        exited
    }

    /// What the user currently sees.
    pub fn visible(&self) -> &DisplayState {
        self.explorer
            .display()
            .unwrap_or_else(|| self.navigator.display())
    }

    pub fn poll(&mut self) {
        self.navigator.poll();
        self.explorer.poll();
    }

    /// Wait until the visible position has settled.
    pub async fn settle(&mut self) -> &DisplayState {
        if self.explorer.is_active() {
            self.explorer.settle().await;
        } else {
            self.navigator.settle().await;
        }
        self.visible()
    }
}
