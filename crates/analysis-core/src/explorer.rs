//! Side-line exploration from a main-line position.
//!
//! Entering a variation replays its moves once, fails fast on the first
//! illegal one, and drives a cursor of its own. The main-line navigator is
//! never touched, so leaving the variation shows the main line exactly as it
//! was.

use std::sync::Arc;

use chess_core::{variation_steps, IdentityError, PositionIdentity, VariationStep};
use tracing::info;

use crate::cursor::{Completion, DisplayState, InterestToken, NavigationCursor};
use crate::orchestrator::Orchestrator;

pub struct Variation {
    start: PositionIdentity,
    steps: Vec<VariationStep>,
    cursor: NavigationCursor,
}

impl Variation {
    pub fn start(&self) -> &PositionIdentity {
        &self.start
    }

    pub fn steps(&self) -> &[VariationStep] {
        &self.steps
    }

    /// Current step; 0 is the start position, k is after k moves.
    pub fn step(&self) -> usize {
        self.cursor.index()
    }

    pub fn identity(&self) -> &PositionIdentity {
        self.cursor.identity()
    }

    pub fn display(&self) -> &DisplayState {
        self.cursor.display()
    }
}

pub enum ExplorerState {
    Inactive,
    Exploring(Variation),
}

pub struct VariationExplorer {
    orchestrator: Arc<Orchestrator>,
    state: ExplorerState,
}

impl VariationExplorer {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            state: ExplorerState::Inactive,
        }
    }

    pub fn state(&self) -> &ExplorerState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, ExplorerState::Exploring(_))
    }

    pub fn variation(&self) -> Option<&Variation> {
        match &self.state {
            ExplorerState::Exploring(v) => Some(v),
            ExplorerState::Inactive => None,
        }
    }

    fn variation_mut(&mut self) -> Option<&mut Variation> {
        match &mut self.state {
            ExplorerState::Exploring(v) => Some(v),
            ExplorerState::Inactive => None,
        }
    }

    pub fn display(&self) -> Option<&DisplayState> {
        self.variation().map(Variation::display)
    }

    /// Start exploring `moves` from `start` and show the first step.
    ///
    /// On an illegal move the explorer keeps its previous state.
    pub fn enter<S: AsRef<str>>(
        &mut self,
        start: PositionIdentity,
        moves: &[S],
    ) -> Result<InterestToken, IdentityError> {
        let steps = variation_steps(&start, moves)?;

        let identities = std::iter::once(start.clone())
            .chain(steps.iter().map(|s| s.identity.clone()))
            .collect();
        let prefetch = self.orchestrator.config().prefetch_plies;
        let mut cursor = NavigationCursor::new(
            "variation",
            identities,
            Arc::clone(&self.orchestrator),
            prefetch,
        );
        let token = cursor.go_to(1);

        info!(start = %start.short(), moves = steps.len(), "Entered variation");
        self.state = ExplorerState::Exploring(Variation {
            start,
            steps,
            cursor,
        });
        Ok(token)
    }

    /// Jump to step `k` (clamped). `None` when not exploring.
    pub fn step_to(&mut self, step: usize) -> Option<InterestToken> {
        self.variation_mut().map(|v| v.cursor.go_to(step))
    }

    pub fn next(&mut self) -> Option<InterestToken> {
        let step = self.variation()?.step();
        self.step_to(step + 1)
    }

    pub fn previous(&mut self) -> Option<InterestToken> {
        let step = self.variation()?.step();
        self.step_to(step.saturating_sub(1))
    }

    /// Leave the variation. Returns whether one was active.
    pub fn exit(&mut self) -> bool {
        let was_active = self.is_active();
        self.state = ExplorerState::Inactive;
        was_active
    }

    pub fn apply(&mut self, completion: Completion) -> bool {
        self.variation_mut()
            .map(|v| v.cursor.apply(completion))
            .unwrap_or(false)
    }

    pub fn poll(&mut self) -> usize {
        self.variation_mut().map(|v| v.cursor.poll()).unwrap_or(0)
    }

    /// Wait until the current step has settled. `None` when not exploring.
    pub async fn settle(&mut self) -> Option<&DisplayState> {
        match &mut self.state {
            ExplorerState::Exploring(v) => Some(v.cursor.settle().await),
            ExplorerState::Inactive => None,
        }
    }
}
