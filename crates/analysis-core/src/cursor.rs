//! A navigation cursor over a fixed list of positions.
//!
//! Each move of the cursor issues a new interest token. Analysis completions
//! are delivered on a channel and applied only if their token is still the
//! current one, so a slow answer for an earlier position can never replace
//! the display of a later one.

use std::sync::Arc;

use chess_core::PositionIdentity;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::AnalysisError;
use crate::orchestrator::Orchestrator;
use crate::result::{AnalysisResult, FieldSet};

/// Monotonic marker of the most recent navigation action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct InterestToken(pub u64);

impl InterestToken {
    pub fn next(self) -> Self {
        InterestToken(self.0 + 1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DisplayState {
    Idle,
    Loading,
    Ready(AnalysisResult),
    Unavailable,
}

impl DisplayState {
    pub fn result(&self) -> Option<&AnalysisResult> {
        match self {
            DisplayState::Ready(result) => Some(result),
            _ => None,
        }
    }
}

/// A settled request, tagged with the token and index it was issued for.
#[derive(Debug)]
pub struct Completion {
    pub token: InterestToken,
    pub index: usize,
    pub identity: PositionIdentity,
    pub outcome: Result<AnalysisResult, AnalysisError>,
}

pub struct NavigationCursor {
    label: &'static str,
    identities: Vec<PositionIdentity>,
    index: usize,
    token: InterestToken,
    display: DisplayState,
    orchestrator: Arc<Orchestrator>,
    prefetch: usize,
    tx: mpsc::UnboundedSender<Completion>,
    rx: mpsc::UnboundedReceiver<Completion>,
}

impl NavigationCursor {
    /// `identities` must not be empty; index 0 is where the cursor starts.
    pub fn new(
        label: &'static str,
        identities: Vec<PositionIdentity>,
        orchestrator: Arc<Orchestrator>,
        prefetch: usize,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            label,
            identities,
            index: 0,
            token: InterestToken::default(),
            display: DisplayState::Idle,
            orchestrator,
            prefetch,
            tx,
            rx,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn last_index(&self) -> usize {
        self.identities.len().saturating_sub(1)
    }

    pub fn identity(&self) -> &PositionIdentity {
        &self.identities[self.index]
    }

    pub fn identity_at(&self, index: usize) -> Option<&PositionIdentity> {
        self.identities.get(index)
    }

    pub fn token(&self) -> InterestToken {
        self.token
    }

    pub fn display(&self) -> &DisplayState {
        &self.display
    }

    /// Move to `index` (clamped), request its analysis and prefetch ahead.
    pub fn go_to(&mut self, index: usize) -> InterestToken {
        self.index = index.min(self.last_index());
        self.token = self.token.next();
        self.display = DisplayState::Loading;

        let identity = self.identities[self.index].clone();
        match self.orchestrator.cached(&identity, FieldSet::ALL) {
            Some(hit) if hit.is_degraded() => {
                // Show it now, swap in the engine result when it arrives
                self.display = DisplayState::Ready(hit);
                self.request(self.index, FieldSet::ALL);
            }
            Some(hit) => self.display = DisplayState::Ready(hit),
            None => self.request(self.index, FieldSet::ALL),
        }

        let ahead = (self.index + self.prefetch).min(self.last_index());
        for i in self.index + 1..=ahead {
            let settled = self
                .orchestrator
                .cached(&self.identities[i], FieldSet::ENGINE)
                .is_some_and(|r| !r.is_degraded());
            if !settled {
                self.request(i, FieldSet::ENGINE);
            }
        }

        debug!(
            cursor = self.label,
            index = self.index,
            token = self.token.0,
            ready = matches!(self.display, DisplayState::Ready(_)),
            "Cursor moved"
        );
        self.token
    }

    fn request(&self, index: usize, fields: FieldSet) {
        let orchestrator = Arc::clone(&self.orchestrator);
        let identity = self.identities[index].clone();
        let token = self.token;
        let tx = self.tx.clone();

        tokio::spawn(async move {
            let outcome = orchestrator.analyze(&identity, fields, token).await;
            // Receiver gone means the cursor was dropped
            let _ = tx.send(Completion {
                token,
                index,
                identity,
                outcome,
            });
        });
    }

    /// Apply a completion if it belongs to the current token and position.
    pub fn apply(&mut self, completion: Completion) -> bool {
        if completion.token != self.token || completion.index != self.index {
            trace!(
                cursor = self.label,
                token = completion.token.0,
                current = self.token.0,
                "Discarding stale completion"
            );
            return false;
        }

        match completion.outcome {
            Ok(result) => self.display = DisplayState::Ready(result),
            // An earlier answer stays up if a refresh fails
            Err(_) if matches!(self.display, DisplayState::Ready(_)) => return false,
            Err(AnalysisError::AnalysisUnavailable(_)) => self.display = DisplayState::Unavailable,
            Err(e) => {
                debug!(cursor = self.label, error = %e, "Analysis failed");
                self.display = DisplayState::Unavailable;
            }
        }
        true
    }

    /// Apply every completion already delivered. Returns how many applied.
    pub fn poll(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(completion) = self.rx.try_recv() {
            if self.apply(completion) {
                applied += 1;
            }
        }
        applied
    }

    /// Wait for the next completion without applying it.
    pub async fn next_completion(&mut self) -> Option<Completion> {
        self.rx.recv().await
    }

    /// Apply completions until the current position leaves `Loading`.
    pub async fn settle(&mut self) -> &DisplayState {
        while self.display == DisplayState::Loading {
            match self.rx.recv().await {
                Some(completion) => {
                    self.apply(completion);
                }
                None => break,
            }
        }
        &self.display
    }
}
