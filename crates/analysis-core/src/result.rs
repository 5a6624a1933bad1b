//! Analysis results and the rules for merging partial results.

use std::fmt;
use std::ops::BitOr;

use serde::{Deserialize, Serialize};

/// Side that delivers a forced mate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    White,
    Black,
}

/// Engine score, always from White's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Score {
    /// Advantage in pawns, positive favours White.
    Pawns(f64),
    /// Forced mate in `moves` for `winner`. Zero moves means mate is on the board.
    Mate { moves: u32, winner: Side },
}

impl Score {
    pub fn from_centipawns(cp: i32) -> Self {
        Score::Pawns(f64::from(cp) / 100.0)
    }

    /// Mate from a signed move count (positive = White mates).
    pub fn mate_in(moves: i32) -> Self {
        Score::Mate {
            moves: moves.unsigned_abs(),
            winner: if moves > 0 { Side::White } else { Side::Black },
        }
    }

    /// Two scores agree when they would be displayed identically.
    pub fn agrees_with(&self, other: &Score) -> bool {
        match (self, other) {
            (Score::Pawns(a), Score::Pawns(b)) => (a - b).abs() < 0.005,
            (Score::Mate { .. }, Score::Mate { .. }) => self == other,
            _ => false,
        }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Score::Pawns(p) => write!(f, "{:+.2}", p),
            Score::Mate { moves, winner } => {
                let sign = match winner {
                    Side::White => '+',
                    Side::Black => '-',
                };
                write!(f, "#{}{}", sign, moves)
            }
        }
    }
}

/// Where an evaluation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalSource {
    /// Full-depth search from the evaluation provider.
    Engine,
    /// Reduced-depth retry after the full search failed.
    Shallow,
    /// Local material count; no provider was reachable.
    Heuristic,
    /// Game over on the board, no search needed.
    Terminal,
}

impl EvalSource {
    /// Degraded evaluations may later be replaced by a full engine result.
    pub fn is_degraded(self) -> bool {
        matches!(self, EvalSource::Shallow | EvalSource::Heuristic)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub score: Score,
    pub source: EvalSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
}

/// Subset of the analysis fields a caller is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FieldSet(u8);

impl FieldSet {
    pub const NONE: FieldSet = FieldSet(0);
    pub const EVALUATION: FieldSet = FieldSet(1);
    pub const EXPLANATION: FieldSet = FieldSet(1 << 1);
    pub const CONTINUATIONS: FieldSet = FieldSet(1 << 2);
    /// Everything one evaluation-provider call produces.
    pub const ENGINE: FieldSet = FieldSet(1 | 1 << 2);
    pub const ALL: FieldSet = FieldSet(1 | 1 << 1 | 1 << 2);

    pub fn contains(self, other: FieldSet) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: FieldSet) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for FieldSet {
    type Output = FieldSet;

    fn bitor(self, rhs: FieldSet) -> FieldSet {
        FieldSet(self.0 | rhs.0)
    }
}

/// Analysis of one position. Every field is optional; a result is filled in
/// incrementally as providers answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default)]
    pub evaluation: Option<Evaluation>,
    #[serde(default)]
    pub explanation: Option<String>,
    /// Candidate lines in SAN, best first.
    #[serde(default)]
    pub continuations: Option<Vec<Vec<String>>>,
    #[serde(default)]
    pub best_move: Option<String>,
}

/// What happened when a partial result was merged into a stored one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    pub changed: bool,
    /// Set when both sides carried an evaluation and they disagreed.
    /// The stored score is kept.
    pub disagreement: Option<(Score, Score)>,
}

impl AnalysisResult {
    pub fn is_empty(&self) -> bool {
        self.evaluation.is_none()
            && self.explanation.is_none()
            && self.continuations.is_none()
            && self.best_move.is_none()
    }

    /// A result is worth showing once it has an evaluation or an explanation.
    pub fn is_usable(&self) -> bool {
        self.evaluation.is_some() || self.explanation.is_some()
    }

    pub fn present(&self) -> FieldSet {
        let mut fields = FieldSet::NONE;
        if self.evaluation.is_some() {
            fields = fields | FieldSet::EVALUATION;
        }
        if self.explanation.is_some() {
            fields = fields | FieldSet::EXPLANATION;
        }
        if self.continuations.is_some() {
            fields = fields | FieldSet::CONTINUATIONS;
        }
        fields
    }

    pub fn has(&self, fields: FieldSet) -> bool {
        self.present().contains(fields)
    }

    /// Fields of `wanted` that are still absent.
    pub fn missing(&self, wanted: FieldSet) -> FieldSet {
        FieldSet(wanted.0 & !self.present().0)
    }

    /// Evaluation came from a shallow retry or the local heuristic.
    pub fn is_degraded(&self) -> bool {
        self.evaluation.as_ref().is_some_and(|e| e.source.is_degraded())
    }

    /// Fields of `wanted` worth asking a provider for: the absent ones, plus
    /// the engine fields while the evaluation is degraded.
    pub fn unresolved(&self, wanted: FieldSet) -> FieldSet {
        let missing = self.missing(wanted);
        if self.is_degraded() {
            FieldSet(missing.0 | (wanted.0 & FieldSet::ENGINE.0))
        } else {
            missing
        }
    }

    /// Fill absent fields from `incoming`. Present fields are never cleared or
    /// overwritten, except that a degraded evaluation gives way to an engine
    /// one (taking the engine's continuations with it).
    pub fn merge_from(&mut self, incoming: AnalysisResult) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();

        match (&self.evaluation, incoming.evaluation) {
            (None, Some(eval)) => {
                self.evaluation = Some(eval);
                outcome.changed = true;
            }
            (Some(stored), Some(eval))
                if stored.source.is_degraded() && eval.source == EvalSource::Engine =>
            {
                self.evaluation = Some(eval);
                if incoming.continuations.is_some() {
                    self.continuations = incoming.continuations.clone();
                    self.best_move = incoming.best_move.clone();
                }
                outcome.changed = true;
            }
            (Some(stored), Some(eval)) => {
                if !stored.score.agrees_with(&eval.score) {
                    outcome.disagreement = Some((stored.score, eval.score));
                }
            }
            (_, None) => {}
        }

        if self.explanation.is_none() && incoming.explanation.is_some() {
            self.explanation = incoming.explanation;
            outcome.changed = true;
        }
        if self.continuations.is_none() && incoming.continuations.is_some() {
            self.continuations = incoming.continuations;
            outcome.changed = true;
        }
        if self.best_move.is_none() && incoming.best_move.is_some() {
            self.best_move = incoming.best_move;
            outcome.changed = true;
        }

        outcome
    }
}
