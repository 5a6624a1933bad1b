//! In-memory analysis cache keyed by position identity.
//!
//! Entries only grow: a merge fills absent fields and never clears one, so a
//! reader can never observe a result that regressed.

use std::collections::HashMap;

use chess_core::PositionIdentity;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::result::{AnalysisResult, Score};

/// Two evaluations of the same position that did not match.
#[derive(Debug, Clone, PartialEq)]
pub struct Disagreement {
    pub identity: PositionIdentity,
    pub kept: Score,
    pub rejected: Score,
}

struct CacheEntry {
    result: AnalysisResult,
    version: u64,
    last_used: u64,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<PositionIdentity, CacheEntry>,
    tick: u64,
    disagreements: Vec<Disagreement>,
}

pub struct AnalysisCache {
    inner: Mutex<CacheInner>,
    capacity: Option<usize>,
}

impl Default for AnalysisCache {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisCache {
    /// Unbounded cache, lives for the session.
    pub fn new() -> Self {
        Self::with_capacity(None)
    }

    /// With a capacity, the least recently used entry is evicted on overflow.
    pub fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            capacity: capacity.filter(|&c| c > 0),
        }
    }

    pub fn get(&self, identity: &PositionIdentity) -> Option<AnalysisResult> {
        let mut inner = self.inner.lock();
        inner.tick += 1;
        let tick = inner.tick;
        inner.entries.get_mut(identity).map(|entry| {
            entry.last_used = tick;
            entry.result.clone()
        })
    }

    /// How many times the entry has changed since it was created.
    pub fn version(&self, identity: &PositionIdentity) -> Option<u64> {
        self.inner.lock().entries.get(identity).map(|e| e.version)
    }

    /// Merge a partial result and return the stored result afterwards.
    ///
    /// An empty partial never creates an entry, so `None` means nothing is
    /// known about the position.
    pub fn merge(&self, identity: &PositionIdentity, partial: AnalysisResult) -> Option<AnalysisResult> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.tick += 1;
        let tick = inner.tick;

        let merged = match inner.entries.get_mut(identity) {
            Some(entry) => {
                let outcome = entry.result.merge_from(partial);
                entry.last_used = tick;
                if outcome.changed {
                    entry.version += 1;
                }
                let merged = entry.result.clone();
                if let Some((kept, rejected)) = outcome.disagreement {
                    warn!(
                        identity = %identity.short(),
                        kept = %kept,
                        rejected = %rejected,
                        "Conflicting evaluations, keeping the first"
                    );
                    inner.disagreements.push(Disagreement {
                        identity: identity.clone(),
                        kept,
                        rejected,
                    });
                }
                merged
            }
            None if partial.is_empty() => return None,
            None => {
                inner.entries.insert(
                    identity.clone(),
                    CacheEntry {
                        result: partial.clone(),
                        version: 0,
                        last_used: tick,
                    },
                );
                evict_overflow(inner, self.capacity);
                partial
            }
        };

        Some(merged)
    }

    /// Drop an entry so the next request re-resolves it.
    pub fn invalidate(&self, identity: &PositionIdentity) -> bool {
        let removed = self.inner.lock().entries.remove(identity).is_some();
        if removed {
            debug!(identity = %identity.short(), "Invalidated cached analysis");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn disagreements(&self) -> Vec<Disagreement> {
        self.inner.lock().disagreements.clone()
    }
}

fn evict_overflow(inner: &mut CacheInner, capacity: Option<usize>) {
    let Some(capacity) = capacity else {
        return;
    };
    while inner.entries.len() > capacity {
        let oldest = inner
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_used)
            .map(|(id, _)| id.clone());
        match oldest {
            Some(id) => {
                inner.entries.remove(&id);
                debug!(identity = %id.short(), "Evicted cached analysis");
            }
            None => break,
        }
    }
}
