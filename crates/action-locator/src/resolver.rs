//! Locator resolver: target description + snapshot -> ranked candidates

use action_primitives::PageSnapshot;
use std::cmp::Ordering;
use tracing::debug;

use crate::{
    errors::LocatorError,
    strategies::{default_strategies, Strategy},
    types::{Resolution, ScoredCandidate, TargetDescription, DEFAULT_CONFIDENCE_FLOOR},
};

/// Resolver running every strategy over a snapshot
pub struct LocatorResolver {
    strategies: Vec<Box<dyn Strategy>>,
    floor: f64,
}

impl Default for LocatorResolver {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIDENCE_FLOOR)
    }
}

impl LocatorResolver {
    /// Create a resolver with the built-in strategies
    pub fn new(floor: f64) -> Self {
        Self {
            strategies: default_strategies(),
            floor: floor.clamp(0.0, 1.0),
        }
    }

    /// Replace the strategy set
    pub fn with_strategies(mut self, strategies: Vec<Box<dyn Strategy>>) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn floor(&self) -> f64 {
        self.floor
    }

    /// Resolve a description against a snapshot.
    ///
    /// An empty result is not an error; the caller decides whether to heal.
    pub fn resolve(
        &self,
        description: &str,
        snapshot: &PageSnapshot,
    ) -> Result<Resolution, LocatorError> {
        let target = TargetDescription::parse(description);
        if target.is_empty() {
            return Err(LocatorError::EmptyDescription);
        }

        let mut candidates: Vec<ScoredCandidate> = self
            .strategies
            .iter()
            .flat_map(|strategy| {
                let found = strategy.candidates(&target, snapshot);
                if !found.is_empty() {
                    debug!(
                        strategy = strategy.name(),
                        count = found.len(),
                        "strategy produced candidates"
                    );
                }
                found
            })
            .collect();

        for scored in &mut candidates {
            scored.confirmed = scored.candidate.is_confirmed(self.floor);
        }
        candidates.sort_by(rank);
        candidates.dedup_by(|later, earlier| {
            later.candidate.strategy == earlier.candidate.strategy
                && later.candidate.selector == earlier.candidate.selector
        });

        debug!(
            target = %target.raw,
            url = %snapshot.url,
            candidates = candidates.len(),
            confirmed = candidates.iter().filter(|c| c.confirmed).count(),
            "resolved target"
        );

        Ok(Resolution {
            target,
            candidates,
            floor: self.floor,
        })
    }
}

/// Confidence desc, then depth asc, then document order
fn rank(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.candidate
        .confidence
        .partial_cmp(&a.candidate.confidence)
        .unwrap_or(Ordering::Equal)
        .then(a.depth.cmp(&b.depth))
        .then(a.order.cmp(&b.order))
}
