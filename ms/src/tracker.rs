//! Active-round bookkeeping
//!
//! Holds the ids of rounds that started and have not yet completed or failed.
//! Its emptiness is the shutdown quiescence signal.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::domain::RoundId;

#[derive(Debug, Default)]
pub struct RoundTracker {
    active: Mutex<HashSet<RoundId>>,
}

impl RoundTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<RoundId>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns false if the round was already tracked
    pub fn add(&self, round: RoundId) -> bool {
        debug!(%round, "RoundTracker::add: called");
        self.lock().insert(round)
    }

    /// Returns false if the round was not tracked
    pub fn remove(&self, round: RoundId) -> bool {
        debug!(%round, "RoundTracker::remove: called");
        self.lock().remove(&round)
    }

    pub fn contains(&self, round: RoundId) -> bool {
        self.lock().contains(&round)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Active round ids in ascending order
    pub fn active_rounds(&self) -> Vec<RoundId> {
        let mut rounds: Vec<RoundId> = self.lock().iter().copied().collect();
        rounds.sort_unstable();
        rounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_remove() {
        let tracker = RoundTracker::new();
        assert!(tracker.is_empty());
        assert!(tracker.add(RoundId::new(2)));
        assert!(!tracker.add(RoundId::new(2)));
        assert!(tracker.contains(RoundId::new(2)));
        assert!(tracker.remove(RoundId::new(2)));
        assert!(!tracker.remove(RoundId::new(2)));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_active_rounds_sorted() {
        let tracker = RoundTracker::new();
        for id in [7, 3, 5] {
            tracker.add(RoundId::new(id));
        }
        assert_eq!(tracker.len(), 3);
        assert_eq!(
            tracker.active_rounds(),
            vec![RoundId::new(3), RoundId::new(5), RoundId::new(7)]
        );
    }
}
