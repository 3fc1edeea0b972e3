//! Registry of rounds keyed by id

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::domain::{RoundId, RoundState};
use crate::error::{SchedulerError, SchedulerResult};

#[derive(Debug, Default)]
pub struct RoundMap {
    rounds: RwLock<HashMap<RoundId, Arc<RoundState>>>,
}

impl RoundMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a freshly allocated round; an occupied slot is an error
    pub fn add(&self, round: RoundState) -> SchedulerResult<Arc<RoundState>> {
        let mut rounds = self.rounds.write().unwrap_or_else(PoisonError::into_inner);
        let id = round.id();
        if rounds.contains_key(&id) {
            return Err(SchedulerError::RoundSlotOccupied(id));
        }
        let round = Arc::new(round);
        rounds.insert(id, round.clone());
        Ok(round)
    }

    pub fn get(&self, id: RoundId) -> Option<Arc<RoundState>> {
        self.rounds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.rounds.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NodeId;

    #[test]
    fn test_add_and_get() {
        let map = RoundMap::new();
        let round = map
            .add(RoundState::new(RoundId::new(1), vec![NodeId::new("a")], 4))
            .unwrap();
        assert_eq!(round.id(), RoundId::new(1));
        assert!(map.get(RoundId::new(1)).is_some());
        assert!(map.get(RoundId::new(2)).is_none());
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_occupied_slot_rejected() {
        let map = RoundMap::new();
        map.add(RoundState::new(RoundId::new(1), vec![], 4)).unwrap();
        let err = map.add(RoundState::new(RoundId::new(1), vec![], 4)).unwrap_err();
        assert!(matches!(err, SchedulerError::RoundSlotOccupied(id) if id == RoundId::new(1)));
    }
}
