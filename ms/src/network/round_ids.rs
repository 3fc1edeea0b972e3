//! Source of monotonic round identifiers

use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::RoundId;
use crate::error::{SchedulerError, SchedulerResult};

/// Hands out round ids that never repeat, across restarts included
///
/// Production implementations persist the counter; the scheduler only needs
/// each call to return an id greater than every earlier one.
pub trait RoundIdSource: Send + Sync {
    fn reserve(&self) -> SchedulerResult<RoundId>;
}

/// Counter kept in memory, seeded from the last persisted id
#[derive(Debug)]
pub struct InMemoryRoundIds {
    next: AtomicU64,
}

impl InMemoryRoundIds {
    pub fn starting_at(first: RoundId) -> Self {
        Self {
            next: AtomicU64::new(first.get()),
        }
    }
}

impl Default for InMemoryRoundIds {
    fn default() -> Self {
        Self::starting_at(RoundId::new(1))
    }
}

impl RoundIdSource for InMemoryRoundIds {
    fn reserve(&self) -> SchedulerResult<RoundId> {
        let id = self.next.fetch_add(1, Ordering::SeqCst);
        if id == u64::MAX {
            return Err(SchedulerError::RoundIds("round id space exhausted".to_string()));
        }
        Ok(RoundId::new(id))
    }
}
