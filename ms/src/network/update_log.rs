//! Append-only log of signed round updates and round-error records
//!
//! Pollers ask for everything after the last update id they have seen.

use std::sync::{PoisonError, RwLock};

use crate::domain::{RoundError, RoundId, RoundInfo};

use crate::error::SchedulerResult;

use super::signing::{RoundSigner, Signed};

/// One entry of the round update log; the update id is part of the signed payload
pub type RoundUpdate = Signed<RoundInfo>;

#[derive(Debug, Default)]
struct LogInner {
    updates: Vec<RoundUpdate>,
    errors: Vec<Signed<RoundError>>,
}

#[derive(Debug, Default)]
pub struct UpdateLog {
    inner: RwLock<LogInner>,
}

impl UpdateLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp `info` with the next update id, sign and append it; ids start at 1
    pub fn push_round(&self, mut info: RoundInfo, signer: &RoundSigner) -> SchedulerResult<u64> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let update_id = inner.updates.len() as u64 + 1;
        info.update_id = update_id;
        inner.updates.push(signer.sign(info)?);
        Ok(update_id)
    }

    pub fn push_error(&self, error: Signed<RoundError>) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .errors
            .push(error);
    }

    /// Updates with an id greater than `update_id`
    pub fn since(&self, update_id: u64) -> Vec<RoundUpdate> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let start = (update_id as usize).min(inner.updates.len());
        inner.updates[start..].to_vec()
    }

    pub fn latest_update_id(&self) -> u64 {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).updates.len() as u64
    }

    /// Most recent broadcast state of one round
    pub fn latest_for(&self, round: RoundId) -> Option<RoundInfo> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .updates
            .iter()
            .rev()
            .find(|u| u.payload.id == round)
            .map(|u| u.payload.clone())
    }

    pub fn round_errors(&self) -> Vec<Signed<RoundError>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).errors.clone()
    }

    pub fn errors_for(&self, round: RoundId) -> Vec<RoundError> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .errors
            .iter()
            .filter(|e| e.payload.round_id == round)
            .map(|e| e.payload.clone())
            .collect()
    }
}
