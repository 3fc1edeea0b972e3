//! Round life-cycle state
//!
//! Phases only move forward (see [`RoundPhase::can_advance_to`]). Every move
//! is timestamped and published on a watch channel that the timeout watchers
//! race against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::debug;

use crate::error::{SchedulerError, SchedulerResult};

use super::id::{NodeId, RoundId};
use super::states::RoundPhase;

#[derive(Debug)]
struct RoundInner {
    phase: RoundPhase,
    ready: usize,
    timestamps: BTreeMap<RoundPhase, DateTime<Utc>>,
}

/// Point-in-time view of a round, the payload of round-state broadcasts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundInfo {
    pub id: RoundId,
    pub phase: RoundPhase,
    pub topology: Vec<NodeId>,
    #[serde(rename = "batch-size")]
    pub batch_size: u32,
    pub timestamps: BTreeMap<RoundPhase, DateTime<Utc>>,
    /// Position in the update log; zero until published
    #[serde(rename = "update-id")]
    pub update_id: u64,
}

/// One scheduled execution of a fixed team
#[derive(Debug)]
pub struct RoundState {
    id: RoundId,
    batch_size: u32,
    topology: Vec<NodeId>,
    inner: Mutex<RoundInner>,
    phase_tx: watch::Sender<RoundPhase>,
}

impl RoundState {
    /// Allocate a round in the Pending phase
    pub fn new(id: RoundId, topology: Vec<NodeId>, batch_size: u32) -> Self {
        let (phase_tx, _) = watch::channel(RoundPhase::Pending);
        let mut timestamps = BTreeMap::new();
        timestamps.insert(RoundPhase::Pending, Utc::now());
        Self {
            id,
            batch_size,
            topology,
            inner: Mutex::new(RoundInner {
                phase: RoundPhase::Pending,
                ready: 0,
                timestamps,
            }),
            phase_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RoundInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> RoundId {
        self.id
    }

    /// Traversal order of the team
    pub fn topology(&self) -> &[NodeId] {
        &self.topology
    }

    pub fn team_size(&self) -> usize {
        self.topology.len()
    }

    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    pub fn phase(&self) -> RoundPhase {
        self.lock().phase
    }

    pub fn ready_count(&self) -> usize {
        self.lock().ready
    }

    pub fn timestamp(&self, phase: RoundPhase) -> Option<DateTime<Utc>> {
        self.lock().timestamps.get(&phase).copied()
    }

    /// Receiver that observes every phase change
    pub fn subscribe(&self) -> watch::Receiver<RoundPhase> {
        self.phase_tx.subscribe()
    }

    /// Move forward to `to`, stamping it with `at`; backward moves are errors
    pub fn advance(&self, to: RoundPhase, at: DateTime<Utc>) -> SchedulerResult<()> {
        let mut inner = self.lock();
        if !inner.phase.can_advance_to(to) {
            return Err(SchedulerError::InvalidRoundTransition {
                round: self.id,
                from: inner.phase,
                to,
            });
        }
        debug!(round = %self.id, from = %inner.phase, %to, "RoundState::advance");
        inner.phase = to;
        inner.ready = 0;
        inner.timestamps.insert(to, at);
        self.phase_tx.send_replace(to);
        Ok(())
    }

    /// Count one more node ready for the next phase
    ///
    /// Returns true for the arrival that completes the team.
    pub fn increment_ready(&self) -> SchedulerResult<bool> {
        let mut inner = self.lock();
        let team_size = self.topology.len();
        if inner.ready >= team_size {
            return Err(SchedulerError::ReadinessOverflow {
                round: self.id,
                team_size,
            });
        }
        inner.ready += 1;
        Ok(inner.ready == team_size)
    }

    /// Force the round to Failed
    ///
    /// Returns false when the round already reached a terminal phase, so only
    /// one caller ever observes the transition.
    pub fn fail(&self, at: DateTime<Utc>) -> bool {
        let mut inner = self.lock();
        if inner.phase.is_terminal() {
            return false;
        }
        inner.phase = RoundPhase::Failed;
        inner.timestamps.insert(RoundPhase::Failed, at);
        self.phase_tx.send_replace(RoundPhase::Failed);
        true
    }

    pub fn info(&self) -> RoundInfo {
        let inner = self.lock();
        RoundInfo {
            id: self.id,
            phase: inner.phase,
            topology: self.topology.clone(),
            batch_size: self.batch_size,
            timestamps: inner.timestamps.clone(),
            update_id: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round(team: usize) -> RoundState {
        let topology = (0..team).map(|i| NodeId::new(format!("n{i}"))).collect();
        RoundState::new(RoundId::new(1), topology, 32)
    }

    #[test]
    fn test_advance_forward() {
        let r = round(3);
        assert_eq!(r.phase(), RoundPhase::Pending);
        r.advance(RoundPhase::Precomputing, Utc::now()).unwrap();
        r.advance(RoundPhase::Realtime, Utc::now()).unwrap();
        assert_eq!(r.phase(), RoundPhase::Realtime);
        assert!(r.timestamp(RoundPhase::Precomputing).is_some());
        assert!(r.timestamp(RoundPhase::Completed).is_none());
    }

    #[test]
    fn test_advance_backward_rejected() {
        let r = round(3);
        r.advance(RoundPhase::Precomputing, Utc::now()).unwrap();
        r.advance(RoundPhase::Realtime, Utc::now()).unwrap();
        let err = r.advance(RoundPhase::Precomputing, Utc::now()).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidRoundTransition { .. }));
        assert_eq!(r.phase(), RoundPhase::Realtime);
    }

    #[test]
    fn test_readiness_counts_to_team_size() {
        let r = round(3);
        r.advance(RoundPhase::Precomputing, Utc::now()).unwrap();
        assert!(!r.increment_ready().unwrap());
        assert!(!r.increment_ready().unwrap());
        assert!(r.increment_ready().unwrap());
        assert!(matches!(
            r.increment_ready(),
            Err(SchedulerError::ReadinessOverflow { team_size: 3, .. })
        ));
        assert_eq!(r.ready_count(), 3);

        r.advance(RoundPhase::Realtime, Utc::now()).unwrap();
        assert_eq!(r.ready_count(), 0);
    }

    #[test]
    fn test_fail_is_idempotent() {
        let r = round(2);
        r.advance(RoundPhase::Precomputing, Utc::now()).unwrap();
        assert!(r.fail(Utc::now()));
        assert!(!r.fail(Utc::now()));
        assert_eq!(r.phase(), RoundPhase::Failed);
    }

    #[test]
    fn test_fail_after_completion_is_noop() {
        let r = round(1);
        r.advance(RoundPhase::Precomputing, Utc::now()).unwrap();
        r.advance(RoundPhase::Realtime, Utc::now()).unwrap();
        r.advance(RoundPhase::Completed, Utc::now()).unwrap();
        assert!(!r.fail(Utc::now()));
        assert_eq!(r.phase(), RoundPhase::Completed);
    }

    #[tokio::test]
    async fn test_subscribers_see_phase_changes() {
        let r = round(2);
        let mut rx = r.subscribe();
        r.advance(RoundPhase::Precomputing, Utc::now()).unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), RoundPhase::Precomputing);

        r.fail(Utc::now());
        let phase = *rx.wait_for(|p| p.is_terminal()).await.unwrap();
        assert_eq!(phase, RoundPhase::Failed);
    }

    #[test]
    fn test_info_snapshot() {
        let r = round(2);
        r.advance(RoundPhase::Precomputing, Utc::now()).unwrap();
        let info = r.info();
        assert_eq!(info.id, RoundId::new(1));
        assert_eq!(info.phase, RoundPhase::Precomputing);
        assert_eq!(info.topology.len(), 2);
        assert_eq!(info.timestamps.len(), 2);

        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("\"precomputing\""));
    }
}
