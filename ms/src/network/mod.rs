//! Network state shared by the scheduler and the polling front
//!
//! Owns the node registry, the round map, the update log, the signing key and
//! the round id source. The scheduler reads and writes through it; pollers
//! read the update log.

mod round_ids;
mod round_map;
mod signing;
mod update_log;

use chrono::Utc;
use ed25519_dalek::VerifyingKey;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

use crate::domain::{FailureCause, NodeId, NodeState, NodeStatus, RoundError, RoundId, RoundState};
use crate::error::{SchedulerError, SchedulerResult};

pub use round_ids::{InMemoryRoundIds, RoundIdSource};
pub use round_map::RoundMap;
pub use signing::{RoundSigner, Signed};
pub use update_log::{RoundUpdate, UpdateLog};

pub struct NetworkState {
    nodes: RwLock<HashMap<NodeId, Arc<NodeState>>>,
    rounds: RoundMap,
    updates: UpdateLog,
    signer: RoundSigner,
    round_ids: Box<dyn RoundIdSource>,
}

impl NetworkState {
    pub fn new(signer: RoundSigner, round_ids: Box<dyn RoundIdSource>) -> Self {
        debug!(verifying_key = ?signer.verifying_key(), "NetworkState::new: called");
        Self {
            nodes: RwLock::new(HashMap::new()),
            rounds: RoundMap::new(),
            updates: UpdateLog::new(),
            signer,
            round_ids,
        }
    }

    /// In-memory state with a fixed key; for tests and simulation
    pub fn in_memory(seed: [u8; 32]) -> Self {
        Self::new(RoundSigner::from_seed(seed), Box::new(InMemoryRoundIds::default()))
    }

    /// Register a node as Active, or return the existing entry
    pub fn add_node(&self, id: NodeId, region: impl Into<String>) -> Arc<NodeState> {
        self.insert_node(id, region, NodeStatus::Active)
    }

    /// Insert a node with an explicit status, or return the existing entry
    pub fn insert_node(&self, id: NodeId, region: impl Into<String>, status: NodeStatus) -> Arc<NodeState> {
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        nodes
            .entry(id.clone())
            .or_insert_with(|| {
                debug!(node = %id, %status, "NetworkState::insert_node: new node");
                Arc::new(NodeState::new(id, region, status))
            })
            .clone()
    }

    pub fn node(&self, id: &NodeId) -> SchedulerResult<Arc<NodeState>> {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| SchedulerError::UnknownNode(id.clone()))
    }

    pub fn nodes(&self) -> Vec<Arc<NodeState>> {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Nodes counted toward the pool threshold
    pub fn count_active_nodes(&self) -> usize {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|n| n.status() == NodeStatus::Active)
            .count()
    }

    pub fn rounds(&self) -> &RoundMap {
        &self.rounds
    }

    pub fn round(&self, id: RoundId) -> SchedulerResult<Arc<RoundState>> {
        self.rounds.get(id).ok_or(SchedulerError::UnknownRound(id))
    }

    pub fn update_log(&self) -> &UpdateLog {
        &self.updates
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signer.verifying_key()
    }

    pub fn reserve_round_id(&self) -> SchedulerResult<RoundId> {
        self.round_ids.reserve()
    }

    /// Sign the round's current state and append it to the update log
    pub fn publish_round(&self, round: &RoundState) -> SchedulerResult<u64> {
        let info = round.info();
        let phase = info.phase;
        let update_id = self.updates.push_round(info, &self.signer)?;
        debug!(round = %round.id(), %phase, update_id, "NetworkState::publish_round");
        Ok(update_id)
    }

    /// Sign and store a round-error record
    pub fn publish_round_error(
        &self,
        round: RoundId,
        node: Option<NodeId>,
        cause: FailureCause,
    ) -> SchedulerResult<()> {
        let record = RoundError {
            round_id: round,
            node,
            cause,
            at: Utc::now(),
        };
        info!(%round, node = ?record.node, %cause, "Publishing round error");
        self.updates.push_error(self.signer.sign(record)?);
        Ok(())
    }
}

impl std::fmt::Debug for NetworkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkState")
            .field("rounds", &self.rounds.len())
            .field("latest_update_id", &self.updates.latest_update_id())
            .finish_non_exhaustive()
    }
}
