//! Waiting pool - nodes eligible for team formation
//!
//! Two disjoint sets guarded by one pool-wide lock: `online` nodes are
//! candidates for the next team, `offline` nodes missed their polls. A node
//! holding a round is in neither.

use chrono::Utc;
use rand::seq::SliceRandom;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::{debug, info};

use crate::domain::{NodeId, NodeState, NodeStatus};
use crate::error::{SchedulerError, SchedulerResult};

/// External view of which nodes must not be scheduled right now
pub trait NodeFilter: Send + Sync {
    fn is_disabled(&self, node: &NodeId) -> bool;
}

impl NodeFilter for HashSet<NodeId> {
    fn is_disabled(&self, node: &NodeId) -> bool {
        self.contains(node)
    }
}

#[derive(Debug, Default)]
struct PoolInner {
    online: HashMap<NodeId, Arc<NodeState>>,
    offline: HashMap<NodeId, Arc<NodeState>>,
}

#[derive(Debug, Default)]
pub struct WaitingPool {
    inner: RwLock<PoolInner>,
}

impl WaitingPool {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, PoolInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, PoolInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert into the online set, dropping any offline entry; idempotent
    pub fn add(&self, node: Arc<NodeState>) {
        debug!(node = %node.id(), "WaitingPool::add: called");
        let mut inner = self.write();
        inner.offline.remove(node.id());
        inner.online.insert(node.id().clone(), node);
    }

    /// Remove from both sets; returns whether the node was present
    pub fn ban(&self, node: &NodeId) -> bool {
        debug!(%node, "WaitingPool::ban: called");
        let mut inner = self.write();
        let online = inner.online.remove(node).is_some();
        let offline = inner.offline.remove(node).is_some();
        online || offline
    }

    /// Move online nodes whose last poll is older than `timeout` offline
    ///
    /// Moved nodes lose any round reference and become Inactive. Returns the
    /// ids that were moved.
    pub fn clean_offline_nodes(&self, timeout: Duration) -> Vec<NodeId> {
        let now = Utc::now();
        let mut inner = self.write();

        let stale: Vec<NodeId> = inner
            .online
            .values()
            .filter(|node| {
                now.signed_duration_since(node.last_poll())
                    .to_std()
                    .map(|age| age > timeout)
                    .unwrap_or(false)
            })
            .map(|node| node.id().clone())
            .collect();

        for id in &stale {
            if let Some(node) = inner.online.remove(id) {
                node.clear_round();
                if node.status() == NodeStatus::Active {
                    node.set_status(NodeStatus::Inactive);
                }
                inner.offline.insert(id.clone(), node);
            }
        }

        if !stale.is_empty() {
            info!(count = stale.len(), ?timeout, "Moved unresponsive nodes offline");
        }
        stale
    }

    /// Bring an offline node back online and mark it Active
    ///
    /// Returns false if the node was not in the offline set.
    pub fn set_node_to_online(&self, node: &NodeState) -> bool {
        let mut inner = self.write();
        let Some(entry) = inner.offline.remove(node.id()) else {
            return false;
        };
        if entry.status() == NodeStatus::Inactive {
            entry.set_status(NodeStatus::Active);
        }
        debug!(node = %node.id(), "WaitingPool::set_node_to_online: restored");
        inner.online.insert(node.id().clone(), entry);
        true
    }

    /// Pick `n` random online nodes and remove them from the pool
    ///
    /// Fails, leaving the pool untouched, unless at least `max(threshold, n)`
    /// online nodes pass `filter`. The write lock is held for the whole pick.
    pub fn pick_n_rand_at_threshold(
        &self,
        threshold: usize,
        n: usize,
        filter: Option<&dyn NodeFilter>,
    ) -> SchedulerResult<Vec<Arc<NodeState>>> {
        let mut inner = self.write();

        let eligible: Vec<NodeId> = inner
            .online
            .keys()
            .filter(|id| filter.is_none_or(|f| !f.is_disabled(id)))
            .cloned()
            .collect();

        if eligible.len() < threshold || eligible.len() < n {
            return Err(SchedulerError::InsufficientPool {
                available: eligible.len(),
                threshold,
                team_size: n,
            });
        }

        let mut indices: Vec<usize> = (0..eligible.len()).collect();
        indices.shuffle(&mut rand::rng());

        let picked: Vec<Arc<NodeState>> = indices
            .into_iter()
            .take(n)
            .filter_map(|i| inner.online.remove(&eligible[i]))
            .collect();

        debug!(picked = picked.len(), remaining = inner.online.len(), "WaitingPool::pick_n_rand_at_threshold: picked");
        Ok(picked)
    }

    pub fn len(&self) -> usize {
        self.read().online.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn offline_len(&self) -> usize {
        self.read().offline.len()
    }

    pub fn is_online(&self, node: &NodeId) -> bool {
        self.read().online.contains_key(node)
    }

    pub fn is_offline(&self, node: &NodeId) -> bool {
        self.read().offline.contains_key(node)
    }

    /// Ids of the offline set
    pub fn offline_ids(&self) -> Vec<NodeId> {
        self.read().offline.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn node(id: &str) -> Arc<NodeState> {
        Arc::new(NodeState::new(NodeId::new(id), "Asia", NodeStatus::Active))
    }

    fn pool_of(size: usize) -> WaitingPool {
        let pool = WaitingPool::new();
        for i in 0..size {
            pool.add(node(&format!("n{i}")));
        }
        pool
    }

    #[test]
    fn test_add_is_idempotent() {
        let pool = WaitingPool::new();
        let n = node("a");
        pool.add(n.clone());
        pool.add(n);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_ban_removes_from_both_sets() {
        let pool = pool_of(2);
        assert!(pool.ban(&NodeId::new("n0")));
        assert!(!pool.is_online(&NodeId::new("n0")));
        assert!(!pool.ban(&NodeId::new("n0")));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_clean_offline_nodes() {
        let pool = WaitingPool::new();
        let stale = node("stale");
        stale.set_last_poll(Utc::now() - chrono::Duration::seconds(90));
        stale.set_round(crate::domain::RoundId::new(3)).unwrap();
        let fresh = node("fresh");
        pool.add(stale.clone());
        pool.add(fresh);

        let moved = pool.clean_offline_nodes(Duration::from_secs(60));
        assert_eq!(moved, vec![NodeId::new("stale")]);
        assert!(pool.is_offline(&NodeId::new("stale")));
        assert!(pool.is_online(&NodeId::new("fresh")));
        assert_eq!(stale.status(), NodeStatus::Inactive);
        assert_eq!(stale.round(), None);
    }

    #[test]
    fn test_set_node_to_online() {
        let pool = WaitingPool::new();
        let n = node("a");
        n.set_last_poll(Utc::now() - chrono::Duration::seconds(90));
        pool.add(n.clone());
        pool.clean_offline_nodes(Duration::from_secs(1));
        assert!(pool.is_offline(n.id()));

        assert!(pool.set_node_to_online(&n));
        assert!(pool.is_online(n.id()));
        assert!(!pool.is_offline(n.id()));
        assert_eq!(n.status(), NodeStatus::Active);
        assert!(!pool.set_node_to_online(&n));
    }

    #[test]
    fn test_add_pulls_node_out_of_offline() {
        let pool = WaitingPool::new();
        let n = node("a");
        n.set_last_poll(Utc::now() - chrono::Duration::seconds(90));
        pool.add(n.clone());
        pool.clean_offline_nodes(Duration::from_secs(1));
        pool.add(n.clone());
        assert!(pool.is_online(n.id()));
        assert_eq!(pool.offline_len(), 0);
    }

    #[test]
    fn test_pick_respects_filter() {
        let pool = pool_of(4);
        let disabled: HashSet<NodeId> = ["n0", "n1"].into_iter().map(NodeId::new).collect();

        let err = pool
            .pick_n_rand_at_threshold(3, 3, Some(&disabled))
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InsufficientPool { available: 2, .. }));
        assert_eq!(pool.len(), 4);

        let picked = pool.pick_n_rand_at_threshold(2, 2, Some(&disabled)).unwrap();
        let ids: HashSet<NodeId> = picked.iter().map(|n| n.id().clone()).collect();
        assert_eq!(ids, ["n2", "n3"].into_iter().map(NodeId::new).collect());
        assert_eq!(pool.len(), 2);
    }

    proptest! {
        #[test]
        fn prop_pick_removes_exactly_n(size in 0usize..20, threshold in 0usize..25, n in 0usize..25) {
            let pool = pool_of(size);
            let result = pool.pick_n_rand_at_threshold(threshold, n, None);
            if size >= threshold.max(n) {
                let picked = result.unwrap();
                prop_assert_eq!(picked.len(), n);
                prop_assert_eq!(pool.len(), size - n);
                let unique: HashSet<NodeId> = picked.iter().map(|p| p.id().clone()).collect();
                prop_assert_eq!(unique.len(), n);
                for p in &picked {
                    prop_assert!(!pool.is_online(p.id()));
                }
            } else {
                prop_assert!(result.is_err());
                prop_assert_eq!(pool.len(), size);
            }
        }

        #[test]
        fn prop_clean_moves_only_stale(ages in proptest::collection::vec(0i64..120, 0..16), timeout in 1u64..100) {
            let pool = WaitingPool::new();
            let now = Utc::now();
            for (i, age) in ages.iter().enumerate() {
                let n = node(&format!("n{i}"));
                n.set_last_poll(now - chrono::Duration::seconds(*age));
                pool.add(n);
            }
            pool.clean_offline_nodes(Duration::from_secs(timeout));

            for (i, age) in ages.iter().enumerate() {
                let id = NodeId::new(format!("n{i}"));
                prop_assert!(!(pool.is_online(&id) && pool.is_offline(&id)));
                if pool.is_offline(&id) {
                    prop_assert!(*age as u64 >= timeout);
                }
            }
            prop_assert_eq!(pool.len() + pool.offline_len(), ages.len());
        }
    }
}
