//! SchedulerHandle - polling front and control interface

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::domain::{Activity, NodeId, NodeState, NodeStatus, UpdateNotification};
use crate::error::{SchedulerError, SchedulerResult};
use crate::network::NetworkState;
use crate::pool::WaitingPool;
use crate::tracker::RoundTracker;

use super::messages::{PollOutcome, SchedulerMetrics, SchedulerRequest};

/// Handle for pollers and operators to talk to a running scheduler
///
/// Cloneable; every clone feeds the same loop.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    updates_tx: mpsc::Sender<UpdateNotification>,
    control_tx: mpsc::Sender<SchedulerRequest>,
    network: Arc<NetworkState>,
    pool: Arc<WaitingPool>,
    tracker: Arc<RoundTracker>,
}

impl SchedulerHandle {
    pub(crate) fn new(
        updates_tx: mpsc::Sender<UpdateNotification>,
        control_tx: mpsc::Sender<SchedulerRequest>,
        network: Arc<NetworkState>,
        pool: Arc<WaitingPool>,
        tracker: Arc<RoundTracker>,
    ) -> Self {
        Self {
            updates_tx,
            control_tx,
            network,
            pool,
            tracker,
        }
    }

    /// Record a node poll and hand any activity change to the loop
    ///
    /// The node's hand-off lock is taken before enqueueing and released by
    /// the loop once the notification is applied. While the loop still owns
    /// the node the poll is refused with [`PollOutcome::Busy`].
    pub async fn poll(&self, node_id: &NodeId, activity: Activity) -> SchedulerResult<PollOutcome> {
        debug!(node = %node_id, %activity, "SchedulerHandle::poll: called");
        let node = self.network.node(node_id)?;
        if !node.handoff().try_acquire() {
            debug!(node = %node_id, "SchedulerHandle::poll: busy");
            return Ok(PollOutcome::Busy);
        }

        let update = match node.record_poll(activity, Utc::now()) {
            Ok(update) => update,
            Err(e) => {
                node.handoff().release();
                return Err(e);
            }
        };
        self.bring_online(&node);

        match update {
            None => {
                node.handoff().release();
                Ok(PollOutcome::Unchanged)
            }
            Some(update) => {
                self.enqueue(&node, update).await?;
                Ok(PollOutcome::Enqueued)
            }
        }
    }

    /// A poll from a node the sweep moved offline brings it back
    fn bring_online(&self, node: &NodeState) {
        if node.status() != NodeStatus::Inactive {
            return;
        }
        if !self.pool.set_node_to_online(node) {
            node.set_status(NodeStatus::Active);
        }
        debug!(node = %node.id(), "SchedulerHandle::poll: node back online");
    }

    /// Ban a node; waits for any in-flight notification to be applied first
    pub async fn ban_node(&self, node_id: &NodeId) -> SchedulerResult<()> {
        debug!(node = %node_id, "SchedulerHandle::ban_node: called");
        let node = self.network.node(node_id)?;
        node.handoff().acquire().await;
        let update = node.ban(Utc::now());
        self.enqueue(&node, update).await
    }

    async fn enqueue(&self, node: &NodeState, update: UpdateNotification) -> SchedulerResult<()> {
        if self.updates_tx.send(update).await.is_err() {
            node.handoff().release();
            return Err(SchedulerError::ChannelClosed);
        }
        Ok(())
    }

    /// Current loop metrics
    pub async fn metrics(&self) -> SchedulerResult<SchedulerMetrics> {
        debug!("SchedulerHandle::metrics: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.control_tx
            .send(SchedulerRequest::GetMetrics { reply_tx })
            .await
            .map_err(|_| SchedulerError::ChannelClosed)?;
        reply_rx.await.map_err(|_| SchedulerError::ChannelClosed)
    }

    /// Request shutdown and wait until every active round has finished
    pub async fn shutdown(&self) -> SchedulerResult<()> {
        debug!("SchedulerHandle::shutdown: called");
        let (ack_tx, ack_rx) = oneshot::channel();
        self.control_tx
            .send(SchedulerRequest::Shutdown { ack_tx })
            .await
            .map_err(|_| SchedulerError::ChannelClosed)?;
        ack_rx.await.map_err(|_| SchedulerError::ChannelClosed)?;
        debug!("SchedulerHandle::shutdown: acknowledged");
        Ok(())
    }

    pub fn network(&self) -> &Arc<NetworkState> {
        &self.network
    }

    pub fn pool(&self) -> &WaitingPool {
        &self.pool
    }

    pub fn tracker(&self) -> &RoundTracker {
        &self.tracker
    }
}
