//! Per-node activity state and the poller/scheduler hand-off lock

use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tracing::debug;

use crate::error::{SchedulerError, SchedulerResult};

use super::id::{NodeId, RoundId};
use super::notification::UpdateNotification;
use super::states::{Activity, NodeStatus};

/// Ownership of a node between the polling front and the scheduler loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffState {
    /// Nobody is working on the node
    Released,
    /// A poller took the node and is enqueueing a notification
    Locked,
    /// The scheduler loop is applying the notification
    OwnedByScheduler,
}

/// Hand-off lock: taken by the poller before enqueue, released by the loop
/// after processing
#[derive(Debug)]
pub struct Handoff {
    state: Mutex<HandoffState>,
    released: Notify,
}

impl Handoff {
    fn new() -> Self {
        Self {
            state: Mutex::new(HandoffState::Released),
            released: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HandoffState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> HandoffState {
        *self.lock()
    }

    /// Released → Locked; false if someone else holds the node
    pub fn try_acquire(&self) -> bool {
        let mut state = self.lock();
        if *state == HandoffState::Released {
            *state = HandoffState::Locked;
            true
        } else {
            false
        }
    }

    /// Wait until the node is released, then take it
    pub async fn acquire(&self) {
        loop {
            let released = self.released.notified();
            if self.try_acquire() {
                return;
            }
            released.await;
        }
    }

    /// Locked → OwnedByScheduler; false if the poller never locked the node
    pub fn take_ownership(&self) -> bool {
        let mut state = self.lock();
        if *state == HandoffState::Locked {
            *state = HandoffState::OwnedByScheduler;
            true
        } else {
            false
        }
    }

    pub fn release(&self) {
        *self.lock() = HandoffState::Released;
        self.released.notify_waiters();
    }
}

#[derive(Debug)]
struct NodeInner {
    status: NodeStatus,
    activity: Activity,
    round: Option<RoundId>,
    last_poll: DateTime<Utc>,
    last_update: DateTime<Utc>,
    num_polls: u64,
}

/// Activity, status and round reference of one node
///
/// The round reference is an id looked up in the round map, never the round
/// itself.
#[derive(Debug)]
pub struct NodeState {
    id: NodeId,
    region: String,
    inner: Mutex<NodeInner>,
    handoff: Handoff,
}

impl NodeState {
    pub fn new(id: NodeId, region: impl Into<String>, status: NodeStatus) -> Self {
        let now = Utc::now();
        Self {
            id,
            region: region.into(),
            inner: Mutex::new(NodeInner {
                status,
                activity: Activity::NotStarted,
                round: None,
                last_poll: now,
                last_update: now,
                num_polls: 0,
            }),
            handoff: Handoff::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, NodeInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// Raw region tag as registered; parsed by team assembly
    pub fn region_tag(&self) -> &str {
        &self.region
    }

    pub fn handoff(&self) -> &Handoff {
        &self.handoff
    }

    pub fn status(&self) -> NodeStatus {
        self.lock().status
    }

    pub fn activity(&self) -> Activity {
        self.lock().activity
    }

    pub fn round(&self) -> Option<RoundId> {
        self.lock().round
    }

    pub fn last_poll(&self) -> DateTime<Utc> {
        self.lock().last_poll
    }

    pub fn last_update(&self) -> DateTime<Utc> {
        self.lock().last_update
    }

    pub fn num_polls(&self) -> u64 {
        self.lock().num_polls
    }

    /// Overwrite the last-poll timestamp, e.g. when restoring persisted state
    pub fn set_last_poll(&self, at: DateTime<Utc>) {
        self.lock().last_poll = at;
    }

    /// Record a poll reporting `activity`
    ///
    /// Returns the notification to enqueue when the activity changed, `None`
    /// for a heartbeat poll.
    pub fn record_poll(&self, activity: Activity, now: DateTime<Utc>) -> SchedulerResult<Option<UpdateNotification>> {
        let mut inner = self.lock();
        match inner.status {
            NodeStatus::Unregistered => return Err(SchedulerError::NodeNotRegistered(self.id.clone())),
            NodeStatus::Banned => return Err(SchedulerError::NodeBanned(self.id.clone())),
            NodeStatus::Active | NodeStatus::Inactive => {}
        }

        inner.last_poll = now;
        inner.num_polls += 1;

        if inner.activity == activity {
            return Ok(None);
        }
        if !inner.activity.can_transition_to(activity) {
            return Err(SchedulerError::InvalidActivityTransition {
                node: self.id.clone(),
                from: inner.activity,
                to: activity,
            });
        }

        let from = inner.activity;
        inner.activity = activity;
        inner.last_update = now;
        debug!(node = %self.id, %from, to = %activity, "NodeState::record_poll: activity changed");
        Ok(Some(UpdateNotification::activity(
            self.id.clone(),
            inner.status,
            from,
            activity,
            now,
        )))
    }

    /// Set the status and return the previous one
    pub fn set_status(&self, status: NodeStatus) -> NodeStatus {
        let mut inner = self.lock();
        std::mem::replace(&mut inner.status, status)
    }

    /// Ban the node; re-banning yields a Banned → Banned notification
    pub fn ban(&self, now: DateTime<Utc>) -> UpdateNotification {
        let mut inner = self.lock();
        let from = std::mem::replace(&mut inner.status, NodeStatus::Banned);
        inner.last_update = now;
        UpdateNotification::status(self.id.clone(), inner.activity, from, NodeStatus::Banned, now)
    }

    /// Attach a round; a node never holds two
    pub fn set_round(&self, round: RoundId) -> SchedulerResult<()> {
        let mut inner = self.lock();
        if let Some(held) = inner.round {
            return Err(SchedulerError::NodeHoldsRound {
                node: self.id.clone(),
                held,
            });
        }
        inner.round = Some(round);
        Ok(())
    }

    /// Drop the round reference, returning what was held
    pub fn clear_round(&self) -> Option<RoundId> {
        self.lock().round.take()
    }
}
