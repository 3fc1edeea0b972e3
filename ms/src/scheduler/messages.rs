//! Message types for the scheduler loop

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::assembly::ProtoRound;
use crate::domain::{RoundId, TimeoutPhase};
use crate::error::SchedulerError;

/// Round life-cycle events fed back into the loop by its workers
#[derive(Debug)]
pub enum RoundEvent {
    /// A phase watcher's timer expired
    TimedOut { round: RoundId, phase: TimeoutPhase },

    /// The round starter committed a proto-round
    Started(RoundId),

    /// The round starter rejected a proto-round
    StartFailed { proto: ProtoRound, error: SchedulerError },

    /// The realtime watcher saw the round leave REALTIME
    Finished(RoundId),
}

/// Control requests to the scheduler loop
#[derive(Debug)]
pub enum SchedulerRequest {
    GetMetrics {
        reply_tx: oneshot::Sender<SchedulerMetrics>,
    },

    /// Stop admitting rounds and acknowledge once every active round is done
    Shutdown { ack_tx: oneshot::Sender<()> },
}

/// Loop life cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Running,
    /// Shutdown requested; no new rounds, waiting for active ones
    Draining,
    Stopped,
}

/// Result of a node poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Heartbeat: activity unchanged, nothing enqueued
    Unchanged,
    /// Activity changed and the notification was queued for the loop
    Enqueued,
    /// The loop still owns the node from an earlier notification
    Busy,
}

/// Scheduler metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerMetrics {
    #[serde(rename = "run-state")]
    pub run_state: RunState,
    #[serde(rename = "updates-processed")]
    pub updates_processed: u64,
    #[serde(rename = "update-errors")]
    pub update_errors: u64,
    #[serde(rename = "rounds-assembled")]
    pub rounds_assembled: u64,
    #[serde(rename = "rounds-started")]
    pub rounds_started: u64,
    #[serde(rename = "rounds-completed")]
    pub rounds_completed: u64,
    #[serde(rename = "rounds-failed")]
    pub rounds_failed: u64,
    pub timeouts: u64,
    #[serde(rename = "assembly-failures")]
    pub assembly_failures: u64,
    #[serde(rename = "start-failures")]
    pub start_failures: u64,
    #[serde(rename = "pool-size")]
    pub pool_size: usize,
    #[serde(rename = "offline-size")]
    pub offline_size: usize,
    #[serde(rename = "active-rounds")]
    pub active_rounds: usize,
}
