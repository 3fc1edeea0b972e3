//! Scheduler error types

use thiserror::Error;

use crate::domain::{Activity, NodeId, RoundId, RoundPhase};

/// Errors raised by the scheduler and its collaborators
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("Node {0} is not registered")]
    NodeNotRegistered(NodeId),

    #[error("Node {0} is banned")]
    NodeBanned(NodeId),

    #[error("Unknown round: {0}")]
    UnknownRound(RoundId),

    #[error("Node {node} reported {activity} without holding a round")]
    NoRound { node: NodeId, activity: Activity },

    #[error("Node {node} cannot move from {from} to {to}")]
    InvalidActivityTransition { node: NodeId, from: Activity, to: Activity },

    #[error("Round {round} cannot move from {from} to {to}")]
    InvalidRoundTransition {
        round: RoundId,
        from: RoundPhase,
        to: RoundPhase,
    },

    #[error("Round {round} readiness already at team size {team_size}")]
    ReadinessOverflow { round: RoundId, team_size: usize },

    #[error("Node {node} already holds round {held}")]
    NodeHoldsRound { node: NodeId, held: RoundId },

    #[error("Round slot {0} is already occupied")]
    RoundSlotOccupied(RoundId),

    #[error("Waiting pool too small: {available} eligible, threshold {threshold}, team size {team_size}")]
    InsufficientPool {
        available: usize,
        threshold: usize,
        team_size: usize,
    },

    #[error("Unknown region tag: {0:?}")]
    UnknownRegion(String),

    #[error("Cannot order an empty team")]
    EmptyTeam,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Round id source exhausted or unavailable: {0}")]
    RoundIds(String),

    #[error("Signature verification failed")]
    BadSignature,

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Channel closed")]
    ChannelClosed,
}

/// Result alias used across the crate
pub type SchedulerResult<T> = Result<T, SchedulerError>;

impl SchedulerError {
    /// Steady-state conditions the loop simply retries on the next event
    pub fn is_steady_state(&self) -> bool {
        matches!(self, SchedulerError::InsufficientPool { .. })
    }

    /// Misconfiguration that repeats until an operator intervenes
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SchedulerError::UnknownRegion(_) | SchedulerError::InvalidConfig(_) | SchedulerError::EmptyTeam
        )
    }

    /// Protocol violations reported by the node update handler
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            SchedulerError::NoRound { .. }
                | SchedulerError::InvalidActivityTransition { .. }
                | SchedulerError::InvalidRoundTransition { .. }
                | SchedulerError::ReadinessOverflow { .. }
                | SchedulerError::NodeHoldsRound { .. }
        )
    }
}
