//! Round failure causes and error records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::id::{NodeId, RoundId};
use super::states::RoundPhase;

/// Phase a round was in when its timer fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutPhase {
    Precomputation,
    Realtime,
}

impl TimeoutPhase {
    /// Realtime once the round got past precomputing
    pub fn classify(phase: RoundPhase) -> Self {
        if phase > RoundPhase::Precomputing {
            TimeoutPhase::Realtime
        } else {
            TimeoutPhase::Precomputation
        }
    }
}

impl fmt::Display for TimeoutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Precomputation => write!(f, "precomputation"),
            Self::Realtime => write!(f, "realtime"),
        }
    }
}

/// Why a round was killed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    Timeout(TimeoutPhase),
    NodeError,
    NodeBanned,
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout(phase) => write!(f, "round timed out in {phase}"),
            Self::NodeError => write!(f, "node reported an error"),
            Self::NodeBanned => write!(f, "node was banned"),
        }
    }
}

/// Payload of a signed round-error record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundError {
    #[serde(rename = "round-id")]
    pub round_id: RoundId,
    /// Node the failure is attributed to; timeouts carry none
    pub node: Option<NodeId>,
    pub cause: FailureCause,
    pub at: DateTime<Utc>,
}
