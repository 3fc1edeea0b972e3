//! mixsched - round scheduler for a permissioned mix-network
//!
//! Worker nodes poll in with their current activity. The scheduler keeps a
//! pool of waiting nodes, assembles fixed-size teams from it in a
//! latency-aware order, starts them as rounds, and fails rounds that stall or
//! whose members error out or get banned.
//!
//! # Modules
//!
//! - [`domain`] - node, round and notification types and their state machines
//! - [`network`] - shared registry, round map, signed update log
//! - [`pool`] - waiting pool of schedulable nodes
//! - [`assembly`] - latency-optimal team ordering
//! - [`tracker`] - active-round bookkeeping
//! - [`scheduler`] - the scheduler loop and its workers
//! - [`simulation`] - scripted nodes driving a live scheduler
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod assembly;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod network;
pub mod pool;
pub mod scheduler;
pub mod simulation;
pub mod tracker;

// Re-export commonly used types
pub use assembly::{LatencyTable, ProtoRound, TeamAssembler};
pub use config::Config;
pub use domain::{
    Activity, FailureCause, NodeId, NodeState, NodeStatus, Region, RoundError, RoundId, RoundInfo, RoundPhase,
    RoundState, TimeoutPhase, UpdateNotification,
};
pub use error::{SchedulerError, SchedulerResult};
pub use network::{InMemoryRoundIds, NetworkState, RoundIdSource, RoundSigner, Signed, UpdateLog};
pub use pool::{NodeFilter, WaitingPool};
pub use scheduler::{PollOutcome, RunState, Scheduler, SchedulerConfig, SchedulerHandle, SchedulerMetrics};
pub use simulation::{SimulationReport, Simulator};
pub use tracker::RoundTracker;
