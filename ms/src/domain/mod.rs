//! Domain types for the round scheduler
//!
//! Nodes and rounds have independent lifetimes: a node refers to its round by
//! [`RoundId`] only, and the round map in the network state resolves it.

mod failure;
mod id;
mod node;
mod notification;
mod region;
mod round;
mod states;

pub use failure::{FailureCause, RoundError, TimeoutPhase};
pub use id::{NodeId, RoundId};
pub use node::{Handoff, HandoffState, NodeState};
pub use notification::UpdateNotification;
pub use region::Region;
pub use round::{RoundInfo, RoundState};
pub use states::{Activity, NodeStatus, RoundPhase};
