//! Node status, node activity and round phase enums
//!
//! Activity validity is defined once, in [`Activity::can_transition_to`]. The
//! scheduler's update handler trusts notifications produced through it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Administrative status of a node, orthogonal to its activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Known but not yet admitted
    #[default]
    Unregistered,
    /// Admitted and polling
    Active,
    /// Swept offline after missing polls
    Inactive,
    /// Permanently excluded from scheduling
    Banned,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unregistered => write!(f, "unregistered"),
            Self::Active => write!(f, "active"),
            Self::Inactive => write!(f, "inactive"),
            Self::Banned => write!(f, "banned"),
        }
    }
}

/// Operational activity a node reports on each poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Activity {
    #[default]
    NotStarted,
    Waiting,
    Precomputing,
    Standby,
    Realtime,
    Completed,
    Error,
}

impl Activity {
    /// Whether a node may report `next` directly after `self`
    ///
    /// The cycle is NotStarted → Waiting → Precomputing → Standby → Realtime →
    /// Completed → Waiting. Error is reachable from everything except Error, and
    /// a node leaves Error only by going back to Waiting.
    pub fn can_transition_to(self, next: Activity) -> bool {
        use Activity::*;
        match (self, next) {
            (Error, Waiting) => true,
            (Error, _) => false,
            (_, Error) => true,
            (NotStarted, Waiting) => true,
            (Waiting, Precomputing) => true,
            (Precomputing, Standby) => true,
            (Standby, Realtime) => true,
            (Realtime, Completed) => true,
            (Completed, Waiting) => true,
            _ => false,
        }
    }

    /// Activities that only make sense while the node holds a round
    pub fn requires_round(self) -> bool {
        matches!(self, Activity::Standby | Activity::Completed)
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::Waiting => write!(f, "waiting"),
            Self::Precomputing => write!(f, "precomputing"),
            Self::Standby => write!(f, "standby"),
            Self::Realtime => write!(f, "realtime"),
            Self::Completed => write!(f, "completed"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Life-cycle phase of a round; ordering follows the life cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    /// Allocated, not yet committed by round start
    #[default]
    Pending,
    Precomputing,
    Realtime,
    Completed,
    Failed,
}

impl RoundPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, RoundPhase::Completed | RoundPhase::Failed)
    }

    /// Forward moves only; Failed is reachable from any live phase
    pub fn can_advance_to(self, next: RoundPhase) -> bool {
        use RoundPhase::*;
        match (self, next) {
            (Pending, Precomputing) => true,
            (Precomputing, Realtime) => true,
            (Realtime, Completed) => true,
            (Pending | Precomputing | Realtime, Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Precomputing => write!(f, "precomputing"),
            Self::Realtime => write!(f, "realtime"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_ACTIVITIES: [Activity; 7] = [
        Activity::NotStarted,
        Activity::Waiting,
        Activity::Precomputing,
        Activity::Standby,
        Activity::Realtime,
        Activity::Completed,
        Activity::Error,
    ];

    #[test]
    fn test_activity_cycle_is_valid() {
        let cycle = [
            Activity::Waiting,
            Activity::Precomputing,
            Activity::Standby,
            Activity::Realtime,
            Activity::Completed,
            Activity::Waiting,
        ];
        assert!(Activity::NotStarted.can_transition_to(Activity::Waiting));
        for pair in cycle.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_error_reachable_from_non_terminal() {
        for activity in ALL_ACTIVITIES {
            let expected = activity != Activity::Error;
            assert_eq!(activity.can_transition_to(Activity::Error), expected, "{activity}");
        }
        assert!(Activity::Error.can_transition_to(Activity::Waiting));
        assert!(!Activity::Error.can_transition_to(Activity::Precomputing));
    }

    #[test]
    fn test_activity_skips_rejected() {
        assert!(!Activity::Waiting.can_transition_to(Activity::Standby));
        assert!(!Activity::Precomputing.can_transition_to(Activity::Waiting));
        assert!(!Activity::Completed.can_transition_to(Activity::Precomputing));
        for activity in ALL_ACTIVITIES {
            assert!(!activity.can_transition_to(activity), "{activity} -> itself");
        }
    }

    #[test]
    fn test_round_phase_monotonic() {
        assert!(RoundPhase::Pending.can_advance_to(RoundPhase::Precomputing));
        assert!(RoundPhase::Precomputing.can_advance_to(RoundPhase::Realtime));
        assert!(RoundPhase::Realtime.can_advance_to(RoundPhase::Completed));
        assert!(RoundPhase::Realtime.can_advance_to(RoundPhase::Failed));
        assert!(!RoundPhase::Realtime.can_advance_to(RoundPhase::Precomputing));
        assert!(!RoundPhase::Completed.can_advance_to(RoundPhase::Failed));
        assert!(!RoundPhase::Failed.can_advance_to(RoundPhase::Failed));
        assert!(!RoundPhase::Precomputing.can_advance_to(RoundPhase::Completed));
    }

    #[test]
    fn test_round_phase_ordering() {
        assert!(RoundPhase::Precomputing < RoundPhase::Realtime);
        assert!(RoundPhase::Completed.is_terminal());
        assert!(RoundPhase::Failed.is_terminal());
        assert!(!RoundPhase::Realtime.is_terminal());
    }
}
