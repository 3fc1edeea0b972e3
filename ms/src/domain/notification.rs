//! Node update notifications
//!
//! Produced once by the polling front, consumed once by the scheduler loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::NodeId;
use super::states::{Activity, NodeStatus};

/// Immutable record of one node state change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateNotification {
    pub node: NodeId,
    #[serde(rename = "from-activity")]
    pub from_activity: Activity,
    #[serde(rename = "to-activity")]
    pub to_activity: Activity,
    #[serde(rename = "from-status")]
    pub from_status: NodeStatus,
    #[serde(rename = "to-status")]
    pub to_status: NodeStatus,
    pub at: DateTime<Utc>,
}

impl UpdateNotification {
    /// Notification for an activity change under an unchanged status
    pub fn activity(node: NodeId, status: NodeStatus, from: Activity, to: Activity, at: DateTime<Utc>) -> Self {
        Self {
            node,
            from_activity: from,
            to_activity: to,
            from_status: status,
            to_status: status,
            at,
        }
    }

    /// Notification for a status change under an unchanged activity
    pub fn status(node: NodeId, activity: Activity, from: NodeStatus, to: NodeStatus, at: DateTime<Utc>) -> Self {
        Self {
            node,
            from_activity: activity,
            to_activity: activity,
            from_status: from,
            to_status: to,
            at,
        }
    }

    pub fn changes_status(&self) -> bool {
        self.from_status != self.to_status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_constructors() {
        let now = Utc::now();
        let n = UpdateNotification::activity(
            NodeId::new("n1"),
            NodeStatus::Active,
            Activity::NotStarted,
            Activity::Waiting,
            now,
        );
        assert!(!n.changes_status());
        assert_eq!(n.to_activity, Activity::Waiting);

        let n = UpdateNotification::status(
            NodeId::new("n1"),
            Activity::Waiting,
            NodeStatus::Active,
            NodeStatus::Banned,
            now,
        );
        assert!(n.changes_status());
        assert_eq!(n.from_activity, n.to_activity);
    }

    #[test]
    fn test_notification_serialization() {
        let n = UpdateNotification::activity(
            NodeId::new("n1"),
            NodeStatus::Active,
            Activity::Standby,
            Activity::Realtime,
            Utc::now(),
        );
        let json = serde_json::to_string(&n).unwrap();
        assert!(json.contains("from-activity"));
        assert!(json.contains("\"realtime\""));
    }
}
