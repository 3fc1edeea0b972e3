//! Background sweep moving unresponsive waiting nodes offline

use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::pool::WaitingPool;

/// Sweep the pool every `interval`; runs until aborted
pub(crate) async fn run_cleanup(pool: Arc<WaitingPool>, interval: Duration, offline_timeout: Duration) {
    debug!(?interval, ?offline_timeout, "run_cleanup: started");
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let moved = pool.clean_offline_nodes(offline_timeout);
        debug!(moved = moved.len(), online = pool.len(), "run_cleanup: swept");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NodeId, NodeState, NodeStatus};
    use chrono::Utc;

    #[tokio::test]
    async fn test_sweep_moves_stale_nodes() {
        let pool = Arc::new(WaitingPool::new());
        let stale = Arc::new(NodeState::new(NodeId::new("stale"), "Asia", NodeStatus::Active));
        stale.set_last_poll(Utc::now() - chrono::Duration::seconds(30));
        pool.add(stale.clone());

        let sweeper = tokio::spawn(run_cleanup(
            pool.clone(),
            Duration::from_millis(10),
            Duration::from_secs(5),
        ));
        tokio::time::sleep(Duration::from_millis(100)).await;
        sweeper.abort();

        assert!(pool.is_offline(stale.id()));
        assert_eq!(stale.status(), NodeStatus::Inactive);
    }
}
