//! Round scheduler
//!
//! A single loop task consumes node update notifications, round events and
//! control requests. Around it:
//! - **Poll front:** [`SchedulerHandle::poll`] takes the node's hand-off lock and enqueues changes
//! - **Round starter:** commits assembled teams, paced by the inter-round delay
//! - **Phase watchers:** one timer per round per pending phase
//! - **Cleanup sweep:** moves unresponsive waiting nodes offline

mod cleanup;
mod config;
mod context;
mod core;
mod handle;
mod kill;
mod messages;
mod starter;
mod timeout;
mod update;

pub use config::SchedulerConfig;
pub use core::Scheduler;
pub use handle::SchedulerHandle;
pub use messages::{PollOutcome, RoundEvent, RunState, SchedulerMetrics, SchedulerRequest};

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use tokio::sync::mpsc;

    use super::config::SchedulerConfig;
    use super::context::SchedulerContext;
    use super::messages::RoundEvent;
    use crate::network::NetworkState;
    use crate::pool::WaitingPool;
    use crate::tracker::RoundTracker;

    /// Fresh context over in-memory network state, with the event receiver
    pub(crate) fn context(config: SchedulerConfig) -> (SchedulerContext, mpsc::Receiver<RoundEvent>) {
        let (events_tx, events_rx) = mpsc::channel(64);
        let ctx = SchedulerContext {
            config: Arc::new(config),
            network: Arc::new(NetworkState::in_memory([9u8; 32])),
            pool: Arc::new(WaitingPool::new()),
            tracker: Arc::new(RoundTracker::new()),
            events_tx,
        };
        (ctx, events_rx)
    }
}
