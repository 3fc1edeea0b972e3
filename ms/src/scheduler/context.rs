//! State shared by the loop and the tasks it spawns

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::network::NetworkState;
use crate::pool::WaitingPool;
use crate::tracker::RoundTracker;

use super::config::SchedulerConfig;
use super::messages::RoundEvent;

#[derive(Debug, Clone)]
pub(crate) struct SchedulerContext {
    pub(crate) config: Arc<SchedulerConfig>,
    pub(crate) network: Arc<NetworkState>,
    pub(crate) pool: Arc<WaitingPool>,
    pub(crate) tracker: Arc<RoundTracker>,
    /// Feeds timeouts, start results and retirements back into the loop
    pub(crate) events_tx: mpsc::Sender<RoundEvent>,
}
