//! Scheduler configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::assembly::MAX_TEAM_SIZE;
use crate::error::{SchedulerError, SchedulerResult};

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Nodes per round
    #[serde(rename = "team-size")]
    pub team_size: usize,

    /// Messages per round batch, passed through to the round
    #[serde(rename = "batch-size")]
    pub batch_size: u32,

    #[serde(rename = "precomputation-timeout-ms")]
    pub precomputation_timeout_ms: u64,

    #[serde(rename = "realtime-timeout-ms")]
    pub realtime_timeout_ms: u64,

    /// Pause the round starter takes before creating each round
    #[serde(rename = "min-delay-between-rounds-ms")]
    pub min_delay_between_rounds_ms: u64,

    /// Offset of the realtime start time from the last STANDBY arrival
    #[serde(rename = "realtime-delay-ms")]
    pub realtime_delay_ms: u64,

    /// Fraction of active nodes that must be waiting before a team is picked
    #[serde(rename = "pool-threshold")]
    pub pool_threshold: f64,

    #[serde(rename = "node-cleanup-interval-secs")]
    pub node_cleanup_interval_secs: u64,

    /// Poll age after which a waiting node is moved offline
    #[serde(rename = "node-offline-timeout-secs")]
    pub node_offline_timeout_secs: u64,

    /// Consecutive configuration failures in team assembly before the loop gives up
    #[serde(rename = "max-assembly-failures")]
    pub max_assembly_failures: u32,

    #[serde(rename = "update-channel-buffer")]
    pub update_channel_buffer: usize,

    #[serde(rename = "event-channel-buffer")]
    pub event_channel_buffer: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        debug!("SchedulerConfig::default: called");
        Self {
            team_size: 5,
            batch_size: 32,
            precomputation_timeout_ms: 60_000,
            realtime_timeout_ms: 15_000,
            min_delay_between_rounds_ms: 500,
            realtime_delay_ms: 3_000,
            pool_threshold: 0.75,
            node_cleanup_interval_secs: 60,
            node_offline_timeout_secs: 180,
            max_assembly_failures: 5,
            update_channel_buffer: 1000,
            event_channel_buffer: 100,
        }
    }
}

impl SchedulerConfig {
    pub fn precomputation_timeout(&self) -> Duration {
        Duration::from_millis(self.precomputation_timeout_ms)
    }

    pub fn realtime_timeout(&self) -> Duration {
        Duration::from_millis(self.realtime_timeout_ms)
    }

    pub fn min_delay_between_rounds(&self) -> Duration {
        Duration::from_millis(self.min_delay_between_rounds_ms)
    }

    pub fn realtime_delay(&self) -> Duration {
        Duration::from_millis(self.realtime_delay_ms)
    }

    pub fn node_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.node_cleanup_interval_secs)
    }

    pub fn node_offline_timeout(&self) -> Duration {
        Duration::from_secs(self.node_offline_timeout_secs)
    }

    /// Minimum pool size for `active_nodes` registered active nodes
    pub fn threshold_for(&self, active_nodes: usize) -> usize {
        (self.pool_threshold * active_nodes as f64) as usize
    }

    /// Reject values the scheduler cannot run with
    pub fn validate(&self) -> SchedulerResult<()> {
        debug!(?self, "SchedulerConfig::validate: called");
        if self.team_size == 0 || self.team_size > MAX_TEAM_SIZE {
            return Err(SchedulerError::InvalidConfig(format!(
                "team-size must be between 1 and {MAX_TEAM_SIZE}, got {}",
                self.team_size
            )));
        }
        if self.batch_size == 0 {
            return Err(SchedulerError::InvalidConfig("batch-size must be positive".to_string()));
        }
        if self.precomputation_timeout_ms == 0 || self.realtime_timeout_ms == 0 {
            return Err(SchedulerError::InvalidConfig("phase timeouts must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.pool_threshold) {
            return Err(SchedulerError::InvalidConfig(format!(
                "pool-threshold must be within [0, 1], got {}",
                self.pool_threshold
            )));
        }
        if self.node_cleanup_interval_secs == 0 {
            return Err(SchedulerError::InvalidConfig(
                "node-cleanup-interval-secs must be positive".to_string(),
            ));
        }
        if self.max_assembly_failures == 0 {
            return Err(SchedulerError::InvalidConfig(
                "max-assembly-failures must be at least 1".to_string(),
            ));
        }
        if self.update_channel_buffer == 0 || self.event_channel_buffer == 0 {
            return Err(SchedulerError::InvalidConfig("channel buffers must be positive".to_string()));
        }
        Ok(())
    }
}
