//! Scripted nodes driving a live scheduler
//!
//! Each simulated node learns about its rounds the way a real node would, by
//! reading signed round broadcasts from the update log, and steps through the
//! activity cycle with one poll per tick.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::domain::{Activity, NodeId, Region, RoundId, RoundPhase};
use crate::error::SchedulerResult;
use crate::network::NetworkState;
use crate::scheduler::{PollOutcome, SchedulerHandle, SchedulerMetrics};

/// Outcome of a simulation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationReport {
    pub polls: u64,
    #[serde(rename = "busy-polls")]
    pub busy_polls: u64,
    #[serde(rename = "rejected-polls")]
    pub rejected_polls: u64,
    #[serde(rename = "injected-errors")]
    pub injected_errors: u64,
    #[serde(rename = "timed-out")]
    pub timed_out: bool,
    pub metrics: SchedulerMetrics,
}

/// What a node knows about the latest round it was placed in
#[derive(Debug, Clone, Copy)]
struct Assignment {
    round: RoundId,
    phase: RoundPhase,
}

/// Drives a set of registered nodes against a scheduler handle
pub struct Simulator {
    handle: SchedulerHandle,
    nodes: Vec<NodeId>,
    poll_interval: Duration,
    failure_rate: f64,
}

impl Simulator {
    pub fn new(handle: SchedulerHandle, nodes: Vec<NodeId>) -> Self {
        Self {
            handle,
            nodes,
            poll_interval: Duration::from_millis(10),
            failure_rate: 0.0,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Probability that a precomputing node reports ERROR instead of STANDBY
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Register `count` active nodes with random regions
    pub fn register_nodes(network: &NetworkState, count: usize) -> Vec<NodeId> {
        let mut rng = rand::rng();
        (0..count)
            .map(|i| {
                let id = NodeId::new(format!("node-{i:03}"));
                let region = Region::ALL[rng.random_range(0..Region::COUNT)];
                network.add_node(id.clone(), region.as_str());
                id
            })
            .collect()
    }

    /// Poll until `rounds` rounds finished (completed or failed) or `deadline` passes
    pub async fn run(&self, rounds: u64, deadline: Duration) -> SchedulerResult<SimulationReport> {
        info!(nodes = self.nodes.len(), rounds, ?deadline, "Simulation started");
        let network = self.handle.network().clone();
        let started = Instant::now();

        let mut seen_update = 0u64;
        let mut assignments: HashMap<NodeId, Assignment> = HashMap::new();
        let mut report = SimulationReport {
            polls: 0,
            busy_polls: 0,
            rejected_polls: 0,
            injected_errors: 0,
            timed_out: false,
            metrics: SchedulerMetrics::default(),
        };

        loop {
            for update in network.update_log().since(seen_update) {
                let info = update.payload;
                seen_update = info.update_id;
                for member in &info.topology {
                    assignments.insert(
                        member.clone(),
                        Assignment {
                            round: info.id,
                            phase: info.phase,
                        },
                    );
                }
            }

            for id in &self.nodes {
                let current = network.node(id)?.activity();
                let assigned = assignments.get(id).copied();
                let mut next = next_activity(current, assigned.map(|a| a.phase));

                if next == Activity::Standby && rand::rng().random_bool(self.failure_rate) {
                    report.injected_errors += 1;
                    next = Activity::Error;
                }

                report.polls += 1;
                match self.handle.poll(id, next).await {
                    Ok(PollOutcome::Busy) => report.busy_polls += 1,
                    Ok(PollOutcome::Enqueued) => {
                        debug!(node = %id, from = %current, to = %next, round = ?assigned.map(|a| a.round), "node moved");
                        if next == Activity::Waiting {
                            assignments.remove(id);
                        }
                    }
                    Ok(PollOutcome::Unchanged) => {}
                    Err(e) => {
                        report.rejected_polls += 1;
                        warn!(node = %id, to = %next, error = %e, "Poll rejected");
                    }
                }
            }

            report.metrics = self.handle.metrics().await?;
            if report.metrics.rounds_completed + report.metrics.rounds_failed >= rounds {
                break;
            }
            if started.elapsed() >= deadline {
                report.timed_out = true;
                break;
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        info!(
            completed = report.metrics.rounds_completed,
            failed = report.metrics.rounds_failed,
            polls = report.polls,
            timed_out = report.timed_out,
            "Simulation finished"
        );
        Ok(report)
    }
}

/// The activity a well-behaved node reports next; returning `current` is a heartbeat
fn next_activity(current: Activity, assigned: Option<RoundPhase>) -> Activity {
    match (current, assigned) {
        (Activity::NotStarted, _) | (Activity::Completed, _) | (Activity::Error, _) => Activity::Waiting,
        (_, Some(RoundPhase::Failed)) => Activity::Error,
        (Activity::Waiting, Some(RoundPhase::Precomputing)) => Activity::Precomputing,
        (Activity::Precomputing, Some(RoundPhase::Precomputing)) => Activity::Standby,
        (Activity::Standby, Some(RoundPhase::Realtime)) => Activity::Realtime,
        (Activity::Realtime, Some(RoundPhase::Realtime)) => Activity::Completed,
        (current, _) => current,
    }
}
