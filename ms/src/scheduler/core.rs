//! Main scheduler loop implementation

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::assembly::{ProtoRound, TeamAssembler};
use crate::domain::{Activity, FailureCause, NodeId, NodeStatus, RoundId, RoundPhase, TimeoutPhase, UpdateNotification};
use crate::error::{SchedulerError, SchedulerResult};
use crate::network::NetworkState;
use crate::pool::{NodeFilter, WaitingPool};
use crate::tracker::RoundTracker;

use super::cleanup::run_cleanup;
use super::config::SchedulerConfig;
use super::context::SchedulerContext;
use super::handle::SchedulerHandle;
use super::kill::kill_round;
use super::messages::{RoundEvent, RunState, SchedulerMetrics, SchedulerRequest};
use super::starter::run_round_starter;
use super::update::{UpdateEffect, handle_node_update};

/// The scheduler loop: sole writer of pool membership and round progress
pub struct Scheduler {
    ctx: SchedulerContext,
    assembler: TeamAssembler,
    filter: Option<Arc<dyn NodeFilter>>,

    updates_tx: mpsc::Sender<UpdateNotification>,
    updates_rx: mpsc::Receiver<UpdateNotification>,
    events_rx: mpsc::Receiver<RoundEvent>,
    control_tx: mpsc::Sender<SchedulerRequest>,
    control_rx: mpsc::Receiver<SchedulerRequest>,
    protos_tx: mpsc::UnboundedSender<ProtoRound>,
    protos_rx: Option<mpsc::UnboundedReceiver<ProtoRound>>,

    run_state: RunState,
    /// Proto-rounds handed to the starter and not yet reported back, with their members
    in_flight: HashMap<RoundId, Vec<NodeId>>,
    /// Members of in-flight proto-rounds; kept out of the pool
    reserved: HashSet<NodeId>,
    consecutive_failures: u32,
    shutdown_acks: Vec<oneshot::Sender<()>>,
    metrics: SchedulerMetrics,
}

impl Scheduler {
    /// Create a scheduler over `network`; fails on invalid configuration
    pub fn new(config: SchedulerConfig, network: Arc<NetworkState>) -> SchedulerResult<Self> {
        debug!(?config, "Scheduler::new: called");
        config.validate()?;

        let (updates_tx, updates_rx) = mpsc::channel(config.update_channel_buffer);
        let (events_tx, events_rx) = mpsc::channel(config.event_channel_buffer);
        let (control_tx, control_rx) = mpsc::channel(config.event_channel_buffer);
        let (protos_tx, protos_rx) = mpsc::unbounded_channel();

        Ok(Self {
            ctx: SchedulerContext {
                config: Arc::new(config),
                network,
                pool: Arc::new(WaitingPool::new()),
                tracker: Arc::new(RoundTracker::new()),
                events_tx,
            },
            assembler: TeamAssembler::default(),
            filter: None,
            updates_tx,
            updates_rx,
            events_rx,
            control_tx,
            control_rx,
            protos_tx,
            protos_rx: Some(protos_rx),
            run_state: RunState::Running,
            in_flight: HashMap::new(),
            reserved: HashSet::new(),
            consecutive_failures: 0,
            shutdown_acks: Vec::new(),
            metrics: SchedulerMetrics::default(),
        })
    }

    /// Exclude nodes the filter disables from team selection
    pub fn with_filter(mut self, filter: Arc<dyn NodeFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_assembler(mut self, assembler: TeamAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    /// Handle for pollers and operators
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle::new(
            self.updates_tx.clone(),
            self.control_tx.clone(),
            self.ctx.network.clone(),
            self.ctx.pool.clone(),
            self.ctx.tracker.clone(),
        )
    }

    /// Run the loop until a requested shutdown has drained, or until team
    /// assembly keeps failing on configuration errors
    pub async fn run(mut self) -> SchedulerResult<()> {
        info!(team_size = self.ctx.config.team_size, "Scheduler started");

        let protos_rx = self.protos_rx.take().ok_or(SchedulerError::ChannelClosed)?;
        let starter = tokio::spawn(run_round_starter(self.ctx.clone(), protos_rx));
        let cleanup = tokio::spawn(run_cleanup(
            self.ctx.pool.clone(),
            self.ctx.config.node_cleanup_interval(),
            self.ctx.config.node_offline_timeout(),
        ));

        let result = self.event_loop().await;
        cleanup.abort();

        // closing the proto channel stops the starter
        drop(self);
        if let Err(e) = starter.await {
            warn!(error = %e, "Round starter task ended abnormally");
        }

        match &result {
            Ok(()) => info!("Scheduler stopped"),
            Err(e) => error!(error = %e, "Scheduler terminated"),
        }
        result
    }

    async fn event_loop(&mut self) -> SchedulerResult<()> {
        loop {
            tokio::select! {
                Some(update) = self.updates_rx.recv() => {
                    self.process_update(update);
                }
                Some(event) = self.events_rx.recv() => {
                    self.handle_round_event(event);
                }
                Some(request) = self.control_rx.recv() => {
                    self.handle_request(request);
                }
                else => {
                    warn!("All scheduler channels closed");
                    return Err(SchedulerError::ChannelClosed);
                }
            }

            if self.run_state == RunState::Running {
                self.assemble_rounds()?;
            }

            if self.run_state == RunState::Draining && self.is_quiescent() {
                self.run_state = RunState::Stopped;
                info!("Scheduler drained");
                for ack in self.shutdown_acks.drain(..) {
                    let _ = ack.send(());
                }
                return Ok(());
            }
        }
    }

    fn is_quiescent(&self) -> bool {
        self.ctx.tracker.is_empty() && self.in_flight.is_empty()
    }

    fn process_update(&mut self, update: UpdateNotification) {
        self.metrics.updates_processed += 1;
        let node = self.ctx.network.node(&update.node).ok();
        if let Some(node) = &node
            && !node.handoff().take_ownership()
        {
            debug!(node = %node.id(), "process_update: notification without hand-off lock");
        }

        let result = handle_node_update(&self.ctx, &update, &self.reserved);

        if let Some(node) = node {
            node.handoff().release();
        }

        match result {
            Ok(UpdateEffect::RoundAdvanced(RoundPhase::Completed)) => self.metrics.rounds_completed += 1,
            Ok(UpdateEffect::RoundKilled) => self.metrics.rounds_failed += 1,
            Ok(_) => {}
            Err(e) => {
                self.metrics.update_errors += 1;
                error!(node = %update.node, to = %update.to_activity, error = %e, "Node update rejected");
            }
        }
    }

    fn handle_round_event(&mut self, event: RoundEvent) {
        match event {
            RoundEvent::TimedOut { round, phase } => self.handle_timeout(round, phase),
            RoundEvent::Started(round) => {
                self.release_reservation(round);
                self.metrics.rounds_started += 1;
                debug!(%round, "handle_round_event: started");
            }
            RoundEvent::StartFailed { proto, error } => {
                self.release_reservation(proto.id);
                self.metrics.start_failures += 1;
                warn!(round = %proto.id, %error, "Returning members of unstarted round to the pool");
                for node in proto.nodes {
                    if node.round().is_none()
                        && node.status() != NodeStatus::Banned
                        && node.activity() == Activity::Waiting
                    {
                        self.ctx.pool.add(node);
                    }
                }
            }
            RoundEvent::Finished(round) => {
                debug!(%round, active = self.ctx.tracker.len(), "handle_round_event: finished");
            }
        }
    }

    fn release_reservation(&mut self, round: RoundId) {
        if let Some(members) = self.in_flight.remove(&round) {
            for id in members {
                self.reserved.remove(&id);
            }
        }
    }

    fn handle_timeout(&mut self, id: RoundId, watched: TimeoutPhase) {
        let round = match self.ctx.network.round(id) {
            Ok(round) => round,
            Err(e) => {
                error!(%id, error = %e, "Timeout for unknown round");
                return;
            }
        };

        let phase = round.phase();
        if phase.is_terminal() {
            debug!(%id, %phase, "handle_timeout: round already finished");
            return;
        }
        if watched == TimeoutPhase::Precomputation && phase != RoundPhase::Precomputing {
            debug!(%id, %phase, "handle_timeout: stale precomputation timer");
            return;
        }

        let cause = FailureCause::Timeout(TimeoutPhase::classify(phase));
        self.metrics.timeouts += 1;
        match kill_round(&self.ctx, &round, None, cause) {
            Ok(true) => self.metrics.rounds_failed += 1,
            Ok(false) => {}
            Err(e) => error!(%id, error = %e, "Failed to kill timed out round"),
        }
    }

    fn handle_request(&mut self, request: SchedulerRequest) {
        match request {
            SchedulerRequest::GetMetrics { reply_tx } => {
                let _ = reply_tx.send(self.snapshot_metrics());
            }
            SchedulerRequest::Shutdown { ack_tx } => {
                if self.run_state == RunState::Running {
                    info!(
                        active = self.ctx.tracker.len(),
                        in_flight = self.in_flight.len(),
                        "Shutdown requested, draining"
                    );
                    self.run_state = RunState::Draining;
                }
                self.shutdown_acks.push(ack_tx);
            }
        }
    }

    fn snapshot_metrics(&self) -> SchedulerMetrics {
        SchedulerMetrics {
            run_state: self.run_state,
            pool_size: self.ctx.pool.len(),
            offline_size: self.ctx.pool.offline_len(),
            active_rounds: self.ctx.tracker.len(),
            ..self.metrics.clone()
        }
    }

    /// Form rounds while the pool allows
    fn assemble_rounds(&mut self) -> SchedulerResult<()> {
        while self.assemble_one()? {}
        Ok(())
    }

    /// Pick, order and hand one team to the starter
    ///
    /// Returns false when the pool is too small. Configuration errors return
    /// the picked nodes to the pool and only end the loop once they repeat
    /// `max-assembly-failures` times in a row.
    fn assemble_one(&mut self) -> SchedulerResult<bool> {
        let config = &self.ctx.config;
        let threshold = config.threshold_for(self.ctx.network.count_active_nodes());

        let picked = match self
            .ctx
            .pool
            .pick_n_rand_at_threshold(threshold, config.team_size, self.filter.as_deref())
        {
            Ok(picked) => picked,
            Err(e) if e.is_steady_state() => return Ok(false),
            Err(e) => return Err(e),
        };

        let result = self.ctx.network.reserve_round_id().and_then(|id| {
            self.assembler.create_proto_round(
                id,
                picked.clone(),
                config.batch_size,
                config.precomputation_timeout(),
                config.realtime_timeout(),
            )
        });

        let proto = match result {
            Ok(proto) => proto,
            Err(e) => {
                for node in picked {
                    self.ctx.pool.add(node);
                }
                self.metrics.assembly_failures += 1;
                if !e.is_configuration() {
                    return Err(e);
                }
                self.consecutive_failures += 1;
                warn!(
                    error = %e,
                    consecutive = self.consecutive_failures,
                    "Team assembly failed"
                );
                if self.consecutive_failures >= config.max_assembly_failures {
                    return Err(e);
                }
                return Ok(false);
            }
        };

        self.consecutive_failures = 0;
        self.metrics.rounds_assembled += 1;
        info!(round = %proto.id, team = ?proto.topology, "Team assembled");
        let (id, members) = (proto.id, proto.topology.clone());
        self.protos_tx.send(proto).map_err(|_| SchedulerError::ChannelClosed)?;
        self.reserved.extend(members.iter().cloned());
        self.in_flight.insert(id, members);
        Ok(true)
    }
}
