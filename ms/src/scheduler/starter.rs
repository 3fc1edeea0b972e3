//! Round starter worker
//!
//! Commits proto-rounds handed over by the loop, pacing creation by the
//! minimum inter-round delay, and reports each outcome back as a round event.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::assembly::ProtoRound;
use crate::domain::{NodeStatus, RoundPhase, RoundState, TimeoutPhase};
use crate::error::{SchedulerError, SchedulerResult};

use super::context::SchedulerContext;
use super::messages::RoundEvent;
use super::timeout::spawn_phase_watcher;

/// Run until the loop drops its end of the proto-round channel
pub(crate) async fn run_round_starter(ctx: SchedulerContext, mut protos: mpsc::UnboundedReceiver<ProtoRound>) {
    debug!("run_round_starter: started");
    while let Some(proto) = protos.recv().await {
        tokio::time::sleep(ctx.config.min_delay_between_rounds()).await;

        let id = proto.id;
        let event = match start_round(&ctx, &proto) {
            Ok(_) => RoundEvent::Started(id),
            Err(e) => {
                error!(round = %id, error = %e, "Failed to start round");
                RoundEvent::StartFailed { proto, error: e }
            }
        };
        if ctx.events_tx.send(event).await.is_err() {
            debug!("run_round_starter: loop gone");
            break;
        }
    }
    debug!("run_round_starter: stopped");
}

/// Commit `proto`: allocate, advance to PRECOMPUTING, attach, publish, track
///
/// Members are checked before any is attached, so a rejected round leaves
/// no node holding it. The round is tracked before any member can see it,
/// so a kill racing the start always finds it in the tracker.
pub(crate) fn start_round(ctx: &SchedulerContext, proto: &ProtoRound) -> SchedulerResult<Arc<RoundState>> {
    debug!(round = %proto.id, team = ?proto.topology, "start_round: called");
    for node in &proto.nodes {
        if let Some(held) = node.round() {
            return Err(SchedulerError::NodeHoldsRound {
                node: node.id().clone(),
                held,
            });
        }
        if node.status() == NodeStatus::Banned {
            return Err(SchedulerError::NodeBanned(node.id().clone()));
        }
    }

    let round = ctx
        .network
        .rounds()
        .add(RoundState::new(proto.id, proto.topology.clone(), proto.batch_size))?;
    round.advance(RoundPhase::Precomputing, Utc::now())?;

    ctx.tracker.add(proto.id);
    if let Err(e) = attach_and_publish(ctx, proto, &round) {
        for node in &proto.nodes {
            if node.round() == Some(proto.id) {
                node.clear_round();
            }
        }
        round.fail(Utc::now());
        ctx.tracker.remove(proto.id);
        return Err(e);
    }

    spawn_phase_watcher(
        ctx,
        round.clone(),
        TimeoutPhase::Precomputation,
        proto.precomputation_timeout,
    );
    info!(round = %proto.id, team = ?proto.topology, "Round started");
    Ok(round)
}

fn attach_and_publish(ctx: &SchedulerContext, proto: &ProtoRound, round: &RoundState) -> SchedulerResult<()> {
    for node in &proto.nodes {
        node.set_round(proto.id)?;
    }
    ctx.network.publish_round(round)?;
    Ok(())
}
