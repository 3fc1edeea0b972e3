//! Node update handling
//!
//! Every notification is first classified by its status transition and the
//! state of the node's round, then by target activity. The match is
//! exhaustive; anything that breaks the protocol comes back as an error for
//! the loop to log and count.

use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::{
    Activity, FailureCause, NodeId, NodeState, NodeStatus, RoundPhase, RoundState, TimeoutPhase, UpdateNotification,
};
use crate::error::{SchedulerError, SchedulerResult};

use super::context::SchedulerContext;
use super::kill::kill_round;
use super::timeout::spawn_phase_watcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpdateKind {
    /// Status moved to Banned
    Ban,
    /// Banned → Banned
    AlreadyBanned,
    /// The node's round already failed and this is not an ERROR report
    StaleAfterFailure,
    Activity(Activity),
}

fn classify(update: &UpdateNotification, round_phase: Option<RoundPhase>) -> UpdateKind {
    match (update.from_status, update.to_status) {
        (NodeStatus::Banned, NodeStatus::Banned) => UpdateKind::AlreadyBanned,
        (_, NodeStatus::Banned) => UpdateKind::Ban,
        _ if round_phase == Some(RoundPhase::Failed) && update.to_activity != Activity::Error => {
            UpdateKind::StaleAfterFailure
        }
        _ => UpdateKind::Activity(update.to_activity),
    }
}

/// What an applied update did, for the loop's bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UpdateEffect {
    Nothing,
    /// The node joined the waiting pool
    Waiting,
    /// The update completed the team's readiness and moved the round
    RoundAdvanced(RoundPhase),
    /// The update failed the node's round
    RoundKilled,
}

/// Apply one notification to node, pool and round state
///
/// `reserved` holds members of teams handed to the starter but not yet
/// started; they stay out of the pool until the start resolves.
pub(crate) fn handle_node_update(
    ctx: &SchedulerContext,
    update: &UpdateNotification,
    reserved: &HashSet<NodeId>,
) -> SchedulerResult<UpdateEffect> {
    debug!(
        node = %update.node,
        from = %update.from_activity,
        to = %update.to_activity,
        status = %update.to_status,
        "handle_node_update: called"
    );
    let node = ctx.network.node(&update.node)?;
    let round = node.round().map(|id| ctx.network.round(id)).transpose()?;

    match classify(update, round.as_ref().map(|r| r.phase())) {
        UpdateKind::AlreadyBanned => {
            debug!(node = %node.id(), "handle_node_update: already banned");
            Ok(UpdateEffect::Nothing)
        }
        UpdateKind::Ban => {
            ctx.pool.ban(node.id());
            match round {
                Some(round) => killed(kill_round(ctx, &round, Some(&node), FailureCause::NodeBanned)?),
                None => Ok(UpdateEffect::Nothing),
            }
        }
        UpdateKind::StaleAfterFailure => {
            debug!(node = %node.id(), to = %update.to_activity, "handle_node_update: round already failed");
            Ok(UpdateEffect::Nothing)
        }
        UpdateKind::Activity(activity) => match activity {
            Activity::NotStarted | Activity::Precomputing | Activity::Realtime => Ok(UpdateEffect::Nothing),
            Activity::Waiting => {
                node.clear_round();
                if node.status() == NodeStatus::Banned {
                    return Ok(UpdateEffect::Nothing);
                }
                if reserved.contains(node.id()) {
                    debug!(node = %node.id(), "handle_node_update: reserved for a pending round");
                    return Ok(UpdateEffect::Nothing);
                }
                ctx.pool.add(node);
                Ok(UpdateEffect::Waiting)
            }
            Activity::Standby => {
                let round = require_round(&node, round, activity)?;
                on_standby(ctx, round)
            }
            Activity::Completed => {
                let round = require_round(&node, round, activity)?;
                node.clear_round();
                on_completed(ctx, &round)
            }
            Activity::Error => match round {
                Some(round) => killed(kill_round(ctx, &round, Some(&node), FailureCause::NodeError)?),
                None => Ok(UpdateEffect::Nothing),
            },
        },
    }
}

fn killed(first: bool) -> SchedulerResult<UpdateEffect> {
    Ok(if first { UpdateEffect::RoundKilled } else { UpdateEffect::Nothing })
}

fn require_round(
    node: &NodeState,
    round: Option<Arc<RoundState>>,
    activity: Activity,
) -> SchedulerResult<Arc<RoundState>> {
    round.ok_or_else(|| SchedulerError::NoRound {
        node: node.id().clone(),
        activity,
    })
}

fn on_standby(ctx: &SchedulerContext, round: Arc<RoundState>) -> SchedulerResult<UpdateEffect> {
    if !round.increment_ready()? {
        return Ok(UpdateEffect::Nothing);
    }

    let start = Utc::now() + chrono::Duration::milliseconds(ctx.config.realtime_delay_ms as i64);
    round.advance(RoundPhase::Realtime, start)?;
    ctx.network.publish_round(&round)?;
    info!(round = %round.id(), %start, "Round entering realtime");

    spawn_phase_watcher(ctx, round, TimeoutPhase::Realtime, ctx.config.realtime_timeout());
    Ok(UpdateEffect::RoundAdvanced(RoundPhase::Realtime))
}

fn on_completed(ctx: &SchedulerContext, round: &RoundState) -> SchedulerResult<UpdateEffect> {
    if !round.increment_ready()? {
        return Ok(UpdateEffect::Nothing);
    }

    round.advance(RoundPhase::Completed, Utc::now())?;
    ctx.network.publish_round(round)?;
    info!(round = %round.id(), "Round completed");
    Ok(UpdateEffect::RoundAdvanced(RoundPhase::Completed))
}
