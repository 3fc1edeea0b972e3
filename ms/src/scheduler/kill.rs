//! Round kill path shared by bans, node errors and timeouts

use chrono::Utc;
use tracing::{debug, warn};

use crate::domain::{FailureCause, NodeState, RoundState};
use crate::error::SchedulerResult;

use super::context::SchedulerContext;

/// Fail `round`, attributing it to `node` if given
///
/// Idempotent: only the call that moves the round to FAILED publishes the
/// error record and the round broadcast; later calls return `Ok(false)`. The
/// triggering node always loses its round reference.
pub(crate) fn kill_round(
    ctx: &SchedulerContext,
    round: &RoundState,
    node: Option<&NodeState>,
    cause: FailureCause,
) -> SchedulerResult<bool> {
    debug!(round = %round.id(), node = ?node.map(|n| n.id()), %cause, "kill_round: called");
    if let Some(node) = node {
        node.clear_round();
    }

    if !round.fail(Utc::now()) {
        debug!(round = %round.id(), phase = %round.phase(), "kill_round: already terminal");
        return Ok(false);
    }

    ctx.tracker.remove(round.id());
    ctx.network
        .publish_round_error(round.id(), node.map(|n| n.id().clone()), cause)?;
    ctx.network.publish_round(round)?;
    warn!(round = %round.id(), node = ?node.map(|n| n.id()), %cause, "Round killed");
    Ok(true)
}
