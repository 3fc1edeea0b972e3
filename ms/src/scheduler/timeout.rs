//! Per-phase round timeout watchers
//!
//! A watcher races a timer against the round's phase channel. Expiry is
//! reported to the loop as [`RoundEvent::TimedOut`]; the loop decides what it
//! means. Leaving the watched phase ends the watcher, and the realtime watcher
//! additionally retires the round from the tracker.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::{RoundPhase, RoundState, TimeoutPhase};

use super::context::SchedulerContext;
use super::messages::RoundEvent;

fn watched_phase(phase: TimeoutPhase) -> RoundPhase {
    match phase {
        TimeoutPhase::Precomputation => RoundPhase::Precomputing,
        TimeoutPhase::Realtime => RoundPhase::Realtime,
    }
}

/// Spawn the watcher for `phase` of `round`
pub(crate) fn spawn_phase_watcher(
    ctx: &SchedulerContext,
    round: Arc<RoundState>,
    phase: TimeoutPhase,
    timeout: Duration,
) -> JoinHandle<()> {
    let ctx = ctx.clone();
    tokio::spawn(async move {
        let id = round.id();
        let watched = watched_phase(phase);
        let mut phases = round.subscribe();
        debug!(round = %id, %phase, ?timeout, "phase watcher started");

        let left = tokio::select! {
            // the sender lives in `round`, which this task holds
            changed = phases.wait_for(|p| *p != watched) => Some(changed.map(|p| *p).unwrap_or(RoundPhase::Failed)),
            _ = tokio::time::sleep(timeout) => None,
        };

        match left {
            None => {
                warn!(round = %id, %phase, ?timeout, "Round phase timer expired");
                if ctx.events_tx.send(RoundEvent::TimedOut { round: id, phase }).await.is_err() {
                    debug!(round = %id, "phase watcher: loop gone");
                }
            }
            Some(reached) => {
                debug!(round = %id, %phase, %reached, "phase watcher: phase left");
                if phase == TimeoutPhase::Realtime {
                    ctx.tracker.remove(id);
                    if ctx.events_tx.send(RoundEvent::Finished(id)).await.is_err() {
                        debug!(round = %id, "phase watcher: loop gone");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NodeId, RoundId};
    use crate::scheduler::test_support::context;
    use chrono::Utc;

    fn started_round(ctx: &SchedulerContext, id: u64) -> Arc<RoundState> {
        let round = ctx
            .network
            .rounds()
            .add(RoundState::new(RoundId::new(id), vec![NodeId::new("a")], 8))
            .unwrap();
        round.advance(RoundPhase::Precomputing, Utc::now()).unwrap();
        ctx.tracker.add(round.id());
        round
    }

    #[tokio::test]
    async fn test_precomputation_timer_expires() {
        let (ctx, mut events) = context(Default::default());
        let round = started_round(&ctx, 1);
        spawn_phase_watcher(&ctx, round, TimeoutPhase::Precomputation, Duration::from_millis(10));

        let event = events.recv().await.unwrap();
        assert!(matches!(
            event,
            RoundEvent::TimedOut { round, phase: TimeoutPhase::Precomputation } if round == RoundId::new(1)
        ));
    }

    #[tokio::test]
    async fn test_precomputation_watcher_exits_quietly() {
        let (ctx, mut events) = context(Default::default());
        let round = started_round(&ctx, 2);
        let watcher = spawn_phase_watcher(&ctx, round.clone(), TimeoutPhase::Precomputation, Duration::from_secs(30));

        round.advance(RoundPhase::Realtime, Utc::now()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), watcher).await.unwrap().unwrap();
        assert!(events.try_recv().is_err());
        assert!(ctx.tracker.contains(round.id()));
    }

    #[tokio::test]
    async fn test_realtime_watcher_retires_round() {
        let (ctx, mut events) = context(Default::default());
        let round = started_round(&ctx, 3);
        round.advance(RoundPhase::Realtime, Utc::now()).unwrap();
        spawn_phase_watcher(&ctx, round.clone(), TimeoutPhase::Realtime, Duration::from_secs(30));

        round.advance(RoundPhase::Completed, Utc::now()).unwrap();
        let event = events.recv().await.unwrap();
        assert!(matches!(event, RoundEvent::Finished(id) if id == round.id()));
        assert!(ctx.tracker.is_empty());
    }
}
