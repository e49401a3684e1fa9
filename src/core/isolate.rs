//! Failure isolation for fallible work on the recurring cadence.
//!
//! The recurring heartbeat's key must never be left un-rescheduled because
//! unrelated business logic failed. Fallible work is therefore never run
//! synchronously from the heartbeat body; instead it is posted as a second,
//! independently-keyed, zero-delay one-shot invocation. If that invocation
//! aborts, the abort consumes only its own schedule entry and has no
//! visibility into the heartbeat's key.

use crate::core::types::{ActionId, OwnerId, TimerKey};
use crate::sink::{ActionSink, SinkError};

/// Post `business` as a zero-delay one-shot invocation under its own key.
///
/// If a prior delegation to the same business action is still pending it is
/// replaced (cancel-then-schedule), so delegating faster than the host fires
/// never builds up duplicate calls.
///
/// # Precondition
///
/// `business` must differ from the action of the heartbeat that calls this.
/// Delegating the heartbeat's own action identifier makes both timers derive
/// the same key and silently merges their schedules; the core does not detect
/// this, because doing so would require it to know which action is the
/// heartbeat.
///
/// # Errors
///
/// Host rejections are propagated unchanged, aborting the delegating
/// invocation.
pub async fn delegate(
    sink: &dyn ActionSink,
    owner: OwnerId,
    business: ActionId,
) -> Result<(), SinkError> {
    let key = TimerKey::derive(owner, business);
    sink.cancel(key).await;

    tracing::debug!(%key, "delegating one-shot invocation");
    sink.schedule(key, business, 0).await
}
