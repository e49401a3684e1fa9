//! Recurring timer for one (owner, action) pair.
//!
//! A [`RecurringTimer`] owns the cancel-then-reschedule protocol for a single
//! logical timer. Every call to [`arm`](RecurringTimer::arm) resets the
//! countdown: the previous pending firing (if any) is cancelled and a fresh
//! one is installed, so the host holds at most one pending firing for the
//! timer's key at any instant.

use crate::core::types::{ActionId, OwnerId, TimerKey, MAX_DELAY};
use crate::sink::{ActionSink, SinkError};

/// The scheduling intent for one (owner, action) pair.
///
/// Per key the observable state machine is `Idle -> Scheduled -> (fires) ->
/// Idle -> Scheduled -> ...`; a re-entrant `arm` while `Scheduled` lands in
/// `Scheduled` again (cancel old, install new) with no intermediate state
/// visible to callers.
///
/// # Recurrence semantics
///
/// When the dispatch layer arms this timer on every invocation, the interval
/// is a floor, not a period: the designated action fires at least `delay`
/// seconds after the *last* invocation of any kind. Frequent unrelated
/// traffic keeps pushing the countdown forward.
#[derive(Debug, Clone, Copy)]
pub struct RecurringTimer {
    owner: OwnerId,
    action: ActionId,
    delay_secs: u32,
}

impl RecurringTimer {
    /// Create a timer for `action` under `owner`, requesting `delay_secs`
    /// between the arming invocation and the firing.
    pub fn new(owner: OwnerId, action: ActionId, delay_secs: u32) -> Self {
        Self {
            owner,
            action,
            delay_secs,
        }
    }

    /// The owning identity.
    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    /// The action invoked when the timer fires.
    pub fn action(&self) -> ActionId {
        self.action
    }

    /// The requested delay in seconds.
    pub fn delay_secs(&self) -> u32 {
        self.delay_secs
    }

    /// The delay actually submitted to the host, clamped to
    /// [`MAX_DELAY`].
    pub fn effective_delay(&self) -> u32 {
        self.delay_secs.min(MAX_DELAY)
    }

    /// The key this timer's pending firing lives under.
    pub fn key(&self) -> TimerKey {
        TimerKey::derive(self.owner, self.action)
    }

    /// Reset the countdown: cancel whatever firing is pending for this
    /// timer's key, then install a fresh one.
    ///
    /// Cancel-first makes the operation idempotent and commutative in
    /// practice (last arm wins) and keeps the host's table free of duplicate
    /// entries it would otherwise reject.
    ///
    /// # Errors
    ///
    /// A host rejection of the schedule request is propagated unchanged and
    /// is fatal to the invoking action; there is no local retry. The next
    /// external invocation re-arms again.
    pub async fn arm(&self, sink: &dyn ActionSink) -> Result<(), SinkError> {
        let key = self.key();
        sink.cancel(key).await;

        let delay = self.effective_delay();
        tracing::debug!(%key, delay, "re-arming recurring timer");
        sink.schedule(key, self.action, delay).await
    }
}
