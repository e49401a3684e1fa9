//! Testing utilities for users of the everbeat library.
//!
//! This module provides helpers for exercising the recurring chain end to
//! end without a real host:
//!
//! - [`SimHarness`]: drives virtual time over an [`InMemorySink`] and
//!   delivers due firings through a dispatcher
//! - [`FlakyAction`]: an action helper that fails N times then succeeds

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::core::types::ActionId;
use crate::dispatch::{Action, ActionContext, ActionError, DispatchError, Dispatcher};
use crate::sink::{InMemorySink, PendingFiring};

/// Cap on zero-delay delivery cascades within a single `advance` call.
const MAX_DELIVERY_ROUNDS: usize = 100;

/// The result of delivering one host firing through the dispatcher.
#[derive(Debug)]
pub struct DeliveryOutcome {
    /// The firing that was consumed.
    pub firing: PendingFiring,
    /// How its invocation ended.
    pub result: Result<(), DispatchError>,
}

/// Simulation harness: an in-memory host wired to one unit's dispatcher.
///
/// The host consumes a firing whether or not its invocation aborts, so
/// delivery failures are recorded in the returned outcomes rather than
/// propagated. Note that the in-memory rendition does not roll back state
/// changes an aborted invocation made before failing; real hosts provide
/// that atomicity themselves.
pub struct SimHarness {
    sink: Arc<InMemorySink>,
    dispatcher: Dispatcher<InMemorySink>,
}

impl SimHarness {
    /// Create a harness over an already-wired dispatcher and its sink.
    pub fn new(dispatcher: Dispatcher<InMemorySink>, sink: Arc<InMemorySink>) -> Self {
        Self { sink, dispatcher }
    }

    /// The underlying host.
    pub fn sink(&self) -> &Arc<InMemorySink> {
        &self.sink
    }

    /// The unit's dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher<InMemorySink> {
        &self.dispatcher
    }

    /// Perform an external invocation of the unit.
    pub async fn invoke(
        &self,
        action: ActionId,
        payload: Option<Value>,
    ) -> Result<(), DispatchError> {
        self.dispatcher.invoke(action, payload).await
    }

    /// Advance virtual time by `secs`, delivering every firing that becomes
    /// due, including zero-delay follow-ups scheduled by the deliveries
    /// themselves.
    ///
    /// Advancing in one jump coalesces several missed heartbeat occurrences
    /// into a single delivery, matching a host that fires late; step one
    /// second at a time to observe the full cadence.
    pub async fn advance(&self, secs: u64) -> Vec<DeliveryOutcome> {
        let mut outcomes = Vec::new();
        let mut due = self.sink.advance(secs).await;
        let mut rounds = 0;

        loop {
            if due.is_empty() {
                break;
            }

            for firing in due {
                let result = self.dispatcher.deliver(&firing).await;
                if let Err(ref err) = result {
                    tracing::warn!(key = %firing.key, error = %err, "delivered firing aborted");
                }
                outcomes.push(DeliveryOutcome { firing, result });
            }

            rounds += 1;
            if rounds >= MAX_DELIVERY_ROUNDS {
                tracing::warn!(
                    rounds,
                    "delivery cascade hit the round limit, leaving the rest pending"
                );
                break;
            }
            due = self.sink.advance(0).await;
        }

        outcomes
    }
}

/// An action that fails a configurable number of times before succeeding.
///
/// Useful for testing failure isolation. Failure counting is protected by a
/// mutex so behavior stays deterministic under concurrent delivery.
pub struct FlakyAction {
    name: String,
    remaining: Mutex<u32>,
}

impl FlakyAction {
    /// Create an action that fails `failures` times, then succeeds forever.
    pub fn new(name: &str, failures: u32) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            remaining: Mutex::new(failures),
        })
    }
}

#[async_trait::async_trait]
impl Action for FlakyAction {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &mut ActionContext) -> Result<(), ActionError> {
        let mut remaining = self.remaining.lock().await;
        if *remaining > 0 {
            *remaining -= 1;
            return Err(ActionError::Failed(format!(
                "induced failure ({} left)",
                *remaining
            )));
        }
        Ok(())
    }
}
