//! Action surface and re-arm middleware for one owning unit.
//!
//! The dispatcher is the unit's single entry point for external invocations
//! and for firings delivered by the host. Before running any registered
//! action body it unconditionally re-arms the unit's heartbeat timer, which
//! turns "the unit was invoked" into "the recurring chain's clock is reset"
//! as an explicit, visible policy rather than a hidden side effect.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

use crate::core::isolate;
use crate::core::timer::RecurringTimer;
use crate::core::types::{ActionId, OwnerId, TimerKey};
use crate::events::{Event, EventBus};
use crate::sink::{ActionSink, PendingFiring, SinkError};

/// Errors that can occur inside an action body.
#[derive(Debug, Error)]
pub enum ActionError {
    /// The action's business logic failed with a message.
    #[error("action failed: {0}")]
    Failed(String),

    /// The invocation payload was missing or malformed.
    #[error("bad payload: {0}")]
    BadPayload(String),

    /// A sink operation issued by the action body was rejected.
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// Generic error wrapper.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// The core trait for code invocable on the unit's action surface.
///
/// # Example
///
/// ```ignore
/// use everbeat::{Action, ActionContext, ActionError};
/// use async_trait::async_trait;
///
/// struct Ping;
///
/// #[async_trait]
/// impl Action for Ping {
///     fn name(&self) -> &str {
///         "ping"
///     }
///
///     async fn execute(&self, _ctx: &mut ActionContext) -> Result<(), ActionError> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Action: Send + Sync {
    /// Returns the display name for this action type.
    fn name(&self) -> &str;

    /// Execute the action body with the given invocation context.
    async fn execute(&self, ctx: &mut ActionContext) -> Result<(), ActionError>;
}

/// Per-invocation context handed to an action body.
pub struct ActionContext {
    owner: OwnerId,
    sink: Arc<dyn ActionSink>,
    event_bus: Arc<EventBus>,
    payload: Option<Value>,
}

impl ActionContext {
    /// Create a context. Exposed for testing action bodies in isolation.
    pub fn new(
        owner: OwnerId,
        sink: Arc<dyn ActionSink>,
        event_bus: Arc<EventBus>,
        payload: Option<Value>,
    ) -> Self {
        Self {
            owner,
            sink,
            event_bus,
            payload,
        }
    }

    /// The identity this invocation runs under.
    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    /// The raw invocation payload, if any.
    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    /// Deserialize the invocation payload.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, ActionError> {
        let value = self
            .payload
            .as_ref()
            .ok_or_else(|| ActionError::BadPayload("missing payload".to_string()))?;
        serde_json::from_value(value.clone()).map_err(|e| ActionError::BadPayload(e.to_string()))
    }

    /// Post `business` as an isolated zero-delay one-shot invocation, so a
    /// failure inside it cannot break this unit's recurring chain.
    ///
    /// `business` must not be the heartbeat's own action identifier; see
    /// [`isolate::delegate`] for the (unenforced) precondition.
    pub async fn delegate(&self, business: ActionId) -> Result<(), SinkError> {
        isolate::delegate(self.sink.as_ref(), self.owner, business).await?;
        self.event_bus
            .emit(Event::delegate_scheduled(
                TimerKey::derive(self.owner, business),
                business,
            ))
            .await;
        Ok(())
    }
}

/// Errors that can occur during dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No action is registered under the identifier.
    #[error("unknown action: {0}")]
    UnknownAction(ActionId),

    /// The host rejected the heartbeat re-arm; the invocation aborts before
    /// the action body runs and the recurring chain is broken until the next
    /// external invocation.
    #[error("heartbeat re-arm rejected by host: {0}")]
    Rearm(#[from] SinkError),

    /// The action body failed.
    #[error("action error: {0}")]
    Action(#[from] ActionError),
}

/// Dispatcher for one owning unit's action surface.
///
/// # Recurrence semantics
///
/// Because every invocation re-arms the heartbeat, the heartbeat fires at
/// least `delay` seconds after the *last* invocation of any kind, not on a
/// fixed period. Units with frequent unrelated traffic see the countdown
/// pushed forward on every call; the interval is a floor on quiet time, not
/// a tick rate.
pub struct Dispatcher<S: ActionSink + 'static> {
    owner: OwnerId,
    sink: Arc<S>,
    heartbeat: RecurringTimer,
    actions: HashMap<ActionId, Arc<dyn Action>>,
    event_bus: Arc<EventBus>,
}

impl<S: ActionSink + 'static> Dispatcher<S> {
    /// Create a dispatcher bound to `sink`, re-arming `heartbeat` before
    /// every invocation. The unit's owner is the heartbeat's owner.
    pub fn new(sink: Arc<S>, heartbeat: RecurringTimer) -> Self {
        Self {
            owner: heartbeat.owner(),
            sink,
            heartbeat,
            actions: HashMap::new(),
            event_bus: Arc::new(EventBus::new()),
        }
    }

    /// Set the event bus.
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Arc::new(event_bus);
        self
    }

    /// Register an action under `id`.
    pub fn register(&mut self, id: ActionId, action: Arc<dyn Action>) {
        self.actions.insert(id, action);
    }

    /// The unit's owner.
    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    /// The heartbeat timer armed on every invocation.
    pub fn heartbeat(&self) -> &RecurringTimer {
        &self.heartbeat
    }

    /// The sink this unit schedules against.
    pub fn sink(&self) -> &Arc<S> {
        &self.sink
    }

    /// The event bus.
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Invoke a registered action.
    ///
    /// Order of operations: the action is looked up, the heartbeat is
    /// re-armed (middleware, applied to every registered entry point), then
    /// the body runs. A sink rejection during re-arm aborts the invocation
    /// before the body; a body failure aborts only this invocation and
    /// leaves the already-installed re-arm in place.
    pub async fn invoke(
        &self,
        action_id: ActionId,
        payload: Option<Value>,
    ) -> Result<(), DispatchError> {
        let action = self
            .actions
            .get(&action_id)
            .ok_or(DispatchError::UnknownAction(action_id))?;

        self.heartbeat.arm(self.sink.as_ref()).await?;
        self.event_bus
            .emit(Event::timer_armed(
                self.heartbeat.key(),
                self.heartbeat.effective_delay(),
            ))
            .await;

        let name = action.name().to_string();
        self.event_bus
            .emit(Event::invocation_started(action_id, name.clone()))
            .await;

        let sink: Arc<dyn ActionSink> = self.sink.clone();
        let mut ctx = ActionContext::new(self.owner, sink, Arc::clone(&self.event_bus), payload);

        let start = Instant::now();
        match action.execute(&mut ctx).await {
            Ok(()) => {
                self.event_bus
                    .emit(Event::invocation_completed(
                        action_id,
                        name,
                        start.elapsed(),
                    ))
                    .await;
                Ok(())
            }
            Err(err) => {
                tracing::warn!(action = %action_id, name = %name, error = %err, "invocation aborted");
                self.event_bus
                    .emit(Event::invocation_failed(action_id, name, err.to_string()))
                    .await;
                Err(err.into())
            }
        }
    }

    /// Dispatch a firing delivered by the host.
    ///
    /// Delivery is an invocation like any other: the heartbeat is re-armed
    /// before the fired action's body runs, which is how a delivered
    /// heartbeat firing installs its own successor within the same
    /// invocation.
    pub async fn deliver(&self, firing: &PendingFiring) -> Result<(), DispatchError> {
        tracing::debug!(firing = %firing.id, key = %firing.key, "delivering host firing");
        self.invoke(firing.action, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventHandler;
    use crate::sink::InMemorySink;
    use tokio::sync::Mutex;

    const OWNER: OwnerId = OwnerId::new(1);
    const HEARTBEAT: ActionId = ActionId::new(10);
    const NOOP: ActionId = ActionId::new(20);
    const FAILING: ActionId = ActionId::new(21);

    struct NoopAction;

    #[async_trait]
    impl Action for NoopAction {
        fn name(&self) -> &str {
            "noop"
        }

        async fn execute(&self, _ctx: &mut ActionContext) -> Result<(), ActionError> {
            Ok(())
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl Action for AlwaysFails {
        fn name(&self) -> &str {
            "always_fails"
        }

        async fn execute(&self, _ctx: &mut ActionContext) -> Result<(), ActionError> {
            Err(ActionError::Failed("boom".to_string()))
        }
    }

    struct RecordingHandler {
        events: Mutex<Vec<Event>>,
    }

    impl RecordingHandler {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                events: Mutex::new(Vec::new()),
            })
        }

        async fn events(&self) -> Vec<Event> {
            self.events.lock().await.clone()
        }
    }

    #[async_trait]
    impl EventHandler for RecordingHandler {
        async fn handle(&self, event: &Event) {
            self.events.lock().await.push(event.clone());
        }
    }

    fn dispatcher(delay_secs: u32) -> (Dispatcher<InMemorySink>, Arc<InMemorySink>) {
        let sink = Arc::new(InMemorySink::new());
        let heartbeat = RecurringTimer::new(OWNER, HEARTBEAT, delay_secs);
        let mut dispatcher = Dispatcher::new(Arc::clone(&sink), heartbeat);
        dispatcher.register(NOOP, Arc::new(NoopAction));
        dispatcher.register(FAILING, Arc::new(AlwaysFails));
        (dispatcher, sink)
    }

    #[tokio::test]
    async fn test_every_invocation_rearms_the_heartbeat() {
        let (dispatcher, sink) = dispatcher(5);
        let key = dispatcher.heartbeat().key();

        dispatcher.invoke(NOOP, None).await.unwrap();
        assert_eq!(sink.pending(key).await.unwrap().delay_secs, 5);

        dispatcher.invoke(NOOP, None).await.unwrap();
        let stats = sink.stats(key).await;
        assert_eq!(stats.scheduled, 2);
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.net_pending(), 1);
    }

    #[tokio::test]
    async fn test_unknown_action_is_rejected_without_rearm() {
        let (dispatcher, sink) = dispatcher(5);

        let result = dispatcher.invoke(ActionId::new(99), None).await;

        assert!(matches!(result, Err(DispatchError::UnknownAction(_))));
        assert_eq!(sink.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_body_failure_leaves_the_rearm_in_place() {
        let (dispatcher, sink) = dispatcher(5);
        let key = dispatcher.heartbeat().key();

        let result = dispatcher.invoke(FAILING, None).await;

        assert!(matches!(result, Err(DispatchError::Action(_))));
        assert!(sink.pending(key).await.is_some());
    }

    #[tokio::test]
    async fn test_invocation_events_are_emitted() {
        let handler = RecordingHandler::new();
        let (dispatcher, _sink) = dispatcher(5);
        dispatcher.event_bus().register(handler.clone()).await;

        dispatcher.invoke(NOOP, None).await.unwrap();
        let _ = dispatcher.invoke(FAILING, None).await;

        let events = handler.events().await;
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::TimerArmed { delay_secs, .. } if *delay_secs == 5)));
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::InvocationCompleted { name, .. } if name == "noop")));
        assert!(events.iter().any(
            |e| matches!(e, Event::InvocationFailed { name, .. } if name == "always_fails")
        ));
    }

    #[tokio::test]
    async fn test_deliver_routes_through_the_invoke_path() {
        let (dispatcher, sink) = dispatcher(5);
        let key = dispatcher.heartbeat().key();

        dispatcher.invoke(NOOP, None).await.unwrap();
        sink.cancel(key).await;
        // Hand-build a firing for the registered action and deliver it.
        sink.schedule(TimerKey::derive(OWNER, NOOP), NOOP, 0)
            .await
            .unwrap();
        let due = sink.advance(0).await;
        assert_eq!(due.len(), 1);

        dispatcher.deliver(&due[0]).await.unwrap();

        // Delivery re-armed the heartbeat again.
        assert!(sink.pending(key).await.is_some());
    }

    #[tokio::test]
    async fn test_payload_roundtrips_to_the_action() {
        struct EchoAction;

        #[async_trait]
        impl Action for EchoAction {
            fn name(&self) -> &str {
                "echo"
            }

            async fn execute(&self, ctx: &mut ActionContext) -> Result<(), ActionError> {
                let value: String = ctx.payload_as()?;
                if value == "expected" {
                    Ok(())
                } else {
                    Err(ActionError::Failed(format!("unexpected payload: {value}")))
                }
            }
        }

        let (mut dispatcher, _sink) = dispatcher(5);
        dispatcher.register(ActionId::new(30), Arc::new(EchoAction));

        dispatcher
            .invoke(ActionId::new(30), Some(serde_json::json!("expected")))
            .await
            .unwrap();

        let missing = dispatcher.invoke(ActionId::new(30), None).await;
        assert!(matches!(
            missing,
            Err(DispatchError::Action(ActionError::BadPayload(_)))
        ));
    }

    #[tokio::test]
    async fn test_context_delegate_schedules_under_its_own_key() {
        struct Delegating;

        #[async_trait]
        impl Action for Delegating {
            fn name(&self) -> &str {
                "delegating"
            }

            async fn execute(&self, ctx: &mut ActionContext) -> Result<(), ActionError> {
                ctx.delegate(FAILING).await?;
                Ok(())
            }
        }

        let (mut dispatcher, sink) = dispatcher(5);
        dispatcher.register(ActionId::new(31), Arc::new(Delegating));

        dispatcher.invoke(ActionId::new(31), None).await.unwrap();

        // Heartbeat key and delegation key are both pending, independently.
        assert_eq!(sink.pending_count().await, 2);
        let delegated = sink
            .pending(TimerKey::derive(OWNER, FAILING))
            .await
            .unwrap();
        assert_eq!(delegated.delay_secs, 0);
    }
}
