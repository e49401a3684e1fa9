pub mod core;
pub mod dispatch;
pub mod events;
pub mod profile;
pub mod sink;
pub mod testing;

pub use crate::core::isolate::delegate;
pub use crate::core::timer::RecurringTimer;
pub use crate::core::types::{ActionId, OwnerId, TimerKey, MAX_DELAY};
pub use dispatch::{Action, ActionContext, ActionError, DispatchError, Dispatcher};
pub use events::{Event, EventBus, EventHandler};
pub use sink::{ActionSink, FiringId, InMemorySink, KeyStats, PendingFiring, SinkError};
