//! Lifecycle events and event handling.
//!
//! This module provides event emission for timer and invocation lifecycle
//! events, enabling observability into the recurring chain.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::core::types::{ActionId, TimerKey};

/// Lifecycle events emitted during dispatch.
#[derive(Debug, Clone)]
pub enum Event {
    /// The heartbeat timer was re-armed for its key.
    TimerArmed {
        key: TimerKey,
        delay_secs: u32,
        timestamp: Instant,
    },

    /// An action invocation has started.
    InvocationStarted {
        action: ActionId,
        name: String,
        timestamp: Instant,
    },

    /// An action invocation completed successfully.
    InvocationCompleted {
        action: ActionId,
        name: String,
        duration: Duration,
        timestamp: Instant,
    },

    /// An action invocation aborted with an error.
    InvocationFailed {
        action: ActionId,
        name: String,
        error: String,
        timestamp: Instant,
    },

    /// Fallible work was posted as an isolated zero-delay one-shot.
    DelegateScheduled {
        key: TimerKey,
        action: ActionId,
        timestamp: Instant,
    },
}

impl Event {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> Instant {
        match self {
            Event::TimerArmed { timestamp, .. } => *timestamp,
            Event::InvocationStarted { timestamp, .. } => *timestamp,
            Event::InvocationCompleted { timestamp, .. } => *timestamp,
            Event::InvocationFailed { timestamp, .. } => *timestamp,
            Event::DelegateScheduled { timestamp, .. } => *timestamp,
        }
    }

    /// Create a TimerArmed event.
    pub fn timer_armed(key: TimerKey, delay_secs: u32) -> Self {
        Event::TimerArmed {
            key,
            delay_secs,
            timestamp: Instant::now(),
        }
    }

    /// Create an InvocationStarted event.
    pub fn invocation_started(action: ActionId, name: impl Into<String>) -> Self {
        Event::InvocationStarted {
            action,
            name: name.into(),
            timestamp: Instant::now(),
        }
    }

    /// Create an InvocationCompleted event.
    pub fn invocation_completed(
        action: ActionId,
        name: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Event::InvocationCompleted {
            action,
            name: name.into(),
            duration,
            timestamp: Instant::now(),
        }
    }

    /// Create an InvocationFailed event.
    pub fn invocation_failed(
        action: ActionId,
        name: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Event::InvocationFailed {
            action,
            name: name.into(),
            error: error.into(),
            timestamp: Instant::now(),
        }
    }

    /// Create a DelegateScheduled event.
    pub fn delegate_scheduled(key: TimerKey, action: ActionId) -> Self {
        Event::DelegateScheduled {
            key,
            action,
            timestamp: Instant::now(),
        }
    }
}

/// Handler for receiving lifecycle events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle an event.
    async fn handle(&self, event: &Event);
}

/// Event bus for distributing events to registered handlers.
pub struct EventBus {
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl EventBus {
    /// Create a new event bus with no handlers.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Register an event handler.
    pub async fn register(&self, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write().await;
        handlers.push(handler);
    }

    /// Emit an event to all registered handlers.
    pub async fn emit(&self, event: Event) {
        let handlers = self.handlers.read().await;
        for handler in handlers.iter() {
            handler.handle(&event).await;
        }
    }

    /// Get the number of registered handlers.
    pub async fn handler_count(&self) -> usize {
        self.handlers.read().await.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
