//! In-memory host implementation.
//!
//! Provides a deterministic stand-in for the deferred-execution host, used
//! for testing and simulation. Time is virtual, counted in whole seconds;
//! nothing fires until [`advance`](InMemorySink::advance) is called, which
//! also models the host's freedom to fire later than requested.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ActionSink, SinkError};
use crate::core::types::{ActionId, TimerKey};

/// Unique identifier the host assigns to each accepted firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FiringId(Uuid);

impl FiringId {
    /// Generate a new random FiringId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for FiringId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FiringId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A pending firing as recorded by the in-memory host.
///
/// The core never reads this state; it exists for the mock host's own
/// bookkeeping and for test inspection.
#[derive(Debug, Clone, Serialize)]
pub struct PendingFiring {
    /// Host-assigned identifier for this firing.
    pub id: FiringId,
    /// Key the firing is registered under.
    pub key: TimerKey,
    /// Action to invoke when the firing is delivered.
    pub action: ActionId,
    /// Delay that was requested, in seconds.
    pub delay_secs: u32,
    /// Virtual second at which the firing becomes due.
    pub due_at: u64,
}

/// Cumulative per-key scheduling statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyStats {
    /// Number of accepted schedule requests.
    pub scheduled: u64,
    /// Number of cancels that actually removed a pending firing.
    pub cancelled: u64,
    /// Number of firings consumed by delivery.
    pub fired: u64,
}

impl KeyStats {
    /// Net outstanding firings implied by the counters.
    ///
    /// For a correctly behaving caller this is always 0 or 1.
    pub fn net_pending(&self) -> i64 {
        self.scheduled as i64 - self.cancelled as i64 - self.fired as i64
    }
}

/// Host tables are keyed by the 128-bit wire encoding; the structured
/// [`TimerKey`] is packed at this boundary and nowhere else.
struct HostState {
    now: u64,
    pending: HashMap<u128, PendingFiring>,
    stats: HashMap<u128, KeyStats>,
}

/// In-memory deferred-execution host.
///
/// Holds at most one pending firing per key and rejects duplicate schedule
/// requests, mirroring the real host's refusal to replace implicitly.
/// Data is not persisted across restarts.
pub struct InMemorySink {
    state: RwLock<HostState>,
}

impl InMemorySink {
    /// Create a new empty host at virtual second 0.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(HostState {
                now: 0,
                pending: HashMap::new(),
                stats: HashMap::new(),
            }),
        }
    }

    /// Current virtual time in seconds.
    pub async fn now(&self) -> u64 {
        self.state.read().await.now
    }

    /// The pending firing for `key`, if any.
    pub async fn pending(&self, key: TimerKey) -> Option<PendingFiring> {
        self.state.read().await.pending.get(&key.to_wire()).cloned()
    }

    /// Total number of pending firings across all keys.
    pub async fn pending_count(&self) -> usize {
        self.state.read().await.pending.len()
    }

    /// Cumulative statistics for `key`.
    pub async fn stats(&self, key: TimerKey) -> KeyStats {
        self.state
            .read()
            .await
            .stats
            .get(&key.to_wire())
            .copied()
            .unwrap_or_default()
    }

    /// Advance virtual time by `secs` and drain every firing that has become
    /// due, consuming it from the pending table.
    ///
    /// Returned firings are ordered by due time, ties broken by wire key, so
    /// drains are deterministic. `advance(0)` picks up zero-delay firings
    /// scheduled at the current instant.
    pub async fn advance(&self, secs: u64) -> Vec<PendingFiring> {
        let mut state = self.state.write().await;
        state.now += secs;
        let now = state.now;

        let due_wires: Vec<u128> = state
            .pending
            .values()
            .filter(|p| p.due_at <= now)
            .map(|p| p.key.to_wire())
            .collect();

        let mut due = Vec::with_capacity(due_wires.len());
        for wire in due_wires {
            if let Some(firing) = state.pending.remove(&wire) {
                state.stats.entry(wire).or_default().fired += 1;
                due.push(firing);
            }
        }

        due.sort_by_key(|p| (p.due_at, p.key.to_wire()));
        due
    }
}

impl Default for InMemorySink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ActionSink for InMemorySink {
    async fn schedule(
        &self,
        key: TimerKey,
        action: ActionId,
        delay_secs: u32,
    ) -> Result<(), SinkError> {
        let wire = key.to_wire();
        let mut state = self.state.write().await;
        if state.pending.contains_key(&wire) {
            return Err(SinkError::DuplicateKey(key));
        }

        let firing = PendingFiring {
            id: FiringId::new(),
            key,
            action,
            delay_secs,
            due_at: state.now + u64::from(delay_secs),
        };
        state.pending.insert(wire, firing);
        state.stats.entry(wire).or_default().scheduled += 1;
        Ok(())
    }

    async fn cancel(&self, key: TimerKey) {
        let wire = key.to_wire();
        let mut state = self.state.write().await;
        if state.pending.remove(&wire).is_some() {
            state.stats.entry(wire).or_default().cancelled += 1;
        }
    }
}
