//! The deferred-execution host boundary.
//!
//! This module defines the narrow interface the core consumes from the host
//! runtime: install one pending firing under a key, or cancel whatever is
//! pending under a key. The core never caches or mirrors host state; every
//! operation round-trips through this trait and relies on the host's
//! one-firing-per-key guarantee.

mod memory;

pub use memory::{FiringId, InMemorySink, KeyStats, PendingFiring};

use async_trait::async_trait;
use thiserror::Error;

use crate::core::types::{ActionId, OwnerId, TimerKey};

/// Host-side rejections of a scheduling request.
///
/// These are fatal to the invocation that issued the request: the core
/// propagates them immediately and performs no local retry. The next external
/// invocation re-arms and retries implicitly.
#[derive(Debug, Error)]
pub enum SinkError {
    /// A firing is already pending under this key. The host does not replace
    /// implicitly; callers cancel first.
    #[error("a firing is already pending for key {0}")]
    DuplicateKey(TimerKey),

    /// The owner is not authorized to schedule.
    #[error("owner {0} is not authorized to schedule")]
    Unauthorized(OwnerId),

    /// The host's scheduling quota is exhausted.
    #[error("host scheduling quota exceeded")]
    QuotaExceeded,

    /// Generic host error.
    #[error("host error: {0}")]
    Other(String),
}

/// The host execution environment for deferred invocations.
///
/// Firing is asynchronous and one-shot: when the delay elapses the host
/// invokes the target action exactly once and the schedule entry is consumed.
/// `delay_secs` is a request, not a guarantee; the host may fire later (never
/// earlier) and enforces a ceiling of [`MAX_DELAY`](crate::core::types::MAX_DELAY).
#[async_trait]
pub trait ActionSink: Send + Sync {
    /// Install exactly one pending firing for `key`, invoking `action` after
    /// at least `delay_secs` seconds.
    ///
    /// Fails with [`SinkError::DuplicateKey`] if a firing is already pending
    /// under `key`; the host never replaces implicitly.
    async fn schedule(
        &self,
        key: TimerKey,
        action: ActionId,
        delay_secs: u32,
    ) -> Result<(), SinkError>;

    /// Remove the pending firing for `key` if one exists.
    ///
    /// Never fails: cancelling a key with nothing scheduled is a no-op, which
    /// the very first invocation of an owner depends on.
    async fn cancel(&self, key: TimerKey);
}
