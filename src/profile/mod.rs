//! Profile registry driven by the recurring heartbeat.
//!
//! A user-keyed record store plus the action surface around it: external
//! callers upsert and remove profiles; the heartbeat ticks on a fixed
//! cadence and delegates a counter bump to an isolated one-shot, so an empty
//! table (a genuinely fallible condition) never breaks the recurring chain.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;

use crate::core::timer::RecurringTimer;
use crate::core::types::{ActionId, OwnerId};
use crate::dispatch::{Action, ActionContext, ActionError, Dispatcher};
use crate::sink::ActionSink;

/// Well-known action identifiers for the profile unit.
pub mod actions {
    use crate::core::types::ActionId;

    /// Heartbeat body: delegates the counter bump and returns.
    pub const TICK: ActionId = ActionId::new(1);
    /// Fallible counter bump, always invoked via delegation.
    pub const COUNT: ActionId = ActionId::new(2);
    /// Create or update a profile.
    pub const UPDATE: ActionId = ActionId::new(3);
    /// Remove a profile.
    pub const REMOVE: ActionId = ActionId::new(4);
}

/// Default heartbeat cadence in seconds.
pub const DEFAULT_HEARTBEAT_DELAY: u32 = 1;

/// Errors that can occur when working with the profile table.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// The user has no profile.
    #[error("user doesn't have a profile: {0}")]
    NotFound(String),

    /// The table has no profiles at all.
    #[error("no user profiles yet")]
    Empty,

    /// Table lock was poisoned.
    #[error("profile table lock poisoned")]
    LockPoisoned,
}

impl From<ProfileError> for ActionError {
    fn from(err: ProfileError) -> Self {
        ActionError::Failed(err.to_string())
    }
}

/// A stored user profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileEntry {
    pub user: String,
    pub nickname: String,
    pub avatar: String,
    pub website: String,
    pub locale: String,
    pub metadata: String,
    /// Heartbeat-driven counter; preserved across field updates.
    #[serde(default)]
    pub count: u64,
}

/// User-visible fields of an upsert request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub user: String,
    pub nickname: String,
    pub avatar: String,
    pub website: String,
    pub locale: String,
    pub metadata: String,
}

/// Thread-safe in-memory profile table, keyed by user.
///
/// Iteration order is the user key's sort order, so "the first profile" is
/// deterministic.
pub struct ProfileStore {
    entries: RwLock<BTreeMap<String, ProfileEntry>>,
}

impl ProfileStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Create or update the profile for `update.user`.
    ///
    /// An existing profile keeps its counter; only the user-visible fields
    /// are replaced.
    pub fn upsert(&self, update: ProfileUpdate) -> Result<(), ProfileError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| ProfileError::LockPoisoned)?;
        let count = entries.get(&update.user).map(|e| e.count).unwrap_or(0);
        entries.insert(
            update.user.clone(),
            ProfileEntry {
                user: update.user,
                nickname: update.nickname,
                avatar: update.avatar,
                website: update.website,
                locale: update.locale,
                metadata: update.metadata,
                count,
            },
        );
        Ok(())
    }

    /// Remove the profile for `user`.
    pub fn remove(&self, user: &str) -> Result<(), ProfileError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| ProfileError::LockPoisoned)?;
        entries
            .remove(user)
            .ok_or_else(|| ProfileError::NotFound(user.to_string()))?;
        Ok(())
    }

    /// Get the profile for `user`, if any.
    pub fn get(&self, user: &str) -> Option<ProfileEntry> {
        self.entries.read().ok()?.get(user).cloned()
    }

    /// Number of stored profiles.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Increment the first profile's counter and return the new value.
    ///
    /// Fails with [`ProfileError::Empty`] when no profiles exist yet, which
    /// makes this the unit's genuinely fallible business action.
    pub fn bump_first(&self) -> Result<u64, ProfileError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| ProfileError::LockPoisoned)?;
        let entry = entries.values_mut().next().ok_or(ProfileError::Empty)?;
        entry.count += 1;
        Ok(entry.count)
    }

    /// All profiles in user order.
    pub fn entries(&self) -> Result<Vec<ProfileEntry>, ProfileError> {
        let entries = self.entries.read().map_err(|_| ProfileError::LockPoisoned)?;
        Ok(entries.values().cloned().collect())
    }
}

impl Default for ProfileStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Upsert action: creates or updates the payload's profile.
pub struct UpdateProfile {
    store: Arc<ProfileStore>,
}

impl UpdateProfile {
    /// Create the action over `store`.
    pub fn new(store: Arc<ProfileStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Action for UpdateProfile {
    fn name(&self) -> &str {
        "profile.update"
    }

    async fn execute(&self, ctx: &mut ActionContext) -> Result<(), ActionError> {
        let update: ProfileUpdate = ctx.payload_as()?;
        tracing::debug!(user = %update.user, "upserting profile");
        self.store.upsert(update)?;
        Ok(())
    }
}

/// Remove action: deletes the profile named by the payload.
pub struct RemoveProfile {
    store: Arc<ProfileStore>,
}

impl RemoveProfile {
    /// Create the action over `store`.
    pub fn new(store: Arc<ProfileStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Action for RemoveProfile {
    fn name(&self) -> &str {
        "profile.remove"
    }

    async fn execute(&self, ctx: &mut ActionContext) -> Result<(), ActionError> {
        let user: String = ctx.payload_as()?;
        tracing::debug!(user = %user, "removing profile");
        self.store.remove(&user)?;
        Ok(())
    }
}

/// Counter bump, the fallible business action the heartbeat delegates to.
pub struct CountProfiles {
    store: Arc<ProfileStore>,
}

impl CountProfiles {
    /// Create the action over `store`.
    pub fn new(store: Arc<ProfileStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Action for CountProfiles {
    fn name(&self) -> &str {
        "profile.count"
    }

    async fn execute(&self, _ctx: &mut ActionContext) -> Result<(), ActionError> {
        let count = self.store.bump_first()?;
        tracing::debug!(count, "bumped heartbeat counter");
        Ok(())
    }
}

/// The heartbeat body.
///
/// Keeps itself infallible by doing nothing but delegating the counter bump
/// to an isolated one-shot; the re-arm installed by the dispatch middleware
/// therefore always survives this invocation.
pub struct Tick;

#[async_trait]
impl Action for Tick {
    fn name(&self) -> &str {
        "profile.tick"
    }

    async fn execute(&self, ctx: &mut ActionContext) -> Result<(), ActionError> {
        ctx.delegate(actions::COUNT).await?;
        Ok(())
    }
}

/// Wire a complete profile unit onto `sink`: a dispatcher with all four
/// actions registered and a heartbeat on [`actions::TICK`] every
/// `delay_secs` seconds.
pub fn contract<S: ActionSink + 'static>(
    owner: OwnerId,
    sink: Arc<S>,
    delay_secs: u32,
) -> (Dispatcher<S>, Arc<ProfileStore>) {
    let store = Arc::new(ProfileStore::new());
    let heartbeat = RecurringTimer::new(owner, actions::TICK, delay_secs);
    let mut dispatcher = Dispatcher::new(sink, heartbeat);

    dispatcher.register(actions::TICK, Arc::new(Tick));
    dispatcher.register(actions::COUNT, Arc::new(CountProfiles::new(Arc::clone(&store))));
    dispatcher.register(actions::UPDATE, Arc::new(UpdateProfile::new(Arc::clone(&store))));
    dispatcher.register(actions::REMOVE, Arc::new(RemoveProfile::new(Arc::clone(&store))));

    (dispatcher, store)
}
