//! Common test utilities shared across integration tests.

use everbeat::profile::{self, ProfileStore};
use everbeat::testing::SimHarness;
use everbeat::{InMemorySink, OwnerId, TimerKey};
use serde_json::{json, Value};
use std::sync::Arc;

/// Owner identity used by all integration tests.
pub const OWNER: OwnerId = OwnerId::new(7);

/// Build a fully wired profile unit on a fresh in-memory host.
pub fn profile_harness(delay_secs: u32) -> (SimHarness, Arc<ProfileStore>, Arc<InMemorySink>) {
    let sink = Arc::new(InMemorySink::new());
    let (dispatcher, store) = profile::contract(OWNER, Arc::clone(&sink), delay_secs);
    (
        SimHarness::new(dispatcher, Arc::clone(&sink)),
        store,
        sink,
    )
}

/// The heartbeat timer's key for the test owner.
pub fn heartbeat_key() -> TimerKey {
    TimerKey::derive(OWNER, profile::actions::TICK)
}

/// The delegated counter's key for the test owner.
pub fn count_key() -> TimerKey {
    TimerKey::derive(OWNER, profile::actions::COUNT)
}

/// A well-formed upsert payload for `user`.
pub fn update_payload(user: &str) -> Value {
    json!({
        "user": user,
        "nickname": format!("{user} nick"),
        "avatar": "avatar.png",
        "website": "https://example.com",
        "locale": "en",
        "metadata": "{}"
    })
}
