//! Core identifier types and key derivation.
//!
//! Owners and actions live in the host's 64-bit identifier space. A
//! [`TimerKey`] pairs the two and uniquely names one timer's pending firing
//! in the host's namespace.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ceiling the host enforces on delay requests, in seconds.
///
/// Requests above it are clamped by the core before submission.
pub const MAX_DELAY: u32 = 3_888_000;

/// Identity authorized to submit scheduling requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerId(u64);

/// Identifier of the code to invoke when a timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionId(u64);

impl OwnerId {
    /// Create a new OwnerId from a raw host identifier.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the underlying identifier value.
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for OwnerId {
    fn from(id: u64) -> Self {
        Self::new(id)
    }
}

impl ActionId {
    /// Create a new ActionId from a raw host identifier.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the underlying identifier value.
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for ActionId {
    fn from(id: u64) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Key identifying one (owner, action) timer's pending firing.
///
/// Derivation is pure, deterministic, and injective: two distinct action
/// identifiers under the same owner map to distinct keys, and the same pair
/// always maps to the same key, so a re-arm cancels/replaces its own prior
/// schedule and never a different timer's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimerKey {
    owner: OwnerId,
    action: ActionId,
}

impl TimerKey {
    /// Derive the key for an (owner, action) pair.
    pub const fn derive(owner: OwnerId, action: ActionId) -> Self {
        Self { owner, action }
    }

    /// The owner half of the key.
    pub const fn owner(self) -> OwnerId {
        self.owner
    }

    /// The action half of the key.
    pub const fn action(self) -> ActionId {
        self.action
    }

    /// Encode the key into the host's 128-bit representation: owner identity
    /// in the high 64 bits, action identity in the low 64 bits.
    ///
    /// Only the sink boundary uses this encoding; in-process code keys maps
    /// on the structured pair.
    pub const fn to_wire(self) -> u128 {
        ((self.owner.0 as u128) << 64) | self.action.0 as u128
    }
}

impl fmt::Display for TimerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_id_roundtrip() {
        let owner = OwnerId::new(42);
        assert_eq!(owner.as_u64(), 42);
        assert_eq!(OwnerId::from(42), owner);
    }

    #[test]
    fn test_action_id_display() {
        let action = ActionId::new(7);
        assert_eq!(format!("{}", action), "7");
    }

    #[test]
    fn test_key_derivation_is_deterministic() {
        let a = TimerKey::derive(OwnerId::new(1), ActionId::new(2));
        let b = TimerKey::derive(OwnerId::new(1), ActionId::new(2));
        assert_eq!(a, b);
    }

    #[test]
    fn test_distinct_pairs_derive_distinct_keys() {
        let base = TimerKey::derive(OwnerId::new(1), ActionId::new(1));
        let other_action = TimerKey::derive(OwnerId::new(1), ActionId::new(2));
        let other_owner = TimerKey::derive(OwnerId::new(2), ActionId::new(1));

        assert_ne!(base, other_action);
        assert_ne!(base, other_owner);
        assert_ne!(other_action, other_owner);
    }

    #[test]
    fn test_wire_encoding_places_owner_in_high_half() {
        let key = TimerKey::derive(OwnerId::new(0xAABB), ActionId::new(0xCCDD));
        let wire = key.to_wire();

        assert_eq!((wire >> 64) as u64, 0xAABB);
        assert_eq!(wire as u64, 0xCCDD);
    }

    #[test]
    fn test_wire_encoding_does_not_collide_on_swapped_halves() {
        // (1, 2) and (2, 1) must land on different wire values.
        let a = TimerKey::derive(OwnerId::new(1), ActionId::new(2));
        let b = TimerKey::derive(OwnerId::new(2), ActionId::new(1));
        assert_ne!(a.to_wire(), b.to_wire());
    }

    #[test]
    fn test_keys_are_hashable() {
        use std::collections::HashSet;

        let mut keys: HashSet<TimerKey> = HashSet::new();
        keys.insert(TimerKey::derive(OwnerId::new(1), ActionId::new(1)));
        keys.insert(TimerKey::derive(OwnerId::new(1), ActionId::new(2)));
        keys.insert(TimerKey::derive(OwnerId::new(1), ActionId::new(1)));

        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn test_key_display() {
        let key = TimerKey::derive(OwnerId::new(3), ActionId::new(9));
        assert_eq!(format!("{}", key), "3/9");
    }
}
