//! Typed identifiers for sessions and visual items.
//!
//! `SessionId` wraps UUIDv7 (time-ordered, globally unique) and displays as
//! standard UUID text for logging. The `short()` form (first 8 hex chars) is
//! for human-facing output only — never used as a lookup key.
//!
//! `ItemId` is a per-session counter. Items never outlive their session, so a
//! plain `u64` is enough and keeps occupancy lookups cheap.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// A viewing session identifier (UUIDv7).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(uuid::Uuid);

impl SessionId {
    /// Create a new time-ordered ID (UUIDv7).
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    /// First 8 hex characters — for human display only, not lookup.
    pub fn short(&self) -> String {
        self.0.as_simple().to_string()[..8].to_string()
    }

    /// Parse from a hex string (32 chars, no hyphens) or standard UUID format.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        uuid::Uuid::parse_str(s).map(Self)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.short())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one visual item placed on the surface.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item#{}", self.0)
    }
}

/// Hands out unique `ItemId`s within one session.
#[derive(Debug, Default)]
pub struct ItemIdAllocator {
    next: AtomicU64,
}

impl ItemIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next ID. IDs start at 1 and never repeat.
    pub fn next(&self) -> ItemId {
        ItemId(self.next.fetch_add(1, Ordering::Relaxed) + 1)
    }
}
