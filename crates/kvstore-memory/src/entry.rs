//! Entries held by the in-process backend

use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

/// When an entry stops being readable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Live until deleted
    Always,
    /// Unreadable once the clock passes this instant
    At(Instant),
}

impl Expiry {
    /// Expiry for a TTL starting now; a zero TTL, or one past the end of the
    /// clock, never expires
    pub fn after(ttl: Duration) -> Self {
        if ttl.is_zero() {
            return Expiry::Always;
        }
        Instant::now().checked_add(ttl).map_or(Expiry::Always, Expiry::At)
    }
}

/// A stored value. The payload is an owned JSON tree, never a reference into
/// caller memory.
#[derive(Debug, Clone)]
pub struct MemoryEntry {
    pub payload: Value,
    pub expiry: Expiry,
}

impl MemoryEntry {
    pub fn new(payload: Value, ttl: Duration) -> Self {
        Self {
            payload,
            expiry: Expiry::after(ttl),
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        match self.expiry {
            Expiry::Always => false,
            Expiry::At(deadline) => now > deadline,
        }
    }
}
