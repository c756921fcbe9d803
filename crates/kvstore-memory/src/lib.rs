//! kvstore-memory: in-process backend for the kvstore capability
//!
//! Holds entries in a concurrent map that lives as long as the owning
//! component. Nothing is persisted.

mod entry;
mod memory;

pub use entry::{Expiry, MemoryEntry};
pub use memory::MemoryKvStorage;
