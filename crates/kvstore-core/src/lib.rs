//! kvstore-core: the storage capability shared by all kvstore backends
//!
//! Consumers depend on [`KvStorage`] only. Backends live in
//! `kvstore-memory` (in-process) and `kvstore-redis` (pooled network client).

pub mod error;
pub mod scope;
pub mod storage;

pub use error::{KvError, KvResult};
pub use scope::Scope;
pub use storage::{KvStorage, NO_EXPIRY};

// Re-export external dependencies
pub use async_trait;
