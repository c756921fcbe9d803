//! kvstore-redis: Redis backend for the kvstore capability
//!
//! Commands go through a bounded [`ConnectionPool`]; operations that issue
//! more than one command run inside MULTI/EXEC. Every key is namespaced with
//! a [`KeyPrefix`] so several environments can share one server.

pub mod config;
pub mod duration;
pub mod endpoint;
mod error;
pub mod executor;
pub mod pool;
pub mod storage;

pub use config::{KeyPrefix, RedisConfig};
pub use endpoint::RedisEndpoint;
pub use executor::{Command, Executor};
pub use pool::{ConnectionPool, Connector, PoolOptions, PoolStats, PooledConnection, RedisConnector};
pub use storage::RedisKvStorage;
