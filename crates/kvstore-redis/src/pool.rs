//! Bounded connection pool with idle eviction and blocking acquisition

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use kvstore_core::{KvError, KvResult, Scope};
use redis::aio::MultiplexedConnection;
use redis::{AsyncConnectionConfig, Client};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::config::RedisConfig;
use crate::error::dial_error;

/// Opens new connections for a [`ConnectionPool`]
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// A cheap handle to one server connection
    type Connection: Clone + Send + Sync + 'static;

    async fn connect(&self) -> KvResult<Self::Connection>;
}

/// Dials Redis with AUTH, SELECT and the configured timeouts
pub struct RedisConnector {
    client: Client,
    address: String,
    connect_timeout: Duration,
    response_timeout: Duration,
}

impl RedisConnector {
    pub fn new(config: &RedisConfig) -> KvResult<Self> {
        config.validate()?;
        let client = Client::open(config.connection_info())
            .map_err(|e| KvError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            address: config.address(),
            connect_timeout: config.connect_timeout,
            response_timeout: config.response_timeout(),
        })
    }
}

#[async_trait]
impl Connector for RedisConnector {
    type Connection = MultiplexedConnection;

    async fn connect(&self) -> KvResult<MultiplexedConnection> {
        debug!("redis pool dialing {}", self.address);

        let config = AsyncConnectionConfig::new()
            .set_connection_timeout(self.connect_timeout)
            .set_response_timeout(self.response_timeout);

        // The connect timeout bounds the whole handshake, AUTH and SELECT included.
        match tokio::time::timeout(
            self.connect_timeout,
            self.client.get_multiplexed_async_connection_with_config(&config),
        )
        .await
        {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => Err(dial_error(&self.address, e)),
            Err(_) => Err(KvError::Transport(format!(
                "connecting to {} timed out after {:?}",
                self.address, self.connect_timeout
            ))),
        }
    }
}

/// Limits for a [`ConnectionPool`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOptions {
    pub max_active: usize,
    pub max_idle: usize,
    /// Zero keeps idle connections forever
    pub idle_timeout: Duration,
    pub wait: bool,
}

impl From<&RedisConfig> for PoolOptions {
    fn from(config: &RedisConfig) -> Self {
        Self {
            max_active: config.max_active,
            max_idle: config.max_idle,
            idle_timeout: config.idle_timeout,
            wait: config.wait,
        }
    }
}

/// Snapshot of pool occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub active: usize,
    pub idle: usize,
    pub max_active: usize,
    pub max_idle: usize,
}

struct IdleConnection<T> {
    conn: T,
    since: Instant,
}

struct PoolInner<C: Connector> {
    connector: C,
    options: PoolOptions,
    permits: Arc<Semaphore>,
    idle: Mutex<VecDeque<IdleConnection<C::Connection>>>,
}

impl<C: Connector> PoolInner<C> {
    fn idle(&self) -> std::sync::MutexGuard<'_, VecDeque<IdleConnection<C::Connection>>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Newest idle connection still within the idle timeout; stale ones are dropped
    fn take_idle(&self) -> Option<C::Connection> {
        let mut idle = self.idle();
        if !self.options.idle_timeout.is_zero() {
            let now = Instant::now();
            while let Some(oldest) = idle.front() {
                if now.duration_since(oldest.since) <= self.options.idle_timeout {
                    break;
                }
                idle.pop_front();
                trace!("redis pool closed stale idle connection");
            }
        }
        idle.pop_back().map(|entry| entry.conn)
    }

    fn release(&self, conn: C::Connection) {
        let mut idle = self.idle();
        if idle.len() < self.options.max_idle {
            idle.push_back(IdleConnection {
                conn,
                since: Instant::now(),
            });
        }
    }
}

/// At most `max_active` connections are checked out at a time. Up to
/// `max_idle` released connections are kept for reuse.
pub struct ConnectionPool<C: Connector = RedisConnector> {
    inner: Arc<PoolInner<C>>,
}

impl<C: Connector> Clone for ConnectionPool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl ConnectionPool<RedisConnector> {
    /// Pool for `config`. No connection is opened until the first [`ConnectionPool::get`].
    pub fn from_config(config: &RedisConfig) -> KvResult<Self> {
        Ok(Self::new(RedisConnector::new(config)?, PoolOptions::from(config)))
    }
}

impl<C: Connector> ConnectionPool<C> {
    pub fn new(connector: C, options: PoolOptions) -> Self {
        let options = PoolOptions {
            max_active: options.max_active.max(1),
            max_idle: options.max_idle.min(options.max_active.max(1)),
            ..options
        };

        Self {
            inner: Arc::new(PoolInner {
                connector,
                options,
                permits: Arc::new(Semaphore::new(options.max_active)),
                idle: Mutex::new(VecDeque::new()),
            }),
        }
    }

    pub fn options(&self) -> PoolOptions {
        self.inner.options
    }

    /// Check out a connection.
    ///
    /// When all `max_active` connections are in use this waits for one to be
    /// released, bounded by `scope`, or fails with [`KvError::PoolExhausted`]
    /// if the pool was configured not to wait.
    pub async fn get(&self, scope: &Scope) -> KvResult<PooledConnection<C>> {
        let permits = Arc::clone(&self.inner.permits);
        let max_active = self.inner.options.max_active;

        let permit = if self.inner.options.wait {
            scope
                .run(permits.acquire_owned())
                .await?
                .map_err(|_| KvError::Transport("connection pool closed".to_string()))?
        } else {
            scope.check()?;
            permits
                .try_acquire_owned()
                .map_err(|_| KvError::PoolExhausted { max_active })?
        };

        if let Some(conn) = self.inner.take_idle() {
            trace!("redis pool reusing idle connection");
            return Ok(PooledConnection::new(conn, Arc::clone(&self.inner), permit));
        }

        // Dropping the permit on failure hands the slot to the next waiter.
        let conn = scope.run(self.inner.connector.connect()).await??;
        Ok(PooledConnection::new(conn, Arc::clone(&self.inner), permit))
    }

    pub fn stats(&self) -> PoolStats {
        let options = self.inner.options;
        PoolStats {
            active: options.max_active - self.inner.permits.available_permits(),
            idle: self.inner.idle().len(),
            max_active: options.max_active,
            max_idle: options.max_idle,
        }
    }
}

/// A checked-out connection.
///
/// Dropping it returns the connection to the idle set, unless it was marked
/// broken, and frees its slot for the next caller.
pub struct PooledConnection<C: Connector> {
    conn: C::Connection,
    pool: Arc<PoolInner<C>>,
    broken: bool,
    _permit: OwnedSemaphorePermit,
}

impl<C: Connector> PooledConnection<C> {
    fn new(conn: C::Connection, pool: Arc<PoolInner<C>>, permit: OwnedSemaphorePermit) -> Self {
        Self {
            conn,
            pool,
            broken: false,
            _permit: permit,
        }
    }

    pub fn connection(&mut self) -> &mut C::Connection {
        &mut self.conn
    }

    /// Close the connection on release instead of reusing it
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }
}

impl<C: Connector> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        // Runs before `_permit` is dropped, so a waiter woken by the permit finds this connection idle.
        if self.broken {
            debug!("redis pool discarding broken connection");
        } else {
            self.pool.release(self.conn.clone());
        }
    }
}
