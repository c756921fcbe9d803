//! Runs commands over pooled connections, one connection per logical operation

use std::collections::HashMap;
use std::fmt;

use kvstore_core::{KvResult, Scope};
use redis::{Cmd, RedisResult, ToRedisArgs, Value};
use tracing::debug;

use crate::config::RedisConfig;
use crate::error::{command_error, ConnectionFate};
use crate::pool::{ConnectionPool, PoolStats, PooledConnection, RedisConnector};

/// A single Redis command and its arguments
#[derive(Clone)]
pub struct Command {
    name: &'static str,
    cmd: Cmd,
}

impl Command {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            cmd: redis::cmd(name),
        }
    }

    pub fn arg<T: ToRedisArgs>(mut self, arg: T) -> Self {
        self.cmd.arg(arg);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

// Arguments may hold user payloads, so only the command name is printed.
impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Command").field(&self.name).finish()
    }
}

/// Issues commands through a [`ConnectionPool`].
///
/// Every call checks out one connection and gives it back when the call
/// returns, whatever the outcome. Connections left in an unknown state
/// (transport failure, malformed reply, interrupted by the scope) are closed
/// instead of being returned.
#[derive(Clone)]
pub struct Executor {
    pool: ConnectionPool<RedisConnector>,
    identity: String,
}

impl Executor {
    pub fn new(config: &RedisConfig) -> KvResult<Self> {
        Ok(Self {
            pool: ConnectionPool::from_config(config)?,
            identity: config.address(),
        })
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Run one command and return its raw reply
    pub async fn exec(&self, scope: &Scope, command: Command) -> KvResult<Value> {
        let mut conn = self.pool.get(scope).await?;
        debug!("redis {}", command.name());

        let reply: KvResult<RedisResult<Value>> = scope
            .run(command.cmd.query_async(conn.connection()))
            .await;
        settle(&mut conn, reply)
    }

    /// Run `commands` between MULTI and EXEC and return the EXEC replies in order
    pub async fn exec_atomic(&self, scope: &Scope, commands: Vec<Command>) -> KvResult<Vec<Value>> {
        let mut conn = self.pool.get(scope).await?;
        debug!(
            "redis MULTI {} EXEC",
            commands
                .iter()
                .map(Command::name)
                .collect::<Vec<_>>()
                .join(" ")
        );

        let mut pipe = redis::pipe();
        pipe.atomic();
        for command in commands {
            pipe.add_command(command.cmd);
        }

        let reply: KvResult<RedisResult<Vec<Value>>> =
            scope.run(pipe.query_async(conn.connection())).await;
        settle(&mut conn, reply)
    }

    pub async fn ping(&self, scope: &Scope) -> KvResult<()> {
        self.exec(scope, Command::new("PING")).await.map(|_| ())
    }

    /// `{host:port: "ok"}` when PING succeeds, `{host:port: <error>}` otherwise
    pub async fn liveness_check(&self, scope: &Scope) -> HashMap<String, String> {
        let status = match self.ping(scope).await {
            Ok(()) => "ok".to_string(),
            Err(e) => e.to_string(),
        };
        HashMap::from([(self.identity.clone(), status)])
    }
}

/// Unwrap a reply, marking the connection broken when it cannot be trusted anymore
fn settle<T>(
    conn: &mut PooledConnection<RedisConnector>,
    reply: KvResult<RedisResult<T>>,
) -> KvResult<T> {
    match reply {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => {
            let (err, fate) = command_error(err);
            if fate == ConnectionFate::Discard {
                conn.mark_broken();
            }
            Err(err)
        }
        // The request may be half written; the stream cannot be reused.
        Err(scope_err) => {
            conn.mark_broken();
            Err(scope_err)
        }
    }
}
