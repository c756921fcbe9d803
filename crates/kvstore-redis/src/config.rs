//! Redis backend configuration types

use std::fmt;
use std::time::Duration;

use kvstore_core::{KvError, KvResult};
use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use serde::{Deserialize, Serialize};

use crate::duration::serde_human;

/// Default network protocol
pub const DEFAULT_PROTOCOL: &str = "tcp";
/// Default Redis port
pub const DEFAULT_PORT: u16 = 6379;
/// Default logical database
pub const DEFAULT_DB: i64 = 10;
/// Default connect/read/write timeout
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(10);
/// Default time an idle connection may sit in the pool
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(240);
/// Default cap on checked-out connections
pub const DEFAULT_MAX_ACTIVE: usize = 5;
/// Default cap on idle connections
pub const DEFAULT_MAX_IDLE: usize = 3;

// Helper functions for serde defaults
fn default_protocol() -> String {
    DEFAULT_PROTOCOL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_db() -> i64 {
    DEFAULT_DB
}

fn default_io_timeout() -> Duration {
    DEFAULT_IO_TIMEOUT
}

fn default_idle_timeout() -> Duration {
    DEFAULT_IDLE_TIMEOUT
}

fn default_max_active() -> usize {
    DEFAULT_MAX_ACTIVE
}

fn default_max_idle() -> usize {
    DEFAULT_MAX_IDLE
}

fn default_wait() -> bool {
    true
}

/// Namespace put in front of every key: `{environment}:{project}:{key}`.
///
/// Both parts are lower-cased so that `Staging`/`staging` share keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PrefixParts")]
pub struct KeyPrefix {
    environment: String,
    project: String,
}

#[derive(Deserialize)]
struct PrefixParts {
    #[serde(default)]
    environment: String,
    #[serde(default)]
    project: String,
}

impl From<PrefixParts> for KeyPrefix {
    fn from(parts: PrefixParts) -> Self {
        KeyPrefix::new(parts.environment, parts.project)
    }
}

impl KeyPrefix {
    pub fn new(environment: impl AsRef<str>, project: impl AsRef<str>) -> Self {
        Self {
            environment: environment.as_ref().to_lowercase(),
            project: project.as_ref().to_lowercase(),
        }
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// Build the namespaced key sent over the wire
    pub fn apply(&self, key: &str) -> String {
        format!("{}:{}:{}", self.environment, self.project, key)
    }

    /// Strip the namespace from a wire key; `None` if it belongs to another namespace
    pub fn strip<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(self.environment.as_str())?
            .strip_prefix(':')?
            .strip_prefix(self.project.as_str())?
            .strip_prefix(':')
    }
}

/// Connection and pool settings for the Redis backend
#[derive(Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Network protocol, only `tcp` is supported
    #[serde(default = "default_protocol")]
    pub protocol: String,

    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Sent with AUTH when the connection is opened
    #[serde(default)]
    pub password: Option<String>,

    /// Logical database selected when the connection is opened
    #[serde(default = "default_db")]
    pub db: i64,

    #[serde(default = "default_io_timeout", with = "serde_human")]
    pub connect_timeout: Duration,

    #[serde(default = "default_io_timeout", with = "serde_human")]
    pub read_timeout: Duration,

    #[serde(default = "default_io_timeout", with = "serde_human")]
    pub write_timeout: Duration,

    /// Idle connections older than this are closed instead of reused; zero keeps them forever
    #[serde(default = "default_idle_timeout", with = "serde_human")]
    pub idle_timeout: Duration,

    /// Maximum number of connections checked out at once
    #[serde(default = "default_max_active")]
    pub max_active: usize,

    /// Maximum number of idle connections kept for reuse
    #[serde(default = "default_max_idle")]
    pub max_idle: usize,

    /// Wait for a free connection when the pool is exhausted instead of failing
    #[serde(default = "default_wait")]
    pub wait: bool,

    #[serde(default)]
    pub prefix: KeyPrefix,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            protocol: default_protocol(),
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            password: None,
            db: DEFAULT_DB,
            connect_timeout: DEFAULT_IO_TIMEOUT,
            read_timeout: DEFAULT_IO_TIMEOUT,
            write_timeout: DEFAULT_IO_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_active: DEFAULT_MAX_ACTIVE,
            max_idle: DEFAULT_MAX_IDLE,
            wait: true,
            prefix: KeyPrefix::default(),
        }
    }
}

impl fmt::Debug for RedisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisConfig")
            .field("protocol", &self.protocol)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("db", &self.db)
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .field("idle_timeout", &self.idle_timeout)
            .field("max_active", &self.max_active)
            .field("max_idle", &self.max_idle)
            .field("wait", &self.wait)
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl RedisConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn with_prefix(mut self, prefix: KeyPrefix) -> Self {
        self.prefix = prefix;
        self
    }

    /// Reject settings the pool cannot work with
    pub fn validate(&self) -> KvResult<()> {
        if !self.protocol.eq_ignore_ascii_case(DEFAULT_PROTOCOL) {
            return Err(KvError::Configuration(format!(
                "unsupported protocol '{}'",
                self.protocol
            )));
        }
        if self.host.trim().is_empty() {
            return Err(KvError::Configuration("host must not be empty".to_string()));
        }
        if self.max_active == 0 {
            return Err(KvError::Configuration(
                "max_active must be at least 1".to_string(),
            ));
        }
        if self.db < 0 {
            return Err(KvError::Configuration(format!(
                "invalid database index {}",
                self.db
            )));
        }
        Ok(())
    }

    /// `host:port` without credentials, for logs
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// redis does not time writes separately, so replies wait for the longer of the two
    pub fn response_timeout(&self) -> Duration {
        self.read_timeout.max(self.write_timeout)
    }

    /// Connection parameters with AUTH and SELECT applied at connect time
    pub fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            addr: ConnectionAddr::Tcp(self.host.clone(), self.port),
            redis: RedisConnectionInfo {
                db: self.db,
                password: self.password.clone().filter(|p| !p.is_empty()),
                ..Default::default()
            },
        }
    }
}
