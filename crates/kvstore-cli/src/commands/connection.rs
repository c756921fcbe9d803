use clap::Args;
use kvstore_core::{KvStorage, Scope};
use kvstore_redis::duration::parse_duration;
use kvstore_redis::{KeyPrefix, RedisEndpoint, RedisKvStorage};
use tracing::debug;

/// Where the store lives and which namespace to use
#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Redis endpoint, e.g. redis://:password@host:6379/10?maxActive=5
    #[arg(long, env = "KVSTORE_REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub redis_url: String,

    /// Deployment environment used in the key prefix
    #[arg(long, env = "KVSTORE_ENV", default_value = "")]
    pub environment: String,

    /// Project name used in the key prefix
    #[arg(long, env = "KVSTORE_PROJECT", default_value = "")]
    pub project: String,

    /// Give up on the operation after this long (e.g. 5s, 500ms)
    #[arg(long, default_value = "10s")]
    pub timeout: String,
}

impl ConnectionArgs {
    /// Storage bound to a scope that expires after `--timeout`
    pub fn storage(&self) -> anyhow::Result<RedisKvStorage> {
        let prefix = KeyPrefix::new(&self.environment, &self.project);
        let config = RedisEndpoint::parse(&self.redis_url)?
            .with_prefix(prefix)
            .into_config();
        debug!("Using Redis at {} (db {})", config.address(), config.db);

        let timeout = parse_duration(&self.timeout).map_err(anyhow::Error::msg)?;
        let storage = RedisKvStorage::connect(&config)?;
        Ok(storage.with_scope(Scope::background().with_timeout(timeout)))
    }
}
