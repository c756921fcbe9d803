use clap::Args;
use colored::Colorize;
use kvstore_core::{KvStorage, NO_EXPIRY};
use kvstore_redis::duration::parse_duration;
use serde_json::Value;
use tracing::info;

use super::connection::ConnectionArgs;

/// Parse a CLI value as JSON, falling back to a plain string
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn print_value(key: &str, value: Option<Value>) -> anyhow::Result<()> {
    match value {
        Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        None => println!("{} {}", key.bright_white(), "(nil)".dimmed()),
    }
    Ok(())
}

#[derive(Args)]
pub struct GetCommand {
    /// Key to read
    pub key: String,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

impl GetCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let rt = tokio::runtime::Runtime::new()?;
        let value = rt.block_on(async {
            let storage = self.connection.storage()?;
            Ok::<_, anyhow::Error>(storage.fetch::<Value>(&self.key).await?)
        })?;
        print_value(&self.key, value)
    }
}

#[derive(Args)]
pub struct SetCommand {
    /// Key to write
    pub key: String,

    /// JSON value; anything that is not valid JSON is stored as a string
    pub value: String,

    /// Expire the key after this long (e.g. 30s, 5m); omitted means never
    #[arg(long)]
    pub ttl: Option<String>,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

impl SetCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let ttl = match self.ttl.as_deref() {
            Some(ttl) => parse_duration(ttl).map_err(anyhow::Error::msg)?,
            None => NO_EXPIRY,
        };
        let value = parse_value(&self.value);

        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(async {
            let storage = self.connection.storage()?;
            storage.store(&self.key, &value, ttl).await?;
            Ok::<_, anyhow::Error>(())
        })?;

        info!("Stored {} (ttl {:?})", self.key, ttl);
        println!("{}", "OK".bright_green());
        Ok(())
    }
}

#[derive(Args)]
pub struct DelCommand {
    /// Key to delete
    pub key: String,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

impl DelCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(async {
            let storage = self.connection.storage()?;
            storage.del(&self.key).await?;
            Ok::<_, anyhow::Error>(())
        })?;

        println!("{}", "OK".bright_green());
        Ok(())
    }
}

#[derive(Args)]
pub struct TakeCommand {
    /// Key to read and delete
    pub key: String,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

impl TakeCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let rt = tokio::runtime::Runtime::new()?;
        let value = rt.block_on(async {
            let storage = self.connection.storage()?;
            Ok::<_, anyhow::Error>(storage.fetch_and_del::<Value>(&self.key).await?)
        })?;
        print_value(&self.key, value)
    }
}
