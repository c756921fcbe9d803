//! kvstore CLI - inspect and edit a Redis-backed kvstore namespace

mod commands;

use clap::{Parser, Subcommand};
use commands::{DelCommand, GetCommand, PingCommand, SetCommand, TakeCommand};
use tracing_subscriber::{layer::SubscriberExt, Layer};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", env = "KVSTORE_LOG_LEVEL", global = true)]
    log_level: String,

    /// Log format: compact, full
    #[arg(
        long,
        default_value = "compact",
        env = "KVSTORE_LOG_FORMAT",
        global = true
    )]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the Redis server answers PING
    Ping(PingCommand),
    /// Print the value stored under a key
    Get(GetCommand),
    /// Store a JSON value under a key
    Set(SetCommand),
    /// Delete a key
    Del(DelCommand),
    /// Print the value stored under a key and delete it atomically
    Take(TakeCommand),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // If RUST_LOG is set, use it directly; otherwise scope the level to our crates
    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::try_from_default_env()?
    } else {
        tracing_subscriber::EnvFilter::new(format!(
            "kvstore={level},\
             kvstore_cli={level},\
             kvstore_core={level},\
             kvstore_redis={level},\
             redis=warn",
            level = cli.log_level
        ))
    };

    let fmt_layer = match cli.log_format.as_str() {
        "full" => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
        _ => tracing_subscriber::fmt::layer() // "compact" or any other value
            .compact()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Ping(cmd) => cmd.execute(),
        Commands::Get(cmd) => cmd.execute(),
        Commands::Set(cmd) => cmd.execute(),
        Commands::Del(cmd) => cmd.execute(),
        Commands::Take(cmd) => cmd.execute(),
    }
}
