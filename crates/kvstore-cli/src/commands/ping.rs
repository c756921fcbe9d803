use clap::Args;
use colored::Colorize;
use tracing::info;

use super::connection::ConnectionArgs;

#[derive(Args)]
pub struct PingCommand {
    #[command(flatten)]
    pub connection: ConnectionArgs,
}

impl PingCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        info!("Checking Redis liveness");

        let rt = tokio::runtime::Runtime::new()?;
        let status = rt.block_on(async {
            let storage = self.connection.storage()?;
            Ok::<_, anyhow::Error>(storage.liveness_check().await)
        })?;

        let mut healthy = true;
        for (target, state) in &status {
            if state == "ok" {
                println!("{} {}", target.bright_white(), "ok".bright_green());
            } else {
                healthy = false;
                println!("{} {}", target.bright_white(), state.bright_red());
            }
        }

        if !healthy {
            anyhow::bail!("Redis is not reachable");
        }
        Ok(())
    }
}
