use std::sync::Arc;

use clap::Args;
use eyre::Context;
use logwright::{config::ConfigManager, Registry};
use tokio::io::{AsyncBufReadExt, BufReader};

use super::open_provider;

#[derive(Args, Debug)]
pub struct Cmd {
    #[arg(index = 1, default_value = "requests", help = "Logger every stdin line is written to.")]
    pub logger: String,

    #[arg(short, long, default_value = "info", help = "Level the lines are logged at.")]
    pub level: String,
}

impl Cmd {
    pub async fn run(&self, config: &impl ConfigManager) -> eyre::Result<()> {
        let provider = open_provider(config)?;
        let registry = Arc::new(
            Registry::from_settings(&provider.current()).context("Failed configuring loggers")?,
        );
        let follower = registry.follow(provider.subscribe());

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await.context("Failed reading stdin")? {
            // The logger may come and go as the settings change.
            match registry.get(&self.logger) {
                Some(logger) => logger.log(&self.level, line),
                None => {
                    tracing::warn!(target: "logwright", "no logger named '{}', dropping line", self.logger)
                }
            }
        }

        follower.abort();
        registry.flush();
        Ok(())
    }
}
