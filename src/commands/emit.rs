use clap::Args;
use eyre::{Context, OptionExt};
use logwright::{config::ConfigManager, Registry};

use super::load_settings;

#[derive(Args, Debug)]
pub struct Cmd {
    #[arg(index = 1, help = "Name of the logger to write to.")]
    pub logger: String,

    #[arg(index = 2, help = "Level to log at, any name from the level table.")]
    pub level: String,

    #[arg(index = 3, required = true, num_args = 1.., help = "The message, words are joined by spaces.")]
    pub message: Vec<String>,
}

impl Cmd {
    pub async fn run(&self, config: &impl ConfigManager) -> eyre::Result<()> {
        let (_, settings) = load_settings(config)?;
        let registry = Registry::from_settings(&settings).context("Failed configuring loggers")?;

        let logger = registry
            .get(&self.logger)
            .ok_or_eyre(format!("No logger named '{}' is configured", self.logger))?;

        if !logger.has_level(&self.level) {
            eyre::bail!("Level '{}' is not in the level table", self.level);
        }

        logger.log(&self.level, self.message.join(" "));
        registry.flush();

        Ok(())
    }
}
