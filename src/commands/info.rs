use clap::{Args, CommandFactory};

use logwright::config::ConfigManager;

use super::{load_settings, Cli};

#[derive(Args, Debug)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cmd {}

impl Cmd {
    pub async fn run(&self, config: &impl ConfigManager) -> eyre::Result<()> {
        let (path, settings) = load_settings(config)?;
        let root = std::env::current_dir()?;
        let names: Vec<_> = settings.logging.loggers.keys().cloned().collect();

        println!(
            "Version:        {}",
            Cli::command().get_version().unwrap_or("")
        );
        println!(
            "Settings:       {}{}",
            path.display(),
            if path.exists() { "" } else { " (missing, using defaults)" }
        );
        println!("Logs:           {}", settings.logs_dir(&root).display());
        println!("Loggers:        {}", names.join(", "));
        Ok(())
    }
}
