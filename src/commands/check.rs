use clap::Args;
use eyre::Context;
use logwright::{config::ConfigManager, logging::colors::style_for, Settings};

#[derive(Args, Debug)]
pub struct Cmd {
    #[arg(
        long,
        help = "Only validate, print nothing on success."
    )]
    pub quiet: bool,
}

impl Cmd {
    pub async fn run(&self, config: &impl ConfigManager) -> eyre::Result<()> {
        let path = config.get_config_path()?;
        let settings = Settings::load(&path)
            .with_context(|| format!("Failed loading settings from {:?}", path))?;

        let logging = settings.logging_config();
        let specs = logging
            .resolve()
            .with_context(|| format!("Settings in {:?} are not usable", path))?;

        if self.quiet {
            return Ok(());
        }

        let root = std::env::current_dir().context("Failed reading working directory")?;

        println!("Settings:       {}", path.display());
        println!("Enabled:        {}", logging.enabled);
        println!("Logs:           {}", settings.logs_dir(&root).display());

        let mut levels: Vec<_> = logging.levels.iter().collect();
        levels.sort_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)));
        let levels: Vec<_> = levels
            .iter()
            .map(|(name, priority)| format!("{}={}", name, priority))
            .collect();
        println!("Levels:         {}", levels.join(" "));

        println!("Loggers:");
        for spec in &specs {
            let transports: Vec<_> = spec.transports.iter().map(ToString::to_string).collect();
            println!(
                "  {:<14}{:<8} {}",
                spec.name,
                spec.level,
                transports.join(",")
            );
        }

        for (level, color) in &logging.colors {
            if style_for(color).is_none() {
                println!("warning: unknown color '{}' for level '{}', printed plain", color, level);
            }
        }

        Ok(())
    }
}
