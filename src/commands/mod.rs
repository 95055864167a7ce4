use std::{fmt::Display, path::PathBuf};

use clap::{Parser, Subcommand};
use eyre::Context;
use logwright::{
    config::{ConfigManager, LocalConfigManager},
    provider::{ConfigProvider, FileProvider, StaticProvider},
    Settings,
};
use tracing::level_filters::LevelFilter;

mod check;
mod emit;
mod info;
mod serve;
mod watch;

#[derive(Subcommand, Debug)]
pub enum LogwrightCmd {
    Check(check::Cmd),

    Emit(emit::Cmd),

    Watch(watch::Cmd),

    Serve(serve::Cmd),

    Info(info::Cmd),
}

impl Display for LogwrightCmd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogwrightCmd::Check(_cmd) => write!(f, "check"),
            LogwrightCmd::Emit(cmd) => write!(f, "emit {} {}", cmd.logger, cmd.level),
            LogwrightCmd::Watch(cmd) => write!(f, "watch {}", cmd.logger),
            LogwrightCmd::Serve(cmd) => write!(f, "serve {}", cmd.listen),
            LogwrightCmd::Info(_cmd) => write!(f, "info"),
        }
    }
}

#[derive(Parser)]
#[command(version, long_version = "")]
#[command(about = "Named, level-filtered loggers driven by a settings file.", long_about = None, disable_help_subcommand = true)]
pub struct Cli {
    #[arg(
        global = true,
        long,
        short = 'c',
        env = logwright::config::CONFIG_ENV,
        help = "The settings file to use. Defaults to $XDG_CONFIG_HOME/logwright/config.toml.",
        display_order = 0
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        short = 'v',
        action = clap::ArgAction::Count,
        global = true,
        help = "Write verbose messages to stderr for debugging.",
        display_order = 999
    )]
    pub verbose: u8,

    #[command(subcommand)]
    pub cmd: LogwrightCmd,
}

impl Cli {
    fn log_filter(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::OFF,
            1 => LevelFilter::ERROR,
            2 => LevelFilter::WARN,
            3 => LevelFilter::INFO,
            4 => LevelFilter::DEBUG,
            5..=u8::MAX => LevelFilter::TRACE,
        }
    }

    fn setup_logging(&self) -> eyre::Result<()> {
        tracing_subscriber::fmt()
            .with_max_level(self.log_filter())
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|e| eyre::eyre!("{}", e))
            .context("Failed installing diagnostics subscriber")
    }

    pub fn run(self) -> eyre::Result<()> {
        self.setup_logging()?;

        tracing::info!(target: "logwright", "logwright starting up");
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        tracing::info!(target: "logwright", "running command {}", &self.cmd);

        let config = LocalConfigManager::new(self.config.clone());
        let result = runtime.block_on(self.invoke_sub_command(config));

        if let Err(msg) = &result {
            tracing::error!(target: "logwright", "failed running command {}, error={} cause={}", &self.cmd, msg, msg.root_cause());
        }

        result
    }

    async fn invoke_sub_command<T>(&self, config: T) -> eyre::Result<()>
    where
        T: ConfigManager,
    {
        match &self.cmd {
            LogwrightCmd::Check(check) => check.run(&config).await,
            LogwrightCmd::Emit(emit) => emit.run(&config).await,
            LogwrightCmd::Watch(watch) => watch.run(&config).await,
            LogwrightCmd::Serve(serve) => serve.run(&config).await,
            LogwrightCmd::Info(info) => info.run(&config).await,
        }
    }
}

/// Reads the settings file, or the built-in defaults when there is none.
pub(crate) fn load_settings(config: &impl ConfigManager) -> eyre::Result<(PathBuf, Settings)> {
    let path = config.get_config_path()?;

    if !path.exists() {
        tracing::info!(target: "logwright", "no settings at {:?}, using defaults", path);
        return Ok((path, Settings::default()));
    }

    let settings = Settings::load(&path)
        .with_context(|| format!("Failed loading settings from {:?}", path))?;
    Ok((path, settings))
}

/// Follows the settings file when there is one, otherwise serves the
/// built-in defaults.
pub(crate) fn open_provider(config: &impl ConfigManager) -> eyre::Result<Box<dyn ConfigProvider>> {
    let path = config.get_config_path()?;

    if path.exists() {
        let provider = FileProvider::open(&path)
            .with_context(|| format!("Failed watching settings at {:?}", path))?;
        return Ok(Box::new(provider));
    }

    tracing::info!(target: "logwright", "no settings at {:?}, using defaults", path);
    Ok(Box::new(StaticProvider::new(Settings::default())))
}
