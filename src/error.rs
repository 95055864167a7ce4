use std::path::PathBuf;

/// Errors that make a configuration unusable. `Registry::configure` returns
/// these without touching the live logger set.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown transport '{transport}' configured for logger '{logger}'")]
    UnknownTransport { logger: String, transport: String },

    #[error("logger '{logger}' uses level '{level}' which is not in the level table")]
    UnknownLevel { logger: String, level: String },

    #[error("failed building {transport} sink for logger '{logger}'")]
    Sink {
        logger: String,
        transport: crate::config::Transport,
        #[source]
        source: std::io::Error,
    },

    #[error("failed creating logs directory {}", path.display())]
    LogsDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed reading settings file {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings file {}: {reason}", path.display())]
    Invalid { path: PathBuf, reason: String },

    #[error("logging is muted, unmute before reconfiguring")]
    Muted,
}
