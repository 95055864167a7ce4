mod bridge;
pub mod colors;
mod formatters;
mod logger;
mod registry;
pub mod rotation;
pub mod sinks;

use std::{io::Write, sync::Arc};

use chrono::{DateTime, Utc};

pub use bridge::LogBridge;
pub use logger::NamedLogger;
pub use registry::{Registry, RegistryBuilder};

/// A single log call as seen by formatters and sinks.
#[derive(Debug, Clone, Copy)]
pub struct Entry<'a> {
    pub logger: &'a str,
    pub level: &'a str,
    pub message: &'a str,
    /// Messages of the error source chain, outermost first. Empty for plain
    /// messages.
    pub causes: &'a [String],
    pub time: DateTime<Utc>,
}

pub trait LogFormatter: Sync + Send {
    fn format(&self, entry: &Entry<'_>) -> String;
}

pub trait LogSink: Sync + Send {
    fn write_log(&self, entry: &Entry<'_>) -> eyre::Result<()>;
    fn flush(&self) -> eyre::Result<()>;
}

/// Produces the writer console sinks print to, called once per line.
pub type MakeWriter = Arc<dyn Fn() -> Box<dyn Write + Send> + Send + Sync>;

/// Where sink failures end up. Log calls never return errors, so this is the
/// only place they surface.
pub trait ErrorChannel: Sync + Send {
    fn report(&self, logger: &str, error: &eyre::Report);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StderrChannel;

impl ErrorChannel for StderrChannel {
    fn report(&self, logger: &str, error: &eyre::Report) {
        eprintln!("logwright: logger '{}' failed: {:#}", logger, error);
    }
}
