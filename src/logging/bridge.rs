use std::sync::Arc;

use eyre::Context;
use log::{LevelFilter, Log};

use super::{NamedLogger, Registry};

/// Routes records of the `log` crate into the registry.
///
/// A record whose target names a configured logger goes to that logger,
/// everything else goes to the fallback logger. Level names map one to one,
/// `trace` falls back to `silly` when the level table has no `trace`.
pub struct LogBridge {
    registry: Arc<Registry>,
    fallback: String,
    filter: LevelFilter,
}

impl LogBridge {
    pub fn new(registry: Arc<Registry>, fallback: impl Into<String>) -> Self {
        Self {
            registry,
            fallback: fallback.into(),
            filter: LevelFilter::Trace,
        }
    }

    pub fn with_level(self, filter: LevelFilter) -> Self {
        Self { filter, ..self }
    }

    pub fn init(self) -> eyre::Result<()> {
        log::set_max_level(self.filter);
        log::set_boxed_logger(Box::new(self)).context("Failed registering log bridge")?;

        Ok(())
    }

    fn route(&self, target: &str) -> Option<Arc<NamedLogger>> {
        self.registry
            .get(target)
            .or_else(|| self.registry.get(&self.fallback))
    }
}

fn level_name(logger: &NamedLogger, level: log::Level) -> &'static str {
    match level {
        log::Level::Error => "error",
        log::Level::Warn => "warn",
        log::Level::Info => "info",
        log::Level::Debug => "debug",
        log::Level::Trace if logger.has_level("trace") => "trace",
        log::Level::Trace => "silly",
    }
}

impl Log for LogBridge {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        if metadata.level() > self.filter {
            return false;
        }

        self.route(metadata.target())
            .is_some_and(|logger| logger.enabled(level_name(&logger, metadata.level())))
    }

    fn log(&self, record: &log::Record) {
        if record.level() > self.filter {
            return;
        }

        if let Some(logger) = self.route(record.target()) {
            let level = level_name(&logger, record.level());
            if logger.has_level(level) {
                logger.log(level, record.args());
            }
        }
    }

    fn flush(&self) {
        self.registry.flush()
    }
}
