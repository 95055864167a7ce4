use std::{
    collections::BTreeMap,
    error::Error,
    fmt::{self, Display},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use chrono::Utc;

use super::{Entry, ErrorChannel, LogSink};

/// A configured logger, addressable on the registry by its name.
///
/// Every configured level is callable through [`NamedLogger::log`]; the
/// usual level names also get shorthand methods. While muted, all calls
/// return before touching any sink.
pub struct NamedLogger {
    name: String,
    level: String,
    threshold: Option<u32>,
    levels: Arc<BTreeMap<String, u32>>,
    sinks: Vec<Box<dyn LogSink>>,
    muted: AtomicBool,
    errors: Arc<dyn ErrorChannel>,
}

impl fmt::Debug for NamedLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedLogger")
            .field("name", &self.name)
            .field("level", &self.level)
            .field("sinks", &self.sinks.len())
            .field("muted", &self.is_muted())
            .finish()
    }
}

impl NamedLogger {
    /// `level` must be a key of `levels`, the registry checks this before
    /// building loggers. A logger with an unknown level emits nothing.
    pub fn new(
        name: impl Into<String>,
        level: impl Into<String>,
        levels: Arc<BTreeMap<String, u32>>,
        sinks: Vec<Box<dyn LogSink>>,
        errors: Arc<dyn ErrorChannel>,
    ) -> Self {
        let level = level.into();

        Self {
            name: name.into(),
            threshold: levels.get(&level).copied(),
            muted: AtomicBool::new(false),
            level,
            levels,
            sinks,
            errors,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The minimum level this logger emits.
    pub fn level(&self) -> &str {
        &self.level
    }

    /// All level names callable on this logger.
    pub fn levels(&self) -> impl Iterator<Item = &str> {
        self.levels.keys().map(String::as_str)
    }

    pub fn has_level(&self, level: &str) -> bool {
        self.levels.contains_key(level)
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Acquire)
    }

    pub(crate) fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Release);
    }

    /// Whether a call at `level` would reach the sinks right now.
    pub fn enabled(&self, level: &str) -> bool {
        !self.is_muted()
            && self
                .levels
                .get(level)
                .is_some_and(|priority| self.permits(*priority))
    }

    fn permits(&self, priority: u32) -> bool {
        self.threshold.is_some_and(|threshold| priority <= threshold)
    }

    pub fn log(&self, level: &str, message: impl Display) {
        if self.is_muted() {
            return;
        }
        self.dispatch(level, &message.to_string(), &[]);
    }

    /// Logs `error` along with its source chain. Sinks decide whether the
    /// chain is rendered on one line or as a `Caused by:` block.
    pub fn report(&self, level: &str, error: &(dyn Error + 'static)) {
        if self.is_muted() {
            return;
        }

        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }

        self.dispatch(level, &error.to_string(), &causes);
    }

    fn dispatch(&self, level: &str, message: &str, causes: &[String]) {
        let Some(priority) = self.levels.get(level) else {
            self.errors.report(
                &self.name,
                &eyre::eyre!("level '{}' is not configured", level),
            );
            return;
        };

        if !self.permits(*priority) {
            return;
        }

        let entry = Entry {
            logger: &self.name,
            level,
            message,
            causes,
            time: Utc::now(),
        };

        for sink in &self.sinks {
            if let Err(err) = sink.write_log(&entry) {
                self.errors.report(&self.name, &err);
            }
        }
    }

    pub fn flush(&self) {
        for sink in &self.sinks {
            if let Err(err) = sink.flush() {
                self.errors.report(&self.name, &err);
            }
        }
    }

    pub fn error(&self, message: impl Display) {
        self.log("error", message)
    }

    pub fn warn(&self, message: impl Display) {
        self.log("warn", message)
    }

    pub fn info(&self, message: impl Display) {
        self.log("info", message)
    }

    pub fn verbose(&self, message: impl Display) {
        self.log("verbose", message)
    }

    pub fn debug(&self, message: impl Display) {
        self.log("debug", message)
    }

    pub fn silly(&self, message: impl Display) {
        self.log("silly", message)
    }
}

/// Formats and logs at a level given by name.
///
/// ```ignore
/// logw!(registry.get("requests").unwrap(), "info", "{} {}", status, path);
/// ```
#[macro_export]
macro_rules! logw {
    ($logger:expr, $level:expr, $($arg:tt)+) => {
        $logger.log($level, format_args!($($arg)+))
    };
}
