//! Named, level-filtered loggers built from a settings document.
//!
//! A [`Registry`] turns the `logging` section of [`Settings`] into loggers
//! with console and rotating file sinks, swaps them on reconfiguration and
//! can mute them as a whole. [`middleware`] logs HTTP exchanges through the
//! `requests` logger and [`provider`] feeds settings changes in.

pub mod config;
pub mod error;
pub mod logging;
pub mod middleware;
pub mod provider;
mod utils;

pub use config::{LoggerSpec, LoggingConfig, Settings};
pub use error::ConfigError;
pub use logging::{LogBridge, NamedLogger, Registry, RegistryBuilder};
