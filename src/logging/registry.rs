use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError, RwLock},
};

use tokio::{sync::watch, task::JoinHandle};

use super::{
    colors::ColorTable, sinks, sinks::SinkFactory, ErrorChannel, LogSink, MakeWriter, NamedLogger,
    StderrChannel,
};
use crate::{config::Settings, error::ConfigError};

#[derive(Default)]
struct State {
    loggers: HashMap<String, Arc<NamedLogger>>,
    colors: Arc<ColorTable>,
    logs_dir: Option<PathBuf>,
    /// Loggers muted by `enabled(false)`, restored by `enabled(true)`.
    snapshot: Option<Vec<Arc<NamedLogger>>>,
}

/// Owns the live set of named loggers.
///
/// Shared as `Arc<Registry>` between everything that logs. Loggers are
/// looked up by name with [`Registry::get`]; [`Registry::configure`] swaps
/// the whole set and [`Registry::enabled`] mutes or restores it.
pub struct Registry {
    root: PathBuf,
    console: MakeWriter,
    errors: Arc<dyn ErrorChannel>,
    state: RwLock<State>,
    // serializes configure() and enabled()
    reconfigure: Mutex<()>,
}

pub struct RegistryBuilder {
    root: Option<PathBuf>,
    console: MakeWriter,
    errors: Arc<dyn ErrorChannel>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self {
            root: None,
            console: sinks::stdout(),
            errors: Arc::new(StderrChannel),
        }
    }

    /// Directory relative log paths are resolved against. Defaults to the
    /// current working directory.
    pub fn with_root(self, root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            ..self
        }
    }

    pub fn with_console_writer(self, console: MakeWriter) -> Self {
        Self { console, ..self }
    }

    pub fn with_error_channel(self, errors: Arc<dyn ErrorChannel>) -> Self {
        Self { errors, ..self }
    }

    pub fn build(self) -> Registry {
        let root = self
            .root
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));

        Registry {
            root,
            console: self.console,
            errors: self.errors,
            state: RwLock::new(State::default()),
            reconfigure: Mutex::new(()),
        }
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// An empty registry rooted at the working directory.
    pub fn new() -> Self {
        RegistryBuilder::new().build()
    }

    /// Builds a registry and applies `settings` in one go.
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let registry = Self::new();
        registry.configure(settings)?;
        Ok(registry)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Replaces every logger with the ones described by `settings`.
    ///
    /// Nothing is applied unless every logger builds; on error the previous
    /// set stays live. Must not be called while muted, such calls fail with
    /// [`ConfigError::Muted`].
    pub fn configure(&self, settings: &Settings) -> Result<(), ConfigError> {
        let _guard = self
            .reconfigure
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if self.read_state().snapshot.is_some() {
            return Err(ConfigError::Muted);
        }

        let config = settings.logging_config();
        if !config.enabled {
            let old = self.publish(State::default());
            tracing::info!(target: "logwright", "logging disabled, removed {} loggers", old.len());
            flush_all(&old);
            return Ok(());
        }

        let specs = config.resolve()?;

        let logs_dir = settings.logs_dir(&self.root);
        ensure_dir(&logs_dir)?;

        let colors = Arc::new(ColorTable::build(&config.colors));
        let levels = Arc::new(config.levels.clone());
        let factory = SinkFactory::new(&logs_dir, self.console.clone(), colors.clone());

        let mut loggers = HashMap::with_capacity(specs.len());
        for spec in &specs {
            let sinks = spec
                .transports
                .iter()
                .map(|transport| factory.build(*transport, spec))
                .collect::<Result<Vec<Box<dyn LogSink>>, _>>()?;

            let logger = NamedLogger::new(
                &spec.name,
                &spec.level,
                levels.clone(),
                sinks,
                self.errors.clone(),
            );
            loggers.insert(spec.name.clone(), Arc::new(logger));
        }

        tracing::info!(
            target: "logwright",
            "configured {} loggers in {:?}",
            loggers.len(),
            logs_dir
        );

        let old = self.publish(State {
            loggers,
            colors,
            logs_dir: Some(logs_dir),
            snapshot: None,
        });
        flush_all(&old);

        Ok(())
    }

    fn publish(&self, state: State) -> Vec<Arc<NamedLogger>> {
        let mut current = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let old = std::mem::replace(&mut *current, state);
        old.loggers.into_values().collect()
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mutes (`false`) or restores (`true`) every logger.
    ///
    /// Muting twice is the same as muting once; restoring hands back the very
    /// same logger instances that were live before muting.
    pub fn enabled(&self, enabled: bool) {
        let _guard = self
            .reconfigure
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        if enabled {
            if let Some(snapshot) = state.snapshot.take() {
                for logger in &snapshot {
                    logger.set_muted(false);
                }
                tracing::debug!(target: "logwright", "restored {} loggers", snapshot.len());
            }
        } else if state.snapshot.is_none() {
            let snapshot: Vec<_> = state.loggers.values().cloned().collect();
            for logger in &snapshot {
                logger.set_muted(true);
            }
            tracing::debug!(target: "logwright", "muted {} loggers", snapshot.len());
            state.snapshot = Some(snapshot);
        }
    }

    pub fn is_muted(&self) -> bool {
        self.read_state().snapshot.is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<NamedLogger>> {
        self.read_state().loggers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read_state().loggers.contains_key(name)
    }

    /// Names of all addressable loggers, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.read_state().loggers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Color table of the current configuration.
    pub fn colors(&self) -> Arc<ColorTable> {
        self.read_state().colors.clone()
    }

    /// Directory file sinks write to, `None` until configured.
    pub fn logs_dir(&self) -> Option<PathBuf> {
        self.read_state().logs_dir.clone()
    }

    pub fn errors(&self) -> Arc<dyn ErrorChannel> {
        self.errors.clone()
    }

    pub fn flush(&self) {
        let loggers: Vec<_> = self.read_state().loggers.values().cloned().collect();
        flush_all(&loggers);
    }

    /// Reconfigures on every settings change published on `changes` until
    /// the sending side goes away. Failed reconfigurations keep the previous
    /// loggers and are reported on the error channel.
    pub fn follow(self: &Arc<Self>, mut changes: watch::Receiver<Arc<Settings>>) -> JoinHandle<()> {
        let registry = self.clone();

        tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let settings = changes.borrow_and_update().clone();
                tracing::debug!(target: "logwright", "settings changed, reconfiguring");

                if let Err(err) = registry.configure(&settings) {
                    tracing::warn!(target: "logwright", "reconfigure failed: {}", err);
                    registry.errors.report("registry", &eyre::Report::new(err));
                }
            }
        })
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

fn flush_all(loggers: &[Arc<NamedLogger>]) {
    for logger in loggers {
        logger.flush();
    }
}

fn ensure_dir(dir: &Path) -> Result<(), ConfigError> {
    // create_dir_all treats an existing directory as success
    std::fs::create_dir_all(dir).map_err(|source| ConfigError::LogsDir {
        path: dir.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::config::{LoggerRecord, LoggerSpec, LoggingConfig, Paths};
    use crate::logging::sinks::SharedBuffer;

    fn settings(root: &Path, loggers: &[(&str, LoggerSpec)]) -> Settings {
        Settings {
            enabled: None,
            paths: Paths {
                logs: Some(root.join("logs").to_string_lossy().into_owned()),
            },
            logging: LoggingConfig {
                loggers: loggers
                    .iter()
                    .map(|(name, spec)| (name.to_string(), spec.clone()))
                    .collect(),
                ..Default::default()
            },
        }
    }

    fn file_only(level: &str) -> LoggerSpec {
        LoggerSpec::Full(LoggerRecord {
            level: level.into(),
            transports: Some(vec!["file".into()]),
            ..Default::default()
        })
    }

    fn registry(root: &Path, console: &SharedBuffer) -> Registry {
        Registry::builder()
            .with_root(root)
            .with_console_writer(console.make_writer())
            .build()
    }

    #[test]
    fn keys_follow_the_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path(), &SharedBuffer::new());

        registry
            .configure(&settings(
                dir.path(),
                &[("requests", file_only("info")), ("debug", file_only("debug"))],
            ))
            .unwrap();
        assert_eq!(registry.names(), vec!["debug", "requests"]);

        registry
            .configure(&settings(dir.path(), &[("requests", file_only("info"))]))
            .unwrap();
        assert_eq!(registry.names(), vec!["requests"]);
        assert!(registry.get("debug").is_none());
    }

    #[test]
    fn disabled_configuration_removes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path(), &SharedBuffer::new());
        registry
            .configure(&settings(dir.path(), &[("requests", file_only("info"))]))
            .unwrap();

        let mut disabled = settings(dir.path(), &[("requests", file_only("info"))]);
        disabled.logging.enabled = false;
        registry.configure(&disabled).unwrap();

        assert!(registry.names().is_empty());
        assert!(registry.logs_dir().is_none());
    }

    #[test]
    fn failed_configuration_keeps_previous_loggers() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path(), &SharedBuffer::new());
        registry
            .configure(&settings(dir.path(), &[("requests", file_only("info"))]))
            .unwrap();
        let before = registry.get("requests").unwrap();

        let broken = settings(
            dir.path(),
            &[
                ("audit", file_only("info")),
                (
                    "metrics",
                    LoggerSpec::Full(LoggerRecord {
                        level: "info".into(),
                        transports: Some(vec!["statsd".into()]),
                        ..Default::default()
                    }),
                ),
            ],
        );
        let err = registry.configure(&broken).unwrap_err();

        assert!(matches!(err, ConfigError::UnknownTransport { .. }));
        assert_eq!(registry.names(), vec!["requests"]);
        assert!(Arc::ptr_eq(&before, &registry.get("requests").unwrap()));
    }

    #[test]
    fn mute_and_restore_keep_identity() {
        let dir = tempfile::tempdir().unwrap();
        let console = SharedBuffer::new();
        let registry = registry(dir.path(), &console);
        registry
            .configure(&settings(
                dir.path(),
                &[("requests", LoggerSpec::Level("info".into()))],
            ))
            .unwrap();
        let before = registry.get("requests").unwrap();

        registry.enabled(false);
        registry.enabled(false);
        assert!(registry.is_muted());

        registry.get("requests").unwrap().info("muted");
        assert!(console.contents().is_empty());
        let log_file = dir.path().join("logs").join("requests.log");
        assert_eq!(std::fs::read_to_string(&log_file).unwrap(), "");

        registry.enabled(true);
        assert!(!registry.is_muted());
        let after = registry.get("requests").unwrap();
        assert!(Arc::ptr_eq(&before, &after));

        after.info("audible");
        assert!(console.contents().contains("audible"));
        assert!(std::fs::read_to_string(&log_file)
            .unwrap()
            .contains("audible"));
    }

    #[test]
    fn configure_while_muted_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path(), &SharedBuffer::new());
        let settings = settings(dir.path(), &[("requests", file_only("info"))]);
        registry.configure(&settings).unwrap();

        registry.enabled(false);
        assert!(matches!(
            registry.configure(&settings),
            Err(ConfigError::Muted)
        ));
        registry.enabled(true);
        registry.configure(&settings).unwrap();
    }

    #[test]
    fn unmuting_without_snapshot_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path(), &SharedBuffer::new());
        registry.enabled(true);
        assert!(!registry.is_muted());
        assert!(registry.names().is_empty());
    }

    #[test]
    fn relative_logs_dir_is_created_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path(), &SharedBuffer::new());
        let mut settings = settings(dir.path(), &[("requests", file_only("info"))]);
        settings.paths.logs = Some("var/log".into());

        registry.configure(&settings).unwrap();
        registry.configure(&settings).unwrap();

        let logs = dir.path().join("var").join("log");
        assert_eq!(registry.logs_dir(), Some(logs.clone()));
        assert!(logs.join("requests.log").exists());
    }

    #[test]
    fn unknown_colors_fall_back_to_plain_labels() {
        let dir = tempfile::tempdir().unwrap();
        let console = SharedBuffer::new();
        let registry = registry(dir.path(), &console);
        let mut settings = settings(dir.path(), &[("requests", LoggerSpec::Level("info".into()))]);
        settings.logging.colors = BTreeMap::from([("info".to_string(), "nope".to_string())]);

        registry.configure(&settings).unwrap();
        assert!(registry.colors().is_empty());

        registry.get("requests").unwrap().info("plain");
        assert!(console.contents().ends_with(" [info] [REQU] plain\n"));
    }

    #[tokio::test]
    async fn follows_published_settings() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(registry(dir.path(), &SharedBuffer::new()));
        let initial = settings(dir.path(), &[("requests", file_only("info"))]);
        registry.configure(&initial).unwrap();

        let (tx, rx) = watch::channel(Arc::new(initial));
        let handle = registry.follow(rx);

        tx.send_replace(Arc::new(settings(
            dir.path(),
            &[("requests", file_only("info")), ("jobs", file_only("warn"))],
        )));
        drop(tx);
        handle.await.unwrap();

        assert_eq!(registry.names(), vec!["jobs", "requests"]);
    }

    #[derive(Default)]
    struct Capture(Mutex<Vec<String>>);

    impl ErrorChannel for Capture {
        fn report(&self, logger: &str, error: &eyre::Report) {
            self.0.lock().unwrap().push(format!("{}: {}", logger, error));
        }
    }

    #[tokio::test]
    async fn broken_published_settings_keep_previous_loggers() {
        let dir = tempfile::tempdir().unwrap();
        let errors = Arc::new(Capture::default());
        let registry = Arc::new(
            Registry::builder()
                .with_root(dir.path())
                .with_console_writer(SharedBuffer::new().make_writer())
                .with_error_channel(errors.clone())
                .build(),
        );
        let initial = settings(dir.path(), &[("requests", file_only("info"))]);
        registry.configure(&initial).unwrap();
        let before = registry.get("requests").unwrap();

        let (tx, rx) = watch::channel(Arc::new(initial));
        let handle = registry.follow(rx);

        tx.send_replace(Arc::new(settings(
            dir.path(),
            &[("requests", file_only("info")), ("jobs", file_only("shout"))],
        )));
        drop(tx);
        handle.await.unwrap();

        assert_eq!(registry.names(), vec!["requests"]);
        assert!(Arc::ptr_eq(&before, &registry.get("requests").unwrap()));

        let reported = errors.0.lock().unwrap();
        assert_eq!(reported.len(), 1);
        assert!(reported[0].starts_with("registry: "));
        assert!(reported[0].contains("'shout'"));
    }
}
