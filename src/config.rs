use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
};

use serde::{
    de::{self, MapAccess, Visitor},
    Deserialize, Deserializer, Serialize,
};

use crate::error::ConfigError;

pub const LOG_DIR_ENV: &str = "LOGWRIGHT_LOG_DIR";
pub const CONFIG_ENV: &str = "LOGWRIGHT_CONFIG";
const DEFAULT_LOG_DIR: &str = "logs";

/// Top level settings document as handed out by a configuration provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub enabled: Option<bool>,
    pub paths: Paths,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    pub logs: Option<String>,
}

/// The `logging` section, the unit `Registry::configure` consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub enabled: bool,
    pub loggers: BTreeMap<String, LoggerSpec>,
    pub colors: BTreeMap<String, String>,
    pub levels: BTreeMap<String, u32>,
}

/// Either a bare level name or a full logger record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LoggerSpec {
    Level(String),
    Full(LoggerRecord),
}

// Hand written so a malformed record reports the offending field instead of
// "did not match any variant".
impl<'de> Deserialize<'de> for LoggerSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SpecVisitor;

        impl<'de> Visitor<'de> for SpecVisitor {
            type Value = LoggerSpec;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a level name or a logger record with a `level`")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
                Ok(LoggerSpec::Level(value.to_string()))
            }

            fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Self::Value, A::Error> {
                LoggerRecord::deserialize(de::value::MapAccessDeserializer::new(map))
                    .map(LoggerSpec::Full)
            }
        }

        deserializer.deserialize_any(SpecVisitor)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggerRecord {
    pub level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transports: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_files: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tailable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zipped_archive: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colorize: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_readable_unhandled_exception: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Console,
    File,
}

impl Transport {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "console" => Some(Self::Console),
            "file" => Some(Self::File),
            _ => None,
        }
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Console => write!(f, "console"),
            Transport::File => write!(f, "file"),
        }
    }
}

/// Sink tuning knobs, filled from the defaults when a record leaves them out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkTuning {
    pub json: bool,
    pub max_files: usize,
    pub max_size: u64,
    pub tailable: bool,
    pub zipped_archive: bool,
    pub colorize: bool,
    pub timestamp: bool,
    pub human_readable_unhandled_exception: bool,
}

impl Default for SinkTuning {
    fn default() -> Self {
        Self {
            json: false,
            max_files: 10,
            max_size: 10 * 1024 * 1024,
            tailable: true,
            zipped_archive: true,
            colorize: true,
            timestamp: true,
            human_readable_unhandled_exception: true,
        }
    }
}

/// A logger spec after shorthand expansion and default merging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSpec {
    pub name: String,
    pub level: String,
    pub transports: Vec<Transport>,
    pub tuning: SinkTuning,
}

impl LoggerSpec {
    pub fn resolve(&self, name: &str) -> Result<ResolvedSpec, ConfigError> {
        let defaults = SinkTuning::default();
        let record = match self {
            LoggerSpec::Level(level) => {
                return Ok(ResolvedSpec {
                    name: name.to_string(),
                    level: level.clone(),
                    transports: vec![Transport::Console, Transport::File],
                    tuning: defaults,
                })
            }
            LoggerSpec::Full(record) => record,
        };

        let transports = match &record.transports {
            None => vec![Transport::Console, Transport::File],
            Some(names) => {
                let mut transports = Vec::with_capacity(names.len());
                for transport in names {
                    let parsed =
                        Transport::parse(transport).ok_or_else(|| ConfigError::UnknownTransport {
                            logger: name.to_string(),
                            transport: transport.clone(),
                        })?;
                    // ordered set: the first mention wins
                    if !transports.contains(&parsed) {
                        transports.push(parsed);
                    }
                }
                transports
            }
        };

        Ok(ResolvedSpec {
            name: name.to_string(),
            level: record.level.clone(),
            transports,
            tuning: SinkTuning {
                json: record.json.unwrap_or(defaults.json),
                max_files: record.max_files.unwrap_or(defaults.max_files),
                max_size: record.max_size.unwrap_or(defaults.max_size),
                tailable: record.tailable.unwrap_or(defaults.tailable),
                zipped_archive: record.zipped_archive.unwrap_or(defaults.zipped_archive),
                colorize: record.colorize.unwrap_or(defaults.colorize),
                timestamp: record.timestamp.unwrap_or(defaults.timestamp),
                human_readable_unhandled_exception: record
                    .human_readable_unhandled_exception
                    .unwrap_or(defaults.human_readable_unhandled_exception),
            },
        })
    }
}

impl LoggingConfig {
    /// Expands every logger spec and checks its level against the level table.
    pub fn resolve(&self) -> Result<Vec<ResolvedSpec>, ConfigError> {
        self.loggers
            .iter()
            .map(|(name, spec)| {
                let resolved = spec.resolve(name)?;
                if !self.levels.contains_key(&resolved.level) {
                    return Err(ConfigError::UnknownLevel {
                        logger: name.clone(),
                        level: resolved.level,
                    });
                }
                Ok(resolved)
            })
            .collect()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let levels = [
            ("error", 0),
            ("err", 0),
            ("warn", 1),
            ("info", 2),
            ("verbose", 3),
            ("debug", 4),
            ("silly", 5),
        ];
        let colors = [
            ("error", "red"),
            ("err", "red"),
            ("warn", "yellow"),
            ("info", "green"),
            ("verbose", "cyan"),
            ("debug", "blue"),
            ("silly", "magenta"),
        ];

        Self {
            enabled: true,
            loggers: BTreeMap::from([(
                "requests".to_string(),
                LoggerSpec::Level("info".to_string()),
            )]),
            colors: colors
                .into_iter()
                .map(|(level, color)| (level.to_string(), color.to_string()))
                .collect(),
            levels: levels
                .into_iter()
                .map(|(level, priority)| (level.to_string(), priority))
                .collect(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: None,
            paths: Paths::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Settings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &contents)
    }

    pub fn parse(path: &Path, contents: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::Invalid {
            path: path.to_path_buf(),
            reason,
        };

        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(contents).map_err(|e| invalid(e.to_string())),
            _ => toml::from_str(contents).map_err(|e| invalid(e.to_string())),
        }
    }

    /// The logging section with the top level master switch folded in.
    pub fn logging_config(&self) -> LoggingConfig {
        let mut logging = self.logging.clone();
        logging.enabled = logging.enabled && self.enabled.unwrap_or(true);
        logging
    }

    /// Resolves the logs directory against `root` when it is relative.
    pub fn logs_dir(&self, root: &Path) -> PathBuf {
        let dir = self
            .paths
            .logs
            .clone()
            .or_else(|| std::env::var(LOG_DIR_ENV).ok())
            .unwrap_or_else(|| DEFAULT_LOG_DIR.to_string());
        let dir = PathBuf::from(dir);

        if dir.is_absolute() {
            dir
        } else {
            root.join(dir)
        }
    }
}

pub trait ConfigManager: Sized + Clone + Send + Sync {
    fn get_config_path(&self) -> eyre::Result<PathBuf>;
}

#[derive(Default, Clone, Debug)]
pub struct LocalConfigManager {
    explicit: Option<PathBuf>,
}

impl LocalConfigManager {
    pub fn new(explicit: Option<PathBuf>) -> Self {
        Self { explicit }
    }
}

// NOTE: falls back to $HOME when XDG_CONFIG_HOME is unset, same as most CLIs on unix.
pub fn config_dir() -> eyre::Result<PathBuf> {
    if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
        return Ok(PathBuf::from(dir).join("logwright"));
    }

    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| eyre::eyre!("Neither $XDG_CONFIG_HOME nor $HOME is set"))?;
    Ok(PathBuf::from(home).join(".config").join("logwright"))
}

impl ConfigManager for LocalConfigManager {
    fn get_config_path(&self) -> eyre::Result<PathBuf> {
        if let Some(path) = &self.explicit {
            return Ok(path.clone());
        }

        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Ok(PathBuf::from(path));
        }

        Ok(config_dir()?.join("config.toml"))
    }
}
