use std::{
    fs::File,
    io::{self, LineWriter, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use eyre::Context;

use super::{
    colors::ColorTable,
    formatters::{ConsoleFormatter, JsonFormatter, PlainFormatter},
    rotation::RotationPolicy,
    Entry, LogFormatter, LogSink, MakeWriter,
};
use crate::{
    config::{ResolvedSpec, Transport},
    error::ConfigError,
};

/// Builds the sinks of one logger. Every call hands out a fresh sink, sinks
/// are never shared between loggers.
pub struct SinkFactory {
    logs_dir: PathBuf,
    console: MakeWriter,
    colors: Arc<ColorTable>,
}

impl SinkFactory {
    pub fn new(logs_dir: impl Into<PathBuf>, console: MakeWriter, colors: Arc<ColorTable>) -> Self {
        Self {
            logs_dir: logs_dir.into(),
            console,
            colors,
        }
    }

    pub fn build(
        &self,
        transport: Transport,
        spec: &ResolvedSpec,
    ) -> Result<Box<dyn LogSink>, ConfigError> {
        match transport {
            Transport::Console => {
                let formatter =
                    ConsoleFormatter::new(&spec.name, &spec.tuning, self.colors.clone());
                Ok(Box::new(ConsoleSink::new(
                    self.console.clone(),
                    Box::new(formatter),
                )))
            }
            Transport::File => {
                let formatter: Box<dyn LogFormatter> = if spec.tuning.json {
                    Box::new(JsonFormatter::new(&spec.tuning))
                } else {
                    Box::new(PlainFormatter::new(&spec.tuning))
                };
                let policy = RotationPolicy::new(&self.logs_dir, &spec.name, &spec.tuning);
                let sink = FileSink::new(policy, formatter).map_err(|source| ConfigError::Sink {
                    logger: spec.name.clone(),
                    transport,
                    source,
                })?;
                Ok(Box::new(sink))
            }
        }
    }
}

struct OpenFile {
    writer: LineWriter<File>,
    size: u64,
}

fn open_append(path: &Path) -> io::Result<OpenFile> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    let size = file.metadata()?.len();

    Ok(OpenFile {
        writer: LineWriter::new(file),
        size,
    })
}

pub struct FileSink {
    file: Mutex<OpenFile>,
    file_path: PathBuf,
    formatter: Box<dyn LogFormatter>,
    policy: RotationPolicy,
}

impl FileSink {
    pub fn new(policy: RotationPolicy, formatter: Box<dyn LogFormatter>) -> io::Result<Self> {
        let file_path = policy.current();
        let file = open_append(&file_path)?;

        Ok(Self {
            file: Mutex::new(file),
            file_path,
            formatter,
            policy,
        })
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    fn rotate(&self, file: &mut OpenFile) -> eyre::Result<()> {
        file.writer.flush().context("Can't flush file before rotating")?;
        self.policy
            .rotate()
            .with_context(|| format!("Failed rotating log file {:?}", self.file_path))?;
        *file = open_append(&self.file_path)
            .with_context(|| format!("Failed reopening log file {:?}", self.file_path))?;
        Ok(())
    }
}

impl LogSink for FileSink {
    fn write_log(&self, entry: &Entry<'_>) -> eyre::Result<()> {
        let mut line = self.formatter.format(entry);
        line.push('\n');

        let mut file = self.file.lock().map_err(|e| eyre::eyre!(e.to_string()))?;
        if self.policy.should_rotate(file.size, line.len() as u64) {
            self.rotate(&mut file)?;
        }

        file.writer.write_all(line.as_bytes())?;
        file.writer.flush().context("Can't flush file")?;
        file.size += line.len() as u64;
        Ok(())
    }

    fn flush(&self) -> eyre::Result<()> {
        let mut file = self.file.lock().map_err(|e| eyre::eyre!(e.to_string()))?;
        file.writer.flush().context("Can't flush file")
    }
}

pub struct ConsoleSink {
    make_writer: MakeWriter,
    formatter: Box<dyn LogFormatter>,
}

impl ConsoleSink {
    pub fn new(make_writer: MakeWriter, formatter: Box<dyn LogFormatter>) -> Self {
        Self {
            make_writer,
            formatter,
        }
    }
}

impl LogSink for ConsoleSink {
    fn write_log(&self, entry: &Entry<'_>) -> eyre::Result<()> {
        let mut line = self.formatter.format(entry);
        line.push('\n');

        let mut writer = (self.make_writer)();
        writer.write_all(line.as_bytes())?;
        writer.flush().context("Can't flush console")
    }

    fn flush(&self) -> eyre::Result<()> {
        (self.make_writer)().flush().context("Can't flush console")
    }
}

/// Console target writing to the process' standard output.
pub fn stdout() -> MakeWriter {
    Arc::new(|| Box::new(io::stdout()))
}

/// In-memory console target, handy for tests and for capturing output.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn make_writer(&self) -> MakeWriter {
        let buffer = self.clone();
        Arc::new(move || Box::new(buffer.clone()))
    }

    pub fn contents(&self) -> String {
        match self.0.lock() {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(poisoned) => String::from_utf8_lossy(&poisoned.into_inner()).into_owned(),
        }
    }

    pub fn clear(&self) {
        if let Ok(mut bytes) = self.0.lock() {
            bytes.clear();
        }
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut bytes = self
            .0
            .lock()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;

    use super::*;
    use crate::config::{LoggerRecord, LoggerSpec};

    fn entry<'a>(message: &'a str) -> Entry<'a> {
        Entry {
            logger: "requests",
            level: "info",
            message,
            causes: &[],
            time: Utc::now(),
        }
    }

    fn spec(record: LoggerRecord) -> ResolvedSpec {
        LoggerSpec::Full(record).resolve("requests").unwrap()
    }

    #[test]
    fn file_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let factory = SinkFactory::new(dir.path(), stdout(), Arc::default());
        let spec = spec(LoggerRecord {
            level: "info".into(),
            transports: Some(vec!["file".into()]),
            ..Default::default()
        });

        let sink = factory.build(Transport::File, &spec).unwrap();
        sink.write_log(&entry("first")).unwrap();
        sink.write_log(&entry("test")).unwrap();

        let contents = std::fs::read_to_string(dir.path().join("requests.log")).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" - info: first"));
        assert!(lines[1].ends_with("test"));
    }

    #[test]
    fn file_sink_rotates_on_size() {
        let dir = tempfile::tempdir().unwrap();
        let formatter = PlainFormatter::new(&crate::config::SinkTuning {
            timestamp: false,
            ..Default::default()
        });
        let tuning = crate::config::SinkTuning {
            max_size: 20,
            max_files: 2,
            zipped_archive: false,
            ..Default::default()
        };
        let policy = RotationPolicy::new(dir.path(), "requests", &tuning);
        let sink = FileSink::new(policy, Box::new(formatter)).unwrap();

        // "info: 0123456789\n" is 17 bytes, every second line rotates
        for _ in 0..3 {
            sink.write_log(&entry("0123456789")).unwrap();
        }

        assert!(sink.path().exists());
        assert!(dir.path().join("requests.1.log").exists());
        assert!(dir.path().join("requests.2.log").exists());
        assert_eq!(
            std::fs::read_to_string(sink.path()).unwrap(),
            "info: 0123456789\n"
        );
    }

    #[test]
    fn console_sink_writes_to_target() {
        let buffer = SharedBuffer::new();
        let colors = Arc::new(ColorTable::build(&BTreeMap::new()));
        let factory = SinkFactory::new("unused", buffer.make_writer(), colors);
        let spec = spec(LoggerRecord {
            level: "info".into(),
            transports: Some(vec!["console".into()]),
            ..Default::default()
        });

        let sink = factory.build(Transport::Console, &spec).unwrap();
        sink.write_log(&entry("hello")).unwrap();

        assert!(buffer.contents().ends_with(" [info] [REQU] hello\n"));
    }

    #[test]
    fn missing_directory_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let factory = SinkFactory::new(dir.path().join("nope"), stdout(), Arc::default());
        let spec = spec(LoggerRecord {
            level: "info".into(),
            ..Default::default()
        });

        assert!(matches!(
            factory.build(Transport::File, &spec),
            Err(ConfigError::Sink { .. })
        ));
    }
}
