use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use flate2::{write::GzEncoder, Compression};

use crate::config::SinkTuning;

/// Size based rotation for `<dir>/<name>.log`.
///
/// Tailable rotation keeps the newest data in `<name>.log` and shifts older
/// generations through `<name>.1.log`, `<name>.2.log`, ... where `.1` is the
/// most recent. Otherwise rotated files are stamped with the rotation time,
/// `<name>.<yyyymmddThhmmssSSS>.log`, and pruned oldest first.
#[derive(Debug, Clone)]
pub struct RotationPolicy {
    dir: PathBuf,
    name: String,
    pub max_size: u64,
    pub max_files: usize,
    pub tailable: bool,
    pub compress: bool,
}

impl RotationPolicy {
    pub fn new(dir: impl Into<PathBuf>, name: impl Into<String>, tuning: &SinkTuning) -> Self {
        Self {
            dir: dir.into(),
            name: name.into(),
            max_size: tuning.max_size,
            max_files: tuning.max_files,
            tailable: tuning.tailable,
            compress: tuning.zipped_archive,
        }
    }

    pub fn current(&self) -> PathBuf {
        self.dir.join(format!("{}.log", self.name))
    }

    /// Whether writing `incoming` more bytes onto a file of `size` bytes
    /// should rotate first. A `max_size` of zero disables rotation.
    pub fn should_rotate(&self, size: u64, incoming: u64) -> bool {
        self.max_size > 0 && size > 0 && size + incoming > self.max_size
    }

    /// Moves the current file out of the way. The caller must have closed
    /// (or at least flushed) its handle and reopens the current path after.
    pub fn rotate(&self) -> io::Result<()> {
        let current = self.current();
        if !current.exists() {
            return Ok(());
        }

        if self.max_files == 0 {
            return fs::remove_file(&current);
        }

        let rotated = if self.tailable {
            self.shift_generations()?;
            self.generation(1)
        } else {
            self.stamped()?
        };

        fs::rename(&current, &rotated)?;
        tracing::debug!(target: "logwright", "rotated {:?} -> {:?}", current, rotated);

        if self.compress {
            compress(&rotated)?;
        }

        if !self.tailable {
            self.prune_stamped()?;
        }

        Ok(())
    }

    fn generation(&self, n: usize) -> PathBuf {
        self.dir.join(format!("{}.{}.log", self.name, n))
    }

    fn shift_generations(&self) -> io::Result<()> {
        for n in (1..=self.max_files).rev() {
            for from in [self.generation(n), gz_path(&self.generation(n))] {
                if !from.exists() {
                    continue;
                }

                if n == self.max_files {
                    fs::remove_file(&from)?;
                    continue;
                }

                let to = if from.extension().is_some_and(|e| e == "gz") {
                    gz_path(&self.generation(n + 1))
                } else {
                    self.generation(n + 1)
                };
                fs::rename(&from, &to)?;
            }
        }
        Ok(())
    }

    /// A fresh name for a stamped generation. Rotations within the same
    /// millisecond get `-n` suffixes above the highest one on disk, so a
    /// name freed by pruning is never handed out again.
    fn stamped(&self) -> io::Result<PathBuf> {
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%3f").to_string();
        let highest = self
            .stamped_keys()?
            .into_iter()
            .filter(|((base, _), _)| *base == stamp)
            .map(|((_, counter), _)| counter)
            .max();

        let name = match highest {
            None => format!("{}.{}.log", self.name, stamp),
            Some(counter) => format!("{}.{}-{}.log", self.name, stamp, counter + 1),
        };
        Ok(self.dir.join(name))
    }

    fn stamped_keys(&self) -> io::Result<Vec<((String, u32), PathBuf)>> {
        let prefix = format!("{}.", self.name);
        let mut files = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(rest) = file_name.strip_prefix(&prefix) else {
                continue;
            };
            let stamp = rest
                .strip_suffix(".log.gz")
                .or_else(|| rest.strip_suffix(".log"))
                .unwrap_or_default();

            if is_stamp(stamp) {
                let key = match stamp.split_once('-') {
                    Some((base, counter)) => (base.to_string(), counter.parse().unwrap_or(0)),
                    None => (stamp.to_string(), 0u32),
                };
                files.push((key, path));
            }
        }
        Ok(files)
    }

    /// Stamped generations, oldest first.
    pub fn stamped_generations(&self) -> io::Result<Vec<PathBuf>> {
        let mut files = self.stamped_keys()?;
        // same-millisecond rotations carry a `-n` suffix and sort after the base
        files.sort();
        Ok(files.into_iter().map(|(_, path)| path).collect())
    }

    fn prune_stamped(&self) -> io::Result<()> {
        let files = self.stamped_generations()?;
        if files.len() <= self.max_files {
            return Ok(());
        }

        for path in &files[..files.len() - self.max_files] {
            if let Err(e) = fs::remove_file(path) {
                tracing::warn!(target: "logwright", "failed removing old log file {:?}: {}", path, e);
            }
        }
        Ok(())
    }
}

fn is_stamp(value: &str) -> bool {
    value.len() >= 18
        && value.contains('T')
        && value
            .chars()
            .all(|c| c.is_ascii_digit() || c == 'T' || c == '-')
}

fn gz_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".gz");
    PathBuf::from(name)
}

/// Gzips `path` into `path.gz` and removes the original.
fn compress(path: &Path) -> io::Result<()> {
    let content = fs::read(path)?;
    let file = fs::File::create(gz_path(path))?;
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder.write_all(&content)?;
    encoder.finish()?;
    fs::remove_file(path)
}
