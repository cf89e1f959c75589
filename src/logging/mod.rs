//! Log sink
//!
//! `env_logger` formats every record; the formatted lines are piped into a
//! [`LogSink`] that mirrors them to stdout and appends them to a size-rotated
//! file.

use crate::core::{Error, LogSettings, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Number of rotated files kept next to the active log
pub const BACKUP_COUNT: usize = 10;

/// Append-only log file that rotates once it would exceed `max_bytes`.
///
/// Rotated files are named `<file>.1` (newest) through `<file>.N`.
pub struct RotatingFile {
    path: PathBuf,
    max_bytes: u64,
    backups: usize,
    file: File,
    written: u64,
}

impl RotatingFile {
    pub fn open(path: &Path, max_bytes: u64, backups: usize) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            max_bytes,
            backups,
            file,
            written,
        })
    }

    fn backup_path(&self, index: usize) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(format!(".{}", index));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;

        if self.backups > 0 {
            for index in (1..self.backups).rev() {
                let from = self.backup_path(index);
                if from.exists() {
                    fs::rename(&from, self.backup_path(index + 1))?;
                }
            }
            fs::rename(&self.path, self.backup_path(1))?;
        }

        self.file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.max_bytes {
            self.rotate()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// Writes every line to the rotating file, if present, and mirrors it to stdout
pub struct LogSink {
    file: Option<RotatingFile>,
    mirror: Box<dyn Write + Send>,
}

impl LogSink {
    /// Build the sink for the resolved log settings, creating the directory
    pub fn from_settings(settings: &LogSettings) -> Result<Self> {
        if !settings.enabled {
            return Ok(Self {
                file: None,
                mirror: Box::new(io::stdout()),
            });
        }

        if !settings.directory.exists() {
            fs::create_dir_all(&settings.directory)?;
        }
        let file = RotatingFile::open(&settings.file_path(), settings.max_bytes(), BACKUP_COUNT)?;
        Ok(Self {
            file: Some(file),
            mirror: Box::new(io::stdout()),
        })
    }

    /// Mirror to `writer` instead of stdout
    pub fn with_mirror(mut self, writer: impl Write + Send + 'static) -> Self {
        self.mirror = Box::new(writer);
        self
    }
}

impl Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(file) = self.file.as_mut() {
            file.write_all(buf)?;
        }
        // stdout can be closed under a supervisor; the file still gets the line
        let _ = self.mirror.write_all(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        let _ = self.mirror.flush();
        Ok(())
    }
}

/// Install the global logger.
///
/// Default filter is `info`, overridable through `RUST_LOG`.
pub fn init(settings: &LogSettings) -> Result<()> {
    let sink = LogSink::from_settings(settings)?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {:<5} {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(sink)))
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))?;

    if settings.enabled {
        log::info!("Logging to {}", settings.file_path().display());
    } else {
        log::info!("File logging disabled");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotates_at_max_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.log");
        let mut file = RotatingFile::open(&path, 20, 2).unwrap();

        file.write_all(b"0123456789\n").unwrap();
        file.write_all(b"abcdefghij\n").unwrap();
        file.write_all(b"ABCDEFGHIJ\n").unwrap();
        file.write_all(b"klmnopqrst\n").unwrap();
        file.flush().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "klmnopqrst\n");
        assert_eq!(fs::read_to_string(dir.path().join("monitor.log.1")).unwrap(), "ABCDEFGHIJ\n");
        assert_eq!(fs::read_to_string(dir.path().join("monitor.log.2")).unwrap(), "abcdefghij\n");
        assert!(!dir.path().join("monitor.log.3").exists());
    }

    #[test]
    fn test_appends_to_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.log");
        fs::write(&path, "old\n").unwrap();

        let mut file = RotatingFile::open(&path, 1024, 2).unwrap();
        file.write_all(b"new\n").unwrap();
        file.flush().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "old\nnew\n");
    }

    #[test]
    fn test_sink_creates_log_directory() {
        let dir = tempfile::tempdir().unwrap();
        let settings = LogSettings {
            enabled: true,
            max_size_kb: 1,
            directory: dir.path().join("nested/logs"),
        };

        let mut sink = LogSink::from_settings(&settings).unwrap();
        sink.write_all(b"2024-01-15 12:00:00 INFO  Value: 600\n").unwrap();
        sink.flush().unwrap();

        let contents = fs::read_to_string(settings.file_path()).unwrap();
        assert!(contents.contains("Value: 600"));
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }
    }

    #[test]
    fn test_closed_stdout_does_not_lose_file_lines() {
        let dir = tempfile::tempdir().unwrap();
        let settings = LogSettings {
            enabled: true,
            max_size_kb: 1,
            directory: dir.path().to_path_buf(),
        };

        let mut sink = LogSink::from_settings(&settings).unwrap().with_mirror(ClosedPipe);
        sink.write_all(b"2024-01-15 12:00:00 INFO  Moisture loss detected! (#1)\n").unwrap();
        sink.write_all(b"2024-01-15 12:00:00 INFO  Value: 600\n").unwrap();
        sink.flush().unwrap();

        let contents = fs::read_to_string(settings.file_path()).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.ends_with("Value: 600\n"));
    }

    #[test]
    fn test_disabled_sink_writes_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = LogSettings {
            enabled: false,
            max_size_kb: 1,
            directory: dir.path().join("logs"),
        };

        LogSink::from_settings(&settings).unwrap();
        assert!(!settings.directory.exists());
    }
}
