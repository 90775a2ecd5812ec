use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;
use log::{LevelFilter, Log, Metadata, Record};

pub const LOG_FILE_NAME: &str = "droidtap.log";
pub const BACKUP_COUNT: usize = 5;

/// Size-capped log file. When a write would push it past `max_bytes` the
/// file is renamed to `.1` (older backups shift up, the oldest is dropped).
pub struct RotatingFile {
    path: PathBuf,
    file: File,
    written: u64,
    max_bytes: u64,
    backups: usize,
}

impl RotatingFile {
    pub fn open(path: &Path, max_bytes: u64, backups: usize) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let written = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(Self { path: path.to_path_buf(), file, written, max_bytes, backups })
    }

    fn backup_path(&self, n: usize) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{}", n));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if self.backups > 0 {
            fs::remove_file(self.backup_path(self.backups)).ok();
            for n in (1..self.backups).rev() {
                let from = self.backup_path(n);
                if from.exists() {
                    fs::rename(&from, self.backup_path(n + 1))?;
                }
            }
            fs::rename(&self.path, self.backup_path(1))?;
        }
        self.file = OpenOptions::new().create(true).write(true).truncate(true).open(&self.path)?;
        self.written = 0;
        Ok(())
    }

    pub fn write_line(&mut self, line: &str) -> io::Result<()> {
        let len = line.len() as u64 + 1;
        if self.written > 0 && self.written + len > self.max_bytes {
            self.rotate()?;
        }
        writeln!(self.file, "{}", line)?;
        self.written += len;
        Ok(())
    }
}

struct Logger {
    console: LevelFilter,
    file: Option<Mutex<RotatingFile>>,
}

fn format_line(level: log::Level, msg: &std::fmt::Arguments) -> String {
    let ts = Local::now().format("%Y-%m-%d %H:%M:%S");
    format!("{} - {} - {}", ts, level, msg)
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= LevelFilter::Debug
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_line(record.level(), record.args());

        // Console honours --debug; the file always gets debug detail
        if record.level() <= self.console {
            println!("{}", line);
        }
        if let Some(file) = &self.file {
            let mut f = file.lock().unwrap_or_else(|e| e.into_inner());
            f.write_line(&line).ok();
        }
    }

    fn flush(&self) {
        io::stdout().flush().ok();
        if let Some(file) = &self.file {
            let mut f = file.lock().unwrap_or_else(|e| e.into_inner());
            f.file.flush().ok();
        }
    }
}

/// Install the global logger: console at INFO (DEBUG when `debug`), and
/// `<log_dir>/droidtap.log` at DEBUG rotated at `max_bytes`.
///
/// A log directory that cannot be created degrades to console only.
pub fn init(log_dir: &Path, debug: bool, max_bytes: u64) -> Result<(), log::SetLoggerError> {
    let file = fs::create_dir_all(log_dir)
        .and_then(|_| RotatingFile::open(&log_dir.join(LOG_FILE_NAME), max_bytes, BACKUP_COUNT));
    let (file, file_err) = match file {
        Ok(f) => (Some(Mutex::new(f)), None),
        Err(e) => (None, Some(e)),
    };

    let console = if debug { LevelFilter::Debug } else { LevelFilter::Info };
    log::set_boxed_logger(Box::new(Logger { console, file }))?;
    log::set_max_level(LevelFilter::Debug);

    if let Some(e) = file_err {
        log::warn!("file logging disabled, cannot open {}: {}", log_dir.display(), e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotates_and_caps_backups() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOG_FILE_NAME);
        let mut file = RotatingFile::open(&path, 32, 2).unwrap();
        for i in 0..10 {
            file.write_line(&format!("line number {:02} padded", i)).unwrap();
        }
        assert!(path.exists());
        assert!(dir.path().join("droidtap.log.1").exists());
        assert!(dir.path().join("droidtap.log.2").exists());
        assert!(!dir.path().join("droidtap.log.3").exists());

        let current = fs::read_to_string(&path).unwrap();
        assert_eq!(current, "line number 09 padded\n");
        let newest_backup = fs::read_to_string(dir.path().join("droidtap.log.1")).unwrap();
        assert_eq!(newest_backup, "line number 08 padded\n");
    }

    #[test]
    fn reopen_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOG_FILE_NAME);
        RotatingFile::open(&path, 1024, 1).unwrap().write_line("first").unwrap();
        RotatingFile::open(&path, 1024, 1).unwrap().write_line("second").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn line_format() {
        let line = format_line(log::Level::Warn, &format_args!("hello {}", 1));
        assert!(line.ends_with(" - WARN - hello 1"), "{line}");
    }
}
