use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;

static LOG_FILE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^server-(\d{4}-\d{2}-\d{2})\.log$").unwrap());

/// Install the console subscriber and, when enabled, a daily-rotated
/// `logs/server-YYYY-MM-DD.log` file layer. The returned guard must be
/// kept alive for the lifetime of the process.
pub fn init(cfg: &Config) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if cfg.enable_file_log {
        std::fs::create_dir_all(&cfg.log_dir)
            .with_context(|| format!("create {}", cfg.log_dir.display()))?;
        let (writer, guard) = tracing_appender::non_blocking(DailyLogWriter::new(cfg.log_dir.clone()));
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .with(fmt::layer().with_ansi(false).with_writer(writer))
            .init();
        Ok(Some(guard))
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
        Ok(None)
    }
}

/// Delete rotated log files older than the retention window, at startup
/// and then once a day.
pub fn spawn_retention_sweep(dir: PathBuf, retention_days: u32) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(24 * 60 * 60));
        loop {
            tick.tick().await;
            match sweep_old_logs(&dir, retention_days) {
                Ok(0) => {}
                Ok(n) => info!(deleted = n, "log retention sweep"),
                Err(e) => warn!("log retention sweep failed: {e:#}"),
            }
        }
    });
}

fn sweep_old_logs(dir: &std::path::Path, retention_days: u32) -> Result<usize> {
    let today = Local::now().date_naive();
    let mut deleted = 0;
    for entry in std::fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(caps) = LOG_FILE_PATTERN.captures(name) else {
            continue;
        };
        let Ok(date) = NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d") else {
            continue;
        };
        let age = today.signed_duration_since(date).num_days();
        if age > retention_days as i64 {
            std::fs::remove_file(entry.path())
                .with_context(|| format!("remove {}", entry.path().display()))?;
            deleted += 1;
        }
    }
    Ok(deleted)
}

/// Appends to `server-YYYY-MM-DD.log`, reopening when the date flips.
/// Wrapped in `tracing_appender::non_blocking` so slow disks never stall
/// the audio path.
struct DailyLogWriter {
    dir: PathBuf,
    day: String,
    file: Option<File>,
}

impl DailyLogWriter {
    fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            day: String::new(),
            file: None,
        }
    }

    fn current_file(&mut self) -> std::io::Result<&mut File> {
        let today = Local::now().format("%Y-%m-%d").to_string();
        if self.file.is_none() || self.day != today {
            let path = self.dir.join(format!("server-{today}.log"));
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            self.day = today;
            self.file = Some(file);
        }
        Ok(self.file.as_mut().unwrap())
    }
}

impl Write for DailyLogWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.current_file()?.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self.file.as_mut() {
            Some(f) => f.flush(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daily_writer_names_file_after_date() {
        let tmp = tempfile::tempdir().unwrap();
        let mut writer = DailyLogWriter::new(tmp.path().to_path_buf());
        writer.write_all(b"hello\n").unwrap();
        writer.flush().unwrap();

        let expected = format!("server-{}.log", Local::now().format("%Y-%m-%d"));
        assert!(tmp.path().join(expected).exists());
    }

    #[test]
    fn sweep_deletes_only_expired_logs() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("server-2000-01-01.log"), "old").unwrap();
        let fresh = format!("server-{}.log", Local::now().format("%Y-%m-%d"));
        std::fs::write(tmp.path().join(&fresh), "new").unwrap();
        std::fs::write(tmp.path().join("unrelated.txt"), "keep").unwrap();

        let deleted = sweep_old_logs(tmp.path(), 7).unwrap();
        assert_eq!(deleted, 1);
        assert!(tmp.path().join(fresh).exists());
        assert!(tmp.path().join("unrelated.txt").exists());
    }
}
