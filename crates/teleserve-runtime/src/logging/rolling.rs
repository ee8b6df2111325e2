//! Log file rotation and retention.
//!
//! Time-based rotation is delegated to `tracing_appender::rolling`. Size-based
//! rotation is done by [`SizeRollingWriter`], which renames the active file to
//! `{stem}.{timestamp}.log` once it would grow past the limit.
//!
//! Either way, rotated files older than the retention are removed by
//! [`prune_logs`].

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Utc;

/// When the log file rolls over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    /// Once the file reaches this many bytes.
    Size(u64),
    Hourly,
    Daily,
    Never,
}

impl Rotation {
    /// Parses `10 MB`, `500 KiB`, `hourly`, `daily` or `never`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "hourly" => Some(Self::Hourly),
            "daily" => Some(Self::Daily),
            "never" => Some(Self::Never),
            other => parse_size(other).map(Self::Size),
        }
    }
}

/// Splits `"7 days"` / `"7days"` into `(7.0, "days")`.
fn split_quantity(value: &str) -> Option<(f64, String)> {
    let value = value.trim();
    let unit_start = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(unit_start);
    let number: f64 = number.parse().ok()?;
    if !number.is_finite() || number <= 0.0 {
        return None;
    }
    Some((number, unit.trim().to_lowercase()))
}

/// Parses a byte size such as `10 MB`. Decimal units are powers of 1000,
/// `KiB`-style units powers of 1024.
pub fn parse_size(value: &str) -> Option<u64> {
    let (number, unit) = split_quantity(value)?;
    let multiplier: u64 = match unit.as_str() {
        "b" | "" => 1,
        "kb" => 1_000,
        "mb" => 1_000_000,
        "gb" => 1_000_000_000,
        "kib" => 1 << 10,
        "mib" => 1 << 20,
        "gib" => 1 << 30,
        _ => return None,
    };
    let bytes = (number * multiplier as f64) as u64;
    (bytes > 0).then_some(bytes)
}

/// Parses an age such as `7 days`, `12 hours` or `2 weeks`.
pub fn parse_retention(value: &str) -> Option<Duration> {
    let (number, unit) = split_quantity(value)?;
    let seconds: f64 = match unit.as_str() {
        "s" | "sec" | "secs" | "second" | "seconds" => 1.0,
        "m" | "min" | "mins" | "minute" | "minutes" => 60.0,
        "h" | "hour" | "hours" => 3_600.0,
        "d" | "day" | "days" => 86_400.0,
        "w" | "week" | "weeks" => 604_800.0,
        "month" | "months" => 2_592_000.0,
        "y" | "year" | "years" => 31_536_000.0,
        _ => return None,
    };
    Duration::try_from_secs_f64(number * seconds).ok()
}

/// Whether `name` is a rotated sibling of `{stem}.log`.
fn is_rotated(name: &str, stem: &str) -> bool {
    name.starts_with(&format!("{stem}.")) && name.ends_with(".log") && name != format!("{stem}.log")
}

/// Removes rotated `{stem}.*.log` files in `dir` last modified longer than
/// `retention` ago. Returns how many were removed.
pub fn prune_logs(dir: &Path, stem: &str, retention: Duration) -> io::Result<usize> {
    let Some(cutoff) = SystemTime::now().checked_sub(retention) else {
        return Ok(0);
    };

    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !is_rotated(name, stem) {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        if modified < cutoff {
            fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

// =============================================================================
// SizeRollingWriter
// =============================================================================

/// Appends to `{dir}/{stem}.log`, rolling over by size.
#[derive(Debug)]
pub struct SizeRollingWriter {
    dir: PathBuf,
    stem: String,
    max_bytes: u64,
    retention: Duration,
    file: File,
    written: u64,
}

impl SizeRollingWriter {
    /// Opens (or creates) the active file, creating `dir` if needed.
    pub fn new(
        dir: impl Into<PathBuf>,
        stem: impl Into<String>,
        max_bytes: u64,
        retention: Duration,
    ) -> io::Result<Self> {
        let dir = dir.into();
        let stem = stem.into();
        fs::create_dir_all(&dir)?;
        let file = Self::open(&dir, &stem)?;
        let written = file.metadata()?.len();
        Ok(Self {
            dir,
            stem,
            max_bytes,
            retention,
            file,
            written,
        })
    }

    fn open(dir: &Path, stem: &str) -> io::Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(format!("{stem}.log")))
    }

    pub fn active_path(&self) -> PathBuf {
        self.dir.join(format!("{}.log", self.stem))
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;

        let stamp = Utc::now().format("%Y-%m-%d_%H-%M-%S%.3f");
        let mut target = self.dir.join(format!("{}.{stamp}.log", self.stem));
        let mut n = 1;
        while target.exists() {
            target = self.dir.join(format!("{}.{stamp}.{n}.log", self.stem));
            n += 1;
        }
        fs::rename(self.active_path(), &target)?;

        self.file = Self::open(&self.dir, &self.stem)?;
        self.written = 0;
        prune_logs(&self.dir, &self.stem, self.retention)?;
        Ok(())
    }
}

impl Write for SizeRollingWriter {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rotation() {
        assert_eq!(Rotation::parse("10 MB"), Some(Rotation::Size(10_000_000)));
        assert_eq!(Rotation::parse("1KiB"), Some(Rotation::Size(1024)));
        assert_eq!(Rotation::parse("0.5 GB"), Some(Rotation::Size(500_000_000)));
        assert_eq!(Rotation::parse("Daily"), Some(Rotation::Daily));
        assert_eq!(Rotation::parse("never"), Some(Rotation::Never));
        assert_eq!(Rotation::parse("10 parsecs"), None);
        assert_eq!(Rotation::parse("0 MB"), None);
        assert_eq!(Rotation::parse(""), None);
    }

    #[test]
    fn test_parse_retention() {
        assert_eq!(parse_retention("7 days"), Some(Duration::from_secs(7 * 86_400)));
        assert_eq!(parse_retention("1 day"), Some(Duration::from_secs(86_400)));
        assert_eq!(parse_retention("12h"), Some(Duration::from_secs(12 * 3_600)));
        assert_eq!(parse_retention("2 weeks"), Some(Duration::from_secs(14 * 86_400)));
        assert_eq!(parse_retention("forever"), None);
        assert_eq!(parse_retention("-1 days"), None);
    }

    #[test]
    fn test_size_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer =
            SizeRollingWriter::new(dir.path(), "app", 16, Duration::from_secs(3_600)).unwrap();

        writer.write_all(b"0123456789\n").unwrap();
        writer.write_all(b"0123456789\n").unwrap();
        writer.write_all(b"0123456789\n").unwrap();
        writer.flush().unwrap();

        let rotated: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| is_rotated(e.file_name().to_str().unwrap(), "app"))
            .collect();
        assert_eq!(rotated.len(), 2);
        assert_eq!(fs::read(writer.active_path()).unwrap(), b"0123456789\n");
    }

    #[test]
    fn test_reopen_keeps_size() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut writer =
                SizeRollingWriter::new(dir.path(), "app", 1_000, Duration::from_secs(60)).unwrap();
            writer.write_all(b"hello\n").unwrap();
        }
        let writer =
            SizeRollingWriter::new(dir.path(), "app", 1_000, Duration::from_secs(60)).unwrap();
        assert_eq!(writer.written, 6);
    }

    #[test]
    fn test_prune_removes_only_old_rotated_files() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("app.2020-01-01.log");
        let fresh = dir.path().join("app.2099-01-01.log");
        let active = dir.path().join("app.log");
        let other = dir.path().join("other.log");
        for path in [&old, &fresh, &active, &other] {
            fs::write(path, b"x").unwrap();
        }
        let ten_days_ago = SystemTime::now() - Duration::from_secs(10 * 86_400);
        for path in [&old, &active, &other] {
            File::options()
                .write(true)
                .open(path)
                .unwrap()
                .set_modified(ten_days_ago)
                .unwrap();
        }

        let removed = prune_logs(dir.path(), "app", Duration::from_secs(7 * 86_400)).unwrap();
        assert_eq!(removed, 1);
        assert!(!old.exists());
        assert!(fresh.exists());
        assert!(active.exists());
        assert!(other.exists());
    }
}
