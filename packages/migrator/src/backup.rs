//! Discovery of legacy database dump files.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use tracing::debug;

fn timestamp_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // Matches filename-embedded timestamps like 2025-08-25T23-00-00.
        Regex::new(r"\d{4}-\d{2}-\d{2}T\d{2}-\d{2}-\d{2}").unwrap()
    })
}

/// Find the most recent `.dump` file in a backup directory.
///
/// Filename-embedded timestamps are authoritative: the newest one wins, and
/// files without a timestamp rank below every timestamped file, ordered
/// among themselves by modification time. A stale dump that was recently
/// copied around therefore cannot shadow a newer timestamped one.
pub fn find_latest_backup(backup_dir: &Path) -> Result<PathBuf> {
    let entries = fs::read_dir(backup_dir)
        .with_context(|| format!("cannot read backup directory {}", backup_dir.display()))?;

    let dumps: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file() && path.extension().is_some_and(|ext| ext == "dump")
        })
        .collect();

    if dumps.is_empty() {
        bail!("no .dump files found in {}", backup_dir.display());
    }

    let latest = dumps
        .into_iter()
        .max_by_key(|path| sort_key(path))
        .context("no readable .dump files")?;
    debug!(path = %latest.display(), "selected latest backup");
    Ok(latest)
}

/// One total-order key per file: `(true, embedded timestamp)` when the
/// filename carries one, `(false, mtime)` otherwise.
fn sort_key(path: &Path) -> (bool, DateTime<Utc>) {
    if let Some(ts) = embedded_timestamp(path) {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&ts, "%Y-%m-%dT%H-%M-%S") {
            return (true, Utc.from_utc_datetime(&naive));
        }
    }
    let mtime = fs::metadata(path)
        .and_then(|m| m.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    (false, mtime)
}

fn embedded_timestamp(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    timestamp_pattern().find(name).map(|m| m.as_str().to_string())
}

/// Guess the Postgres major version from a dump filename like
/// `prod-pg15-2025-08-25T23-00-00.dump`. Defaults to 16.
pub fn detect_pg_version(filename: &str) -> String {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(r"pg(\d+)").unwrap());
    pattern
        .captures(filename)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| "16".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    fn prefers_the_newest_embedded_timestamp() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in [
            "prod-2025-08-01T10-00-00.dump",
            "prod-2025-08-25T23-00-00.dump",
            "prod-2025-07-15T08-30-00.dump",
        ] {
            File::create(dir.path().join(name)).expect("create");
        }

        let latest = find_latest_backup(dir.path()).expect("find");
        assert_eq!(
            latest.file_name().and_then(|n| n.to_str()),
            Some("prod-2025-08-25T23-00-00.dump")
        );
    }

    #[test]
    fn ignores_non_dump_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        File::create(dir.path().join("notes.txt")).expect("create");
        File::create(dir.path().join("backup-2025-08-01T10-00-00.dump")).expect("create");

        let latest = find_latest_backup(dir.path()).expect("find");
        assert!(latest.to_string_lossy().ends_with(".dump"));
    }

    #[test]
    fn errors_when_no_dumps_exist() {
        let dir = tempfile::tempdir().expect("tempdir");
        File::create(dir.path().join("readme.md")).expect("create");
        assert!(find_latest_backup(dir.path()).is_err());
    }

    #[test]
    fn filename_timestamp_beats_newer_mtime_in_mixed_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        // Created first, so it has the oldest mtime despite the newest
        // embedded timestamp.
        File::create(dir.path().join("c-2025-08-25T00-00-00.dump")).expect("create");
        std::thread::sleep(std::time::Duration::from_millis(20));
        File::create(dir.path().join("b.dump")).expect("create");
        std::thread::sleep(std::time::Duration::from_millis(20));
        File::create(dir.path().join("a-2025-01-01T00-00-00.dump")).expect("create");

        let latest = find_latest_backup(dir.path()).expect("find");
        assert_eq!(
            latest.file_name().and_then(|n| n.to_str()),
            Some("c-2025-08-25T00-00-00.dump")
        );
    }

    #[test]
    fn falls_back_to_mtime_without_timestamps() {
        let dir = tempfile::tempdir().expect("tempdir");
        File::create(dir.path().join("old.dump")).expect("create");
        // Rewriting the second file gives it the later mtime.
        std::thread::sleep(std::time::Duration::from_millis(20));
        File::create(dir.path().join("new.dump")).expect("create");

        let latest = find_latest_backup(dir.path()).expect("find");
        assert_eq!(latest.file_name().and_then(|n| n.to_str()), Some("new.dump"));
    }

    #[test]
    fn detects_pg_version_from_filename() {
        assert_eq!(detect_pg_version("prod-pg15-2025.dump"), "15");
        assert_eq!(detect_pg_version("backup.dump"), "16");
    }
}
