//! Per-flow audit log and document snapshots under the logs directory.
//!
//! Layout:
//! - `<logs_dir>/<flow>.log`: append-only, one `[timestamp] message` entry per
//!   transition.
//! - `<logs_dir>/<flow>_<prefix>iter<n>.flow-meta.xml`: every document the run
//!   worked on.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Local, SecondsFormat};
use tracing::info;

use crate::core::types::SnapshotKind;

#[derive(Debug, Clone)]
pub struct AuditLog {
    dir: PathBuf,
    flow_name: String,
    log_path: PathBuf,
}

impl AuditLog {
    /// Open (creating the directory if needed) the log for `flow_name`.
    ///
    /// Existing entries are kept; new entries are appended after them.
    pub fn open(dir: &Path, flow_name: &str) -> Result<Self> {
        fs::create_dir_all(dir).with_context(|| format!("create logs dir {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            flow_name: flow_name.to_string(),
            log_path: log_path(dir, flow_name),
        })
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }

    /// Append one entry stamped with local time (RFC 3339, microseconds).
    /// Mirrored to tracing at info level.
    ///
    /// The line goes out in a single write so a concurrent `tail` never sees
    /// half of it.
    pub fn append(&self, message: &str) -> Result<()> {
        info!(flow = %self.flow_name, "{message}");
        let line = entry_line(message);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .with_context(|| format!("open {}", self.log_path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("append {}", self.log_path.display()))
    }

    /// Write a document snapshot and return its path.
    pub fn save_snapshot(&self, kind: SnapshotKind, iteration: u32, document: &str) -> Result<PathBuf> {
        let path = self.dir.join(format!(
            "{}_{}iter{}.flow-meta.xml",
            self.flow_name,
            kind.prefix(),
            iteration
        ));
        fs::write(&path, document).with_context(|| format!("write snapshot {}", path.display()))?;
        Ok(path)
    }
}

fn entry_line(message: &str) -> String {
    let timestamp = Local::now().to_rfc3339_opts(SecondsFormat::Micros, false);
    format!("[{timestamp}] {message}\n")
}

/// Path of the log file for `flow_name` under `dir`.
pub fn log_path(dir: &Path, flow_name: &str) -> PathBuf {
    dir.join(format!("{flow_name}.log"))
}

/// Read everything appended to `path` after byte `offset`.
///
/// Returns the new text and the offset to pass next time. A missing file reads
/// as empty; a file shorter than `offset` (truncated or replaced) is read from
/// the start.
pub fn read_from(path: &Path, offset: u64) -> Result<(String, u64)> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok((String::new(), 0)),
        Err(err) => return Err(err).with_context(|| format!("open {}", path.display())),
    };
    let len = file
        .metadata()
        .with_context(|| format!("stat {}", path.display()))?
        .len();
    let start = if len < offset { 0 } else { offset };
    file.seek(SeekFrom::Start(start))
        .with_context(|| format!("seek {}", path.display()))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .with_context(|| format!("read {}", path.display()))?;
    let next = start + bytes.len() as u64;
    Ok((String::from_utf8_lossy(&bytes).into_owned(), next))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_timestamped_entries() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = AuditLog::open(&temp.path().join("logs"), "My_Flow").expect("open");
        log.append("first").expect("append");
        log.append("second").expect("append");

        let contents = fs::read_to_string(log.path()).expect("read");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("] first"));
        assert!(lines[1].ends_with("] second"));
        assert!(log.path().ends_with("My_Flow.log"));
    }

    #[test]
    fn entries_carry_local_rfc3339_micros() {
        let line = entry_line("hello");
        assert!(line.ends_with("] hello\n"));
        assert_eq!(line.matches('\n').count(), 1);

        let stamp = &line[1..line.find(']').expect("closing bracket")];
        let parsed = chrono::DateTime::parse_from_rfc3339(stamp).expect("rfc3339");
        assert_eq!(parsed.offset(), Local::now().offset());
        let fraction = stamp
            .split('.')
            .nth(1)
            .expect("fractional seconds")
            .chars()
            .take_while(char::is_ascii_digit)
            .count();
        assert_eq!(fraction, 6);
    }

    #[test]
    fn reopening_keeps_previous_entries() {
        let temp = tempfile::tempdir().expect("tempdir");
        AuditLog::open(temp.path(), "F").expect("open").append("one").expect("append");
        AuditLog::open(temp.path(), "F").expect("open").append("two").expect("append");
        let contents = fs::read_to_string(log_path(temp.path(), "F")).expect("read");
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn snapshot_names_carry_kind_and_iteration() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = AuditLog::open(temp.path(), "My_Flow").expect("open");
        let path = log
            .save_snapshot(SnapshotKind::DeployFix, 2, "<Flow/>")
            .expect("snapshot");
        assert!(path.ends_with("My_Flow_deploy_fix_iter2.flow-meta.xml"));
        assert_eq!(fs::read_to_string(path).expect("read"), "<Flow/>");
    }

    #[test]
    fn read_from_returns_only_new_bytes() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log = AuditLog::open(temp.path(), "F").expect("open");
        log.append("one").expect("append");
        let (first, offset) = read_from(log.path(), 0).expect("read");
        assert!(first.contains("one"));

        log.append("two").expect("append");
        let (second, next) = read_from(log.path(), offset).expect("read");
        assert!(!second.contains("one"));
        assert!(second.contains("two"));
        assert!(next > offset);

        let (nothing, same) = read_from(log.path(), next).expect("read");
        assert!(nothing.is_empty());
        assert_eq!(same, next);
    }

    #[test]
    fn read_from_missing_file_is_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        let (text, offset) = read_from(&temp.path().join("nope.log"), 10).expect("read");
        assert!(text.is_empty());
        assert_eq!(offset, 0);
    }
}
