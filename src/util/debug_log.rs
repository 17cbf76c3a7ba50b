use chrono::{SecondsFormat, Utc};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Append-only diagnostic log for model-call troubleshooting.
///
/// Every record is prefixed with an ISO-8601 UTC timestamp. Writing must
/// never fail the caller: errors are reported through tracing and dropped.
#[derive(Debug, Clone)]
pub struct DebugLog {
    path: PathBuf,
}

impl DebugLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, entry: &str) {
        if let Err(e) = self.try_append(entry) {
            warn!("failed to write debug log {}: {}", self.path.display(), e);
        }
    }

    fn try_append(&self, entry: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        writeln!(file, "[{}] {}", stamp, entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_timestamped_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = DebugLog::new(dir.path().join("model_debug.log"));

        log.append("FIRST entry");
        log.append("SECOND entry");

        let content = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("FIRST entry"));
        assert!(lines[1].ends_with("SECOND entry"));
    }

    #[test]
    fn write_failure_is_swallowed() {
        // A directory path cannot be opened for append; the call must not panic.
        let dir = tempfile::tempdir().unwrap();
        let log = DebugLog::new(dir.path());
        log.append("goes nowhere");
    }
}
