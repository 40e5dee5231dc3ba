use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::json;

/// Transcript logger for session I/O and lifecycle events.
///
/// Writes one JSON object per line to `session-<id>.log` in the log
/// directory, plus a small metadata file describing the shell process.
pub struct SessionLogger {
    session_id: String,
    log_file: File,
    meta_path: PathBuf,
}

impl SessionLogger {
    pub fn new(session_id: &str, log_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(log_dir).context("Failed to create log directory")?;

        let log_path = log_dir.join(format!("session-{}.log", session_id));
        let log_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .context("Failed to create log file")?;

        Ok(Self {
            session_id: session_id.to_string(),
            log_file,
            meta_path: log_dir.join(format!("session-{}-meta.json", session_id)),
        })
    }

    /// Log input written to the shell.
    pub fn log_input(&mut self, data: &str) -> Result<()> {
        self.log_entry(json!({ "direction": "in", "data": data }))
    }

    /// Log output received from the shell.
    pub fn log_output(&mut self, source: &str, data: &str) -> Result<()> {
        self.log_entry(json!({ "direction": "out", "source": source, "data": data }))
    }

    /// Log a lifecycle event (started, interrupt, closed, exited, ...).
    pub fn log_event(&mut self, event: &str, detail: Option<&str>) -> Result<()> {
        match detail {
            Some(detail) => self.log_entry(json!({ "event": event, "detail": detail })),
            None => self.log_entry(json!({ "event": event })),
        }
    }

    /// Write the session metadata file (overwritten in place).
    pub fn write_metadata(&self, metadata: &serde_json::Value) -> Result<()> {
        let json_str =
            serde_json::to_string_pretty(metadata).context("Failed to serialize metadata")?;
        std::fs::write(&self.meta_path, json_str).context("Failed to write metadata")?;
        Ok(())
    }

    fn log_entry(&mut self, mut entry: serde_json::Value) -> Result<()> {
        if let Some(obj) = entry.as_object_mut() {
            obj.insert("timestamp".into(), json!(Utc::now().to_rfc3339()));
            obj.insert("session_id".into(), json!(self.session_id));
        }

        writeln!(self.log_file, "{}", entry).context("Failed to write to log file")?;
        self.log_file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_lines_are_json_with_session_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = SessionLogger::new("t1", dir.path()).unwrap();
        logger.log_input("echo hi").unwrap();
        logger.log_output("stdout", "hi\n").unwrap();
        logger.log_event("closed", None).unwrap();

        let raw = std::fs::read_to_string(dir.path().join("session-t1.log")).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 3);
        for line in lines {
            let v: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(v["session_id"], "t1");
            assert!(v["timestamp"].is_string());
        }
    }

    #[test]
    fn metadata_is_overwritten_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let logger = SessionLogger::new("t2", dir.path()).unwrap();
        logger.write_metadata(&json!({ "pid": 42 })).unwrap();
        logger.write_metadata(&json!({ "pid": 43 })).unwrap();

        let raw = std::fs::read_to_string(dir.path().join("session-t2-meta.json")).unwrap();
        let v: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(v["pid"], 43);
    }
}
