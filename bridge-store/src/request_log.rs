//! Append-only request log.
//!
//! Records are kept in a bounded in-memory ring (oldest evicted first) and
//! optionally mirrored to a JSON-lines file. The file is a mirror only; stats
//! are always computed from memory.

use bridge_core::error::{BridgeError, Result};
use bridge_core::record::RequestRecord;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

/// Storage seam for request records.
pub trait RequestLog: Send + Sync {
    fn append(&self, record: RequestRecord) -> Result<()>;

    /// Records with `timestamp >= cutoff`, oldest first.
    fn since(&self, cutoff: DateTime<Utc>) -> Result<Vec<RequestRecord>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── File mirror ──────────────────────────────────────────────────────────────

/// JSON-lines writer, one record per line.
pub struct RequestLogFile {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl RequestLogFile {
    /// Open (or create) the file in append mode.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        info!(path = %path.display(), "Request log file opened");
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_line(&self, line: &str) -> Result<()> {
        let mut w = self
            .writer
            .lock()
            .map_err(|_| BridgeError::Internal("request log writer lock poisoned".into()))?;
        w.write_all(line.as_bytes())?;
        w.write_all(b"\n")?;
        w.flush()?;
        Ok(())
    }
}

// ── In-memory log ────────────────────────────────────────────────────────────

pub struct MemoryRequestLog {
    records: Mutex<VecDeque<RequestRecord>>,
    max_records: usize,
    file: Option<RequestLogFile>,
}

impl MemoryRequestLog {
    pub fn new(max_records: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::new()),
            max_records: max_records.max(1),
            file: None,
        }
    }

    pub fn with_file(mut self, file: RequestLogFile) -> Self {
        self.file = Some(file);
        self
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, VecDeque<RequestRecord>>> {
        self.records
            .lock()
            .map_err(|_| BridgeError::Internal("request log lock poisoned".into()))
    }
}

impl RequestLog for MemoryRequestLog {
    /// The record lands in memory first; a failed mirror write is reported
    /// but never takes the record back out.
    fn append(&self, record: RequestRecord) -> Result<()> {
        let line = self.file.as_ref().map(|_| record.to_json_line());
        {
            let mut records = self.lock()?;
            if records.len() >= self.max_records {
                records.pop_front();
                debug!(max = self.max_records, "Request log full, oldest record evicted");
            }
            records.push_back(record);
        }
        match (&self.file, line) {
            (Some(file), Some(line)) => file.write_line(&line),
            _ => Ok(()),
        }
    }

    fn since(&self, cutoff: DateTime<Utc>) -> Result<Vec<RequestRecord>> {
        let records = self.lock()?;
        Ok(records
            .iter()
            .filter(|r| r.timestamp >= cutoff)
            .cloned()
            .collect())
    }

    fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    fn rec(service: u64, status: u16) -> RequestRecord {
        RequestRecord::new(Some(service), "GET", "/x", status, 0.01)
    }

    #[test]
    fn oldest_record_evicted_when_full() {
        let log = MemoryRequestLog::new(2);
        log.append(rec(1, 200)).unwrap();
        log.append(rec(2, 200)).unwrap();
        log.append(rec(3, 200)).unwrap();
        let all = log.since(Utc::now() - Duration::hours(1)).unwrap();
        let ids: Vec<_> = all.iter().map(|r| r.service_id).collect();
        assert_eq!(ids, vec![Some(2), Some(3)]);
    }

    #[test]
    fn since_filters_by_timestamp() {
        let log = MemoryRequestLog::new(10);
        let mut old = rec(1, 200);
        old.timestamp = Utc::now() - Duration::days(2);
        log.append(old).unwrap();
        log.append(rec(2, 500)).unwrap();
        let recent = log.since(Utc::now() - Duration::days(1)).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].service_id, Some(2));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn file_mirror_writes_json_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs/requests.jsonl");
        let log = MemoryRequestLog::new(10).with_file(RequestLogFile::open(&path).unwrap());
        log.append(rec(1, 200)).unwrap();
        log.append(rec(2, 404)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: RequestRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.status_code, 404);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn failed_mirror_write_keeps_record_in_memory() {
        let log = MemoryRequestLog::new(10).with_file(RequestLogFile::open("/dev/full").unwrap());
        assert!(log.append(rec(1, 200)).is_err());
        assert_eq!(log.len(), 1);
        let recent = log.since(Utc::now() - Duration::hours(1)).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].service_id, Some(1));
    }
}
