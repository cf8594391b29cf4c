//! JSON-lines audit log on disk
//!
//! One [`AuditRecord`] per line. Every append is flushed and `sync_data`'d
//! before it is acknowledged, so an ack survives a crash.

use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{AuditAck, AuditEvent, AuditLog, AuditRecord, AuditSink};
use crate::store::{StoreError, StoreResult};

struct Writer {
    file: File,
    next_sequence: u64,
}

/// Durable append-only audit log
pub struct JsonlAuditLog {
    path: PathBuf,
    writer: Mutex<Writer>,
}

impl JsonlAuditLog {
    /// Open (or create) a log file, continuing the sequence of any existing records
    pub async fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        Self::repair_tail(&path).await?;
        let existing = Self::read_all(&path).await?;
        let next_sequence = existing.last().map(|r| r.sequence + 1).unwrap_or(1);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        debug!(path = %path.display(), next_sequence, "Opened audit log");
        Ok(Self {
            path,
            writer: Mutex::new(Writer {
                file,
                next_sequence,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cut a torn final line left by a crash so the next append starts on a
    /// fresh line.
    async fn repair_tail(path: &Path) -> StoreResult<()> {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if raw.is_empty() || raw.ends_with(b"\n") {
            return Ok(());
        }

        let keep = raw
            .iter()
            .rposition(|b| *b == b'\n')
            .map(|idx| idx + 1)
            .unwrap_or(0);
        warn!(
            path = %path.display(),
            dropped_bytes = raw.len() - keep,
            "Truncating torn audit tail"
        );
        let file = OpenOptions::new().write(true).open(path).await?;
        file.set_len(keep as u64).await?;
        file.sync_data().await?;
        Ok(())
    }

    /// Replay every record in a log file. A missing file is an empty log.
    pub async fn read_all(path: &Path) -> StoreResult<Vec<AuditRecord>> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (idx, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    // A torn final line is the only expected corruption
                    warn!(path = %path.display(), line = idx + 1, "Skipping unreadable audit line: {}", e);
                }
            }
        }
        Ok(records)
    }

    /// Records currently on disk
    pub async fn records(&self) -> StoreResult<Vec<AuditRecord>> {
        // Hold the writer so we never read a half-written line
        let _guard = self.writer.lock().await;
        Self::read_all(&self.path).await
    }

    async fn write_lines(writer: &mut Writer, records: &[AuditRecord]) -> StoreResult<()> {
        let mut buf = String::new();
        for record in records {
            let line = serde_json::to_string(record)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            buf.push_str(&line);
            buf.push('\n');
        }

        let len = writer.file.metadata().await?.len();
        let written = async {
            writer.file.write_all(buf.as_bytes()).await?;
            writer.file.flush().await?;
            writer.file.sync_data().await
        }
        .await;

        if let Err(e) = written {
            // Roll back a partial batch so the next append is not glued onto it
            if let Err(undo) = writer.file.set_len(len).await {
                warn!(len, "Failed to roll back partial audit write: {}", undo);
            }
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl AuditLog for JsonlAuditLog {
    async fn append(&self, event: AuditEvent) -> StoreResult<AuditAck> {
        let mut writer = self.writer.lock().await;
        let record = AuditRecord {
            sequence: writer.next_sequence,
            recorded_at: Utc::now(),
            event,
        };
        Self::write_lines(&mut writer, std::slice::from_ref(&record)).await?;
        writer.next_sequence += 1;

        debug!(
            sequence = record.sequence,
            event_type = record.event.event_type(),
            "Audit event appended"
        );
        Ok(AuditAck::from(&record))
    }
}

#[async_trait]
impl AuditSink for JsonlAuditLog {
    async fn persist(&self, records: &[AuditRecord]) -> StoreResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut writer = self.writer.lock().await;
        Self::write_lines(&mut writer, records).await?;
        if let Some(last) = records.last() {
            writer.next_sequence = writer.next_sequence.max(last.sequence + 1);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(n: u32) -> AuditEvent {
        AuditEvent::SessionInterrupted {
            session_id: format!("s-{}", n),
            agent_id: "a-1".to_string(),
            intervention_count: n,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_append_and_replay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit").join("governance.jsonl");

        let log = JsonlAuditLog::open(&path).await.unwrap();
        let first = log.append(event(1)).await.unwrap();
        let second = log.append(event(2)).await.unwrap();
        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);

        let records = JsonlAuditLog::read_all(&path).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].event.session_id(), Some("s-2"));
    }

    #[tokio::test]
    async fn test_reopen_continues_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("governance.jsonl");

        {
            let log = JsonlAuditLog::open(&path).await.unwrap();
            log.append(event(1)).await.unwrap();
        }
        let log = JsonlAuditLog::open(&path).await.unwrap();
        let ack = log.append(event(2)).await.unwrap();
        assert_eq!(ack.sequence, 2);
        assert_eq!(log.records().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_skips_torn_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("governance.jsonl");
        {
            let log = JsonlAuditLog::open(&path).await.unwrap();
            log.append(event(1)).await.unwrap();
        }
        let mut raw = std::fs::read_to_string(&path).unwrap();
        raw.push_str("{\"sequence\": 2, \"recorded_");
        std::fs::write(&path, raw).unwrap();

        let records = JsonlAuditLog::read_all(&path).await.unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_append_after_torn_line_survives_replay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("governance.jsonl");
        {
            let log = JsonlAuditLog::open(&path).await.unwrap();
            log.append(event(1)).await.unwrap();
        }
        {
            use std::io::Write;
            let mut raw = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
            raw.write_all(b"{\"sequence\": 2, \"recorded_").unwrap();
        }

        let log = JsonlAuditLog::open(&path).await.unwrap();
        let ack = log.append(event(2)).await.unwrap();
        assert_eq!(ack.sequence, 2);

        let records = JsonlAuditLog::read_all(&path).await.unwrap();
        let sequences: Vec<u64> = records.iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![1, 2]);
        assert_eq!(records[1].event.session_id(), Some("s-2"));
        assert!(std::fs::read_to_string(&path).unwrap().ends_with('\n'));
    }

    #[tokio::test]
    async fn test_torn_only_line_is_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("governance.jsonl");
        std::fs::write(&path, "{\"seq").unwrap();

        let log = JsonlAuditLog::open(&path).await.unwrap();
        let ack = log.append(event(1)).await.unwrap();
        assert_eq!(ack.sequence, 1);
        assert_eq!(JsonlAuditLog::read_all(&path).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let records = JsonlAuditLog::read_all(&dir.path().join("none.jsonl"))
            .await
            .unwrap();
        assert!(records.is_empty());
    }
}
