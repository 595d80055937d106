use crate::errors::TlError;
use crate::model::SinkRecord;
use crate::ports::PersistenceSink;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::to_string;
use std::fs::{create_dir_all, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Sink that drops every record
#[derive(Debug, Default)]
pub struct NullSink;

#[async_trait]
impl PersistenceSink for NullSink {
    async fn append(&self, _record: SinkRecord) -> Result<(), TlError> {
        Ok(())
    }
}

/// Sink keeping records in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<SinkRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<SinkRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl PersistenceSink for MemorySink {
    async fn append(&self, record: SinkRecord) -> Result<(), TlError> {
        self.records.lock().push(record);
        Ok(())
    }
}

/// Sink appending one JSON object per line
pub struct JsonlSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonlSink {
    /// Open `path` for appending, creating parent directories
    pub fn create(path: impl AsRef<Path>) -> Result<Self, TlError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PersistenceSink for JsonlSink {
    async fn append(&self, record: SinkRecord) -> Result<(), TlError> {
        let line = to_string(&record).map_err(|err| TlError::Serialization(err.to_string()))?;
        let mut writer = self.writer.lock();
        writer
            .write_all(line.as_bytes())
            .and_then(|_| writer.write_all(b"\n"))?;
        Ok(())
    }

    async fn flush(&self) -> Result<(), TlError> {
        self.writer.lock().flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_primitives::{HealingEvent, HealingTier};
    use chrono::Utc;
    use selfheal_core_types::StepFingerprint;

    fn event() -> SinkRecord {
        SinkRecord::HealingEvent(HealingEvent {
            step_id: "s1".into(),
            fingerprint: StepFingerprint::from_raw("abc"),
            tier: HealingTier::Tier2,
            attempt: 1,
            original_locator: None,
            healed_locator: None,
            success: true,
            duration_ms: 40,
            error_message: None,
            occurred_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn jsonl_sink_appends_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("events.jsonl");

        let sink = JsonlSink::create(&path).unwrap();
        sink.append(event()).await.unwrap();
        sink.flush().await.unwrap();
        drop(sink);

        let sink = JsonlSink::create(&path).unwrap();
        sink.append(event()).await.unwrap();
        sink.flush().await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: SinkRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.kind(), "healing_event");
        assert!(lines[0].contains("\"record\":\"healing_event\""));
    }
}
