use crate::errors::TlError;
use crate::model::SinkRecord;
use async_trait::async_trait;

/// Append-only acceptor of action logs and healing events.
///
/// Records are never read back during a run.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn append(&self, record: SinkRecord) -> Result<(), TlError>;

    async fn flush(&self) -> Result<(), TlError> {
        Ok(())
    }
}
