//! Ordered, append-only trace of a run

use crate::model::{ActionLog, SinkRecord, StepContext, TraceEntry};
use crate::ports::PersistenceSink;
use crate::sinks::NullSink;
use action_primitives::{ActionStep, ExecutionResult, HealingEvent};
use chrono::Utc;
use parking_lot::RwLock;
use selfheal_core_types::RunId;
use std::sync::Arc;
use tracing::{debug, warn};

/// Appends `(step, result, healing?)` tuples in execution order and forwards
/// them to the persistence sink. Entries are never mutated once written.
pub struct TraceRecorder {
    run_id: RunId,
    entries: RwLock<Vec<TraceEntry>>,
    sink: Arc<dyn PersistenceSink>,
}

impl TraceRecorder {
    pub fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            entries: RwLock::new(Vec::new()),
            sink: Arc::new(NullSink),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn PersistenceSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Append one attempt. Sink failures are logged and do not fail the run.
    pub async fn record(
        &self,
        step: &ActionStep,
        context: &StepContext,
        result: ExecutionResult,
        healing: Option<HealingEvent>,
    ) -> TraceEntry {
        let entry = {
            let mut entries = self.entries.write();
            let entry = TraceEntry {
                seq: entries.len() as u64 + 1,
                run_id: self.run_id.clone(),
                step: step.clone(),
                fingerprint: context.fingerprint.clone(),
                page_url: context.page_url.clone(),
                result,
                healing,
                recorded_at: Utc::now(),
            };
            entries.push(entry.clone());
            entry
        };

        debug!(
            seq = entry.seq,
            step_id = %entry.step.id,
            attempt = entry.result.attempt,
            success = entry.result.success,
            "trace entry recorded"
        );

        if let Err(err) = self
            .sink
            .append(SinkRecord::ActionLog(ActionLog::from(&entry)))
            .await
        {
            warn!(step_id = %entry.step.id, error = %err, "failed to persist action log");
        }
        if let Some(event) = &entry.healing {
            if let Err(err) = self.sink.append(SinkRecord::HealingEvent(event.clone())).await {
                warn!(step_id = %entry.step.id, error = %err, "failed to persist healing event");
            }
        }
        entry
    }

    /// Snapshot of all entries in execution order
    pub fn entries(&self) -> Vec<TraceEntry> {
        self.entries.read().clone()
    }

    /// Every recorded attempt of one step
    pub fn attempts_for(&self, step_id: &str) -> Vec<TraceEntry> {
        self.entries
            .read()
            .iter()
            .filter(|entry| entry.step.id == step_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub async fn flush(&self) {
        if let Err(err) = self.sink.flush().await {
            warn!(error = %err, "failed to flush persistence sink");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::TlError;
    use crate::sinks::MemorySink;
    use action_primitives::{
        CandidateSource, ErrorKind, HealingTier, Locator, LocatorCandidate,
    };
    use async_trait::async_trait;

    struct BrokenSink;

    #[async_trait]
    impl PersistenceSink for BrokenSink {
        async fn append(&self, _record: SinkRecord) -> Result<(), TlError> {
            Err(TlError::Internal("disk full".into()))
        }
    }

    fn step() -> ActionStep {
        ActionStep::click("s1", "Login button")
    }

    #[tokio::test]
    async fn entries_keep_execution_order_and_reach_the_sink() {
        let sink = Arc::new(MemorySink::new());
        let recorder = TraceRecorder::new(RunId::new()).with_sink(sink.clone());
        let context = StepContext::new(&step(), "https://app.test/login");

        let declared = LocatorCandidate::declared(Locator::exact_text("Login"));
        recorder
            .record(
                &step(),
                &context,
                ExecutionResult::failed(
                    "s1",
                    1,
                    Some(declared.clone()),
                    ErrorKind::ActionTimeout,
                    "timeout",
                    10,
                ),
                None,
            )
            .await;

        let healed = LocatorCandidate::new(
            Locator::role_name("button", "Sign In"),
            0.9,
            CandidateSource::HealedTier1,
        );
        let event = HealingEvent {
            step_id: "s1".into(),
            fingerprint: context.fingerprint.clone(),
            tier: HealingTier::Tier1,
            attempt: 1,
            original_locator: Some(declared),
            healed_locator: Some(healed.clone()),
            success: true,
            duration_ms: 12,
            error_message: None,
            occurred_at: Utc::now(),
        };
        recorder
            .record(
                &step(),
                &context,
                ExecutionResult::succeeded("s1", 2, Some(healed), CandidateSource::HealedTier1, 8),
                Some(event),
            )
            .await;

        let entries = recorder.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].seq, 1);
        assert_eq!(entries[1].seq, 2);
        assert_eq!(entries[1].tier(), 1);
        assert_eq!(recorder.attempts_for("s1").len(), 2);

        let kinds: Vec<&str> = sink.records().iter().map(|record| record.kind()).collect();
        assert_eq!(kinds, vec!["action_log", "action_log", "healing_event"]);
    }

    #[tokio::test]
    async fn sink_failure_does_not_lose_trace_entries() {
        let recorder = TraceRecorder::new(RunId::new()).with_sink(Arc::new(BrokenSink));
        let context = StepContext::new(&step(), "https://app.test/login");
        recorder
            .record(
                &step(),
                &context,
                ExecutionResult::succeeded("s1", 1, None, CandidateSource::Declared, 1),
                None,
            )
            .await;
        assert_eq!(recorder.len(), 1);
    }
}
