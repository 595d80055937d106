use action_primitives::{ActionKind, ActionStep, ExecutionResult, HealingEvent};
use chrono::{DateTime, Utc};
use selfheal_core_types::{RunId, StepFingerprint};
use serde::{Deserialize, Serialize};

/// Where a step ran: its fingerprint and the page it started on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepContext {
    pub fingerprint: StepFingerprint,
    pub page_url: String,
}

impl StepContext {
    pub fn new(step: &ActionStep, page_url: impl Into<String>) -> Self {
        let page_url = page_url.into();
        Self {
            fingerprint: step.fingerprint(&page_url),
            page_url,
        }
    }
}

/// One line of the trace: a step attempt with its optional healing record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    /// Position in the run, starting at 1
    pub seq: u64,
    pub run_id: RunId,
    pub step: ActionStep,
    pub fingerprint: StepFingerprint,
    pub page_url: String,
    pub result: ExecutionResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healing: Option<HealingEvent>,
    pub recorded_at: DateTime<Utc>,
}

impl TraceEntry {
    pub fn attempt(&self) -> u32 {
        self.result.attempt
    }

    /// Healing tier of this attempt, 0 for the initial execution
    pub fn tier(&self) -> u8 {
        self.healing
            .as_ref()
            .map(|event| event.tier.number())
            .unwrap_or(0)
    }
}

/// Execution record forwarded to persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionLog {
    pub run_id: RunId,
    pub seq: u64,
    pub step_id: String,
    pub kind: ActionKind,
    pub fingerprint: StepFingerprint,
    pub page_url: String,
    pub result: ExecutionResult,
    pub recorded_at: DateTime<Utc>,
}

impl From<&TraceEntry> for ActionLog {
    fn from(entry: &TraceEntry) -> Self {
        Self {
            run_id: entry.run_id.clone(),
            seq: entry.seq,
            step_id: entry.step.id.clone(),
            kind: entry.step.kind,
            fingerprint: entry.fingerprint.clone(),
            page_url: entry.page_url.clone(),
            result: entry.result.clone(),
            recorded_at: entry.recorded_at,
        }
    }
}

/// Records accepted by a [`crate::PersistenceSink`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum SinkRecord {
    ActionLog(ActionLog),
    HealingEvent(HealingEvent),
}

impl SinkRecord {
    pub fn kind(&self) -> &'static str {
        match self {
            SinkRecord::ActionLog(_) => "action_log",
            SinkRecord::HealingEvent(_) => "healing_event",
        }
    }
}
