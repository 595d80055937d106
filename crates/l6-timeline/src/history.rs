//! Per-step view over a flat trace

use crate::model::TraceEntry;
use action_primitives::{ActionStep, CandidateSource, ErrorKind, LocatorCandidate};
use selfheal_core_types::StepFingerprint;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptSummary {
    pub attempt: u32,
    /// 0 for the initial execution
    pub tier: u8,
    pub success: bool,
    pub locator: Option<String>,
    pub source: Option<CandidateSource>,
    pub error_kind: Option<ErrorKind>,
    pub duration_ms: u64,
}

/// Everything that happened to one step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepHistory {
    pub step: ActionStep,
    pub fingerprint: StepFingerprint,
    pub page_url: String,
    pub attempts: Vec<AttemptSummary>,
    pub succeeded: bool,
    /// Locator of the successful attempt, if it used one
    pub final_locator: Option<LocatorCandidate>,
    pub final_source: Option<CandidateSource>,
}

impl StepHistory {
    pub fn healed(&self) -> bool {
        self.final_source
            .map(|source| source.is_healed())
            .unwrap_or(false)
    }
}

/// Group entries by step, in order of first appearance
pub fn summarize(entries: &[TraceEntry]) -> Vec<StepHistory> {
    let mut histories: Vec<StepHistory> = Vec::new();
    for entry in entries {
        let attempt = AttemptSummary {
            attempt: entry.result.attempt,
            tier: entry.tier(),
            success: entry.result.success,
            locator: entry
                .result
                .locator_used
                .as_ref()
                .map(|candidate| candidate.locator().to_string()),
            source: entry.result.source,
            error_kind: entry.result.error_kind,
            duration_ms: entry.result.duration_ms,
        };

        let position = histories
            .iter()
            .position(|history| history.step.id == entry.step.id);
        let history = match position {
            Some(index) => &mut histories[index],
            None => {
                histories.push(StepHistory {
                    step: entry.step.clone(),
                    fingerprint: entry.fingerprint.clone(),
                    page_url: entry.page_url.clone(),
                    attempts: Vec::new(),
                    succeeded: false,
                    final_locator: None,
                    final_source: None,
                });
                let last = histories.len() - 1;
                &mut histories[last]
            }
        };

        if entry.result.success {
            history.succeeded = true;
            history.final_locator = entry.result.locator_used.clone();
            history.final_source = entry.result.source;
        }
        history.attempts.push(attempt);
    }
    histories
}
