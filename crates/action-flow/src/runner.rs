//! Plan execution

use action_primitives::{ActionKind, FlowPlan, StepOutput};
use l6_timeline::TraceEntry;
use selfheal_core_types::RunId;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info};

use crate::errors::FlowError;
use crate::events::FlowEvent;
use crate::orchestrator::HealingOrchestrator;
use crate::session::Session;

/// Data produced by a successful extract or screenshot step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepOutputRecord {
    pub step_id: String,
    pub output: StepOutput,
}

/// The step that aborted a run, with its full attempt history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepFailure {
    pub step_id: String,
    pub error: String,
    pub attempts: Vec<TraceEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub plan_name: String,
    pub total_steps: usize,
    pub successful_steps: usize,
    /// Steps rescued by either healing tier
    pub healed_steps: usize,
    pub outputs: Vec<StepOutputRecord>,
    pub failure: Option<StepFailure>,
    pub duration_ms: u64,
}

impl RunReport {
    fn new(run_id: RunId, plan: &FlowPlan) -> Self {
        Self {
            run_id,
            plan_name: plan.name.clone(),
            total_steps: plan.steps.len(),
            successful_steps: 0,
            healed_steps: 0,
            outputs: Vec::new(),
            failure: None,
            duration_ms: 0,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failure.is_none() && self.successful_steps == self.total_steps
    }

    /// Text extracted by a step, if any
    pub fn text(&self, step_id: &str) -> Option<&str> {
        self.outputs.iter().find_map(|record| match &record.output {
            StepOutput::Text(text) if record.step_id == step_id => Some(text.as_str()),
            _ => None,
        })
    }
}

/// A run that stopped before its last step. The report keeps the partial
/// progress.
#[derive(Debug, Error)]
#[error(
    "run aborted after {} of {} steps: {source}",
    .report.successful_steps,
    .report.total_steps
)]
pub struct RunAborted {
    pub report: Box<RunReport>,
    #[source]
    pub source: FlowError,
}

/// Runs a plan's steps strictly in order on one session
pub struct FlowRunner {
    orchestrator: Arc<HealingOrchestrator>,
}

impl FlowRunner {
    pub fn new(orchestrator: Arc<HealingOrchestrator>) -> Self {
        Self { orchestrator }
    }

    pub fn orchestrator(&self) -> &Arc<HealingOrchestrator> {
        &self.orchestrator
    }

    /// Execute every step. The session is released on every exit path.
    pub async fn run(
        &self,
        plan: &FlowPlan,
        session: &mut Session,
    ) -> Result<RunReport, RunAborted> {
        let started = Instant::now();
        let mut report = RunReport::new(session.run_id().clone(), plan);

        if let Err(err) = validate_plan(plan) {
            return Err(self.abort(session, report, started, err).await);
        }

        info!(
            run_id = %session.run_id(),
            plan = %plan.name,
            steps = plan.steps.len(),
            "run started"
        );

        for step in &plan.steps {
            match self.orchestrator.run_step(step, session).await {
                Ok(outcome) => {
                    report.successful_steps += 1;
                    if outcome.healed.is_some() {
                        report.healed_steps += 1;
                    }
                    if let Some(output) = outcome.result.output {
                        report.outputs.push(StepOutputRecord {
                            step_id: step.id.clone(),
                            output,
                        });
                    }
                }
                Err(err) => {
                    let step_id = err.step_id().unwrap_or(&step.id).to_string();
                    report.failure = Some(StepFailure {
                        attempts: self.orchestrator.recorder().attempts_for(&step_id),
                        step_id,
                        error: err.to_string(),
                    });
                    return Err(self.abort(session, report, started, err).await);
                }
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        self.close(session, &report, false).await;
        info!(
            run_id = %report.run_id,
            successful = report.successful_steps,
            healed = report.healed_steps,
            duration_ms = report.duration_ms,
            "run finished"
        );
        Ok(report)
    }

    async fn abort(
        &self,
        session: &mut Session,
        mut report: RunReport,
        started: Instant,
        source: FlowError,
    ) -> RunAborted {
        report.duration_ms = started.elapsed().as_millis() as u64;
        error!(
            run_id = %report.run_id,
            error = %source,
            severity = source.severity(),
            successful = report.successful_steps,
            total = report.total_steps,
            "run aborted"
        );
        self.close(session, &report, true).await;
        RunAborted {
            report: Box::new(report),
            source,
        }
    }

    async fn close(&self, session: &mut Session, report: &RunReport, aborted: bool) {
        self.orchestrator.recorder().flush().await;
        session.release().await;
        self.orchestrator.events().publish(FlowEvent::RunFinished {
            run_id: report.run_id.clone(),
            total_steps: report.total_steps,
            successful_steps: report.successful_steps,
            aborted,
        });
    }
}

/// Reject plans that cannot run before any driver call is made
pub fn validate_plan(plan: &FlowPlan) -> Result<(), FlowError> {
    if let Some(id) = plan.duplicate_step_id() {
        return Err(FlowError::InvalidPlan(format!("duplicate step id '{id}'")));
    }
    for step in &plan.steps {
        if step.id.trim().is_empty() {
            return Err(FlowError::InvalidPlan("step with empty id".to_string()));
        }
        if step.timeout_ms == 0 {
            return Err(FlowError::InvalidPlan(format!(
                "step '{}' has a zero timeout",
                step.id
            )));
        }
        let needs_value = matches!(
            step.kind,
            ActionKind::Navigate | ActionKind::Fill | ActionKind::Select
        );
        if needs_value && step.value.is_none() {
            return Err(FlowError::InvalidPlan(format!(
                "{} step '{}' needs a value",
                step.kind.name(),
                step.id
            )));
        }
        if step.kind.requires_target()
            && step.target_description.trim().is_empty()
            && step.locator.is_none()
        {
            return Err(FlowError::InvalidPlan(format!(
                "{} step '{}' needs a target description or locator",
                step.kind.name(),
                step.id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_primitives::ActionStep;

    #[test]
    fn rejects_duplicate_ids() {
        let plan = FlowPlan::new(
            "dup",
            vec![
                ActionStep::click("a", "Save button"),
                ActionStep::click("a", "Cancel button"),
            ],
        );
        assert!(matches!(validate_plan(&plan), Err(FlowError::InvalidPlan(_))));
    }

    #[test]
    fn rejects_fill_without_text_and_click_without_target() {
        let fill = FlowPlan::new(
            "fill",
            vec![ActionStep::new("f", ActionKind::Fill, "Email field")],
        );
        assert!(validate_plan(&fill).is_err());

        let click = FlowPlan::new("click", vec![ActionStep::click("c", "  ")]);
        assert!(validate_plan(&click).is_err());
    }

    #[test]
    fn accepts_targetless_steps() {
        let plan = FlowPlan::new(
            "ok",
            vec![
                ActionStep::navigate("open", "https://app.test"),
                ActionStep::new("shot", ActionKind::Screenshot, ""),
                ActionStep::new("pause", ActionKind::Wait, "").with_value("5"),
            ],
        );
        assert!(validate_plan(&plan).is_ok());
    }
}
