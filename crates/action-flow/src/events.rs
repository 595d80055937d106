//! Progress events published while a plan runs

use action_primitives::ActionKind;
use selfheal_core_types::RunId;
use serde::Serialize;
use std::fmt;

/// States of the per-step healing state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealingState {
    Init,
    Executing,
    Success,
    LocatorFailed,
    Tier1Healing,
    Tier1Success,
    ReExecuting,
    Tier1Exhausted,
    Tier2Healing,
    Tier2ActionExecuted,
    Tier2Exhausted,
    TerminalFailure,
}

impl HealingState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, HealingState::Success | HealingState::TerminalFailure)
    }

    pub fn name(&self) -> &'static str {
        match self {
            HealingState::Init => "init",
            HealingState::Executing => "executing",
            HealingState::Success => "success",
            HealingState::LocatorFailed => "locator_failed",
            HealingState::Tier1Healing => "tier1_healing",
            HealingState::Tier1Success => "tier1_success",
            HealingState::ReExecuting => "re_executing",
            HealingState::Tier1Exhausted => "tier1_exhausted",
            HealingState::Tier2Healing => "tier2_healing",
            HealingState::Tier2ActionExecuted => "tier2_action_executed",
            HealingState::Tier2Exhausted => "tier2_exhausted",
            HealingState::TerminalFailure => "terminal_failure",
        }
    }
}

impl fmt::Display for HealingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FlowEvent {
    StepStarted {
        run_id: RunId,
        step_id: String,
        kind: ActionKind,
    },
    StateChanged {
        run_id: RunId,
        step_id: String,
        state: HealingState,
        /// Attempts made so far for the step
        attempt: u32,
    },
    StepFinished {
        run_id: RunId,
        step_id: String,
        success: bool,
        attempts: u32,
    },
    RunFinished {
        run_id: RunId,
        total_steps: usize,
        successful_steps: usize,
        aborted: bool,
    },
}
