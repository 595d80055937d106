//! AI healing collaborator interface

pub mod openai;

use action_primitives::{
    ActionKind, ActionStep, DebugHandle, ErrorKind, HealingTier, LocatorCandidate, PageSnapshot,
};
use async_trait::async_trait;
use selfheal_core_types::StepFingerprint;
use serde::Serialize;

use crate::errors::ProviderError;

/// Everything a provider is told about a failing step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealRequest {
    pub step: ActionStep,
    pub fingerprint: StepFingerprint,
    pub page_url: String,
    pub tier: HealingTier,
    /// 1-based ordinal within the tier
    pub attempt: u32,
    /// Locators already tried for this step, oldest first
    pub failed_locators: Vec<LocatorCandidate>,
    pub last_error: Option<ErrorKind>,
}

impl HealRequest {
    /// Natural-language instruction for a direct (Tier-2) action
    pub fn task(&self) -> String {
        let step = &self.step;
        let target = step.target_description.trim();
        let value = step.value.as_deref().unwrap_or_default();
        match step.kind {
            ActionKind::Click => format!("Click the element described as \"{target}\""),
            ActionKind::Fill => {
                format!("Type \"{value}\" into the field described as \"{target}\"")
            }
            ActionKind::Select => {
                format!("Choose the option \"{value}\" in the dropdown described as \"{target}\"")
            }
            ActionKind::Extract => {
                format!("Read the text of the element described as \"{target}\"")
            }
            ActionKind::Wait => {
                format!("Wait until the element described as \"{target}\" is visible")
            }
            ActionKind::Navigate => format!("Open {value}"),
            ActionKind::Screenshot => "Take a screenshot of the current page".to_string(),
        }
    }
}

/// AI collaborator consulted by the orchestrator.
///
/// Errors fail the current healing attempt only.
#[async_trait]
pub trait HealingProvider: Send + Sync {
    /// Tier-1: propose a replacement locator from the page's accessibility
    /// tree. `Ok(None)` means no suggestion.
    async fn suggest_locator(
        &self,
        snapshot: &PageSnapshot,
        request: &HealRequest,
    ) -> Result<Option<LocatorCandidate>, ProviderError>;

    /// Tier-2: perform the step directly inside the live session
    async fn execute_action(
        &self,
        handle: &DebugHandle,
        request: &HealRequest,
    ) -> Result<bool, ProviderError>;

    fn name(&self) -> &str {
        "provider"
    }
}

/// Provider that never heals; every healing attempt fails
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHealingProvider;

#[async_trait]
impl HealingProvider for NoopHealingProvider {
    async fn suggest_locator(
        &self,
        _snapshot: &PageSnapshot,
        _request: &HealRequest,
    ) -> Result<Option<LocatorCandidate>, ProviderError> {
        Ok(None)
    }

    async fn execute_action(
        &self,
        _handle: &DebugHandle,
        _request: &HealRequest,
    ) -> Result<bool, ProviderError> {
        Err(ProviderError::Unsupported(
            "healing is disabled".to_string(),
        ))
    }

    fn name(&self) -> &str {
        "noop"
    }
}
