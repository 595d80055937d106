//! Per-attempt execution results and healing events

use chrono::{DateTime, Utc};
use selfheal_core_types::StepFingerprint;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{CandidateSource, LocatorCandidate};

/// Classification of a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No element matched the locator (or no candidate was available)
    LocatorNotFound,
    /// The action did not complete within `timeout_ms`
    ActionTimeout,
    /// Element detached between lookup and action
    StaleElement,
    /// Action completed but the post-action assertion did not hold
    AssertionFailed,
    /// Non-fatal driver error (protocol hiccup, invalid locator)
    DriverError,
    /// Provider had nothing to offer for this attempt
    HealingUnavailable,
    /// Provider call failed or timed out
    ProviderFailed,
}

impl ErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::LocatorNotFound => "locator_not_found",
            ErrorKind::ActionTimeout => "action_timeout",
            ErrorKind::StaleElement => "stale_element",
            ErrorKind::AssertionFailed => "assertion_failed",
            ErrorKind::DriverError => "driver_error",
            ErrorKind::HealingUnavailable => "healing_unavailable",
            ErrorKind::ProviderFailed => "provider_failed",
        }
    }

    /// Failures that drive escalation into the healing tiers
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ErrorKind::LocatorNotFound
                | ErrorKind::ActionTimeout
                | ErrorKind::StaleElement
                | ErrorKind::AssertionFailed
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Data produced by a successful extract or screenshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StepOutput {
    Text(String),
    Screenshot(#[serde(with = "base64_bytes")] Vec<u8>),
}

/// Outcome of exactly one attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub step_id: String,
    /// 1-based ordinal within the step
    pub attempt: u32,
    pub success: bool,
    /// None for Tier-2 direct actions and attempts that had no candidate
    pub locator_used: Option<LocatorCandidate>,
    pub source: Option<CandidateSource>,
    pub duration_ms: u64,
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<StepOutput>,
}

impl ExecutionResult {
    /// Successful attempt
    pub fn succeeded(
        step_id: impl Into<String>,
        attempt: u32,
        locator_used: Option<LocatorCandidate>,
        source: CandidateSource,
        duration_ms: u64,
    ) -> Self {
        Self {
            step_id: step_id.into(),
            attempt,
            success: true,
            locator_used,
            source: Some(source),
            duration_ms,
            error_kind: None,
            error_message: None,
            output: None,
        }
    }

    /// Failed attempt
    pub fn failed(
        step_id: impl Into<String>,
        attempt: u32,
        locator_used: Option<LocatorCandidate>,
        error_kind: ErrorKind,
        message: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        let source = locator_used.as_ref().map(|candidate| candidate.source);
        Self {
            step_id: step_id.into(),
            attempt,
            success: false,
            locator_used,
            source,
            duration_ms,
            error_kind: Some(error_kind),
            error_message: Some(message.into()),
            output: None,
        }
    }

    pub fn with_source(mut self, source: CandidateSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_output(mut self, output: StepOutput) -> Self {
        self.output = Some(output);
        self
    }

    /// Extracted text, when the attempt produced any
    pub fn text(&self) -> Option<&str> {
        match &self.output {
            Some(StepOutput::Text(text)) => Some(text.as_str()),
            _ => None,
        }
    }
}

/// Healing tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealingTier {
    Tier1,
    Tier2,
}

impl HealingTier {
    pub fn number(&self) -> u8 {
        match self {
            HealingTier::Tier1 => 1,
            HealingTier::Tier2 => 2,
        }
    }

    pub fn source(&self) -> CandidateSource {
        match self {
            HealingTier::Tier1 => CandidateSource::HealedTier1,
            HealingTier::Tier2 => CandidateSource::HealedTier2,
        }
    }
}

impl fmt::Display for HealingTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tier{}", self.number())
    }
}

/// Record of one healing attempt. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealingEvent {
    pub step_id: String,
    pub fingerprint: StepFingerprint,
    pub tier: HealingTier,
    /// 1-based ordinal within the tier
    pub attempt: u32,
    pub original_locator: Option<LocatorCandidate>,
    /// Always None for Tier-2
    pub healed_locator: Option<LocatorCandidate>,
    pub success: bool,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
