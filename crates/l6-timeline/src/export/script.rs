//! Replay script generation from a completed trace
//!
//! Every step is emitted with the final working locator of the run. Steps
//! that only succeeded through a Tier-2 direct action carry no locator and
//! fall back to healing when replayed.

use crate::errors::TlError;
use crate::history::{summarize, StepHistory};
use crate::model::TraceEntry;
use action_primitives::{ActionKind, ActionStep, CandidateSource, FlowPlan, LocatorStrategy};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::str::FromStr;

/// Healing budget embedded in generated scripts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackContract {
    pub tier1_attempts: u32,
    pub tier2_attempts: u32,
}

impl Default for FallbackContract {
    fn default() -> Self {
        Self {
            tier1_attempts: 2,
            tier2_attempts: 2,
        }
    }
}

/// Why a step carries the locator it does
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepAnnotation {
    pub step_id: String,
    /// None when the step never succeeded
    pub source: Option<CandidateSource>,
    /// Locator the run started with, when it was replaced by healing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original: Option<String>,
    pub attempts: usize,
}

/// YAML replay plan; loads as a regular flow plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayPlan {
    pub name: String,
    pub fallback: FallbackContract,
    pub steps: Vec<ActionStep>,
    #[serde(default)]
    pub annotations: Vec<StepAnnotation>,
}

impl From<ReplayPlan> for FlowPlan {
    fn from(plan: ReplayPlan) -> Self {
        FlowPlan::new(plan.name, plan.steps)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptFormat {
    /// YAML plan for this engine
    Plan,
    /// Python Playwright script
    Playwright,
}

impl FromStr for ScriptFormat {
    type Err = TlError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "plan" | "yaml" => Ok(ScriptFormat::Plan),
            "playwright" | "python" | "py" => Ok(ScriptFormat::Playwright),
            other => Err(TlError::InvalidArg(format!("unknown script format '{}'", other))),
        }
    }
}

pub struct CodeGenerator {
    name: String,
    fallback: FallbackContract,
}

impl CodeGenerator {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fallback: FallbackContract::default(),
        }
    }

    pub fn with_fallback(mut self, fallback: FallbackContract) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn generate(&self, entries: &[TraceEntry], format: ScriptFormat) -> Result<String, TlError> {
        match format {
            ScriptFormat::Plan => {
                let plan = self.plan(entries)?;
                serde_yaml::to_string(&plan).map_err(|err| TlError::Serialization(err.to_string()))
            }
            ScriptFormat::Playwright => self.playwright(entries),
        }
    }

    /// Build the replay plan with final locators pinned
    pub fn plan(&self, entries: &[TraceEntry]) -> Result<ReplayPlan, TlError> {
        let histories = summarize(entries);
        if histories.is_empty() {
            return Err(TlError::InvalidArg("trace is empty".into()));
        }

        let mut steps = Vec::with_capacity(histories.len());
        let mut annotations = Vec::with_capacity(histories.len());
        for history in &histories {
            steps.push(pinned_step(history));
            annotations.push(annotate(history));
        }

        Ok(ReplayPlan {
            name: self.name.clone(),
            fallback: self.fallback,
            steps,
            annotations,
        })
    }

    fn playwright(&self, entries: &[TraceEntry]) -> Result<String, TlError> {
        let plan = self.plan(entries)?;
        let mut out = String::new();
        let fmt_err = |err: std::fmt::Error| TlError::Internal(err.to_string());

        writeln!(out, "\"\"\"Replay of {} generated by selfheal.\"\"\"", py_escape_doc(&plan.name))
            .map_err(fmt_err)?;
        out.push_str(PLAYWRIGHT_PRELUDE);
        writeln!(out, "TIER1_ATTEMPTS = {}", plan.fallback.tier1_attempts).map_err(fmt_err)?;
        writeln!(out, "TIER2_ATTEMPTS = {}", plan.fallback.tier2_attempts).map_err(fmt_err)?;
        out.push_str(PLAYWRIGHT_HELPERS);

        out.push_str("\n\ndef main():\n");
        out.push_str("    with sync_playwright() as p:\n");
        out.push_str("        browser = p.chromium.launch()\n");
        out.push_str("        page = browser.new_page()\n");
        for (step, annotation) in plan.steps.iter().zip(&plan.annotations) {
            if let Some(source) = annotation.source.filter(|source| source.is_healed()) {
                writeln!(out, "        # {}: {}", step.id, source.name()).map_err(fmt_err)?;
            }
            writeln!(out, "        {}", python_step(step)).map_err(fmt_err)?;
        }
        out.push_str("        browser.close()\n");
        out.push_str("\n\nif __name__ == \"__main__\":\n    main()\n");
        Ok(out)
    }
}

fn pinned_step(history: &StepHistory) -> ActionStep {
    let mut step = history.step.clone();
    if history.succeeded {
        match &history.final_locator {
            Some(candidate) => step.locator = Some(candidate.locator()),
            // Tier-2 success: nothing reusable, let replay resolve and heal
            None if history.final_source == Some(CandidateSource::HealedTier2) => {
                step.locator = None
            }
            None => {}
        }
    }
    step
}

fn annotate(history: &StepHistory) -> StepAnnotation {
    let original = if history.healed() {
        history
            .step
            .locator
            .as_ref()
            .map(|locator| locator.to_string())
            .or_else(|| history.attempts.first().and_then(|attempt| attempt.locator.clone()))
            .or_else(|| Some(history.step.target_description.clone()))
    } else {
        None
    };
    StepAnnotation {
        step_id: history.step.id.clone(),
        source: if history.succeeded {
            history.final_source
        } else {
            None
        },
        original,
        attempts: history.attempts.len(),
    }
}

/// Python string literal; JSON string syntax is a valid subset
fn py_str(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

fn py_escape_doc(value: &str) -> String {
    value.replace('\\', "\\\\").replace("\"\"\"", "\\\"\\\"\\\"")
}

fn playwright_selector(step: &ActionStep) -> Option<String> {
    step.locator.as_ref().map(|locator| match locator.strategy {
        LocatorStrategy::Xpath if !locator.selector.starts_with("xpath=") => {
            format!("xpath={}", locator.selector)
        }
        _ => locator.selector.clone(),
    })
}

fn python_step(step: &ActionStep) -> String {
    let value = step.value.as_deref().map(py_str).unwrap_or_else(|| "None".into());
    match step.kind {
        ActionKind::Navigate => format!("page.goto({})", value),
        ActionKind::Screenshot => format!("page.screenshot(path={})", py_str(&format!("{}.png", step.id))),
        ActionKind::Wait if !step.has_target() => {
            let millis = step
                .value
                .as_deref()
                .and_then(|raw| raw.trim().parse::<u64>().ok())
                .unwrap_or(step.timeout_ms);
            format!("page.wait_for_timeout({})", millis)
        }
        kind => {
            let selector = playwright_selector(step)
                .map(|selector| py_str(&selector))
                .unwrap_or_else(|| "None".into());
            let call = format!(
                "step(page, {}, {}, {}, {}, timeout={})",
                py_str(kind.name()),
                selector,
                py_str(&step.target_description),
                value,
                step.timeout_ms
            );
            if kind == ActionKind::Extract {
                format!("print({}, {})", py_str(&format!("{}:", step.id)), call)
            } else {
                call
            }
        }
    }
}

const PLAYWRIGHT_PRELUDE: &str = r#"
import json
import os
import urllib.request

from playwright.sync_api import sync_playwright, TimeoutError as PlaywrightTimeout

SELFHEAL_ENDPOINT = os.environ.get("SELFHEAL_ENDPOINT", "http://127.0.0.1:8787")
"#;

const PLAYWRIGHT_HELPERS: &str = r#"

def _post(path, payload):
    request = urllib.request.Request(
        SELFHEAL_ENDPOINT + path,
        data=json.dumps(payload).encode("utf-8"),
        headers={"Content-Type": "application/json"},
    )
    try:
        with urllib.request.urlopen(request, timeout=120) as response:
            return json.loads(response.read().decode("utf-8"))
    except Exception:
        return None


def _perform(page, action, selector, value, timeout):
    target = page.locator(selector).first
    if action == "click":
        return target.click(timeout=timeout)
    if action == "fill":
        return target.fill(value or "", timeout=timeout)
    if action == "select":
        return target.select_option(value, timeout=timeout)
    if action == "extract":
        return target.inner_text(timeout=timeout)
    if action == "wait":
        return target.wait_for(state="visible", timeout=timeout)
    raise ValueError("unsupported action " + action)


def heal(page, action, description, value=None, timeout=10000):
    """Tier-1: ask for a replacement locator. Tier-2: let the agent act."""
    request = {"action": action, "description": description, "value": value, "url": page.url}
    for _ in range(TIER1_ATTEMPTS):
        suggestion = _post("/heal/locator", dict(request, html=page.content()))
        selector = (suggestion or {}).get("selector")
        if not selector:
            continue
        try:
            return _perform(page, action, selector, value, timeout)
        except PlaywrightTimeout:
            continue
    for _ in range(TIER2_ATTEMPTS):
        result = _post("/heal/act", request)
        if result and result.get("success"):
            return result.get("output")
    raise RuntimeError("healing exhausted for " + repr(description))


def step(page, action, selector, description, value=None, timeout=10000):
    if selector is None:
        return heal(page, action, description, value, timeout)
    try:
        return _perform(page, action, selector, value, timeout)
    except PlaywrightTimeout:
        return heal(page, action, description, value, timeout)
"#;
