//! Core data types: action steps, locators and locator candidates

use selfheal_core_types::StepFingerprint;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default per-action timeout in milliseconds
pub const DEFAULT_STEP_TIMEOUT_MS: u64 = 10_000;

fn default_timeout_ms() -> u64 {
    DEFAULT_STEP_TIMEOUT_MS
}

/// Kind of UI action performed by a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Navigate,
    Click,
    Fill,
    Select,
    Extract,
    Wait,
    Screenshot,
}

impl ActionKind {
    /// Get kind name as string
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Navigate => "navigate",
            ActionKind::Click => "click",
            ActionKind::Fill => "fill",
            ActionKind::Select => "select",
            ActionKind::Extract => "extract",
            ActionKind::Wait => "wait",
            ActionKind::Screenshot => "screenshot",
        }
    }

    /// Whether this kind always operates on a page element
    pub fn requires_target(&self) -> bool {
        matches!(
            self,
            ActionKind::Click | ActionKind::Fill | ActionKind::Select | ActionKind::Extract
        )
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Post-action verification for assertion steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssertionKind {
    /// Target element is present and visible
    Visible,
    /// Target text equals the step value
    TextEquals,
    /// Target text contains the step value
    TextContains,
    /// Current page URL contains the step value
    UrlContains,
}

/// One UI action. Immutable once created; builders consume `self`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionStep {
    /// Step identifier, unique within a plan
    pub id: String,

    /// Action kind
    pub kind: ActionKind,

    /// Free-text description of the target element
    #[serde(default)]
    pub target_description: String,

    /// URL for navigate, text for fill, option for select, milliseconds for
    /// a target-less wait, expected value for assertions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Per-action timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Optional verification performed after the action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assertion: Option<AssertionKind>,

    /// Locator declared by the plan author (or pinned by code generation)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<Locator>,
}

impl ActionStep {
    /// Create a new step
    pub fn new(id: impl Into<String>, kind: ActionKind, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            target_description: target.into(),
            value: None,
            timeout_ms: DEFAULT_STEP_TIMEOUT_MS,
            assertion: None,
            locator: None,
        }
    }

    pub fn navigate(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(id, ActionKind::Navigate, "").with_value(url)
    }

    pub fn click(id: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(id, ActionKind::Click, target)
    }

    pub fn fill(id: impl Into<String>, target: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(id, ActionKind::Fill, target).with_value(text)
    }

    pub fn extract(id: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(id, ActionKind::Extract, target)
    }

    /// Set value
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set assertion
    pub fn with_assertion(mut self, assertion: AssertionKind) -> Self {
        self.assertion = Some(assertion);
        self
    }

    /// Set declared locator
    pub fn with_locator(mut self, locator: Locator) -> Self {
        self.locator = Some(locator);
        self
    }

    /// Whether this step operates on a page element and can therefore be
    /// healed.
    pub fn has_target(&self) -> bool {
        if self.kind.requires_target() {
            return true;
        }
        self.kind == ActionKind::Wait
            && (!self.target_description.trim().is_empty() || self.locator.is_some())
    }

    /// Fingerprint of this step on the given page
    pub fn fingerprint(&self, page_url: &str) -> StepFingerprint {
        StepFingerprint::derive(self.kind.name(), &self.target_description, page_url)
    }
}

/// Ordered list of steps executed in one run
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FlowPlan {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub steps: Vec<ActionStep>,
}

impl FlowPlan {
    pub fn new(name: impl Into<String>, steps: Vec<ActionStep>) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }

    /// First duplicated step id, if any
    pub fn duplicate_step_id(&self) -> Option<&str> {
        self.steps.iter().enumerate().find_map(|(index, step)| {
            self.steps[..index]
                .iter()
                .any(|earlier| earlier.id == step.id)
                .then_some(step.id.as_str())
        })
    }
}

/// Locator strategy enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LocatorStrategy {
    ExactText,
    AriaLabel,
    Placeholder,
    PartialText,
    RoleName,
    Css,
    Xpath,
}

impl LocatorStrategy {
    /// Get strategy name as string
    pub fn name(&self) -> &'static str {
        match self {
            LocatorStrategy::ExactText => "exact-text",
            LocatorStrategy::AriaLabel => "aria-label",
            LocatorStrategy::Placeholder => "placeholder",
            LocatorStrategy::PartialText => "partial-text",
            LocatorStrategy::RoleName => "role-name",
            LocatorStrategy::Css => "css",
            LocatorStrategy::Xpath => "xpath",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase().replace('_', "-");
        let strategy = match normalized.as_str() {
            "exact-text" | "text" => LocatorStrategy::ExactText,
            "aria-label" | "aria" => LocatorStrategy::AriaLabel,
            "placeholder" => LocatorStrategy::Placeholder,
            "partial-text" => LocatorStrategy::PartialText,
            "role-name" | "role" => LocatorStrategy::RoleName,
            "css" => LocatorStrategy::Css,
            "xpath" => LocatorStrategy::Xpath,
            _ => return None,
        };
        Some(strategy)
    }
}

impl fmt::Display for LocatorStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Strategy + selector pair identifying a UI element.
///
/// Selectors use a Playwright-like textual form:
/// `text="Sign In"`, `text=Sign`, `[aria-label="Close"]`,
/// `[placeholder="Email"]`, `role=button[name="Sign In"]`, raw CSS, raw XPath.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
    pub strategy: LocatorStrategy,
    pub selector: String,
}

impl Locator {
    pub fn new(strategy: LocatorStrategy, selector: impl Into<String>) -> Self {
        Self {
            strategy,
            selector: selector.into(),
        }
    }

    pub fn exact_text(text: &str) -> Self {
        Self::new(LocatorStrategy::ExactText, format!("text={}", quote(text)))
    }

    pub fn partial_text(text: &str) -> Self {
        Self::new(LocatorStrategy::PartialText, format!("text={}", text))
    }

    pub fn aria_label(label: &str) -> Self {
        Self::new(LocatorStrategy::AriaLabel, format!("[aria-label={}]", quote(label)))
    }

    pub fn placeholder(placeholder: &str) -> Self {
        Self::new(
            LocatorStrategy::Placeholder,
            format!("[placeholder={}]", quote(placeholder)),
        )
    }

    pub fn role_name(role: &str, name: &str) -> Self {
        Self::new(
            LocatorStrategy::RoleName,
            format!("role={}[name={}]", role, quote(name)),
        )
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Self::new(LocatorStrategy::Css, selector)
    }

    pub fn xpath(selector: impl Into<String>) -> Self {
        Self::new(LocatorStrategy::Xpath, selector)
    }

    /// Decompose the textual selector into a structured query
    pub fn query(&self) -> LocatorQuery {
        let raw = self.selector.trim();
        match self.strategy {
            LocatorStrategy::ExactText => LocatorQuery::Text {
                value: unquote(raw.strip_prefix("text=").unwrap_or(raw)),
                exact: true,
            },
            LocatorStrategy::PartialText => LocatorQuery::Text {
                value: unquote(raw.strip_prefix("text=").unwrap_or(raw)),
                exact: false,
            },
            LocatorStrategy::AriaLabel => LocatorQuery::Attribute {
                name: "aria-label",
                value: attribute_value(raw, "aria-label"),
            },
            LocatorStrategy::Placeholder => LocatorQuery::Attribute {
                name: "placeholder",
                value: attribute_value(raw, "placeholder"),
            },
            LocatorStrategy::RoleName => {
                let body = raw.strip_prefix("role=").unwrap_or(raw);
                match body.split_once('[') {
                    Some((role, rest)) => {
                        let inner = rest.strip_suffix(']').unwrap_or(rest);
                        let name = inner.strip_prefix("name=").map(unquote);
                        LocatorQuery::Role {
                            role: role.trim().to_string(),
                            name,
                        }
                    }
                    None => LocatorQuery::Role {
                        role: body.trim().to_string(),
                        name: None,
                    },
                }
            }
            LocatorStrategy::Css => LocatorQuery::Css(raw.to_string()),
            LocatorStrategy::Xpath => LocatorQuery::XPath(raw.to_string()),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.strategy.name(), self.selector)
    }
}

/// Structured form of a [`Locator`] selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocatorQuery {
    Text { value: String, exact: bool },
    Attribute { name: &'static str, value: String },
    Role { role: String, name: Option<String> },
    Css(String),
    XPath(String),
}

/// Where a candidate came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CandidateSource {
    /// Declared by the plan or produced by regular resolution
    Declared,
    /// Suggested by the AI collaborator during Tier-1 healing
    HealedTier1,
    /// Produced by a Tier-2 direct action (no locator)
    HealedTier2,
}

impl CandidateSource {
    pub fn name(&self) -> &'static str {
        match self {
            CandidateSource::Declared => "declared",
            CandidateSource::HealedTier1 => "healed-tier1",
            CandidateSource::HealedTier2 => "healed-tier2",
        }
    }

    pub fn is_healed(&self) -> bool {
        !matches!(self, CandidateSource::Declared)
    }
}

impl fmt::Display for CandidateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A locator with its confidence score and provenance.
///
/// Produced fresh per resolution attempt and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocatorCandidate {
    pub strategy: LocatorStrategy,
    pub selector: String,
    /// Confidence score (0.0-1.0)
    pub confidence: f64,
    pub source: CandidateSource,
}

impl LocatorCandidate {
    /// Create a new candidate; confidence is clamped into [0, 1]
    pub fn new(locator: Locator, confidence: f64, source: CandidateSource) -> Self {
        Self {
            strategy: locator.strategy,
            selector: locator.selector,
            confidence: clamp_confidence(confidence),
            source,
        }
    }

    /// Declared locators are trusted fully
    pub fn declared(locator: Locator) -> Self {
        Self::new(locator, 1.0, CandidateSource::Declared)
    }

    pub fn locator(&self) -> Locator {
        Locator::new(self.strategy, self.selector.clone())
    }

    /// Same locator, different provenance
    pub fn with_source(&self, source: CandidateSource) -> Self {
        Self {
            source,
            ..self.clone()
        }
    }

    /// Check against a confidence floor
    pub fn is_confirmed(&self, floor: f64) -> bool {
        self.confidence >= floor
    }
}

impl fmt::Display for LocatorCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} ({:.2}, {})",
            self.strategy.name(),
            self.selector,
            self.confidence,
            self.source.name()
        )
    }
}

fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Quote a selector value, escaping backslashes and double quotes
pub fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Reverse of [`quote`]; unquoted input is returned trimmed
pub fn unquote(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        let inner = &trimmed[1..trimmed.len() - 1];
        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(ch) = chars.next() {
            if ch == '\\' {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            } else {
                out.push(ch);
            }
        }
        out
    } else {
        trimmed.to_string()
    }
}

fn attribute_value(raw: &str, attribute: &str) -> String {
    let inner = raw
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(raw);
    match inner.split_once('=') {
        Some((name, value)) if name.trim() == attribute => unquote(value),
        _ => unquote(inner),
    }
}
