//! Candidate-producing strategies
//!
//! Each strategy inspects the visible nodes of a snapshot and emits scored
//! candidates for one [`LocatorStrategy`]. Fixed scores:
//! exact text 0.95, aria-label 0.85, placeholder 0.80, partial text 0.75.
//! Role + name is weighted by uniqueness and depth.

use action_primitives::{
    normalize, AxNode, CandidateSource, Locator, LocatorCandidate, LocatorQuery, LocatorStrategy,
    PageSnapshot,
};
use std::collections::HashMap;

use crate::types::{ScoredCandidate, SelectorSyntax, TargetDescription};

pub const EXACT_TEXT_SCORE: f64 = 0.95;
pub const ARIA_LABEL_SCORE: f64 = 0.85;
pub const PLACEHOLDER_SCORE: f64 = 0.80;
pub const PARTIAL_TEXT_SCORE: f64 = 0.75;
pub const SELECTOR_PRESENT_SCORE: f64 = 0.90;
pub const SELECTOR_ABSENT_SCORE: f64 = 0.50;

const ROLE_NAME_BASE: f64 = 0.60;
const ROLE_NAME_UNIQUENESS: f64 = 0.30;
const ROLE_NAME_DEPTH_DECAY: f64 = 0.03;
const ROLE_HINT_BONUS: f64 = 0.05;

/// Strategy trait for candidate generation
pub trait Strategy: Send + Sync {
    /// Produce candidates for the target. Confirmation is decided later by
    /// the resolver.
    fn candidates(&self, target: &TargetDescription, snapshot: &PageSnapshot)
        -> Vec<ScoredCandidate>;

    /// Get strategy type
    fn strategy_type(&self) -> LocatorStrategy;

    /// Get strategy name
    fn name(&self) -> &'static str {
        self.strategy_type().name()
    }
}

/// Score of a role+name match: unique shallow nodes score highest
pub fn role_name_score(matches: usize, depth: u32, role_hint_agrees: bool) -> f64 {
    let matches = matches.max(1) as f64;
    let base = (ROLE_NAME_BASE + ROLE_NAME_UNIQUENESS / matches)
        * (1.0 / (1.0 + ROLE_NAME_DEPTH_DECAY * depth as f64));
    let bonus = if role_hint_agrees { ROLE_HINT_BONUS } else { 0.0 };
    (base + bonus).min(1.0)
}

fn visible(snapshot: &PageSnapshot) -> impl Iterator<Item = &AxNode> {
    snapshot.nodes.iter().filter(|node| node.visible)
}

fn scored(locator: Locator, confidence: f64, node: &AxNode) -> ScoredCandidate {
    ScoredCandidate {
        candidate: LocatorCandidate::new(locator, confidence, CandidateSource::Declared),
        depth: node.depth,
        order: node.index,
        confirmed: false,
    }
}

/// Collapse candidates with the same selector into the one scored from the
/// shallowest, earliest node. Confidence and depth always describe the same
/// node.
fn collapse(candidates: Vec<ScoredCandidate>) -> Vec<ScoredCandidate> {
    let mut by_selector: HashMap<String, ScoredCandidate> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for candidate in candidates {
        let key = candidate.candidate.selector.clone();
        match by_selector.get_mut(&key) {
            Some(existing) => {
                if (candidate.depth, candidate.order) < (existing.depth, existing.order) {
                    *existing = candidate;
                }
            }
            None => {
                order.push(key.clone());
                by_selector.insert(key, candidate);
            }
        }
    }
    order
        .into_iter()
        .filter_map(|key| by_selector.remove(&key))
        .collect()
}

/// Node text (or accessible name) equals a description phrase
#[derive(Debug, Default)]
pub struct ExactTextStrategy;

impl Strategy for ExactTextStrategy {
    fn candidates(
        &self,
        target: &TargetDescription,
        snapshot: &PageSnapshot,
    ) -> Vec<ScoredCandidate> {
        let phrases = target.phrases();
        let found = visible(snapshot)
            .filter_map(|node| {
                let text = normalize(node.label_text());
                phrases
                    .iter()
                    .any(|(_, phrase)| *phrase == text)
                    .then(|| {
                        scored(
                            Locator::exact_text(node.label_text().trim()),
                            EXACT_TEXT_SCORE,
                            node,
                        )
                    })
            })
            .collect();
        collapse(found)
    }

    fn strategy_type(&self) -> LocatorStrategy {
        LocatorStrategy::ExactText
    }
}

/// aria-label attribute equals a description phrase
#[derive(Debug, Default)]
pub struct AriaLabelStrategy;

impl Strategy for AriaLabelStrategy {
    fn candidates(
        &self,
        target: &TargetDescription,
        snapshot: &PageSnapshot,
    ) -> Vec<ScoredCandidate> {
        let phrases = target.phrases();
        let found = visible(snapshot)
            .filter_map(|node| {
                let label = node.aria_label.as_deref()?;
                let normalized = normalize(label);
                phrases
                    .iter()
                    .any(|(_, phrase)| *phrase == normalized)
                    .then(|| scored(Locator::aria_label(label.trim()), ARIA_LABEL_SCORE, node))
            })
            .collect();
        collapse(found)
    }

    fn strategy_type(&self) -> LocatorStrategy {
        LocatorStrategy::AriaLabel
    }
}

/// placeholder attribute equals a description phrase
#[derive(Debug, Default)]
pub struct PlaceholderStrategy;

impl Strategy for PlaceholderStrategy {
    fn candidates(
        &self,
        target: &TargetDescription,
        snapshot: &PageSnapshot,
    ) -> Vec<ScoredCandidate> {
        let phrases = target.phrases();
        let found = visible(snapshot)
            .filter_map(|node| {
                let placeholder = node.placeholder.as_deref()?;
                let normalized = normalize(placeholder);
                phrases
                    .iter()
                    .any(|(_, phrase)| *phrase == normalized)
                    .then(|| {
                        scored(
                            Locator::placeholder(placeholder.trim()),
                            PLACEHOLDER_SCORE,
                            node,
                        )
                    })
            })
            .collect();
        collapse(found)
    }

    fn strategy_type(&self) -> LocatorStrategy {
        LocatorStrategy::Placeholder
    }
}

/// Node text contains the name phrase without being equal to it
#[derive(Debug, Default)]
pub struct PartialTextStrategy;

impl Strategy for PartialTextStrategy {
    fn candidates(
        &self,
        target: &TargetDescription,
        snapshot: &PageSnapshot,
    ) -> Vec<ScoredCandidate> {
        let phrase = target.normalized_name.as_str();
        if phrase.is_empty() {
            return Vec::new();
        }
        let locator = Locator::partial_text(target.name.trim());
        let found = visible(snapshot)
            .filter(|node| {
                let text = normalize(node.label_text());
                text != phrase && text != target.normalized && text.contains(phrase)
            })
            .map(|node| scored(locator.clone(), PARTIAL_TEXT_SCORE, node))
            .collect();
        collapse(found)
    }

    fn strategy_type(&self) -> LocatorStrategy {
        LocatorStrategy::PartialText
    }
}

/// Role + accessible name
#[derive(Debug, Default)]
pub struct RoleNameStrategy;

impl Strategy for RoleNameStrategy {
    fn candidates(
        &self,
        target: &TargetDescription,
        snapshot: &PageSnapshot,
    ) -> Vec<ScoredCandidate> {
        let phrases = target.phrases();
        let named: Vec<&AxNode> = visible(snapshot)
            .filter(|node| !node.role.trim().is_empty())
            .filter(|node| {
                let name = normalize(&node.name);
                phrases.iter().any(|(_, phrase)| *phrase == name)
            })
            .collect();

        let mut counts: HashMap<(String, String), usize> = HashMap::new();
        for node in &named {
            *counts
                .entry((node.role.to_lowercase(), normalize(&node.name)))
                .or_default() += 1;
        }

        let found = named
            .into_iter()
            .map(|node| {
                let key = (node.role.to_lowercase(), normalize(&node.name));
                let matches = counts.get(&key).copied().unwrap_or(1);
                let hint_agrees = target
                    .role_hint
                    .as_deref()
                    .map(|hint| hint.eq_ignore_ascii_case(&node.role))
                    .unwrap_or(false);
                scored(
                    Locator::role_name(&node.role, node.name.trim()),
                    role_name_score(matches, node.depth, hint_agrees),
                    node,
                )
            })
            .collect();
        collapse(found)
    }

    fn strategy_type(&self) -> LocatorStrategy {
        LocatorStrategy::RoleName
    }
}

/// Raw CSS or XPath description passed through as a selector
#[derive(Debug, Default)]
pub struct SelectorStrategy;

impl Strategy for SelectorStrategy {
    fn candidates(
        &self,
        target: &TargetDescription,
        snapshot: &PageSnapshot,
    ) -> Vec<ScoredCandidate> {
        let (locator, query) = match target.selector {
            Some(SelectorSyntax::Css) => (
                Locator::css(target.raw.clone()),
                LocatorQuery::Css(target.raw.clone()),
            ),
            Some(SelectorSyntax::Xpath) => (
                Locator::xpath(target.raw.clone()),
                LocatorQuery::XPath(target.raw.clone()),
            ),
            None => return Vec::new(),
        };

        match visible(snapshot).find(|node| node.matches(&query)) {
            Some(node) => vec![scored(locator, SELECTOR_PRESENT_SCORE, node)],
            // Unknown to the snapshot; the browser may still resolve it.
            None => vec![ScoredCandidate {
                candidate: LocatorCandidate::new(
                    locator,
                    SELECTOR_ABSENT_SCORE,
                    CandidateSource::Declared,
                ),
                depth: u32::MAX,
                order: usize::MAX,
                confirmed: false,
            }],
        }
    }

    /// Reported as css; xpath descriptions still yield xpath candidates
    fn strategy_type(&self) -> LocatorStrategy {
        LocatorStrategy::Css
    }
}

/// All built-in strategies
pub fn default_strategies() -> Vec<Box<dyn Strategy>> {
    vec![
        Box::new(ExactTextStrategy),
        Box::new(AriaLabelStrategy),
        Box::new(PlaceholderStrategy),
        Box::new(PartialTextStrategy),
        Box::new(RoleNameStrategy),
        Box::new(SelectorStrategy),
    ]
}
