//! Core types for locator resolution

use action_primitives::{normalize, LocatorCandidate};
use serde::{Deserialize, Serialize};

/// Default confidence floor below which candidates are unconfirmed
pub const DEFAULT_CONFIDENCE_FLOOR: f64 = 0.7;

/// Trailing words that describe the element kind rather than its name,
/// mapped to the accessibility role they hint at.
const ROLE_WORDS: &[(&str, &str)] = &[
    ("button", "button"),
    ("link", "link"),
    ("field", "textbox"),
    ("input", "textbox"),
    ("textbox", "textbox"),
    ("checkbox", "checkbox"),
    ("dropdown", "combobox"),
    ("menu", "menu"),
    ("tab", "tab"),
    ("option", "option"),
    ("image", "img"),
    ("heading", "heading"),
];

/// Shape of a description that is itself a selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorSyntax {
    Css,
    Xpath,
}

/// Parsed free-text target description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDescription {
    /// Description as written, trimmed
    pub raw: String,
    /// Lower-cased, whitespace-collapsed description
    pub normalized: String,
    /// Name phrase with the trailing role word removed, original casing
    pub name: String,
    /// Normalized name phrase
    pub normalized_name: String,
    /// Role suggested by a trailing word such as "button" or "field"
    pub role_hint: Option<String>,
    /// Set when the description is a raw CSS or XPath selector
    pub selector: Option<SelectorSyntax>,
}

impl TargetDescription {
    pub fn parse(description: &str) -> Self {
        let raw = description.trim().to_string();
        let normalized = normalize(&raw);

        let selector = if raw.starts_with('/') || raw.starts_with("(/") {
            Some(SelectorSyntax::Xpath)
        } else if raw.starts_with('#') || raw.starts_with('.') || raw.starts_with('[') {
            Some(SelectorSyntax::Css)
        } else {
            None
        };

        let words: Vec<&str> = raw.split_whitespace().collect();
        let mut name = words.join(" ");
        let mut role_hint = None;
        if selector.is_none() && words.len() > 1 {
            if let Some(last) = words.last() {
                let last = last.to_lowercase();
                if let Some((_, role)) = ROLE_WORDS.iter().find(|(word, _)| *word == last) {
                    role_hint = Some(role.to_string());
                    name = words[..words.len() - 1].join(" ");
                }
            }
        }
        let normalized_name = normalize(&name);

        Self {
            raw,
            normalized,
            name,
            normalized_name,
            role_hint,
            selector,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.normalized.is_empty()
    }

    /// Distinct normalized phrases to match text against: the full
    /// description first, then the name phrase when a role word was split off.
    pub fn phrases(&self) -> Vec<(&str, &str)> {
        let mut phrases = vec![(self.raw.as_str(), self.normalized.as_str())];
        if self.normalized_name != self.normalized && !self.normalized_name.is_empty() {
            phrases.push((self.name.as_str(), self.normalized_name.as_str()));
        }
        phrases
    }
}

/// Candidate with the ranking data the resolver sorts by
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub candidate: LocatorCandidate,
    /// Depth of the shallowest matching node
    pub depth: u32,
    /// Document order of the first matching node
    pub order: usize,
    /// Confidence at or above the floor
    pub confirmed: bool,
}

/// Ranked output of one resolution
#[derive(Debug, Clone)]
pub struct Resolution {
    pub target: TargetDescription,
    /// Sorted by confidence desc, then depth asc, then document order
    pub candidates: Vec<ScoredCandidate>,
    pub floor: f64,
}

impl Resolution {
    /// Top confirmed candidate, else the top unconfirmed one
    pub fn best(&self) -> Option<&ScoredCandidate> {
        self.candidates
            .iter()
            .find(|scored| scored.confirmed)
            .or_else(|| self.candidates.first())
    }

    pub fn confirmed(&self) -> impl Iterator<Item = &ScoredCandidate> {
        self.candidates.iter().filter(|scored| scored.confirmed)
    }

    pub fn has_confirmed(&self) -> bool {
        self.candidates.iter().any(|scored| scored.confirmed)
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_trailing_role_word() {
        let target = TargetDescription::parse("  Login   Button ");
        assert_eq!(target.raw, "Login   Button");
        assert_eq!(target.normalized, "login button");
        assert_eq!(target.name, "Login");
        assert_eq!(target.role_hint.as_deref(), Some("button"));
        assert_eq!(target.phrases().len(), 2);
    }

    #[test]
    fn single_role_word_is_a_name() {
        let target = TargetDescription::parse("Menu");
        assert!(target.role_hint.is_none());
        assert_eq!(target.normalized_name, "menu");
        assert_eq!(target.phrases().len(), 1);
    }

    #[test]
    fn recognizes_selector_descriptions() {
        assert_eq!(
            TargetDescription::parse("#submit").selector,
            Some(SelectorSyntax::Css)
        );
        assert_eq!(
            TargetDescription::parse("//button[@type='submit']").selector,
            Some(SelectorSyntax::Xpath)
        );
        assert_eq!(TargetDescription::parse("Email field").selector, None);
    }
}
