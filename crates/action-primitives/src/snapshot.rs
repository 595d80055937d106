//! Accessibility-tree page snapshots

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Locator, LocatorQuery};

fn default_visible() -> bool {
    true
}

/// One node of the accessibility tree, flattened in document order
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AxNode {
    /// Document-order position, assigned by [`PageSnapshot::new`]
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub role: String,
    /// Accessible name
    #[serde(default)]
    pub name: String,
    /// Visible text content
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aria_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    /// Distance from the document root
    #[serde(default)]
    pub depth: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dom_id: Option<String>,
    /// Unique CSS path for the node, when the source can compute one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xpath: Option<String>,
    #[serde(default = "default_visible")]
    pub visible: bool,
    /// Current form value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Fixture-only: clicking this node loads the given URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigates_to: Option<String>,
}

impl AxNode {
    pub fn new(role: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            name: name.into(),
            visible: true,
            ..Self::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_aria_label(mut self, label: impl Into<String>) -> Self {
        self.aria_label = Some(label.into());
        self
    }

    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_css(mut self, css: impl Into<String>) -> Self {
        self.css = Some(css.into());
        self
    }

    pub fn with_dom_id(mut self, id: impl Into<String>) -> Self {
        self.dom_id = Some(id.into());
        self
    }

    pub fn with_navigation(mut self, url: impl Into<String>) -> Self {
        self.navigates_to = Some(url.into());
        self
    }

    /// Visible text, falling back to the accessible name
    pub fn label_text(&self) -> &str {
        if self.text.trim().is_empty() {
            &self.name
        } else {
            &self.text
        }
    }

    /// Whether this node satisfies the query
    pub fn matches(&self, query: &LocatorQuery) -> bool {
        match query {
            LocatorQuery::Text { value, exact } => {
                let wanted = normalize(value);
                if wanted.is_empty() {
                    return false;
                }
                [self.text.as_str(), self.name.as_str()]
                    .iter()
                    .map(|candidate| normalize(candidate))
                    .any(|candidate| {
                        if *exact {
                            candidate == wanted
                        } else {
                            candidate.contains(&wanted)
                        }
                    })
            }
            LocatorQuery::Attribute { name, value } => {
                let attribute = match *name {
                    "aria-label" => self.aria_label.as_deref(),
                    "placeholder" => self.placeholder.as_deref(),
                    _ => None,
                };
                attribute
                    .map(|actual| normalize(actual) == normalize(value))
                    .unwrap_or(false)
            }
            LocatorQuery::Role { role, name } => {
                if !self.role.eq_ignore_ascii_case(role) {
                    return false;
                }
                match name {
                    Some(name) => normalize(&self.name) == normalize(name),
                    None => true,
                }
            }
            LocatorQuery::Css(selector) => {
                let selector = selector.trim();
                if self.css.as_deref().map(str::trim) == Some(selector) {
                    return true;
                }
                match (selector.strip_prefix('#'), self.dom_id.as_deref()) {
                    (Some(id), Some(dom_id)) => id == dom_id,
                    _ => false,
                }
            }
            LocatorQuery::XPath(selector) => {
                self.xpath.as_deref().map(str::trim) == Some(selector.trim())
            }
        }
    }
}

/// Lower-case and collapse whitespace
pub fn normalize(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Structured view of a page at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub nodes: Vec<AxNode>,
    #[serde(default = "Utc::now")]
    pub captured_at: DateTime<Utc>,
}

impl PageSnapshot {
    /// Build a snapshot; node indices are renumbered in document order
    pub fn new(url: impl Into<String>, title: impl Into<String>, nodes: Vec<AxNode>) -> Self {
        let mut snapshot = Self {
            url: url.into(),
            title: title.into(),
            nodes,
            captured_at: Utc::now(),
        };
        snapshot.reindex();
        snapshot
    }

    pub fn reindex(&mut self) {
        for (index, node) in self.nodes.iter_mut().enumerate() {
            node.index = index;
        }
    }

    /// Visible nodes matching the locator, in document order
    pub fn find(&self, locator: &Locator) -> Vec<&AxNode> {
        let query = locator.query();
        self.nodes
            .iter()
            .filter(|node| node.visible && node.matches(&query))
            .collect()
    }

    /// First visible node matching the locator
    pub fn first(&self, locator: &Locator) -> Option<&AxNode> {
        self.find(locator).into_iter().next()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
