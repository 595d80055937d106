//! Deterministic step fingerprints.
//!
//! A fingerprint is derived from `(step kind, target description, page URL
//! template)` and is the key of the locator cache as well as the correlation
//! key between steps, execution results and healing events.

use std::fmt;

use sha2::{Digest, Sha256};
use url::Url;

use crate::CoreError;

/// Placeholder used for volatile path segments in URL templates.
const ID_PLACEHOLDER: &str = ":id";

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(transparent))]
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct StepFingerprint(String);

impl StepFingerprint {
    /// Derive the fingerprint for a step executed on `page_url`.
    ///
    /// Target descriptions are compared case-insensitively with collapsed
    /// whitespace, so cosmetic edits to a plan do not orphan cached locators.
    pub fn derive(step_kind: &str, target_description: &str, page_url: &str) -> Self {
        let template = url_template(page_url);
        let description = normalize_description(target_description);

        let mut hasher = Sha256::new();
        hasher.update(step_kind.as_bytes());
        hasher.update([0u8]);
        hasher.update(description.as_bytes());
        hasher.update([0u8]);
        hasher.update(template.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Wrap an already computed fingerprint (e.g. read back from a trace).
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for log lines.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(12);
        &self.0[..end]
    }
}

impl fmt::Display for StepFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reduce a page URL to a template: query and fragment are dropped and
/// volatile path segments (numbers, UUIDs, long hex ids) become `:id`.
///
/// Inputs that do not parse as absolute URLs are returned trimmed and
/// lower-cased, which keeps `about:blank`-style pages stable.
pub fn url_template(page_url: &str) -> String {
    let trimmed = page_url.trim();
    let parsed = match parse_page_url(trimmed) {
        Ok(parsed) => parsed,
        Err(_) => return trimmed.to_ascii_lowercase(),
    };

    let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();
    let port = parsed
        .port()
        .map(|port| format!(":{port}"))
        .unwrap_or_default();

    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();

    let path = segments
        .iter()
        .map(|segment| {
            if is_volatile_segment(segment) {
                ID_PLACEHOLDER
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/");

    format!("{}://{}{}/{}", parsed.scheme(), host, port, path)
}

/// Parse a hierarchical page URL (`scheme://host/path`).
pub fn parse_page_url(page_url: &str) -> Result<Url, CoreError> {
    let parsed = Url::parse(page_url.trim()).map_err(|err| CoreError::InvalidUrl {
        url: page_url.to_string(),
        reason: err.to_string(),
    })?;
    if parsed.cannot_be_a_base() {
        return Err(CoreError::InvalidUrl {
            url: page_url.to_string(),
            reason: "not a hierarchical url".to_string(),
        });
    }
    Ok(parsed)
}

fn is_volatile_segment(segment: &str) -> bool {
    if segment.chars().all(|c| c.is_ascii_digit()) {
        return true;
    }
    if uuid::Uuid::parse_str(segment).is_ok() {
        return true;
    }
    segment.len() >= 16 && segment.chars().all(|c| c.is_ascii_hexdigit())
}

fn normalize_description(description: &str) -> String {
    description
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_deterministic() {
        let a = StepFingerprint::derive("click", "Login button", "https://app.test/login");
        let b = StepFingerprint::derive("click", "Login button", "https://app.test/login");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn fingerprint_ignores_query_and_cosmetic_whitespace() {
        let a = StepFingerprint::derive("click", "Login  button", "https://app.test/login?next=/a");
        let b = StepFingerprint::derive("click", "login button", "https://app.test/login#top");
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_distinguishes_step_kind() {
        let click = StepFingerprint::derive("click", "Email", "https://app.test/login");
        let fill = StepFingerprint::derive("fill", "Email", "https://app.test/login");
        assert_ne!(click, fill);
    }

    #[test]
    fn url_template_replaces_volatile_segments() {
        assert_eq!(
            url_template("https://Shop.test/orders/12345/items?page=2"),
            "https://shop.test/orders/:id/items"
        );
        assert_eq!(
            url_template("https://shop.test/u/3f2504e0-4f89-11d3-9a0c-0305e82c3301"),
            "https://shop.test/u/:id"
        );
        assert_eq!(url_template("about:blank"), "about:blank");
        assert_eq!(url_template("http://localhost:8080/"), "http://localhost:8080/");
    }

    #[test]
    fn opaque_urls_are_rejected_by_parser() {
        assert!(parse_page_url("https://app.test/login").is_ok());
        let err = parse_page_url("about:blank").unwrap_err();
        assert!(matches!(err, CoreError::InvalidUrl { .. }));
        assert!(parse_page_url("not a url").is_err());
    }
}
