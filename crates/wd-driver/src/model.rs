//! Wire types of the W3C WebDriver protocol

use action_primitives::AxNode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key under which W3C drivers return element references
pub const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Every WebDriver response wraps its payload in `value`
#[derive(Debug, Deserialize)]
pub struct W3cResponse {
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Default, Deserialize)]
pub struct ErrorValue {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FindElementRequest {
    pub using: &'static str,
    pub value: String,
}

impl FindElementRequest {
    pub fn css(value: impl Into<String>) -> Self {
        Self {
            using: "css selector",
            value: value.into(),
        }
    }

    pub fn xpath(value: impl Into<String>) -> Self {
        Self {
            using: "xpath",
            value: value.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NavigateToUrlRequest<'a> {
    pub url: &'a str,
}

#[derive(Debug, Serialize)]
pub struct SendKeysRequest<'a> {
    pub text: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ExecuteScriptRequest<'a> {
    pub script: &'a str,
    pub args: Vec<Value>,
}

/// Result of the injected snapshot script
#[derive(Debug, Deserialize)]
pub struct RawSnapshot {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub nodes: Vec<AxNode>,
}

/// Pull the element id out of a find-element payload
pub fn element_id(value: &Value) -> Option<String> {
    value
        .get(ELEMENT_KEY)
        .or_else(|| value.get("ELEMENT"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_w3c_and_legacy_element_ids() {
        assert_eq!(
            element_id(&json!({ "element-6066-11e4-a52e-4f735466cecf": "abc" })).as_deref(),
            Some("abc")
        );
        assert_eq!(element_id(&json!({ "ELEMENT": "old" })).as_deref(), Some("old"));
        assert_eq!(element_id(&json!({})), None);
    }
}
