use action_primitives::{
    AxNode, CandidateSource, DebugHandle, Locator, LocatorCandidate, LocatorStrategy,
    PageSnapshot,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::{HealRequest, HealingProvider};
use crate::errors::ProviderError;

const SYSTEM_PROMPT: &str = "You repair broken UI locators. You receive a step that failed, \
the locators that were already tried and the page's accessibility tree. Answer with one JSON \
object {\"strategy\": ..., \"selector\": ..., \"confidence\": ...}. strategy is one of \
exact-text, aria-label, placeholder, partial-text, role-name, css, xpath. Use \
text=\"Label\", [aria-label=\"Label\"], [placeholder=\"Hint\"], text=Label, \
role=button[name=\"Label\"], a CSS selector or an XPath expression as the selector. \
Answer {\"selector\": null} when no element fits. Never repeat a locator that already failed.";

const DEFAULT_CONFIDENCE: f64 = 0.8;

#[derive(Debug, Clone)]
pub struct OpenAiProviderConfig {
    pub api_keys: Vec<String>,
    pub model: String,
    pub api_base: String,
    pub temperature: f32,
    pub timeout: Duration,
    /// Browser agent that performs Tier-2 actions; Tier-2 is unsupported
    /// without one
    pub agent_endpoint: Option<String>,
    /// Accessibility nodes included in the prompt
    pub max_nodes: usize,
}

impl Default for OpenAiProviderConfig {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            model: "gpt-4o-mini".to_string(),
            api_base: "https://api.openai.com/v1".to_string(),
            temperature: 0.0,
            timeout: Duration::from_secs(60),
            agent_endpoint: None,
            max_nodes: 200,
        }
    }
}

/// Healing provider backed by an OpenAI-compatible chat completions API
pub struct OpenAiHealingProvider {
    client: Client,
    config: OpenAiProviderConfig,
}

impl OpenAiHealingProvider {
    pub fn new(config: OpenAiProviderConfig) -> Result<Self, ProviderError> {
        if config.api_keys.is_empty() {
            return Err(ProviderError::Rejected(
                "missing OpenAI API key for healing".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| {
                ProviderError::Unavailable(format!("failed to build HTTP client: {err}"))
            })?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &OpenAiProviderConfig {
        &self.config
    }

    async fn complete(&self, user_prompt: String) -> Result<String, ProviderError> {
        let url = format!(
            "{}/chat/completions",
            self.config.api_base.trim_end_matches('/')
        );

        let mut last_error: Option<ProviderError> = None;
        for (index, key) in self.config.api_keys.iter().enumerate() {
            let body = ChatCompletionRequest {
                model: self.config.model.clone(),
                temperature: self.config.temperature,
                response_format: ResponseFormat {
                    r#type: "json_object".to_string(),
                },
                messages: vec![
                    ChatMessage {
                        role: "system".to_string(),
                        content: SYSTEM_PROMPT.to_string(),
                    },
                    ChatMessage {
                        role: "user".to_string(),
                        content: user_prompt.clone(),
                    },
                ],
            };

            let response = match self
                .client
                .post(&url)
                .bearer_auth(key)
                .json(&body)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(err) if err.is_timeout() => {
                    return Err(ProviderError::Timeout(self.config.timeout.as_millis() as u64));
                }
                Err(err) => {
                    last_error = Some(ProviderError::Unavailable(format!(
                        "openai request failed: {err}"
                    )));
                    continue;
                }
            };

            if !response.status().is_success() {
                let status = response.status();
                let text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "<response unavailable>".to_string());
                if status.as_u16() == 429 && index + 1 < self.config.api_keys.len() {
                    let friendly = openai_rate_limit_message(&text);
                    warn!(
                        target: "openai",
                        message = %friendly,
                        attempt = index + 1,
                        remaining = self.config.api_keys.len() - index - 1,
                        "OpenAI rate limited healing request; switching API key"
                    );
                    last_error = Some(ProviderError::Unavailable(friendly));
                    continue;
                }
                if status.as_u16() == 429 {
                    return Err(ProviderError::Unavailable(openai_rate_limit_message(&text)));
                }
                return Err(ProviderError::Rejected(format!(
                    "openai returned {}: {}",
                    status, text
                )));
            }

            let response: ChatCompletionResponse = response.json().await.map_err(|err| {
                ProviderError::InvalidResponse(format!("openai response invalid: {err}"))
            })?;

            return response
                .choices
                .first()
                .and_then(|choice| choice.message.content.as_text())
                .ok_or_else(|| {
                    ProviderError::InvalidResponse("openai response missing content".to_string())
                });
        }

        Err(last_error.unwrap_or_else(|| {
            ProviderError::Unavailable("OpenAI request exhausted all API keys".to_string())
        }))
    }
}

#[async_trait]
impl HealingProvider for OpenAiHealingProvider {
    async fn suggest_locator(
        &self,
        snapshot: &PageSnapshot,
        request: &HealRequest,
    ) -> Result<Option<LocatorCandidate>, ProviderError> {
        let prompt = build_user_prompt(snapshot, request, self.config.max_nodes);
        let content = self.complete(prompt).await?;
        let suggestion = parse_suggestion(&content)?;
        debug!(
            step_id = %request.step.id,
            attempt = request.attempt,
            suggested = %suggestion.as_ref().map(|c| c.to_string()).unwrap_or_default(),
            "healing suggestion received"
        );
        Ok(suggestion)
    }

    async fn execute_action(
        &self,
        handle: &DebugHandle,
        request: &HealRequest,
    ) -> Result<bool, ProviderError> {
        let Some(endpoint) = self.config.agent_endpoint.as_deref() else {
            return Err(ProviderError::Unsupported(
                "no agent endpoint configured for direct actions".to_string(),
            ));
        };

        let body = AgentTaskRequest {
            task: request.task(),
            session_id: &handle.session_id,
            endpoint: handle.endpoint.as_deref(),
        };
        let response = self
            .client
            .post(endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    ProviderError::Timeout(self.config.timeout.as_millis() as u64)
                } else {
                    ProviderError::Unavailable(format!("agent request failed: {err}"))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<response unavailable>".to_string());
            return Err(ProviderError::Rejected(format!(
                "agent returned {}: {}",
                status, text
            )));
        }

        let outcome: AgentTaskResponse = response.json().await.map_err(|err| {
            ProviderError::InvalidResponse(format!("agent response invalid: {err}"))
        })?;
        if let Some(message) = outcome.message.as_deref() {
            debug!(step_id = %request.step.id, agent_message = message, "agent finished");
        }
        Ok(outcome.success)
    }

    fn name(&self) -> &str {
        "openai"
    }
}

fn build_user_prompt(snapshot: &PageSnapshot, request: &HealRequest, max_nodes: usize) -> String {
    let step = &request.step;
    let mut lines = vec![
        format!("Step: {} ({})", step.id, step.kind.name()),
        format!("Target: {}", step.target_description),
    ];
    if let Some(value) = &step.value {
        lines.push(format!("Value: {value}"));
    }
    lines.push(format!("Page: {} ({})", snapshot.url, snapshot.title));
    if let Some(kind) = request.last_error {
        lines.push(format!("Last error: {}", kind.name()));
    }
    if !request.failed_locators.is_empty() {
        lines.push("Already failed:".to_string());
        lines.extend(
            request
                .failed_locators
                .iter()
                .map(|candidate| format!("- {candidate}")),
        );
    }
    lines.push("Accessibility tree:".to_string());
    lines.extend(
        snapshot
            .nodes
            .iter()
            .filter(|node| node.visible)
            .take(max_nodes)
            .map(describe_node),
    );

    let mut prompt = lines.join("\n");
    prompt.push('\n');
    prompt
}

fn describe_node(node: &AxNode) -> String {
    let indent = "  ".repeat(node.depth as usize);
    let mut line = format!("{indent}- {} \"{}\"", node.role, node.name);
    if !node.text.is_empty() {
        line.push_str(&format!(" text=\"{}\"", node.text));
    }
    if let Some(label) = &node.aria_label {
        line.push_str(&format!(" aria-label=\"{label}\""));
    }
    if let Some(placeholder) = &node.placeholder {
        line.push_str(&format!(" placeholder=\"{placeholder}\""));
    }
    if let Some(css) = &node.css {
        line.push_str(&format!(" css=\"{css}\""));
    }
    line
}

#[derive(Debug, Deserialize)]
struct LocatorSuggestion {
    #[serde(default)]
    strategy: Option<String>,
    #[serde(default)]
    selector: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Parse the model's answer. A null or blank selector means no suggestion.
fn parse_suggestion(content: &str) -> Result<Option<LocatorCandidate>, ProviderError> {
    let json = extract_json_object(content).ok_or_else(|| {
        ProviderError::InvalidResponse("healing response missing JSON object".to_string())
    })?;
    let suggestion: LocatorSuggestion = serde_json::from_str(&json).map_err(|err| {
        ProviderError::InvalidResponse(format!("failed to parse healing JSON: {err}"))
    })?;

    let Some(selector) = suggestion
        .selector
        .map(|selector| selector.trim().to_string())
        .filter(|selector| !selector.is_empty())
    else {
        return Ok(None);
    };

    let strategy = match suggestion.strategy.as_deref() {
        Some(raw) => LocatorStrategy::parse(raw).ok_or_else(|| {
            ProviderError::InvalidResponse(format!("unknown locator strategy '{raw}'"))
        })?,
        None => infer_strategy(&selector),
    };

    Ok(Some(LocatorCandidate::new(
        Locator::new(strategy, selector),
        suggestion.confidence.unwrap_or(DEFAULT_CONFIDENCE),
        CandidateSource::HealedTier1,
    )))
}

fn infer_strategy(selector: &str) -> LocatorStrategy {
    if selector.starts_with('/') || selector.starts_with("(/") {
        LocatorStrategy::Xpath
    } else if selector.starts_with("text=\"") {
        LocatorStrategy::ExactText
    } else if selector.starts_with("text=") {
        LocatorStrategy::PartialText
    } else if selector.starts_with("role=") {
        LocatorStrategy::RoleName
    } else {
        LocatorStrategy::Css
    }
}

pub fn extract_json_object(raw: &str) -> Option<String> {
    if raw.trim_start().starts_with('{') {
        return Some(trim_symmetric(raw));
    }

    let fence = "```";
    if let Some(start) = raw.find(fence) {
        let after_fence = &raw[start + fence.len()..];
        let after_lang = after_fence.trim_start_matches(|c: char| c.is_alphanumeric() || c == '_');
        if let Some(end) = after_lang.find(fence) {
            let block = &after_lang[..end];
            if block.contains('{') {
                return Some(trim_symmetric(block));
            }
        }
    }

    raw.split('{').nth(1).and_then(|rest| {
        let mut depth = 1i32;
        for (idx, ch) in rest.char_indices() {
            match ch {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        let mut candidate = String::from("{");
                        candidate.push_str(&rest[..=idx]);
                        return Some(trim_symmetric(&candidate));
                    }
                }
                _ => {}
            }
        }
        None
    })
}

fn trim_symmetric(value: &str) -> String {
    value.trim().trim_matches('`').trim().to_string()
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    temperature: f32,
    response_format: ResponseFormat,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: String,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatCompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionMessage {
    content: ChatCompletionContent,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ChatCompletionContent {
    Text(String),
    Parts(Vec<ChatCompletionPart>),
}

impl ChatCompletionContent {
    fn as_text(&self) -> Option<String> {
        match self {
            ChatCompletionContent::Text(value) => Some(value.clone()),
            ChatCompletionContent::Parts(parts) => {
                let text = parts
                    .iter()
                    .filter_map(|part| part.text.as_ref())
                    .cloned()
                    .collect::<Vec<_>>()
                    .join("\n");
                if text.is_empty() {
                    None
                } else {
                    Some(text)
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
struct AgentTaskRequest<'a> {
    task: String,
    session_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    endpoint: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct AgentTaskResponse {
    success: bool,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorEnvelope {
    error: OpenAiErrorMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorMessage {
    message: Option<String>,
}

fn openai_rate_limit_message(raw: &str) -> String {
    if let Ok(envelope) = serde_json::from_str::<OpenAiErrorEnvelope>(raw) {
        if let Some(message) = envelope.error.message {
            return format!(
                "OpenAI rate limit exceeded: {}. Please retry later or configure a higher tier.",
                message.trim()
            );
        }
    }
    "OpenAI rate limit exceeded; please retry later or reduce usage.".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_primitives::{ActionStep, AxNode, HealingTier};

    fn request() -> HealRequest {
        let step = ActionStep::click("login", "Login button");
        HealRequest {
            fingerprint: step.fingerprint("https://app.test/login"),
            page_url: "https://app.test/login".into(),
            step,
            tier: HealingTier::Tier1,
            attempt: 1,
            failed_locators: vec![LocatorCandidate::declared(Locator::css("#login"))],
            last_error: None,
        }
    }

    #[test]
    fn parses_fenced_suggestion() {
        let content = "Sure:\n```json\n\
            {\"strategy\": \"css\", \"selector\": \"button.sign-in\", \"confidence\": 0.9}\n```";
        let candidate = parse_suggestion(content).unwrap().unwrap();
        assert_eq!(candidate.strategy, LocatorStrategy::Css);
        assert_eq!(candidate.selector, "button.sign-in");
        assert_eq!(candidate.source, CandidateSource::HealedTier1);
        assert!((candidate.confidence - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn null_selector_means_no_suggestion() {
        assert!(parse_suggestion(r#"{"selector": null}"#).unwrap().is_none());
    }

    #[test]
    fn missing_strategy_is_inferred() {
        let candidate = parse_suggestion(r#"{"selector": "role=button[name=\"Sign in\"]"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(candidate.strategy, LocatorStrategy::RoleName);
        assert!((candidate.confidence - DEFAULT_CONFIDENCE).abs() < f64::EPSILON);
    }

    #[test]
    fn prose_without_json_is_invalid() {
        assert!(matches!(
            parse_suggestion("I could not find it"),
            Err(ProviderError::InvalidResponse(_))
        ));
    }

    #[test]
    fn prompt_lists_failed_locators_and_nodes() {
        let snapshot = PageSnapshot::new(
            "https://app.test/login",
            "Login",
            vec![AxNode::new("button", "Sign in").with_css("button.sign-in")],
        );
        let prompt = build_user_prompt(&snapshot, &request(), 10);
        assert!(prompt.contains("- css:#login"));
        assert!(prompt.contains("button \"Sign in\" css=\"button.sign-in\"\n"));
        assert!(prompt.starts_with("Step: "));
    }

    #[test]
    fn rate_limit_message_uses_envelope() {
        let raw = r#"{"error": {"message": "Too many requests"}}"#;
        assert!(openai_rate_limit_message(raw).contains("Too many requests"));
    }

    #[tokio::test]
    async fn direct_action_without_agent_is_unsupported() {
        let provider = OpenAiHealingProvider::new(OpenAiProviderConfig {
            api_keys: vec!["sk-test".into()],
            ..Default::default()
        })
        .unwrap();
        let err = provider
            .execute_action(&DebugHandle::new("s-1", None), &request())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Unsupported(_)));
    }

    #[test]
    fn requires_api_key() {
        assert!(OpenAiHealingProvider::new(OpenAiProviderConfig::default()).is_err());
    }
}
