//! Offline provider that replays canned judgments.
//!
//! Rules are matched in order against the concatenated message text; the
//! first rule whose `contains` substring appears wins.
//!
//! ## Configuration Format
//! ```json
//! {
//!   "rules": [
//!     {"contains": "gender bias", "response": {"bias_score": 0.1}},
//!     {"contains": "Evaluate the accuracy", "response": "{\"score\": 0.9}"}
//!   ],
//!   "default": {"score": 0.5},
//!   "file": "judgments.json"
//! }
//! ```
//!
//! `file`, when present, is read as a JSON object of the same shape and its
//! rules are appended after the inline ones.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use super::{
    factory::ProviderFactory, ChatMessage, CompletionConfig, CompletionResponse, LlmProvider,
    ProviderError, TokenUsage,
};

#[derive(Debug, Clone, Deserialize)]
struct FixtureRule {
    contains: String,
    response: JsonValue,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FixtureConfig {
    #[serde(default)]
    rules: Vec<FixtureRule>,
    #[serde(default)]
    default: Option<JsonValue>,
    #[serde(default)]
    file: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FixtureProvider {
    rules: Vec<(String, String)>,
    default: Option<String>,
}

impl FixtureProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with `response` when the prompt contains `needle`.
    pub fn with_rule(mut self, needle: impl Into<String>, response: impl Into<JsonValue>) -> Self {
        self.rules.push((needle.into(), render(&response.into())));
        self
    }

    pub fn with_default(mut self, response: impl Into<JsonValue>) -> Self {
        self.default = Some(render(&response.into()));
        self
    }

    pub fn from_config(config: &JsonValue) -> Result<Self, ProviderError> {
        let parsed: FixtureConfig =
            serde_json::from_value(config.clone()).map_err(|e| ProviderError::NotConfigured(e.to_string()))?;

        let mut provider = Self::new();
        for rule in parsed.rules {
            provider = provider.with_rule(rule.contains, rule.response);
        }
        if let Some(default) = parsed.default {
            provider = provider.with_default(default);
        }

        if let Some(path) = parsed.file {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ProviderError::NotConfigured(format!("cannot read fixture file '{}': {}", path, e)))?;
            let from_file: FixtureConfig =
                serde_json::from_str(&text).map_err(|e| ProviderError::NotConfigured(e.to_string()))?;
            for rule in from_file.rules {
                provider = provider.with_rule(rule.contains, rule.response);
            }
            if provider.default.is_none() {
                provider.default = from_file.default.as_ref().map(render);
            }
        }

        Ok(provider)
    }
}

fn render(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl LlmProvider for FixtureProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let prompt = messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let content = self
            .rules
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, response)| response.clone())
            .or_else(|| self.default.clone())
            .ok_or_else(|| ProviderError::ApiError {
                status: 404,
                message: "no fixture matches this prompt".to_string(),
            })?;

        Ok(CompletionResponse {
            usage: TokenUsage {
                prompt_tokens: self.estimate_tokens(&prompt),
                completion_tokens: self.estimate_tokens(&content),
                cached_prompt_tokens: 0,
            },
            content,
            model: config.model.clone(),
            stop_reason: Some("stop".to_string()),
        })
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "fixture"
    }
}

pub struct FixtureProviderFactory;

impl ProviderFactory for FixtureProviderFactory {
    fn name(&self) -> &'static str {
        "fixture"
    }

    fn create(&self, settings: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        Ok(Arc::new(FixtureProvider::from_config(settings)?))
    }

    fn check(&self, settings: &JsonValue) -> Result<(), ProviderError> {
        serde_json::from_value::<FixtureConfig>(settings.clone())
            .map(|_| ())
            .map_err(|e| ProviderError::NotConfigured(e.to_string()))
    }

    fn example_settings(&self) -> JsonValue {
        serde_json::json!({"rules": [], "default": {"score": 0.5, "confidence": 0.5}})
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_first_matching_rule_wins() {
        let provider = FixtureProvider::new()
            .with_rule("bias", json!({"bias_score": 0.1}))
            .with_rule("b", json!({"score": 0.2}));
        let response = provider
            .complete(vec![ChatMessage::user("analyze bias")], &CompletionConfig::default())
            .await
            .unwrap();
        assert_eq!(response.content, r#"{"bias_score":0.1}"#);
    }

    #[tokio::test]
    async fn test_no_match_without_default_errors() {
        let provider = FixtureProvider::new();
        let result = provider
            .complete(vec![ChatMessage::user("hello")], &CompletionConfig::default())
            .await;
        assert!(matches!(result, Err(ProviderError::ApiError { status: 404, .. })));
    }

    #[tokio::test]
    async fn test_from_config() {
        let provider = FixtureProvider::from_config(&json!({
            "rules": [{"contains": "table", "response": "{\"score\": 0.9}"}],
            "default": {"score": 0.5}
        }))
        .unwrap();
        let hit = provider
            .complete(vec![ChatMessage::user("a table")], &CompletionConfig::default())
            .await
            .unwrap();
        assert_eq!(hit.content, r#"{"score": 0.9}"#);
        let miss = provider
            .complete(vec![ChatMessage::user("a metric")], &CompletionConfig::default())
            .await
            .unwrap();
        assert_eq!(miss.content, r#"{"score":0.5}"#);
    }

    #[test]
    fn test_factory_validates_shape() {
        let factory = FixtureProviderFactory;
        assert!(factory.check(&json!({"rules": [{"contains": "x", "response": 1}]})).is_ok());
        assert!(factory.check(&json!({"rules": "nope"})).is_err());
    }
}
