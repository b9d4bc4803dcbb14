use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Core trait for LLM providers
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate completion for a given prompt
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse>;

    /// Model identifier sent with every request
    fn model(&self) -> &str;
}

/// Request structure for LLM generation
#[derive(Debug, Clone, Default)]
pub struct LlmRequest {
    /// Optional system instructions, sent ahead of the prompt
    pub system: Option<String>,
    pub prompt: String,
    pub max_tokens: Option<usize>,
    pub temperature: Option<f32>,
    pub timeout_seconds: Option<u64>,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }
}

/// Response from LLM generation
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub usage: UsageMetadata,
    pub model: String,
}

/// Token usage metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageMetadata {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

pub mod remote;
pub mod summarizer;

/// Helper to extract JSON from text that might contain markdown backticks or preamble
pub fn extract_json_from_text(text: &str) -> Option<String> {
    // 1. Try to find content between ```json and ```
    if let Some(start) = text.find("```json") {
        let rest = &text[start + 7..];
        if let Some(end) = rest.find("```") {
            return Some(rest[..end].trim().to_string());
        }
    }

    // 2. Try to find content between ``` and ```
    if let Some(start) = text.find("```") {
        let rest = &text[start + 3..];
        if let Some(end) = rest.find("```") {
            let inner = rest[..end].trim();
            if inner.starts_with('{') {
                return Some(inner.to_string());
            }
        }
    }

    // 3. Try to find the first '{' and last '}'
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            return Some(text[start..=end].to_string());
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_fenced_json() {
        let text = "Sure!\n```json\n{\"importance\": \"high\"}\n```\nDone.";
        assert_eq!(
            extract_json_from_text(text).as_deref(),
            Some("{\"importance\": \"high\"}")
        );
    }

    #[test]
    fn extracts_bare_object_with_preamble() {
        let text = "Here you go: {\"a\": {\"b\": 1}} trailing";
        assert_eq!(extract_json_from_text(text).as_deref(), Some("{\"a\": {\"b\": 1}}"));
    }

    #[test]
    fn no_json_yields_none() {
        assert_eq!(extract_json_from_text("high\nSomething happened"), None);
        assert_eq!(extract_json_from_text("} backwards {"), None);
    }
}
