use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::digest::build_digest_prompt;
use crate::error::AnalysisError;
use crate::llm::summarizer::{extractive_summary, truncate};
use crate::llm::{extract_json_from_text, LlmProvider, LlmRequest};
use crate::models::{ArticleDecision, Classification, Digest, Importance, RawArticle};

/// System instructions for the per-article importance classifier.
pub const CLASSIFY_SYSTEM_PROMPT: &str = r#"You are an importance classifier for a financial news desk covering crypto and US equities.
Judge how strongly the article can move markets.

HIGH - likely to cause major market moves:
- decisions by the SEC, CFTC, Fed or other major regulators (rates, frameworks, enforcement)
- large institutions (> $1B) entering or leaving crypto/equities; major ETF approvals, rejections or flows (> $500M)
- major protocol upgrades, forks or security incidents of leading coins; collapse, hack or sanction of a major exchange
- BTC/ETH daily moves > 15% or record highs/lows; S&P 500 or Nasdaq daily moves > 3%
- macro surprises (inflation, jobs, GDP), geopolitical shocks, systemic financial risk

MEDIUM - may move a sector or short-term sentiment:
- strategy changes of mid-sized institutions ($100M-$1B); regional regulatory guidance
- notable updates or partnerships of top-10 coins or well-known listed companies
- important launches in DeFi, Web3, AI or clean energy; market comments by prominent figures
- single-company earnings surprises; 5-15% moves of major assets

LOW - limited market impact:
- routine project updates, generic analysis or price predictions, meme coins
- routine corporate news, moves under 5%, news unrelated to financial markets

Reply with JSON only, no prose:
{"importance": "high|medium|low", "summary": "at most 3 sentences on the likely market impact (may be empty for low)", "keywords": "3-5 comma-separated keywords (may be empty for low)"}"#;

/// Classification and digest operations, stateless per call.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Label one article and summarize it.
    async fn classify_and_summarize(&self, article: &RawArticle) -> Result<Classification, AnalysisError>;

    /// Produce one digest from the retained articles. An empty input never reaches the model.
    async fn digest(&self, retained: &[ArticleDecision]) -> Result<Digest, AnalysisError>;
}

/// `Analyzer` backed by an LLM provider.
pub struct LlmAnalyzer {
    provider: Arc<dyn LlmProvider>,
    max_tokens: usize,
    temperature: f32,
    max_content_chars: usize,
}

impl LlmAnalyzer {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            max_tokens: 800,
            temperature: 0.0,
            max_content_chars: 4000,
        }
    }

    pub fn from_config(provider: Arc<dyn LlmProvider>, config: &common::LlmConfig) -> Self {
        Self {
            provider,
            max_tokens: config.max_tokens(),
            temperature: config.temperature(),
            max_content_chars: config.max_content_chars(),
        }
    }

    fn request(&self, system: Option<&str>, prompt: String) -> LlmRequest {
        LlmRequest {
            system: system.map(str::to_string),
            prompt,
            max_tokens: Some(self.max_tokens),
            temperature: Some(self.temperature),
            timeout_seconds: None,
        }
    }
}

#[async_trait]
impl Analyzer for LlmAnalyzer {
    async fn classify_and_summarize(&self, article: &RawArticle) -> Result<Classification, AnalysisError> {
        if article.title.trim().is_empty() {
            return Err(AnalysisError::InvalidInput("empty title".to_string()));
        }
        if article.content.trim().is_empty() {
            return Err(AnalysisError::InvalidInput("empty content".to_string()));
        }

        let prompt = build_classification_prompt(article, self.max_content_chars);
        let response = self
            .provider
            .generate(self.request(Some(CLASSIFY_SYSTEM_PROMPT), prompt))
            .await
            .map_err(AnalysisError::provider)?;

        debug!(
            model = %response.model,
            tokens = response.usage.total_tokens,
            "classification reply received"
        );
        parse_classification(&response.content, &article.content)
    }

    async fn digest(&self, retained: &[ArticleDecision]) -> Result<Digest, AnalysisError> {
        if retained.is_empty() {
            return Ok(Digest::Empty);
        }

        let response = self
            .provider
            .generate(self.request(None, build_digest_prompt(retained)))
            .await
            .map_err(AnalysisError::provider)?;

        let text = response.content.trim();
        if text.is_empty() {
            return Err(AnalysisError::Malformed("model returned an empty digest".to_string()));
        }
        debug!(tokens = response.usage.total_tokens, "digest generated");
        Ok(Digest::Generated(text.to_string()))
    }
}

pub fn build_classification_prompt(article: &RawArticle, max_content_chars: usize) -> String {
    format!(
        "Title: {}\n\nContent:\n{}",
        article.title.trim(),
        prepare_content(&article.content, max_content_chars)
    )
}

/// Strip HTML when the content looks like markup, then cap its length.
fn prepare_content(content: &str, max_chars: usize) -> String {
    let looks_like_html = content.contains("</") || content.contains("<br") || content.contains("<p>");
    let text = if looks_like_html {
        html2text::from_read(content.as_bytes(), 120).unwrap_or_else(|_| content.to_string())
    } else {
        content.to_string()
    };
    truncate(text.trim(), max_chars)
}

#[derive(Debug, Deserialize)]
struct ClassificationJson {
    importance: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    keywords: Option<Value>,
}

/// Parse the classifier reply. JSON is expected; a reply whose first line is a bare
/// label (the rest being the summary) is accepted too, including when braces in the
/// prose look like JSON but are not.
pub fn parse_classification(reply: &str, content: &str) -> Result<Classification, AnalysisError> {
    let parsed = match extract_json_from_text(reply) {
        Some(json) => match serde_json::from_str::<ClassificationJson>(&json) {
            Ok(parsed) => Ok(parsed),
            Err(e) => Err(format!("{} in `{}`", e, truncate(&json, 120))),
        },
        None => Err("no JSON object in reply".to_string()),
    };

    let (importance, summary, keywords) = match parsed {
        Ok(parsed) => (
            parse_label(&parsed.importance)?,
            parsed.summary.unwrap_or_default(),
            parsed.keywords.map(split_keywords).unwrap_or_default(),
        ),
        Err(json_error) => {
            let (importance, summary) = parse_bare_label(reply).map_err(|e| {
                debug!("reply is neither JSON ({}) nor a bare label", json_error);
                e
            })?;
            (importance, summary, Vec::new())
        }
    };

    let summary = match summary.trim() {
        "" => extractive_summary(content),
        s => s.to_string(),
    };

    Ok(Classification {
        importance,
        summary,
        keywords,
    })
}

/// First line is the label (optionally `Importance: high`), the rest the summary.
fn parse_bare_label(reply: &str) -> Result<(Importance, String), AnalysisError> {
    let mut lines = reply.trim().lines();
    let label = lines.next().unwrap_or_default();
    let label = label.rsplit(':').next().unwrap_or(label);
    let rest: Vec<&str> = lines.map(str::trim).filter(|l| !l.is_empty()).collect();
    Ok((parse_label(label)?, rest.join(" ")))
}

fn parse_label(label: &str) -> Result<Importance, AnalysisError> {
    label
        .parse::<Importance>()
        .map_err(|e| AnalysisError::Malformed(e.to_string()))
}

fn split_keywords(value: Value) -> Vec<String> {
    match value {
        Value::String(s) => s
            .split([',', '，', ';', '、'])
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect(),
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(|s| s.trim().to_string()))
            .filter(|k| !k.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}
