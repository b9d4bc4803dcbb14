use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Text used in place of a digest when nothing in the run was worth keeping.
pub const NO_SIGNIFICANT_NEWS: &str = "No significant news in this run.";

/// Importance label assigned to each article by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Low,
    Medium,
    High,
}

impl Importance {
    pub fn as_str(self) -> &'static str {
        match self {
            Importance::Low => "low",
            Importance::Medium => "medium",
            Importance::High => "high",
        }
    }

    /// Medium and high articles are kept, persisted and digested.
    pub fn is_retained(self) -> bool {
        matches!(self, Importance::Medium | Importance::High)
    }
}

impl fmt::Display for Importance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown importance label `{0}`")]
pub struct UnknownImportance(pub String);

impl FromStr for Importance {
    type Err = UnknownImportance;

    /// Case-insensitive, tolerant of quotes and trailing punctuation. The CJK labels
    /// 低/中/高 are accepted as well.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cleaned = s
            .trim()
            .trim_matches(|c: char| c.is_whitespace() || "\"'`*.,:;!。".contains(c))
            .to_lowercase();

        match cleaned.as_str() {
            "low" | "低" => Ok(Importance::Low),
            "medium" | "med" | "中" => Ok(Importance::Medium),
            "high" | "高" => Ok(Importance::High),
            _ => Err(UnknownImportance(s.trim().to_string())),
        }
    }
}

/// An article as delivered by the news source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawArticle {
    pub title: String,
    pub content: String,
    pub url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

impl RawArticle {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            url: None,
            published_at: None,
        }
    }
}

/// What the classifier says about one article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub importance: Importance,
    pub summary: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// A raw article together with its classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleDecision {
    pub article: RawArticle,
    pub importance: Importance,
    pub summary: String,
    pub keywords: Vec<String>,
}

impl ArticleDecision {
    pub fn new(article: RawArticle, classification: Classification) -> Self {
        Self {
            article,
            importance: classification.importance,
            summary: classification.summary,
            keywords: classification.keywords,
        }
    }
}

/// Result of the digest step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "lowercase")]
pub enum Digest {
    /// Nothing was retained; the model was not consulted.
    Empty,
    Generated(String),
}

impl Digest {
    pub fn text(&self) -> &str {
        match self {
            Digest::Empty => NO_SIGNIFICANT_NEWS,
            Digest::Generated(text) => text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Article,
    Digest,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Article => "article",
            RecordKind::Digest => "digest",
        }
    }
}

/// A row of the `news` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredRecord {
    pub id: i64,
    pub kind: RecordKind,
    pub title: String,
    pub summary: String,
    pub importance: Importance,
    pub content: String,
    pub source_url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
