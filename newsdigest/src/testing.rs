//! In-memory collaborators for pipeline and scheduler tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

use crate::error::{AnalysisError, FetchError, StoreError};
use crate::ingestion::NewsSource;
use crate::models::{ArticleDecision, Classification, Digest, Importance, RawArticle, RecordKind};
use crate::processing::Analyzer;
use crate::storage::ArticleStore;

/// Article whose content starts with the importance the fake analyzer will assign.
pub fn article(title: &str, importance: &str) -> RawArticle {
    RawArticle::new(title, format!("{} news about {}", importance, title))
}

#[derive(Default)]
pub struct FakeSource {
    pub articles: Vec<RawArticle>,
    pub fail: bool,
    /// When set, each fetch waits for a permit before returning
    pub gate: Option<Arc<Semaphore>>,
    pub calls: AtomicUsize,
}

impl FakeSource {
    pub fn with(articles: Vec<RawArticle>) -> Self {
        Self {
            articles,
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NewsSource for FakeSource {
    fn name(&self) -> &str {
        "fake"
    }

    async fn fetch(&self) -> Result<Vec<RawArticle>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        if self.fail {
            return Err(FetchError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(self.articles.clone())
    }
}

/// Reads the importance from the first word of the content. Titles listed in
/// `fail_titles` fail with a provider error.
#[derive(Default)]
pub struct FakeAnalyzer {
    pub fail_titles: Vec<String>,
    pub fail_digest: bool,
    pub classified: Mutex<Vec<String>>,
    pub digest_inputs: Mutex<Vec<Vec<String>>>,
}

#[async_trait]
impl Analyzer for FakeAnalyzer {
    async fn classify_and_summarize(&self, article: &RawArticle) -> Result<Classification, AnalysisError> {
        self.classified.lock().unwrap().push(article.title.clone());
        if self.fail_titles.contains(&article.title) {
            return Err(AnalysisError::Provider("model unavailable".to_string()));
        }
        let label = article.content.split_whitespace().next().unwrap_or_default();
        let importance: Importance = label
            .parse()
            .map_err(|_| AnalysisError::Malformed(label.to_string()))?;
        Ok(Classification {
            importance,
            summary: format!("summary of {}", article.title),
            keywords: vec![],
        })
    }

    async fn digest(&self, retained: &[ArticleDecision]) -> Result<Digest, AnalysisError> {
        self.digest_inputs
            .lock()
            .unwrap()
            .push(retained.iter().map(|d| d.article.title.clone()).collect());
        if self.fail_digest {
            return Err(AnalysisError::Provider("digest model unavailable".to_string()));
        }
        if retained.is_empty() {
            return Ok(Digest::Empty);
        }
        Ok(Digest::Generated(format!("digest of {} articles", retained.len())))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SavedRecord {
    pub kind: RecordKind,
    pub title: String,
    pub importance: Option<Importance>,
    pub content: String,
}

#[derive(Default)]
pub struct MemoryStore {
    pub fail_titles: Vec<String>,
    pub fail_digest: bool,
    pub records: Mutex<Vec<SavedRecord>>,
    pub attempts: AtomicUsize,
}

impl MemoryStore {
    pub fn records(&self) -> Vec<SavedRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn push(&self, record: SavedRecord) -> i64 {
        let mut records = self.records.lock().unwrap();
        records.push(record);
        records.len() as i64
    }
}

#[async_trait]
impl ArticleStore for MemoryStore {
    async fn save_article(&self, decision: &ArticleDecision) -> Result<i64, StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_titles.contains(&decision.article.title) {
            return Err(StoreError::InvalidRecord("rejected by test".to_string()));
        }
        Ok(self.push(SavedRecord {
            kind: RecordKind::Article,
            title: decision.article.title.clone(),
            importance: Some(decision.importance),
            content: decision.article.content.clone(),
        }))
    }

    async fn save_digest(&self, text: &str, article_count: usize) -> Result<i64, StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_digest {
            return Err(StoreError::InvalidRecord("digest rejected by test".to_string()));
        }
        Ok(self.push(SavedRecord {
            kind: RecordKind::Digest,
            title: format!("digest for {}", article_count),
            importance: Some(Importance::High),
            content: text.to_string(),
        }))
    }
}
