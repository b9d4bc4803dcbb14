//! One run of the news workflow:
//! `Start -> Fetched -> Analyzed -> Filtered -> Digested -> Persisted -> Done`,
//! or `Start -> Aborted` when the fetch fails.
//!
//! Only the fetch is fatal. Analysis and store failures are caught where they happen,
//! logged with the article and stage, and counted in the [`RunReport`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::FetchError;
use crate::filter::retain_important;
use crate::ingestion::NewsSource;
use crate::llm::summarizer::truncate;
use crate::models::{ArticleDecision, Digest, RawArticle};
use crate::processing::Analyzer;
use crate::storage::ArticleStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Start,
    Fetched,
    Analyzed,
    Filtered,
    Digested,
    Persisted,
    Done,
    Aborted,
}

impl RunState {
    /// The successor on the success path. Terminal states have none.
    pub fn next(self) -> Option<RunState> {
        match self {
            RunState::Start => Some(RunState::Fetched),
            RunState::Fetched => Some(RunState::Analyzed),
            RunState::Analyzed => Some(RunState::Filtered),
            RunState::Filtered => Some(RunState::Digested),
            RunState::Digested => Some(RunState::Persisted),
            RunState::Persisted => Some(RunState::Done),
            RunState::Done | RunState::Aborted => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Fetch,
    Analyze,
    Digest,
    Persist,
}

/// A non-fatal failure recorded during a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageFailure {
    pub stage: Stage,
    /// Article title, or "digest"
    pub subject: String,
    pub message: String,
}

/// Structured outcome of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: i64,
    pub state: RunState,
    pub fetched: usize,
    pub analyzed_ok: usize,
    pub analyzed_failed: usize,
    pub retained: usize,
    /// Article saves only; the digest save is reported by `digest_saved`
    pub saved_ok: usize,
    pub saved_failed: usize,
    pub digest_saved: bool,
    pub digest: Option<String>,
    pub fetch_error: Option<String>,
    pub failures: Vec<StageFailure>,
}

impl RunReport {
    fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: 0,
            state: RunState::Start,
            fetched: 0,
            analyzed_ok: 0,
            analyzed_failed: 0,
            retained: 0,
            saved_ok: 0,
            saved_failed: 0,
            digest_saved: false,
            digest: None,
            fetch_error: None,
            failures: Vec::new(),
        }
    }

    /// Only `Done` counts as success, partial failures included.
    pub fn is_success(&self) -> bool {
        self.state == RunState::Done
    }

    fn advance(&mut self, to: RunState) {
        debug_assert_eq!(self.state.next(), Some(to), "illegal transition from {:?}", self.state);
        self.state = to;
    }

    fn record(&mut self, stage: Stage, subject: impl Into<String>, message: impl ToString) {
        self.failures.push(StageFailure {
            stage,
            subject: subject.into(),
            message: message.to_string(),
        });
    }

    fn abort(&mut self, err: &FetchError) {
        debug_assert_eq!(self.state, RunState::Start);
        self.fetch_error = Some(err.to_string());
        self.record(Stage::Fetch, "source", err);
        self.state = RunState::Aborted;
        self.close();
    }

    fn finish(&mut self) {
        self.advance(RunState::Done);
        self.close();
    }

    fn close(&mut self) {
        let now = Utc::now();
        self.duration_ms = (now - self.started_at).num_milliseconds();
        self.finished_at = Some(now);
    }
}

/// Fetch, classify, filter, digest and persist, strictly in sequence.
pub struct Pipeline {
    source: Arc<dyn NewsSource>,
    analyzer: Arc<dyn Analyzer>,
    store: Arc<dyn ArticleStore>,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn NewsSource>,
        analyzer: Arc<dyn Analyzer>,
        store: Arc<dyn ArticleStore>,
    ) -> Self {
        Self {
            source,
            analyzer,
            store,
        }
    }

    /// Execute one complete run. Never fails: every outcome, including an aborted
    /// fetch, is described by the returned report.
    pub async fn run(&self) -> RunReport {
        let run_id = Uuid::new_v4();
        self.execute(run_id)
            .instrument(info_span!("run", %run_id))
            .await
    }

    async fn execute(&self, run_id: Uuid) -> RunReport {
        let mut report = RunReport::new(run_id);
        info!("Run started, fetching from {}", self.source.name());

        let articles = match self.source.fetch().await {
            Ok(articles) => articles,
            Err(e) => {
                error!(%e, "fetch failed, aborting run");
                report.abort(&e);
                return report;
            }
        };
        report.fetched = articles.len();
        report.advance(RunState::Fetched);

        let decisions = self.analyze(articles, &mut report).await;
        report.advance(RunState::Analyzed);

        let retained = retain_important(&decisions);
        report.retained = retained.len();
        info!("{} of {} analyzed articles retained", retained.len(), decisions.len());
        report.advance(RunState::Filtered);

        let digest = self.summarize(&retained, &mut report).await;
        report.advance(RunState::Digested);

        self.persist(&retained, digest.as_ref(), &mut report).await;
        report.advance(RunState::Persisted);

        report.finish();
        info!(
            fetched = report.fetched,
            analyzed_ok = report.analyzed_ok,
            analyzed_failed = report.analyzed_failed,
            retained = report.retained,
            saved_ok = report.saved_ok,
            saved_failed = report.saved_failed,
            digest_saved = report.digest_saved,
            duration_ms = report.duration_ms,
            "Run finished"
        );
        report
    }

    async fn analyze(&self, articles: Vec<RawArticle>, report: &mut RunReport) -> Vec<ArticleDecision> {
        let total = articles.len();
        let mut decisions = Vec::with_capacity(total);

        for (i, article) in articles.into_iter().enumerate() {
            info!("Analyzing article {}/{}: {}", i + 1, total, truncate(&article.title, 60));
            match self.analyzer.classify_and_summarize(&article).await {
                Ok(classification) => {
                    report.analyzed_ok += 1;
                    decisions.push(ArticleDecision::new(article, classification));
                }
                Err(e) => {
                    warn!(stage = "analyze", title = %article.title, "classification failed: {}", e);
                    report.analyzed_failed += 1;
                    report.record(Stage::Analyze, article.title, e);
                }
            }
        }

        decisions
    }

    async fn summarize(&self, retained: &[ArticleDecision], report: &mut RunReport) -> Option<Digest> {
        match self.analyzer.digest(retained).await {
            Ok(digest) => {
                report.digest = Some(digest.text().to_string());
                Some(digest)
            }
            Err(e) => {
                warn!(stage = "digest", "digest generation failed: {}", e);
                report.record(Stage::Digest, "digest", e);
                None
            }
        }
    }

    async fn persist(&self, retained: &[ArticleDecision], digest: Option<&Digest>, report: &mut RunReport) {
        for decision in retained {
            match self.store.save_article(decision).await {
                Ok(_) => report.saved_ok += 1,
                Err(e) => {
                    error!(stage = "persist", title = %decision.article.title, "failed to store article: {}", e);
                    report.saved_failed += 1;
                    report.record(Stage::Persist, decision.article.title.clone(), e);
                }
            }
        }

        // The empty-set placeholder is reported but never stored
        if let Some(Digest::Generated(text)) = digest {
            match self.store.save_digest(text, retained.len()).await {
                Ok(_) => report.digest_saved = true,
                Err(e) => {
                    error!(stage = "persist", "failed to store digest: {}", e);
                    report.record(Stage::Persist, "digest", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Importance, RecordKind, NO_SIGNIFICANT_NEWS};
    use crate::testing::{article, FakeAnalyzer, FakeSource, MemoryStore};

    fn pipeline(source: FakeSource, analyzer: FakeAnalyzer, store: Arc<MemoryStore>) -> Pipeline {
        Pipeline::new(Arc::new(source), Arc::new(analyzer), store)
    }

    fn abc() -> Vec<RawArticle> {
        vec![article("A", "high"), article("B", "low"), article("C", "medium")]
    }

    #[tokio::test]
    async fn retains_and_persists_important_articles() {
        let store = Arc::new(MemoryStore::default());
        let report = pipeline(FakeSource::with(abc()), FakeAnalyzer::default(), store.clone())
            .run()
            .await;

        assert!(report.is_success());
        assert_eq!(report.fetched, 3);
        assert_eq!(report.analyzed_ok, 3);
        assert_eq!(report.retained, 2);
        assert_eq!(report.saved_ok, 2);
        assert!(report.digest_saved);
        assert_eq!(report.digest.as_deref(), Some("digest of 2 articles"));
        assert!(report.failures.is_empty());

        let records = store.records();
        let titles: Vec<_> = records.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, ["A", "C", "digest for 2"]);
        assert_eq!(records[0].importance, Some(Importance::High));
        assert_eq!(records[1].importance, Some(Importance::Medium));
        assert_eq!(records[2].kind, RecordKind::Digest);
    }

    #[tokio::test]
    async fn digest_sees_only_retained_articles() {
        let analyzer = Arc::new(FakeAnalyzer::default());
        let store = Arc::new(MemoryStore::default());
        let pipeline = Pipeline::new(Arc::new(FakeSource::with(abc())), analyzer.clone(), store);

        pipeline.run().await;

        assert_eq!(*analyzer.classified.lock().unwrap(), ["A", "B", "C"]);
        assert_eq!(*analyzer.digest_inputs.lock().unwrap(), vec![vec!["A", "C"]]);
    }

    #[tokio::test]
    async fn empty_fetch_yields_placeholder_and_stores_nothing() {
        let store = Arc::new(MemoryStore::default());
        let report = pipeline(FakeSource::with(vec![]), FakeAnalyzer::default(), store.clone())
            .run()
            .await;

        assert!(report.is_success());
        assert_eq!(report.fetched, 0);
        assert_eq!(report.digest.as_deref(), Some(NO_SIGNIFICANT_NEWS));
        assert!(!report.digest_saved);
        assert_eq!(store.attempts(), 0);
    }

    #[tokio::test]
    async fn all_low_articles_store_nothing() {
        let store = Arc::new(MemoryStore::default());
        let source = FakeSource::with(vec![article("A", "low"), article("B", "low")]);
        let report = pipeline(source, FakeAnalyzer::default(), store.clone()).run().await;

        assert!(report.is_success());
        assert_eq!(report.retained, 0);
        assert_eq!(report.digest.as_deref(), Some(NO_SIGNIFICANT_NEWS));
        assert!(store.records().is_empty());
    }

    #[tokio::test]
    async fn fetch_failure_aborts_before_any_work() {
        let analyzer = Arc::new(FakeAnalyzer::default());
        let store = Arc::new(MemoryStore::default());
        let pipeline = Pipeline::new(Arc::new(FakeSource::failing()), analyzer.clone(), store.clone());

        let report = pipeline.run().await;

        assert_eq!(report.state, RunState::Aborted);
        assert!(!report.is_success());
        assert!(report.fetch_error.as_deref().unwrap().contains("503"));
        assert!(analyzer.classified.lock().unwrap().is_empty());
        assert_eq!(store.attempts(), 0);
    }

    #[tokio::test]
    async fn classification_failure_skips_only_that_article() {
        let store = Arc::new(MemoryStore::default());
        let analyzer = FakeAnalyzer {
            fail_titles: vec!["A".to_string()],
            ..Default::default()
        };
        let report = pipeline(FakeSource::with(abc()), analyzer, store.clone()).run().await;

        assert!(report.is_success());
        assert_eq!(report.analyzed_ok, 2);
        assert_eq!(report.analyzed_failed, 1);
        assert_eq!(report.retained, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].stage, Stage::Analyze);
        assert_eq!(report.failures[0].subject, "A");

        let titles: Vec<_> = store.records().into_iter().map(|r| r.title).collect();
        assert_eq!(titles, ["C", "digest for 1"]);
    }

    #[tokio::test]
    async fn article_save_failure_does_not_stop_the_rest() {
        let store = Arc::new(MemoryStore {
            fail_titles: vec!["A".to_string()],
            ..Default::default()
        });
        let report = pipeline(FakeSource::with(abc()), FakeAnalyzer::default(), store.clone())
            .run()
            .await;

        assert!(report.is_success());
        assert_eq!(report.saved_ok, 1);
        assert_eq!(report.saved_failed, 1);
        assert!(report.digest_saved);
        assert_eq!(report.failures[0].stage, Stage::Persist);
        assert_eq!(report.failures[0].subject, "A");
    }

    #[tokio::test]
    async fn digest_save_failure_keeps_article_rows() {
        let store = Arc::new(MemoryStore {
            fail_digest: true,
            ..Default::default()
        });
        let report = pipeline(FakeSource::with(abc()), FakeAnalyzer::default(), store.clone())
            .run()
            .await;

        assert!(report.is_success());
        assert_eq!(report.saved_ok, 2);
        assert!(!report.digest_saved);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].subject, "digest");
        assert!(store.records().iter().all(|r| r.kind == RecordKind::Article));
    }

    #[tokio::test]
    async fn digest_generation_failure_still_persists_articles() {
        let store = Arc::new(MemoryStore::default());
        let analyzer = FakeAnalyzer {
            fail_digest: true,
            ..Default::default()
        };
        let report = pipeline(FakeSource::with(abc()), analyzer, store.clone()).run().await;

        assert!(report.is_success());
        assert!(report.digest.is_none());
        assert!(!report.digest_saved);
        assert_eq!(report.failures[0].stage, Stage::Digest);
        assert_eq!(store.records().len(), 2);
    }

    #[test]
    fn success_path_is_linear() {
        let mut state = RunState::Start;
        let mut visited = vec![state];
        while let Some(next) = state.next() {
            state = next;
            visited.push(state);
        }
        assert_eq!(
            visited,
            [
                RunState::Start,
                RunState::Fetched,
                RunState::Analyzed,
                RunState::Filtered,
                RunState::Digested,
                RunState::Persisted,
                RunState::Done,
            ]
        );
        assert_eq!(RunState::Aborted.next(), None);
    }

    #[test]
    fn abort_marks_report_failed() {
        let mut report = RunReport::new(Uuid::new_v4());
        report.abort(&FetchError::Timeout(30));

        assert_eq!(report.state, RunState::Aborted);
        assert!(!report.is_success());
        assert_eq!(report.fetch_error.as_deref(), Some("news source timed out after 30s"));
        assert_eq!(report.failures[0].stage, Stage::Fetch);
        assert!(report.finished_at.is_some());
    }
}
