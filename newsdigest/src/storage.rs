use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::digest::{digest_summary, digest_title};
use crate::error::StoreError;
use crate::models::{ArticleDecision, Importance, RecordKind, StoredRecord};

/// Persistence for retained articles and per-run digests. No deduplication:
/// every call appends a row.
#[async_trait]
pub trait ArticleStore: Send + Sync {
    async fn save_article(&self, decision: &ArticleDecision) -> Result<i64, StoreError>;

    /// `article_count` is how many articles the digest covers.
    async fn save_digest(&self, text: &str, article_count: usize) -> Result<i64, StoreError>;
}

/// `news` table in SQLite.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connectivity check
    pub async fn ping(&self) -> Result<(), StoreError> {
        let one: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&self.pool).await?;
        debug!("database ping returned {}", one);
        Ok(())
    }

    pub async fn get(&self, id: i64) -> Result<Option<StoredRecord>, StoreError> {
        let row = sqlx::query_as::<_, NewsRow>(
            r#"
            SELECT id, kind, title, summary, importance, content, source_url,
                   published_at, created_at, updated_at
            FROM news
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(StoredRecord::try_from).transpose()
    }

    /// Newest records first
    pub async fn latest(&self, limit: u32) -> Result<Vec<StoredRecord>, StoreError> {
        let rows = sqlx::query_as::<_, NewsRow>(
            r#"
            SELECT id, kind, title, summary, importance, content, source_url,
                   published_at, created_at, updated_at
            FROM news
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(StoredRecord::try_from).collect()
    }

    async fn insert(&self, record: NewRecord<'_>) -> Result<i64, StoreError> {
        if record.title.trim().is_empty() {
            return Err(StoreError::InvalidRecord("title is empty".to_string()));
        }
        if record.content.trim().is_empty() {
            return Err(StoreError::InvalidRecord("content is empty".to_string()));
        }

        let now = Utc::now();
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO news (kind, title, summary, importance, content, source_url,
                              published_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(record.kind.as_str())
        .bind(record.title)
        .bind(record.summary)
        .bind(record.importance.as_str())
        .bind(record.content)
        .bind(record.source_url)
        .bind(record.published_at)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }
}

#[async_trait]
impl ArticleStore for SqliteStore {
    async fn save_article(&self, decision: &ArticleDecision) -> Result<i64, StoreError> {
        let id = self
            .insert(NewRecord {
                kind: RecordKind::Article,
                title: &decision.article.title,
                summary: &decision.summary,
                importance: decision.importance,
                content: &decision.article.content,
                source_url: decision.article.url.as_deref(),
                published_at: decision.article.published_at,
            })
            .await?;

        info!("Stored article {}: {}", id, decision.article.title);
        Ok(id)
    }

    async fn save_digest(&self, text: &str, article_count: usize) -> Result<i64, StoreError> {
        let title = digest_title(Utc::now());
        let summary = digest_summary(article_count);
        let id = self
            .insert(NewRecord {
                kind: RecordKind::Digest,
                title: &title,
                summary: &summary,
                importance: Importance::High,
                content: text,
                source_url: None,
                published_at: None,
            })
            .await?;

        info!("Stored digest {}: {}", id, title);
        Ok(id)
    }
}

struct NewRecord<'a> {
    kind: RecordKind,
    title: &'a str,
    summary: &'a str,
    importance: Importance,
    content: &'a str,
    source_url: Option<&'a str>,
    published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, sqlx::FromRow)]
struct NewsRow {
    id: i64,
    kind: String,
    title: String,
    summary: String,
    importance: String,
    content: String,
    source_url: Option<String>,
    published_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<NewsRow> for StoredRecord {
    type Error = StoreError;

    fn try_from(row: NewsRow) -> Result<Self, Self::Error> {
        let importance = row.importance.parse::<Importance>().map_err(|e| StoreError::Corrupt {
            id: row.id,
            reason: e.to_string(),
        })?;
        let kind = match row.kind.as_str() {
            "article" => RecordKind::Article,
            "digest" => RecordKind::Digest,
            other => {
                return Err(StoreError::Corrupt {
                    id: row.id,
                    reason: format!("unknown kind `{}`", other),
                })
            }
        };

        Ok(StoredRecord {
            id: row.id,
            kind,
            title: row.title,
            summary: row.summary,
            importance,
            content: row.content,
            source_url: row.source_url,
            published_at: row.published_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
