use thiserror::Error;

/// Failure to obtain the article batch. Fatal for the run.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("news source request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("news source timed out after {0}s")]
    Timeout(u64),

    #[error("news source returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("news source returned malformed data: {0}")]
    Malformed(String),
}

/// Failure to classify one article or to produce the digest. Recorded, never fatal.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("article cannot be analyzed: {0}")]
    InvalidInput(String),

    #[error("LLM provider error: {0}")]
    Provider(String),

    #[error("malformed LLM output: {0}")]
    Malformed(String),
}

impl AnalysisError {
    pub(crate) fn provider(err: anyhow::Error) -> Self {
        AnalysisError::Provider(format!("{:#}", err))
    }
}

/// Failure to persist one record. Recorded, never fatal.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("refusing to store invalid record: {0}")]
    InvalidRecord(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored row {id} is corrupt: {reason}")]
    Corrupt { id: i64, reason: String },
}
