use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cache lock poisoned")]
    LockPoisoned,
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Rate limited: retry after {retry_after_secs:?} seconds")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Release not found: {0}")]
    NotFound(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Query for {query} returned {count} results, reaching the limit of {limit}")]
    CountExceeded {
        query: String,
        count: usize,
        limit: usize,
    },

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

impl IndexError {
    /// Errors that must stop the whole run rather than a single module
    pub fn is_fatal(&self) -> bool {
        matches!(self, IndexError::CountExceeded { .. } | IndexError::Cache(_))
    }
}
