//! Job store connection.

use surrealdb::Surreal;
use surrealdb::engine::any::{Any, connect};
use thiserror::Error;

/// Handle to the job store. Clones share one connection.
pub type Database = Surreal<Any>;

/// Where the job store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    /// SurrealDB endpoint: `mem://`, or `rocksdb://path` with the `rocksdb` feature.
    pub endpoint: String,
    pub namespace: String,
    pub database: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self::endpoint("mem://")
    }
}

impl DbConfig {
    /// Volatile store, gone when the process exits.
    pub fn memory() -> Self {
        Self::default()
    }

    pub fn endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            namespace: "labels".to_string(),
            database: "main".to_string(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn is_memory(&self) -> bool {
        self.endpoint.starts_with("mem://") || self.endpoint == "memory"
    }
}

/// Job store errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Connection error: {0}")]
    Connection(#[from] surrealdb::Error),
    #[error("Query error: {0}")]
    Query(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

impl DbError {
    /// Optimistic transaction conflicts are reported as retryable by SurrealDB.
    pub fn is_retryable(&self) -> bool {
        match self {
            DbError::Connection(e) => e.to_string().contains("can be retried"),
            _ => false,
        }
    }
}

/// Open the store named by `config`.
pub async fn connect_db(config: &DbConfig) -> Result<Database, DbError> {
    if config.is_memory() {
        tracing::warn!("Job store is in memory; jobs will not survive a restart");
    }

    let db = connect(config.endpoint.as_str()).await?;
    db.use_ns(config.namespace.as_str())
        .use_db(config.database.as_str())
        .await?;

    tracing::info!(
        endpoint = %config.endpoint,
        "Job store ready: {}/{}",
        config.namespace,
        config.database
    );
    Ok(db)
}
