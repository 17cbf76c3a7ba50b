pub mod executor;

use async_trait::async_trait;
use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum DbError {
    ConnectionError(String),
    QueryError(String),
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbError::ConnectionError(msg) => write!(f, "database connection error: {}", msg),
            DbError::QueryError(msg) => write!(f, "database query error: {}", msg),
        }
    }
}

impl Error for DbError {}

/// Result of one read query: column names, the retained rows (capped at the
/// display limit), and the uncapped row count.
#[derive(Debug, Clone)]
pub struct TableResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub row_count: usize,
    pub truncated: bool,
}

/// Read-only execution boundary of the configured database. A trait seam so
/// the pipeline can be driven against a scripted database in tests.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Runs a single SELECT statement, retaining at most `row_cap` rows.
    async fn execute_select(&self, sql: &str, row_cap: usize) -> Result<TableResult, DbError>;

    /// Lists the user-visible table names, used to build the validation
    /// allowlist.
    async fn list_tables(&self) -> Result<Vec<String>, DbError>;
}
