use crate::db::{DbError, QueryExecutor, TableResult};
use async_trait::async_trait;
use duckdb::Connection;
use duckdb::types::ValueRef;
use r2d2::{ManageConnection, Pool};
use tracing::debug;

pub struct DuckDbConnectionManager {
    connection_string: String,
}

impl DuckDbConnectionManager {
    pub fn new(connection_string: String) -> Self {
        Self { connection_string }
    }
}

impl ManageConnection for DuckDbConnectionManager {
    type Connection = Connection;
    type Error = duckdb::Error;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        Connection::open(&self.connection_string)
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.execute("SELECT 1", [])?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// [`QueryExecutor`] backed by an embedded DuckDB file. DuckDB calls are
/// synchronous, so every operation hops onto the blocking pool.
pub struct DuckDbExecutor {
    pool: Pool<DuckDbConnectionManager>,
}

impl DuckDbExecutor {
    pub fn new(connection_string: String, pool_size: u32) -> Result<Self, DbError> {
        let manager = DuckDbConnectionManager::new(connection_string);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl QueryExecutor for DuckDbExecutor {
    async fn execute_select(&self, sql: &str, row_cap: usize) -> Result<TableResult, DbError> {
        let pool = self.pool.clone();
        let sql = sql.to_string();
        tokio::task::spawn_blocking(move || run_select(&pool, &sql, row_cap))
            .await
            .map_err(|e| DbError::QueryError(e.to_string()))?
    }

    async fn list_tables(&self) -> Result<Vec<String>, DbError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || run_list_tables(&pool))
            .await
            .map_err(|e| DbError::QueryError(e.to_string()))?
    }
}

fn run_select(
    pool: &Pool<DuckDbConnectionManager>,
    sql: &str,
    row_cap: usize,
) -> Result<TableResult, DbError> {
    let conn = pool
        .get()
        .map_err(|e| DbError::ConnectionError(e.to_string()))?;

    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| DbError::QueryError(e.to_string()))?;

    // Column metadata has to be gathered before the row iterator borrows
    // the statement.
    let column_count = stmt.column_count();
    let mut columns = Vec::with_capacity(column_count);
    for idx in 0..column_count {
        match stmt.column_name(idx) {
            Ok(name) => columns.push(name.to_string()),
            Err(_) => columns.push(format!("column_{}", idx)),
        }
    }

    let mut rows = stmt
        .query([])
        .map_err(|e| DbError::QueryError(e.to_string()))?;

    let mut retained = Vec::new();
    let mut row_count = 0usize;
    while let Some(row) = rows
        .next()
        .map_err(|e| DbError::QueryError(e.to_string()))?
    {
        row_count += 1;
        if retained.len() < row_cap {
            retained.push((0..column_count).map(|idx| render_cell(row, idx)).collect());
        }
    }

    Ok(TableResult {
        columns,
        rows: retained,
        row_count,
        truncated: row_count > row_cap,
    })
}

fn run_list_tables(pool: &Pool<DuckDbConnectionManager>) -> Result<Vec<String>, DbError> {
    let conn = pool
        .get()
        .map_err(|e| DbError::ConnectionError(e.to_string()))?;

    // sqlite_master is the most reliable catalog view in DuckDB; fall back
    // to information_schema when it is unavailable.
    match query_names(
        &conn,
        "SELECT name FROM sqlite_master WHERE type='table' \
         AND name NOT LIKE 'sqlite_%' AND name NOT LIKE 'duck_%' AND name NOT LIKE 'pg_%'",
    ) {
        Ok(tables) if !tables.is_empty() => return Ok(tables),
        Ok(_) => {}
        Err(e) => debug!("sqlite_master listing failed, trying information_schema: {}", e),
    }

    query_names(
        &conn,
        "SELECT table_name FROM information_schema.tables WHERE table_schema = 'main'",
    )
}

fn query_names(conn: &Connection, sql: &str) -> Result<Vec<String>, DbError> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| DbError::QueryError(e.to_string()))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|e| DbError::QueryError(e.to_string()))?
        .filter_map(Result::ok)
        .collect();
    Ok(names)
}

fn render_cell(row: &duckdb::Row<'_>, idx: usize) -> String {
    match row.get_ref(idx) {
        Ok(ValueRef::Null) => "NULL".to_string(),
        Ok(ValueRef::Boolean(v)) => v.to_string(),
        Ok(ValueRef::TinyInt(v)) => v.to_string(),
        Ok(ValueRef::SmallInt(v)) => v.to_string(),
        Ok(ValueRef::Int(v)) => v.to_string(),
        Ok(ValueRef::BigInt(v)) => v.to_string(),
        Ok(ValueRef::Float(v)) => v.to_string(),
        Ok(ValueRef::Double(v)) => v.to_string(),
        Ok(ValueRef::Text(v)) => String::from_utf8_lossy(v).into_owned(),
        _ => row.get::<_, String>(idx).unwrap_or_else(|_| "?".to_string()),
    }
}
