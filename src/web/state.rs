use crate::chat::ChatSession;
use crate::config::AppConfig;
use crate::db::QueryExecutor;
use crate::sql::pipeline::SqlPipeline;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared application state for the web server.
///
/// The session sits behind a mutex so turns are processed one at a time;
/// the pipeline and executor are absent when their configuration is.
pub struct AppState {
    pub config: AppConfig,
    pub session: Mutex<ChatSession>,
    pub pipeline: Option<SqlPipeline>,
    pub executor: Option<Arc<dyn QueryExecutor>>,
    pub startup_time: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        pipeline: Option<SqlPipeline>,
        executor: Option<Arc<dyn QueryExecutor>>,
    ) -> Self {
        Self {
            config,
            session: Mutex::new(ChatSession::new()),
            pipeline,
            executor,
            startup_time: chrono::Utc::now(),
        }
    }
}
