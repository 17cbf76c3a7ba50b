use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

mod chat;
mod config;
mod db;
mod ingest;
mod llm;
mod sql;
mod util;
mod web;

use crate::config::{AppConfig, CliArgs};
use crate::db::QueryExecutor;
use crate::db::executor::DuckDbExecutor;
use crate::llm::ModelClient;
use crate::sql::pipeline::SqlPipeline;
use crate::util::logging::init_tracing;
use crate::web::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args = CliArgs::parse();

    let config = match AppConfig::new(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    let data_dir = PathBuf::from(&config.data_dir);
    if !data_dir.exists() {
        info!("Creating data directory: {}", config.data_dir);
        std::fs::create_dir_all(&data_dir)?;
    }

    // A missing database disables execution (and the allowlist check), not
    // the whole assistant.
    let executor: Option<Arc<dyn QueryExecutor>> = match &config.database {
        Some(db_config) => {
            info!("Opening database: {}", db_config.connection_string);
            let executor = DuckDbExecutor::new(
                db_config.connection_string.clone(),
                db_config.pool_size as u32,
            )?;
            Some(Arc::new(executor))
        }
        None => {
            warn!("No database configured; SQL execution is disabled");
            None
        }
    };

    // A missing credential disables model-backed features, nothing else.
    let pipeline = if config.llm.api_key.is_some() {
        info!("Initializing model client for {}", config.llm.model);
        let model = Arc::new(ModelClient::new(&config.llm)?);
        Some(SqlPipeline::new(model, executor.clone()))
    } else {
        warn!("No API key configured; chat and SQL generation are disabled");
        None
    };

    let app_state = Arc::new(AppState::new(config.clone(), pipeline, executor));

    info!(
        "Starting AnalytiBot server on {}:{}",
        config.web.host, config.web.port
    );
    web::run_server(config.web, app_state).await?;
    info!("Server stopped gracefully");

    Ok(())
}
