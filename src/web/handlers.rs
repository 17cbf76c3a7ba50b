use axum::{
    Json,
    extract::{Multipart, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use crate::chat::ChatSession;
use crate::ingest::csv::CsvLoader;
use crate::sql::pipeline::{ExecOutcome, TurnOutcome};
use crate::web::state::AppState;

const NO_MODEL_MSG: &str =
    "No model API key is configured; chat and SQL generation are unavailable.";
const NO_DB_MSG: &str = "No database connection is configured; cannot execute SQL.";

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct CandidateView {
    pub index: usize,
    pub sql: String,
    pub origin: String,
    pub verdict: String,
    /// Allowlist in effect when the candidate was validated; absent when no
    /// database is configured.
    pub allowlist: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub reply: Option<String>,
    pub candidates: Vec<CandidateView>,
}

fn pending_views(session: &ChatSession) -> Vec<CandidateView> {
    session
        .pending()
        .iter()
        .enumerate()
        .map(|(index, candidate)| CandidateView {
            index,
            sql: candidate.sql.clone(),
            origin: candidate.origin.label(),
            verdict: candidate.verdict.label().to_string(),
            allowlist: candidate.allowlist.clone(),
        })
        .collect()
}

/// One chat turn. Any generated SQL comes back as pending candidates and is
/// executed only through the separate `/api/execute` action.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, String)> {
    let message = payload.message.trim().to_string();
    if message.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "message must not be empty".to_string()));
    }
    let Some(pipeline) = state.pipeline.as_ref() else {
        return Err((StatusCode::SERVICE_UNAVAILABLE, NO_MODEL_MSG.to_string()));
    };

    let mut session = state.session.lock().await;
    let outcome = pipeline.handle_turn(&mut session, &message).await;
    let candidates = pending_views(&session);

    let response = match outcome {
        TurnOutcome::Reply(reply) => ChatResponse {
            reply: Some(reply),
            candidates,
        },
        TurnOutcome::Candidates => ChatResponse {
            reply: None,
            candidates,
        },
        TurnOutcome::NoSqlGenerated(raw) => ChatResponse {
            reply: Some(format!("[no sql generated] {}", raw)),
            candidates,
        },
    };
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub index: usize,
    /// Labeled debug override: skips the table-allowlist rule only.
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
pub struct ExecuteResponse {
    pub status: String,
    pub sql: Option<String>,
    pub columns: Option<Vec<String>>,
    pub rows: Option<Vec<Vec<String>>>,
    pub row_count: Option<usize>,
    pub truncated: Option<bool>,
    pub error: Option<String>,
    pub candidates: Vec<CandidateView>,
}

impl ExecuteResponse {
    fn new(status: &str) -> Self {
        Self {
            status: status.to_string(),
            sql: None,
            columns: None,
            rows: None,
            row_count: None,
            truncated: None,
            error: None,
            candidates: Vec::new(),
        }
    }
}

/// Explicit confirmation step: runs one pending candidate against the
/// database.
pub async fn execute(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ExecuteRequest>,
) -> Result<Json<ExecuteResponse>, (StatusCode, String)> {
    let Some(pipeline) = state.pipeline.as_ref() else {
        return Err((StatusCode::SERVICE_UNAVAILABLE, NO_MODEL_MSG.to_string()));
    };

    if payload.force {
        info!("forced execution requested for candidate {}", payload.index);
    }

    let mut session = state.session.lock().await;
    let outcome = pipeline
        .confirm_execute(&mut session, payload.index, payload.force)
        .await;

    match outcome {
        ExecOutcome::NotConfigured => {
            Err((StatusCode::SERVICE_UNAVAILABLE, NO_DB_MSG.to_string()))
        }
        ExecOutcome::UnknownCandidate => Err((
            StatusCode::NOT_FOUND,
            format!("no pending candidate with index {}", payload.index),
        )),
        ExecOutcome::Rejected { sql } => {
            let mut response = ExecuteResponse::new("rejected");
            response.sql = Some(sql);
            response.candidates = pending_views(&session);
            Ok(Json(response))
        }
        ExecOutcome::Executed { sql, result } => {
            let mut response = ExecuteResponse::new("executed");
            response.sql = Some(sql);
            response.columns = Some(result.columns);
            response.rows = Some(result.rows);
            response.row_count = Some(result.row_count);
            response.truncated = Some(result.truncated);
            response.candidates = pending_views(&session);
            Ok(Json(response))
        }
        ExecOutcome::Failed { error, .. } => {
            let mut response = ExecuteResponse::new("failed");
            response.error = Some(error);
            response.candidates = pending_views(&session);
            Ok(Json(response))
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DatasetView {
    pub columns: Vec<String>,
    pub types: Vec<String>,
    pub row_count: usize,
}

/// CSV upload. The dataset stays in memory for prompt summaries; it is not
/// loaded into the database.
pub async fn upload_dataset(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<DatasetView>, (StatusCode, String)> {
    let mut uploaded: Option<Vec<u8>> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("invalid multipart payload: {}", e)))?
    {
        let data = field
            .bytes()
            .await
            .map_err(|e| (StatusCode::BAD_REQUEST, format!("failed to read upload: {}", e)))?;
        if !data.is_empty() {
            uploaded = Some(data.to_vec());
            break;
        }
    }

    let bytes = uploaded.ok_or((StatusCode::BAD_REQUEST, "no file in upload".to_string()))?;
    let dataset = CsvLoader::new().load_bytes(&bytes).map_err(|e| {
        error!("Failed to load uploaded CSV: {}", e);
        (StatusCode::BAD_REQUEST, format!("failed to load CSV: {}", e))
    })?;

    let view = DatasetView {
        columns: dataset.columns.clone(),
        types: dataset.types.iter().map(|t| t.label().to_string()).collect(),
        row_count: dataset.row_count(),
    };

    state.session.lock().await.dataset = Some(dataset);
    Ok(Json(view))
}

/// Clears history, dataset, cached result and pending candidates.
pub async fn reset_session(State(state): State<Arc<AppState>>) -> StatusCode {
    state.session.lock().await.clear();
    info!("session cleared");
    StatusCode::NO_CONTENT
}

pub async fn list_tables(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<String>>, (StatusCode, String)> {
    let Some(executor) = state.executor.as_ref() else {
        return Err((StatusCode::SERVICE_UNAVAILABLE, NO_DB_MSG.to_string()));
    };
    executor.list_tables().await.map(Json).map_err(|e| {
        error!("Failed to list tables: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Database error: {}", e),
        )
    })
}

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: String,
    pub uptime_seconds: i64,
    pub model: String,
    pub turns: usize,
    pub pending_candidates: usize,
    pub dataset_loaded: bool,
    pub database_configured: bool,
    pub model_configured: bool,
}

pub async fn system_status(State(state): State<Arc<AppState>>) -> Json<SystemStatus> {
    let now = chrono::Utc::now();
    let session = state.session.lock().await;

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: now.signed_duration_since(state.startup_time).num_seconds(),
        model: state.config.llm.model.clone(),
        turns: session.history().len(),
        pending_candidates: session.pending().len(),
        dataset_loaded: session.dataset.is_some(),
        database_configured: state.executor.is_some(),
        model_configured: state.pipeline.is_some(),
    })
}
