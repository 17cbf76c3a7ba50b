use crate::chat::session::{ChatSession, SUMMARY_MAX_CHARS};
use crate::db::{QueryExecutor, TableResult};
use crate::llm::ModelClient;
use crate::sql::intent::{self, Intent};
use crate::sql::{CandidateOrigin, CandidateSql, SafetyVerdict, prompt, safety};
use std::sync::Arc;
use tracing::{info, warn};

/// Rows retained from an execution for display; the full count is still
/// reported.
pub const DISPLAY_ROW_LIMIT: usize = 200;

/// Outcome of one chat turn.
#[derive(Debug)]
pub enum TurnOutcome {
    /// Free-text reply; no SQL was involved.
    Reply(String),
    /// One or more candidates were generated and now await confirmation in
    /// the session's pending list.
    Candidates,
    /// SQL was requested but the model output contained no statement; the
    /// raw output is carried for display.
    NoSqlGenerated(String),
}

/// Outcome of one confirmed execution request.
#[derive(Debug)]
pub enum ExecOutcome {
    /// No database connection is configured; execution is unavailable.
    NotConfigured,
    /// The index does not name a pending candidate.
    UnknownCandidate,
    /// The candidate failed safety validation and was not executed.
    Rejected { sql: String },
    Executed { sql: String, result: TableResult },
    /// Execution failed; `repair_indices` points at any newly generated
    /// repair candidates in the session's pending list.
    Failed {
        error: String,
        repair_indices: Vec<usize>,
    },
}

/// Orchestrates a user turn end to end: intent classification, SQL
/// generation, safety validation, confirmed execution, and one repair
/// round after a failure. Generated SQL is never executed in the same call
/// that produced it; execution happens only through [`confirm_execute`].
///
/// [`confirm_execute`]: SqlPipeline::confirm_execute
pub struct SqlPipeline {
    model: Arc<ModelClient>,
    executor: Option<Arc<dyn QueryExecutor>>,
}

impl SqlPipeline {
    pub fn new(model: Arc<ModelClient>, executor: Option<Arc<dyn QueryExecutor>>) -> Self {
        Self { model, executor }
    }

    /// Fetches the validation allowlist from the live database. The
    /// schema-introspection pseudo-table is always a legitimate target so
    /// probe statements can pass validation. Without a configured database
    /// (or when the lookup fails) there is no allowlist and validation
    /// degrades to the looser mode.
    pub async fn allowlist(&self) -> Option<Vec<String>> {
        let executor = self.executor.as_ref()?;
        match executor.list_tables().await {
            Ok(mut tables) => {
                if !tables
                    .iter()
                    .any(|t| t.eq_ignore_ascii_case("information_schema"))
                {
                    tables.push("information_schema".to_string());
                }
                Some(tables)
            }
            Err(e) => {
                warn!("failed to fetch table allowlist: {}", e);
                None
            }
        }
    }

    /// Processes one user message to completion (generation only; any
    /// produced SQL waits in the session for explicit confirmation).
    pub async fn handle_turn(&self, session: &mut ChatSession, user_text: &str) -> TurnOutcome {
        session.begin_turn(user_text);
        let known_tables = self.allowlist().await;

        let initial = match intent::classify(user_text, known_tables.as_deref(), &self.model).await
        {
            Intent::FreeText => {
                let reply = self.model.complete(&session.transcript()).await;
                session.push_assistant(reply.clone());
                session.prune_duplicate_replies();
                return TurnOutcome::Reply(reply);
            }
            Intent::NeedsSql(initial) => initial,
        };

        let candidates = match initial {
            Some(candidate) => {
                info!("intent probe supplied the initial candidate");
                session
                    .push_assistant("[intent] a database query is needed; awaiting confirmation");
                vec![candidate]
            }
            None => {
                let summary = session.dataset.as_ref().map(|d| d.summary(SUMMARY_MAX_CHARS));
                let raw = self
                    .model
                    .complete(&prompt::generation_prompt(
                        &session.transcript(),
                        summary.as_deref(),
                    ))
                    .await;
                let candidates = parse_generated(&raw);
                if candidates.is_empty() {
                    session.push_assistant(format!("[no sql generated] {}", raw));
                    return TurnOutcome::NoSqlGenerated(raw);
                }
                candidates
            }
        };

        for mut candidate in candidates {
            self.validate(&mut candidate).await;
            match candidate.verdict {
                SafetyVerdict::Rejected => {
                    session.push_assistant(format!("[generated sql rejected] {}", candidate.sql));
                }
                _ => {
                    session.push_assistant(format!(
                        "[generated sql passed checks, awaiting confirmation] {}",
                        candidate.sql
                    ));
                }
            }
            session.push_pending(candidate);
        }

        TurnOutcome::Candidates
    }

    /// Validates a candidate against a freshly fetched allowlist.
    pub async fn validate(&self, candidate: &mut CandidateSql) {
        let allowlist = self.allowlist().await;
        let safe = safety::is_safe_select(&candidate.sql, allowlist.as_deref());
        candidate.allowlist = allowlist;
        candidate.verdict = if safe {
            SafetyVerdict::Passed
        } else {
            SafetyVerdict::Rejected
        };
    }

    /// Executes a pending candidate after the user's explicit confirmation.
    ///
    /// The candidate is re-validated first; `force` is the labeled debug
    /// override and skips only the allowlist-membership rule, never the
    /// separator/verb/prefix rules. A failure on a first-generation
    /// candidate triggers one repair round; a failure on a repair candidate
    /// is surfaced as-is.
    pub async fn confirm_execute(
        &self,
        session: &mut ChatSession,
        index: usize,
        force: bool,
    ) -> ExecOutcome {
        let Some(candidate) = session.pending_candidate(index).cloned() else {
            return ExecOutcome::UnknownCandidate;
        };

        let allowlist = if force {
            session.push_assistant("[forced execution requested; table allowlist check skipped]");
            None
        } else {
            self.allowlist().await
        };

        if !safety::is_safe_select(&candidate.sql, allowlist.as_deref()) {
            session.set_pending_verdict(index, SafetyVerdict::Rejected);
            session.push_assistant(format!(
                "[sql failed safety checks; execution refused] {}",
                candidate.sql
            ));
            return ExecOutcome::Rejected { sql: candidate.sql };
        }

        let Some(executor) = self.executor.as_ref() else {
            return ExecOutcome::NotConfigured;
        };

        session.push_assistant(format!("[executing sql] {}", candidate.sql));
        match executor.execute_select(&candidate.sql, DISPLAY_ROW_LIMIT).await {
            Ok(result) => {
                session.push_assistant(format!(
                    "[sql execution complete] rows={}, cols={:?}",
                    result.row_count, result.columns
                ));
                session.cache_execution(candidate.sql.clone(), result.clone());
                ExecOutcome::Executed {
                    sql: candidate.sql,
                    result,
                }
            }
            Err(e) => {
                let error = e.to_string();
                session.push_assistant(format!("[sql execution failed] {}", error));
                if matches!(candidate.origin, CandidateOrigin::RepairAttempt(_)) {
                    // One repair round only; a repaired candidate's failure
                    // is surfaced without another attempt.
                    return ExecOutcome::Failed {
                        error,
                        repair_indices: Vec::new(),
                    };
                }
                let repair_indices = self.repair(session, &candidate.sql, &error).await;
                ExecOutcome::Failed {
                    error,
                    repair_indices,
                }
            }
        }
    }

    /// Asks the model to correct a failed statement. Every returned line
    /// beginning with `select` becomes an independently confirmable
    /// candidate; other lines are dropped.
    async fn repair(
        &self,
        session: &mut ChatSession,
        failed_sql: &str,
        error: &str,
    ) -> Vec<usize> {
        let allowlist = self.allowlist().await;
        let dataset_columns = session.dataset.as_ref().map(|d| d.columns.clone());
        let reply = self
            .model
            .complete(&prompt::repair_prompt(
                failed_sql,
                error,
                allowlist.as_deref(),
                dataset_columns.as_deref(),
            ))
            .await;

        let fixes: Vec<CandidateSql> = reply
            .lines()
            .map(str::trim)
            .filter(|line| line.to_lowercase().starts_with("select"))
            .enumerate()
            .map(|(i, line)| CandidateSql::new(line, CandidateOrigin::RepairAttempt(i + 1)))
            .collect();

        if fixes.is_empty() {
            session.push_assistant(format!("[repair produced no sql] {}", reply));
            return Vec::new();
        }

        session.push_assistant(format!("[repair produced {} candidate(s)]", fixes.len()));
        let mut indices = Vec::with_capacity(fixes.len());
        for mut candidate in fixes {
            self.validate(&mut candidate).await;
            match candidate.verdict {
                SafetyVerdict::Rejected => {
                    session.push_assistant(format!("[repair candidate rejected] {}", candidate.sql));
                }
                _ => {
                    session.push_assistant(format!(
                        "[repair candidate passed checks, awaiting confirmation] {}",
                        candidate.sql
                    ));
                }
            }
            indices.push(session.push_pending(candidate));
        }
        indices
    }
}

/// Splits a generation response into candidates. Probe responses may carry
/// several SELECTs, one per line; otherwise the first non-empty line is the
/// single expected statement (the validator decides whether it survives).
fn parse_generated(raw: &str) -> Vec<CandidateSql> {
    let selects: Vec<&str> = raw
        .lines()
        .map(str::trim)
        .filter(|line| line.to_lowercase().starts_with("select"))
        .collect();
    if !selects.is_empty() {
        return selects
            .into_iter()
            .map(|line| CandidateSql::new(line, CandidateOrigin::InitialGeneration))
            .collect();
    }

    raw.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| vec![CandidateSql::new(line, CandidateOrigin::InitialGeneration)])
        .unwrap_or_default()
}
