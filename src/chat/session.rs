use crate::db::TableResult;
use crate::ingest::{Dataset, clip_chars, infer_types, table_summary};
use crate::sql::{CandidateSql, SafetyVerdict};

/// Character cap for each dataset/result summary block sent to the model.
pub const SUMMARY_MAX_CHARS: usize = 1500;

/// Character cap for the whole rendered transcript.
pub const TRANSCRIPT_MAX_CHARS: usize = 8000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct LastExecution {
    pub sql: String,
    pub result: TableResult,
}

/// State of one chat session: the append-only turn history, the optional
/// uploaded dataset, the cached most recent execution result, and the SQL
/// candidates awaiting user confirmation.
///
/// Turns are serialized by the caller; this type assumes a single writer.
#[derive(Debug, Default)]
pub struct ChatSession {
    history: Vec<ConversationTurn>,
    pub dataset: Option<Dataset>,
    last_execution: Option<LastExecution>,
    pending: Vec<CandidateSql>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.history.push(ConversationTurn {
            role: Role::User,
            content: content.into(),
        });
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.history.push(ConversationTurn {
            role: Role::Assistant,
            content: content.into(),
        });
    }

    /// Starts a new user turn: records the message and drops candidates
    /// left over from the previous turn so stale SQL cannot be executed
    /// against a new request.
    pub fn begin_turn(&mut self, user_text: &str) {
        self.push_user(user_text);
        self.pending.clear();
    }

    /// Collapses consecutive assistant turns with identical content into
    /// one, keeping order otherwise intact.
    pub fn prune_duplicate_replies(&mut self) {
        let mut pruned: Vec<ConversationTurn> = Vec::with_capacity(self.history.len());
        for turn in self.history.drain(..) {
            if let Some(last) = pruned.last() {
                if last.role == Role::Assistant
                    && turn.role == Role::Assistant
                    && last.content == turn.content
                {
                    continue;
                }
            }
            pruned.push(turn);
        }
        self.history = pruned;
    }

    pub fn pending(&self) -> &[CandidateSql] {
        &self.pending
    }

    pub fn pending_candidate(&self, index: usize) -> Option<&CandidateSql> {
        self.pending.get(index)
    }

    /// Appends a candidate and returns its index for later confirmation.
    pub fn push_pending(&mut self, candidate: CandidateSql) -> usize {
        self.pending.push(candidate);
        self.pending.len() - 1
    }

    pub fn set_pending_verdict(&mut self, index: usize, verdict: SafetyVerdict) {
        if let Some(candidate) = self.pending.get_mut(index) {
            candidate.verdict = verdict;
        }
    }

    pub fn cache_execution(&mut self, sql: String, result: TableResult) {
        self.last_execution = Some(LastExecution { sql, result });
    }

    pub fn last_execution(&self) -> Option<&LastExecution> {
        self.last_execution.as_ref()
    }

    /// Wholesale reset of the session.
    pub fn clear(&mut self) {
        self.history.clear();
        self.dataset = None;
        self.last_execution = None;
        self.pending.clear();
    }

    /// Renders the transcript the model consumes: `User:`/`Assistant:`
    /// lines, then the dataset summary block and the last execution result
    /// block when present, clipped to [`TRANSCRIPT_MAX_CHARS`].
    pub fn transcript(&self) -> String {
        let mut lines: Vec<String> = self
            .history
            .iter()
            .map(|turn| format!("{}: {}", turn.role.label(), turn.content))
            .collect();

        if let Some(dataset) = &self.dataset {
            lines.push("\n--- DATASET SUMMARY ---".to_string());
            lines.push(dataset.summary(SUMMARY_MAX_CHARS));
        }

        if let Some(last) = &self.last_execution {
            lines.push("\n--- LAST SQL RESULT ---".to_string());
            lines.push(format!("LAST_SQL: {}", last.sql));
            lines.push(result_summary(&last.result));
        }

        clip_chars(&lines.join("\n"), TRANSCRIPT_MAX_CHARS)
    }
}

/// Summarizes an execution result in the same shape as a dataset summary.
pub fn result_summary(result: &TableResult) -> String {
    let types = infer_types(&result.columns, &result.rows, 50);
    table_summary(&result.columns, &types, &result.rows, SUMMARY_MAX_CHARS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with_history(turns: &[(Role, &str)]) -> ChatSession {
        let mut session = ChatSession::new();
        for (role, content) in turns {
            match role {
                Role::User => session.push_user(*content),
                Role::Assistant => session.push_assistant(*content),
            }
        }
        session
    }

    #[test]
    fn consecutive_duplicate_replies_collapse_to_one() {
        let mut session = session_with_history(&[
            (Role::User, "hello"),
            (Role::Assistant, "hi there"),
            (Role::Assistant, "hi there"),
            (Role::User, "hi there"),
            (Role::Assistant, "hi there"),
        ]);

        session.prune_duplicate_replies();

        let contents: Vec<&str> = session
            .history()
            .iter()
            .map(|t| t.content.as_str())
            .collect();
        assert_eq!(contents, vec!["hello", "hi there", "hi there", "hi there"]);
        assert_eq!(session.history()[1].role, Role::Assistant);
        assert_eq!(session.history()[2].role, Role::User);
    }

    #[test]
    fn transcript_renders_roles_and_result_block() {
        let mut session = session_with_history(&[
            (Role::User, "show me the orders"),
            (Role::Assistant, "here they are"),
        ]);
        session.cache_execution(
            "select id from orders".to_string(),
            TableResult {
                columns: vec!["id".to_string()],
                rows: vec![vec!["1".to_string()], vec!["2".to_string()]],
                row_count: 2,
                truncated: false,
            },
        );

        let transcript = session.transcript();
        assert!(transcript.starts_with("User: show me the orders\nAssistant: here they are"));
        assert!(transcript.contains("--- LAST SQL RESULT ---"));
        assert!(transcript.contains("LAST_SQL: select id from orders"));
        assert!(transcript.contains("COLUMNS: id"));
        assert!(transcript.contains("id:1"));
    }

    #[test]
    fn transcript_is_clipped() {
        let mut session = ChatSession::new();
        for _ in 0..400 {
            session.push_user("a".repeat(100));
        }
        let transcript = session.transcript();
        assert!(transcript.ends_with("..."));
        assert!(transcript.chars().count() <= TRANSCRIPT_MAX_CHARS + 3);
    }

    #[test]
    fn begin_turn_drops_stale_candidates() {
        use crate::sql::{CandidateOrigin, CandidateSql};

        let mut session = ChatSession::new();
        session.push_pending(CandidateSql::new(
            "select 1",
            CandidateOrigin::InitialGeneration,
        ));
        session.begin_turn("next question");

        assert!(session.pending().is_empty());
        assert_eq!(session.history().len(), 1);
    }

    #[test]
    fn clear_resets_everything() {
        let mut session = session_with_history(&[(Role::User, "hi")]);
        session.dataset = Some(Dataset {
            columns: vec!["a".to_string()],
            types: vec![crate::ingest::ColumnType::Text],
            rows: vec![],
        });
        session.clear();

        assert!(session.history().is_empty());
        assert!(session.dataset.is_none());
        assert!(session.last_execution().is_none());
    }
}
