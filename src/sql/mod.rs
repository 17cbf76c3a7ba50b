pub mod intent;
pub mod pipeline;
pub mod prompt;
pub mod safety;

/// Where a candidate statement came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateOrigin {
    InitialGeneration,
    IntentClassification,
    RepairAttempt(usize),
}

impl CandidateOrigin {
    pub fn label(&self) -> String {
        match self {
            CandidateOrigin::InitialGeneration => "initial-generation".to_string(),
            CandidateOrigin::IntentClassification => "intent-classification".to_string(),
            CandidateOrigin::RepairAttempt(n) => format!("repair-attempt-{}", n),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyVerdict {
    Unchecked,
    Passed,
    Rejected,
}

impl SafetyVerdict {
    pub fn label(&self) -> &'static str {
        match self {
            SafetyVerdict::Unchecked => "unchecked",
            SafetyVerdict::Passed => "passed",
            SafetyVerdict::Rejected => "rejected",
        }
    }
}

/// A model-produced SQL statement, tracked from generation through
/// validation to (confirmed) execution. A rejected candidate never reaches
/// the database.
#[derive(Debug, Clone)]
pub struct CandidateSql {
    pub sql: String,
    pub origin: CandidateOrigin,
    pub verdict: SafetyVerdict,
    /// Allowlist in effect when the candidate was last validated.
    pub allowlist: Option<Vec<String>>,
}

impl CandidateSql {
    pub fn new(sql: impl Into<String>, origin: CandidateOrigin) -> Self {
        Self {
            sql: sql.into(),
            origin,
            verdict: SafetyVerdict::Unchecked,
            allowlist: None,
        }
    }
}
