use chrono::Local;

/// Column names from a loaded dataset included in a repair prompt, at most.
const REPAIR_COLUMN_HINTS: usize = 30;

fn current_time() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Conservative intent probe: the model answers with either one SELECT
/// statement or the NO_SQL token, nothing else.
pub fn intent_prompt(user_text: &str) -> String {
    format!(
        "Current time: {}\n\
         Decide whether the user request below genuinely requires running a query \
         against a database table. Only when the user explicitly asks to run or \
         write a SQL query, names a table or column that must be retrieved from \
         the database, or spells out a need such as 'write me SQL' / 'query <table>', \
         answer with one valid SELECT statement.\n\
         If no database query is needed (for example the user wants statistics, \
         visualization, interpretation or advice about already-loaded data), answer \
         with NO_SQL only.\n\
         User request: {}\n\
         Return exactly one line: either a SELECT statement (starting with SELECT, \
         no explanation, no punctuation, no semicolon) or NO_SQL.",
        current_time(),
        user_text
    )
}

/// Prompt for the main SQL generation step. Asks for a single SELECT, with
/// relative dates resolved via CURRENT_DATE, and allows probe statements
/// (one per line) when column names are uncertain.
pub fn generation_prompt(transcript: &str, dataset_summary: Option<&str>) -> String {
    let mut prompt = format!(
        "Current time: {}\n\
         Based on the conversation below, produce a single SELECT SQL statement. \
         Use only the target tables, and use CURRENT_DATE instead of spelling out \
         today's date in date conditions.\n\
         If the target table's column names may be unknown, you may instead return \
         one or more safe probe statements (one per line, SELECT only) to locate \
         column names or inspect sample data, for example querying \
         information_schema.columns or `SELECT * FROM <table> LIMIT 10`. Do not \
         include semicolons or comments, and no insert/update/delete or other \
         write operations.\n",
        current_time()
    );
    if let Some(summary) = dataset_summary {
        prompt.push_str(&format!("Dataset summary:\n{}\n", summary));
    }
    prompt.push_str(&format!(
        "Conversation:\n{}\nReturn only SQL, no explanation.",
        transcript
    ));
    prompt
}

/// Prompt for the repair round after an execution failure. Carries the raw
/// database error, the failing statement, the allowlisted tables, and a few
/// column names from the loaded dataset when one is present.
pub fn repair_prompt(
    original_sql: &str,
    error_text: &str,
    allowed_tables: Option<&[String]>,
    dataset_columns: Option<&[String]>,
) -> String {
    let mut prompt = String::from(
        "The SQL statement below failed with the error shown. Correct it while \
         keeping it strictly read-only. To locate column names or data problems \
         you may use one of two strategies: \
         (1) return one broad safe scan such as `SELECT * FROM <table> LIMIT 100` \
         to inspect the table's real columns and values; or \
         (2) return several safe probe queries (one SELECT per line, no \
         semicolons), each checking candidate columns or filters. \
         Return only SQL statements, one per line, with no explanation and no \
         semicolons.\n",
    );
    if let Some(tables) = allowed_tables {
        if !tables.is_empty() {
            prompt.push_str(&format!("Available tables: {}\n", tables.join(", ")));
        }
    }
    if let Some(columns) = dataset_columns {
        if !columns.is_empty() {
            let hints: Vec<&str> = columns
                .iter()
                .take(REPAIR_COLUMN_HINTS)
                .map(String::as_str)
                .collect();
            prompt.push_str(&format!(
                "Columns of the loaded dataset (sample): {}\n",
                hints.join(", ")
            ));
        }
    }
    prompt.push_str(&format!(
        "Original SQL: {}\nError: {}\nCorrected SQL (one or more, one per line):",
        original_sql, error_text
    ));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repair_prompt_caps_dataset_column_hints() {
        let columns: Vec<String> = (0..60).map(|i| format!("col_{}", i)).collect();
        let prompt = repair_prompt("select x from t", "no such column: x", None, Some(&columns));

        assert!(prompt.contains("col_29"));
        assert!(!prompt.contains("col_30"));
        assert!(prompt.contains("Original SQL: select x from t"));
        assert!(prompt.contains("Error: no such column: x"));
    }

    #[test]
    fn generation_prompt_includes_summary_when_present() {
        let prompt = generation_prompt("User: hi", Some("COLUMNS: a"));
        assert!(prompt.contains("Dataset summary:\nCOLUMNS: a"));
        assert!(prompt.contains("Conversation:\nUser: hi"));
        assert!(prompt.contains("CURRENT_DATE"));
    }
}
