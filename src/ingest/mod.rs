pub mod csv;

use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum IngestError {
    DecodeError(String),
    ParsingError(String),
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::DecodeError(msg) => write!(f, "Decode error: {}", msg),
            IngestError::ParsingError(msg) => write!(f, "Parsing error: {}", msg),
        }
    }
}

impl Error for IngestError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Double,
    Boolean,
    Text,
}

impl ColumnType {
    pub fn label(&self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::Double => "double",
            ColumnType::Boolean => "boolean",
            ColumnType::Text => "text",
        }
    }

    /// Infers a column type from string values. Blank cells are ignored;
    /// a column with no non-blank cells is text.
    pub fn infer<'a>(values: impl Iterator<Item = &'a str>) -> ColumnType {
        let mut saw_value = false;
        let mut all_int = true;
        let mut all_float = true;
        let mut all_bool = true;

        for value in values {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            saw_value = true;
            if all_int && value.parse::<i64>().is_err() {
                all_int = false;
            }
            if all_float && value.parse::<f64>().is_err() {
                all_float = false;
            }
            if all_bool && !matches!(value.to_ascii_lowercase().as_str(), "true" | "false") {
                all_bool = false;
            }
            if !all_int && !all_float && !all_bool {
                return ColumnType::Text;
            }
        }

        if !saw_value {
            ColumnType::Text
        } else if all_bool {
            ColumnType::Boolean
        } else if all_int {
            ColumnType::Integer
        } else if all_float {
            ColumnType::Double
        } else {
            ColumnType::Text
        }
    }
}

/// Infers a type per column by sampling up to `sample_rows` rows.
pub fn infer_types(
    columns: &[String],
    rows: &[Vec<String>],
    sample_rows: usize,
) -> Vec<ColumnType> {
    (0..columns.len())
        .map(|idx| {
            ColumnType::infer(
                rows.iter()
                    .take(sample_rows)
                    .filter_map(|row| row.get(idx))
                    .map(String::as_str),
            )
        })
        .collect()
}

/// An in-memory tabular dataset loaded from an uploaded file. Kept around
/// for prompt summaries and repair-prompt column hints; SQL execution runs
/// against the configured database, not against this.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub types: Vec<ColumnType>,
    pub rows: Vec<Vec<String>>,
}

impl Dataset {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn summary(&self, max_chars: usize) -> String {
        table_summary(&self.columns, &self.types, &self.rows, max_chars)
    }
}

/// Renders the summary block consumed by the model:
/// `COLUMNS:` line, `TYPES:` line, then up to five `key:value` sample rows
/// joined with " | ". Output is clipped to `max_chars` with an ellipsis.
pub fn table_summary(
    columns: &[String],
    types: &[ColumnType],
    rows: &[Vec<String>],
    max_chars: usize,
) -> String {
    let type_pairs: Vec<String> = columns
        .iter()
        .zip(types.iter())
        .map(|(name, ty)| format!("{}:{}", name, ty.label()))
        .collect();

    let sample_lines: Vec<String> = rows
        .iter()
        .take(5)
        .map(|row| {
            columns
                .iter()
                .zip(row.iter())
                .map(|(name, value)| format!("{}:{}", name, value))
                .collect::<Vec<_>>()
                .join(" | ")
        })
        .collect();

    let summary = format!(
        "COLUMNS: {}\nTYPES: {}\nSAMPLE:\n{}",
        columns.join(", "),
        type_pairs.join(", "),
        sample_lines.join("\n")
    );
    clip_chars(&summary, max_chars)
}

/// Truncates `text` to `max_chars` characters, marking the cut with `...`.
pub fn clip_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let mut clipped: String = text.chars().take(max_chars).collect();
        clipped.push_str("...");
        clipped
    } else {
        text.to_string()
    }
}
