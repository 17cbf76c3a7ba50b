use crate::ingest::{Dataset, IngestError, infer_types};
use encoding_rs::{Encoding, GBK, UTF_8, WINDOWS_1252};
use tracing::info;

/// Loads uploaded CSV bytes into a [`Dataset`].
///
/// Files arrive in whatever encoding the user's spreadsheet tool produced,
/// so decoding walks a fallback chain before parsing: UTF-8 (BOM-aware),
/// then GBK, then Windows-1252 as the terminal lossless fallback.
pub struct CsvLoader {
    type_sample_rows: usize,
}

const ENCODING_CHAIN: [&Encoding; 3] = [UTF_8, GBK, WINDOWS_1252];

impl CsvLoader {
    pub fn new() -> Self {
        Self {
            type_sample_rows: 200,
        }
    }

    pub fn load_bytes(&self, bytes: &[u8]) -> Result<Dataset, IngestError> {
        let (decoded, encoding) = decode_bytes(bytes)?;

        let mut reader = csv::ReaderBuilder::new().from_reader(decoded.as_bytes());

        let columns: Vec<String> = reader
            .headers()
            .map_err(|e| IngestError::ParsingError(e.to_string()))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        if columns.is_empty() || columns.iter().all(|c| c.is_empty()) {
            return Err(IngestError::ParsingError("no header row found".to_string()));
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| IngestError::ParsingError(e.to_string()))?;
            rows.push(record.iter().map(|field| field.to_string()).collect());
        }

        let types = infer_types(&columns, &rows, self.type_sample_rows);
        info!(
            "loaded CSV (encoding={}): {} rows, {} columns",
            encoding,
            rows.len(),
            columns.len()
        );

        Ok(Dataset {
            columns,
            types,
            rows,
        })
    }
}

impl Default for CsvLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_bytes(bytes: &[u8]) -> Result<(String, &'static str), IngestError> {
    for encoding in ENCODING_CHAIN {
        let (text, _, had_errors) = encoding.decode(bytes);
        if !had_errors {
            return Ok((text.into_owned(), encoding.name()));
        }
    }
    // Windows-1252 maps every byte, so this is only reachable if the chain
    // changes.
    Err(IngestError::DecodeError(
        "no candidate encoding decoded the file".to_string(),
    ))
}
