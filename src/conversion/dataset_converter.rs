//! Training dataset format conversion
//!
//! Turns raw exports into the JSONL layouts accepted by customization jobs:
//! a JSON array into one object per line, and prompt/completion rows into
//! single-turn `bedrock-conversation-2024` records.

use crate::models::dataset::ConverseRecord;
use serde_json::Value;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Line {line}: Invalid JSON: {source}")]
    InvalidJson {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Input must be a JSON array of objects: {0}")]
    NotAnArray(String),

    #[error("Element {index} of {path} is not a JSON object")]
    NotAnObject { path: String, index: usize },

    #[error("Line {line}: column '{column}' is missing or empty")]
    MissingColumn { line: usize, column: String },

    #[error("Failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> ConversionError + '_ {
    move |source| ConversionError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn create_output(path: &Path) -> Result<BufWriter<File>, ConversionError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
    }
    Ok(BufWriter::new(File::create(path).map_err(io_error(path))?))
}

/// Rewrite a JSON array file as JSONL
///
/// Each array element is written as one compact JSON line. Returns the
/// number of records written.
pub fn json_to_jsonl(input: &Path, output: &Path) -> Result<usize, ConversionError> {
    let raw = fs::read_to_string(input).map_err(io_error(input))?;
    let parsed: Value =
        serde_json::from_str(&raw).map_err(|source| ConversionError::InvalidJson { line: 1, source })?;

    let Value::Array(items) = parsed else {
        return Err(ConversionError::NotAnArray(input.display().to_string()));
    };
    if let Some(index) = items.iter().position(|item| !item.is_object()) {
        return Err(ConversionError::NotAnObject {
            path: input.display().to_string(),
            index,
        });
    }

    let mut writer = create_output(output)?;
    for item in &items {
        serde_json::to_writer(&mut writer, item)?;
        writer.write_all(b"\n").map_err(io_error(output))?;
    }
    writer.flush().map_err(io_error(output))?;

    info!("Converted {} records from {} to {}", items.len(), input.display(), output.display());
    Ok(items.len())
}

/// Text of a column; list-valued columns contribute their first element
fn column_text(row: &Value, column: &str, line: usize) -> Result<String, ConversionError> {
    let missing = || ConversionError::MissingColumn {
        line,
        column: column.to_string(),
    };

    let value = match row.get(column).ok_or_else(missing)? {
        Value::Array(items) => items.first().ok_or_else(missing)?,
        other => other,
    };

    Ok(match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    })
}

/// Convert prompt/completion JSONL into conversation records
///
/// # Arguments
///
/// * `input` - JSONL file with one prompt/completion object per line
/// * `output` - Destination JSONL file; parent directories are created
/// * `prompt_column` - Column holding the user prompt
/// * `completion_column` - Column holding the expected answer
/// * `system` - Optional system prompt; an empty string adds no system block
pub fn prompt_completion_to_converse(
    input: &Path,
    output: &Path,
    prompt_column: &str,
    completion_column: &str,
    system: Option<&str>,
) -> Result<usize, ConversionError> {
    let reader = BufReader::new(File::open(input).map_err(io_error(input))?);
    let mut writer = create_output(output)?;
    let mut written = 0;

    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(io_error(input))?;
        if line.trim().is_empty() {
            continue;
        }
        let line_number = index + 1;

        let row: Value = serde_json::from_str(&line).map_err(|source| ConversionError::InvalidJson {
            line: line_number,
            source,
        })?;

        let prompt = column_text(&row, prompt_column, line_number)?;
        let completion = column_text(&row, completion_column, line_number)?;
        let record = ConverseRecord::single_turn(&prompt, &completion, system);

        serde_json::to_writer(&mut writer, &record)?;
        writer.write_all(b"\n").map_err(io_error(output))?;
        written += 1;
    }
    writer.flush().map_err(io_error(output))?;

    info!("Wrote {} conversation records to {}", written, output.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_json_to_jsonl() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("data.json");
        let output = dir.path().join("out/data.jsonl");
        fs::write(&input, r#"[{"prompt": "a", "completion": "b"}, {"prompt": "c", "completion": "d"}]"#).unwrap();

        assert_eq!(json_to_jsonl(&input, &output).unwrap(), 2);

        let written = fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], r#"{"completion":"b","prompt":"a"}"#);
    }

    #[test]
    fn test_json_to_jsonl_rejects_objects() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("data.json");
        fs::write(&input, r#"{"prompt": "a"}"#).unwrap();

        let result = json_to_jsonl(&input, &dir.path().join("out.jsonl"));
        assert!(matches!(result, Err(ConversionError::NotAnArray(_))));
    }

    #[test]
    fn test_json_to_jsonl_rejects_non_object_elements() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("data.json");
        let output = dir.path().join("out.jsonl");
        fs::write(&input, r#"[{"prompt": "a"}, "loose string", 3]"#).unwrap();

        let result = json_to_jsonl(&input, &output);
        assert!(matches!(result, Err(ConversionError::NotAnObject { index: 1, .. })));
        assert!(!output.exists());
    }

    #[test]
    fn test_prompt_completion_to_converse() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("pc.jsonl");
        let output = dir.path().join("converse.jsonl");
        fs::write(
            &input,
            "{\"question\": [\"What is S3?\", \"ignored\"], \"answer\": \"Object storage\"}\n\n{\"question\": \"Why?\", \"answer\": 42}\n",
        )
        .unwrap();

        let count =
            prompt_completion_to_converse(&input, &output, "question", "answer", Some("Be brief")).unwrap();
        assert_eq!(count, 2);

        let written = fs::read_to_string(&output).unwrap();
        let records: Vec<Value> = written.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(records[0]["schemaVersion"], "bedrock-conversation-2024");
        assert_eq!(records[0]["system"][0]["text"], "Be brief");
        assert_eq!(records[0]["messages"][0]["content"][0]["text"], "What is S3?");
        assert_eq!(records[1]["messages"][1]["content"][0]["text"], "42");
    }

    #[test]
    fn test_missing_column_names_line() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("pc.jsonl");
        fs::write(&input, "{\"prompt\": \"a\", \"completion\": \"b\"}\n{\"prompt\": \"c\"}\n").unwrap();

        let err = prompt_completion_to_converse(&input, &dir.path().join("o.jsonl"), "prompt", "completion", None)
            .unwrap_err();
        assert_eq!(err.to_string(), "Line 2: column 'completion' is missing or empty");
    }
}
