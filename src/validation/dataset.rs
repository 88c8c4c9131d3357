//! File-level dataset validation
//!
//! Reads a JSONL training or validation file, checks every record against
//! the format expected by the target model and enforces the service limits
//! on record count and file size. Problems are collected into a report
//! instead of aborting at the first bad line.

use crate::core::constants::limits;
use crate::validation::chat::validate_chat;
use crate::validation::registry::{InputType, ModelRegistry, ModelSpec};
use crate::validation::schema::{validate_converse, validate_prompt_completion};
use serde_json::Value;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Model '{name}' is not supported. Supported models: {supported}")]
    UnknownModel { name: String, supported: String },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Which side of a training/validation pair a file is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    Training,
    Validation,
}

impl DatasetKind {
    fn max_records(self) -> usize {
        match self {
            DatasetKind::Training => limits::MAX_TRAIN_RECORDS,
            DatasetKind::Validation => limits::MAX_VALIDATION_RECORDS,
        }
    }

    fn max_size_gb(self) -> f64 {
        match self {
            DatasetKind::Training => limits::MAX_TRAINING_SIZE_GB,
            DatasetKind::Validation => limits::MAX_VALIDATION_SIZE_GB,
        }
    }

    fn label(self) -> &'static str {
        match self {
            DatasetKind::Training => "Training",
            DatasetKind::Validation => "Validation",
        }
    }
}

/// Outcome of validating one file
#[derive(Debug, Clone)]
pub struct FileReport {
    pub path: PathBuf,
    pub kind: DatasetKind,
    pub line_count: usize,
    pub errors: Vec<String>,
}

impl FileReport {
    pub fn passed(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Outcome of validating a training file and an optional validation file
#[derive(Debug, Clone)]
pub struct PairReport {
    pub training: FileReport,
    pub validation: Option<FileReport>,
    /// Problems spanning both files
    pub errors: Vec<String>,
}

impl PairReport {
    pub fn passed(&self) -> bool {
        self.errors.is_empty()
            && self.training.passed()
            && self.validation.as_ref().is_none_or(FileReport::passed)
    }

    /// Every error, prefixed with the file it came from
    pub fn all_errors(&self) -> Vec<String> {
        let mut all = Vec::new();
        for report in std::iter::once(&self.training).chain(self.validation.as_ref()) {
            all.extend(
                report
                    .errors
                    .iter()
                    .map(|error| format!("{}: {error}", report.path.display())),
            );
        }
        all.extend(self.errors.iter().cloned());
        all
    }
}

/// Validates datasets for one customizable model
#[derive(Debug, Clone)]
pub struct DatasetValidator {
    spec: &'static ModelSpec,
}

impl DatasetValidator {
    pub fn new(spec: &'static ModelSpec) -> Self {
        Self { spec }
    }

    pub fn for_model(name: &str) -> Result<Self, ValidationError> {
        ModelRegistry::get(name)
            .map(Self::new)
            .ok_or_else(|| ValidationError::UnknownModel {
                name: name.to_string(),
                supported: ModelRegistry::names().join(", "),
            })
    }

    pub fn spec(&self) -> &'static ModelSpec {
        self.spec
    }

    /// Check one parsed record
    pub fn validate_row(&self, row: &Value) -> Vec<String> {
        match self.spec.input_type {
            InputType::Converse => validate_converse(row, self.spec.model_type),
            InputType::PromptCompletion => validate_prompt_completion(row),
            InputType::Chat => validate_chat(row),
        }
    }

    /// Check every line of `reader`; returns the line count and errors
    pub fn validate_reader<R: BufRead>(
        &self,
        reader: R,
        kind: DatasetKind,
    ) -> io::Result<(usize, Vec<String>)> {
        let mut errors = Vec::new();
        let mut line_count = 0;

        // Raw bytes so a line with invalid UTF-8 is reported, not fatal
        for (index, line) in reader.split(b'\n').enumerate() {
            let mut line = line?;
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            line_count += 1;
            let line_number = index + 1;

            let row: Value = match serde_json::from_slice(&line) {
                Ok(row) => row,
                Err(e) => {
                    debug!("Line {} failed to parse: {}", line_number, e);
                    errors.push(format!("Line {line_number}: Invalid JSON"));
                    continue;
                }
            };

            errors.extend(
                self.validate_row(&row)
                    .into_iter()
                    .map(|error| format!("Line {line_number}: {error}")),
            );
        }

        errors.extend(self.count_error(line_count, kind));
        Ok((line_count, errors))
    }

    fn count_error(&self, count: usize, kind: DatasetKind) -> Option<String> {
        let max = kind.max_records();
        match self.spec.input_type {
            InputType::Chat if !(limits::MIN_LINES..=max).contains(&count) => Some(format!(
                "File has {count} lines. {} data should have between {} and {max} lines.",
                kind.label(),
                limits::MIN_LINES
            )),
            InputType::Converse | InputType::PromptCompletion if count > max => Some(format!(
                "The {} dataset contains {count} records, which exceeds the maximum allowed limit of {max}.",
                kind.label().to_lowercase()
            )),
            _ => None,
        }
    }

    /// Validate a JSONL file on disk
    pub fn validate_file(&self, path: &Path, kind: DatasetKind) -> Result<FileReport, ValidationError> {
        let io_error = |source| ValidationError::Io {
            path: path.to_path_buf(),
            source,
        };

        let size = std::fs::metadata(path).map_err(io_error)?.len();
        let file = File::open(path).map_err(io_error)?;
        let (line_count, mut errors) = self
            .validate_reader(BufReader::new(file), kind)
            .map_err(io_error)?;

        let size_gb = size as f64 / BYTES_PER_GB;
        if size_gb > kind.max_size_gb() {
            errors.push(format!(
                "{} file size ({size_gb:.2} GB) exceeds the maximum allowed size ({} GB)",
                kind.label(),
                kind.max_size_gb()
            ));
        }

        if errors.is_empty() {
            info!("{} file {} passed ({} lines)", kind.label(), path.display(), line_count);
        } else {
            warn!(
                "{} file {} has {} problem(s)",
                kind.label(),
                path.display(),
                errors.len()
            );
        }

        Ok(FileReport {
            path: path.to_path_buf(),
            kind,
            line_count,
            errors,
        })
    }

    /// Validate a training file and an optional validation file together
    pub fn validate_pair(
        &self,
        training: &Path,
        validation: Option<&Path>,
    ) -> Result<PairReport, ValidationError> {
        let training = self.validate_file(training, DatasetKind::Training)?;
        let validation = validation
            .map(|path| self.validate_file(path, DatasetKind::Validation))
            .transpose()?;

        let total = training.line_count + validation.as_ref().map_or(0, |r| r.line_count);
        let mut errors = Vec::new();
        if total > limits::MAX_TOTAL_LINES {
            errors.push(format!(
                "Total number of lines ({total}) exceeds the maximum allowed ({})",
                limits::MAX_TOTAL_LINES
            ));
        }

        Ok(PairReport {
            training,
            validation,
            errors,
        })
    }
}
