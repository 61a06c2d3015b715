//! Configuration error types

use crate::path::Path;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Top-level configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Resolution of a descriptor failed
    #[error("Failed to read configuration:\n{0}")]
    Read(#[from] ReadError),

    /// Writing a value back into a tree failed
    #[error("Failed to write configuration: {0}")]
    Write(#[from] WriteError),

    /// A source could not be materialized
    #[error("Configuration source error: {0}")]
    Source(#[from] SourceError),

    /// YAML parsing error
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// Validation error
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Failures raised while fetching a source's tree
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    /// IO error reading a file-backed source
    #[error("Failed to read {}: {message}", .path.display())]
    Io { path: PathBuf, message: String },

    /// The source content could not be turned into a tree
    #[error("Failed to parse source {source_name}: {message}")]
    Parse { source_name: String, message: String },

    /// The source is not available at all
    #[error("Source {source_name} is unavailable: {message}")]
    Unavailable { source_name: String, message: String },
}

/// Failures raised while writing a value into a tree
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WriteError {
    /// Two branches wrote to the same location
    #[error("Conflicting values written at {path}")]
    Collision { path: Path },

    /// The value could not be converted back to its stored representation
    #[error("Cannot write value at {path}: {message}")]
    Conversion { path: Path, message: String },
}

/// Classification of a [`ReadError`] leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadErrorKind {
    MissingValue,
    ParseError,
    UnknownKeys,
    SourceUnavailable,
    Conversion,
}

/// Aggregated, tree-shaped report of everything that failed during a read
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReadError {
    /// Nothing was found at the path
    #[error("Missing value at {path}{}", render_docs(.docs))]
    MissingValue { path: Path, docs: Vec<String> },

    /// A value was found but is malformed for the requested shape
    #[error("Parse error at {path}: {message}")]
    ParseError { path: Path, message: String },

    /// Keys present in a source that no descriptor consumed
    #[error("Unknown keys: {}", render_paths(.keys))]
    UnknownKeys { keys: Vec<Path> },

    /// None of the sources attached to the path could be loaded
    #[error("Source unavailable at {path} ({}): {message}", .sources.join(", "))]
    SourceUnavailable {
        path: Path,
        sources: Vec<String>,
        message: String,
    },

    /// A transformation rejected the value
    #[error("Conversion failed at {path}: {message}")]
    Conversion { path: Path, message: String },

    /// Every branch listed failed
    #[error("{}", render_group("All of the following failed", .0))]
    And(Vec<ReadError>),

    /// Every alternative listed failed
    #[error("{}", render_group("None of the alternatives succeeded", .0))]
    Or(Vec<ReadError>),
}

impl ReadError {
    pub fn missing(path: Path) -> Self {
        ReadError::MissingValue {
            path,
            docs: Vec::new(),
        }
    }

    pub fn parse(path: Path, message: impl Into<String>) -> Self {
        ReadError::ParseError {
            path,
            message: message.into(),
        }
    }

    pub fn conversion(path: Path, message: impl Into<String>) -> Self {
        ReadError::Conversion {
            path,
            message: message.into(),
        }
    }

    /// Combine two failures that both happened (product semantics)
    pub fn and(self, other: ReadError) -> Self {
        match (self, other) {
            (ReadError::And(mut left), ReadError::And(right)) => {
                left.extend(right);
                ReadError::And(left)
            }
            (ReadError::And(mut left), right) => {
                left.push(right);
                ReadError::And(left)
            }
            (left, ReadError::And(mut right)) => {
                right.insert(0, left);
                ReadError::And(right)
            }
            (left, right) => ReadError::And(vec![left, right]),
        }
    }

    /// Combine two failed alternatives
    pub fn or(self, other: ReadError) -> Self {
        match (self, other) {
            (ReadError::Or(mut left), ReadError::Or(right)) => {
                left.extend(right);
                ReadError::Or(left)
            }
            (ReadError::Or(mut left), right) => {
                left.push(right);
                ReadError::Or(left)
            }
            (left, right) => ReadError::Or(vec![left, right]),
        }
    }

    /// Fold a list of failures into a single `And` node; `None` when empty
    pub fn all(errors: Vec<ReadError>) -> Option<Self> {
        errors.into_iter().reduce(ReadError::and)
    }

    pub fn kind(&self) -> Option<ReadErrorKind> {
        match self {
            ReadError::MissingValue { .. } => Some(ReadErrorKind::MissingValue),
            ReadError::ParseError { .. } => Some(ReadErrorKind::ParseError),
            ReadError::UnknownKeys { .. } => Some(ReadErrorKind::UnknownKeys),
            ReadError::SourceUnavailable { .. } => Some(ReadErrorKind::SourceUnavailable),
            ReadError::Conversion { .. } => Some(ReadErrorKind::Conversion),
            ReadError::And(_) | ReadError::Or(_) => None,
        }
    }

    /// True when every leaf of the report is a missing value
    pub fn is_missing_only(&self) -> bool {
        match self {
            ReadError::MissingValue { .. } => true,
            ReadError::And(errors) | ReadError::Or(errors) => {
                errors.iter().all(ReadError::is_missing_only)
            }
            _ => false,
        }
    }

    /// All leaf failures, depth first
    pub fn leaves(&self) -> Vec<&ReadError> {
        match self {
            ReadError::And(errors) | ReadError::Or(errors) => {
                errors.iter().flat_map(ReadError::leaves).collect()
            }
            leaf => vec![leaf],
        }
    }

    /// Number of leaf failures
    pub fn len(&self) -> usize {
        self.leaves().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Paths of every leaf failure, unknown keys expanded
    pub fn paths(&self) -> Vec<&Path> {
        self.leaves()
            .into_iter()
            .flat_map(|leaf| match leaf {
                ReadError::MissingValue { path, .. }
                | ReadError::ParseError { path, .. }
                | ReadError::SourceUnavailable { path, .. }
                | ReadError::Conversion { path, .. } => vec![path],
                ReadError::UnknownKeys { keys } => keys.iter().collect(),
                ReadError::And(_) | ReadError::Or(_) => Vec::new(),
            })
            .collect()
    }

    pub(crate) fn with_docs(self, doc: &str) -> Self {
        match self {
            ReadError::MissingValue { path, mut docs } => {
                docs.push(doc.to_string());
                ReadError::MissingValue { path, docs }
            }
            ReadError::And(errors) => {
                ReadError::And(errors.into_iter().map(|e| e.with_docs(doc)).collect())
            }
            ReadError::Or(errors) => {
                ReadError::Or(errors.into_iter().map(|e| e.with_docs(doc)).collect())
            }
            other => other,
        }
    }
}

fn render_docs(docs: &[String]) -> String {
    if docs.is_empty() {
        String::new()
    } else {
        format!(" ({})", docs.join("; "))
    }
}

fn render_paths(paths: &[Path]) -> String {
    paths
        .iter()
        .map(|path| path.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn render_group(label: &str, errors: &[ReadError]) -> String {
    let mut out = format!("{}:", label);
    for error in errors {
        let rendered = error.to_string();
        let mut lines = rendered.lines();
        if let Some(first) = lines.next() {
            out.push_str("\n  - ");
            out.push_str(first);
        }
        for line in lines {
            out.push_str("\n    ");
            out.push_str(line);
        }
    }
    out
}
