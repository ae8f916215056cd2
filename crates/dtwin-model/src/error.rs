//! Error types for the model repository

use crate::id::ModelId;
use crate::parser::ParseIssue;
use std::path::PathBuf;

/// Errors raised by [`crate::ModelRepository`]
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// Definition directory does not exist
    #[error("model directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    /// IO error while reading definitions
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Definitions did not conform to the language
    #[error("model validation failed with {} issue(s)", .0.len())]
    Validation(Vec<ParseIssue>),

    /// A definition text is not a JSON document
    #[error("definition {index} is not valid JSON: {source}")]
    Json {
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    /// Model already present in the repository
    #[error("model already loaded: {0}")]
    DuplicateModel(ModelId),

    /// Key does not match the entity identifier
    #[error("model key {key} does not match entity id {entity}")]
    KeyMismatch { key: ModelId, entity: ModelId },
}

impl RepositoryError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Parse issues, if this is a validation failure
    #[must_use]
    pub fn issues(&self) -> Option<&[ParseIssue]> {
        match self {
            Self::Validation(issues) => Some(issues),
            _ => None,
        }
    }
}
