// src/error.rs
//
// Boundary error types.
//
// Only failures the caller must act on live here: unknown identifiers,
// missing upstream sources, invalid input files and cache faults. Model
// loading and advisory failures are handled inside their components and
// never reach these types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unknown scenario_id: {0}")]
    UnknownScenario(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("invalid {what}: {message}")]
    InvalidInput { what: String, message: String },

    #[error("failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse '{path}': {message}")]
    Parse { path: String, message: String },

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl PipelineError {
    pub fn invalid(what: impl Into<String>, message: impl Into<String>) -> Self {
        PipelineError::InvalidInput {
            what: what.into(),
            message: message.into(),
        }
    }

    /// True for "not found" style failures (unknown ids).
    pub fn is_not_found(&self) -> bool {
        matches!(self, PipelineError::UnknownScenario(_))
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("generation {0} is not staged")]
    UnknownGeneration(u64),

    #[error("duplicate key {0}")]
    DuplicateKey(String),

    #[error("row for scenario '{found}' written under '{expected}'")]
    ScenarioMismatch { expected: String, found: String },

    #[error("corrupt cache row: {0}")]
    Corrupt(String),

    #[error("cache lock poisoned")]
    Poisoned,
}

/// Read a file into a string, attaching the path to failures.
pub(crate) fn read_to_string(path: &std::path::Path) -> Result<String, PipelineError> {
    std::fs::read_to_string(path).map_err(|source| PipelineError::Io {
        path: path.display().to_string(),
        source,
    })
}
