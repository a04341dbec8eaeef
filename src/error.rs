// ABOUTME: Application-wide error types for releasectl.
// ABOUTME: Uses thiserror for ergonomic error handling.

use std::path::PathBuf;
use thiserror::Error;

use crate::graph::InvalidGraph;
use crate::lock::LockError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("workflow file not found in {0}")]
    WorkflowNotFound(PathBuf),

    #[error("cannot read request file {0}: {1}")]
    RequestFile(PathBuf, String),

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    InvalidGraph(#[from] InvalidGraph),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Process exit code the CLI uses when a run aborts with this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidGraph(_) => 3,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
