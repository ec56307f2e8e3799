// src/errors.rs

//! Crate-wide error types.
//!
//! - [`ConfigurationError`]: a task graph or config that can never run
//!   (unknown dependency, cycle, bad settings). Detected before any I/O.
//! - [`TaskGraphError`]: outcome of a failed [`crate::dag::TaskGraph`] run.
//! - [`VertexsyncError`]: everything surfaced to `connect` callers and the
//!   CLI.

use thiserror::Error;

use crate::db::DbError;

#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("task '{task}' has unknown dependency '{dependency}'")]
    MissingDependency { task: String, dependency: String },

    #[error("cycle detected in task graph involving task '{0}'")]
    CycleDetected(String),

    #[error("task '{0}' is declared more than once")]
    DuplicateTask(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum TaskGraphError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("task '{name}' failed: {cause:#}")]
    TaskFailed { name: String, cause: anyhow::Error },
}

#[derive(Error, Debug)]
pub enum VertexsyncError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Connection failed: {0}")]
    ConnectionFailed(#[source] DbError),

    #[error("Schema synchronization failed in task '{task}': {cause:#}")]
    SchemaSyncFailed { task: String, cause: anyhow::Error },

    #[error("Query on '{collection}' failed: {cause}")]
    QueryFailed {
        collection: String,
        #[source]
        cause: DbError,
    },

    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<TaskGraphError> for VertexsyncError {
    fn from(err: TaskGraphError) -> Self {
        match err {
            TaskGraphError::Configuration(e) => VertexsyncError::Configuration(e),
            TaskGraphError::TaskFailed { name, cause } => {
                VertexsyncError::SchemaSyncFailed { task: name, cause }
            }
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, VertexsyncError>;
