//! Error types for the cleanup engine

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CleanupError {
    /// Invalid or contradictory options, bad regex, nothing to clean
    #[error("{0}")]
    Config(String),

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to activate credentials: {0:#}")]
    Auth(anyhow::Error),

    /// The target is on the protected list and is never cleaned
    #[error("refusing to clean protected {0}")]
    Forbidden(String),

    #[error("failed to parse creation time {value:?} of cluster {cluster}: {source}")]
    TimeParse {
        cluster: String,
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("registry {0} is not supported, only *gcr.io registries are")]
    UnsupportedRegistry(String),

    /// A registry or GKE call failed
    #[error("{0:#}")]
    Api(anyhow::Error),

    #[error("cleanup of project {project} timed out after {after:?}")]
    Timeout { project: String, after: Duration },

    #[error("{failures} errors occurred during cleanup")]
    Incomplete { failures: usize },
}

impl CleanupError {
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::Forbidden(_))
    }
}

/// A per-project failure, with the number of resources deleted before it hit.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct PartialDeletion {
    pub deleted: usize,
    #[source]
    pub error: CleanupError,
}

impl PartialDeletion {
    pub fn new(deleted: usize, error: CleanupError) -> Self {
        Self { deleted, error }
    }
}
