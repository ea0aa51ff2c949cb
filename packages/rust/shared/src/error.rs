//! Error types for Curiosity.
//!
//! Library crates use [`CuriosityError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Curiosity operations.
#[derive(Debug, thiserror::Error)]
pub enum CuriosityError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Season metadata file is missing or is not valid JSON.
    #[error("failed to read season metadata {path:?}: {message}")]
    MetadataParse { path: PathBuf, message: String },

    /// An episode listed in the metadata has no transcript on disk.
    #[error("missing transcript for episode '{episode}' of season '{season}' (expected {path:?})")]
    MissingTranscript {
        season: String,
        episode: String,
        path: PathBuf,
    },

    /// The external index tool could not be run or reported failure.
    #[error("index build failed for {failed} of {total} season file(s)")]
    ToolInvocation { failed: usize, total: usize },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CuriosityError>;

impl CuriosityError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a metadata error for the file at `path`.
    pub fn metadata(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::MetadataParse {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
