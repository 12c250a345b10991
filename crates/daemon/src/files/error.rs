//! Error type shared by the filesystem core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by the filesystem operations.
///
/// The display strings are the messages clients see, except for [`FileError::Io`]
/// whose details are logged and replaced by a generic message at the HTTP edge.
#[derive(Debug, Error)]
pub enum FileError {
    /// The path is empty or escapes the confinement root.
    #[error("Path is not safe")]
    NotSafe,

    /// The path does not exist.
    #[error("{what} not found")]
    NotFound { what: &'static str },

    /// A directory was required.
    #[error("Path is not a directory")]
    NotADirectory,

    /// A regular file was required.
    #[error("Path is not a file")]
    NotAFile,

    /// The destination already exists.
    #[error("Destination path already exists")]
    Conflict,

    /// The request is malformed.
    #[error("{0}")]
    InvalidRequest(String),

    /// Underlying filesystem failure.
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FileError {
    /// `Path not found`.
    pub fn path_not_found() -> Self {
        FileError::NotFound { what: "Path" }
    }

    /// `Source path not found`.
    pub fn source_not_found() -> Self {
        FileError::NotFound {
            what: "Source path",
        }
    }

    /// Wrap an IO error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FileError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias using FileError.
pub type FileResult<T> = std::result::Result<T, FileError>;
