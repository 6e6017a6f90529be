//! Error types for storage backend operations.

use std::fmt;
use std::io;

use thiserror::Error;

use cairn_types::{Handle, TypeError};

/// The phase of a backend operation during which an I/O error occurred.
///
/// Carried inside [`BackendError::Io`] so callers can log precisely where a
/// failure happened without parsing messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IoPhase {
    /// Creating a directory (bootstrap or shard parent).
    CreateDir,
    /// Opening a file for reading or create-exclusive writing.
    OpenFile,
    /// Copying object bytes into the target file.
    Write,
    /// Flushing written data to stable storage.
    Sync,
    /// Changing permission bits.
    Chmod,
    /// Querying file metadata.
    Stat,
    /// Seeking to a read offset.
    Seek,
    /// Unlinking a single object file.
    Remove,
    /// Recursively removing the repository root.
    RemoveAll,
}

impl fmt::Display for IoPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CreateDir => "CreateDir",
            Self::OpenFile => "OpenFile",
            Self::Write => "Write",
            Self::Sync => "Sync",
            Self::Chmod => "Chmod",
            Self::Stat => "Stat",
            Self::Seek => "Seek",
            Self::Remove => "Remove",
            Self::RemoveAll => "RemoveAll",
        };
        f.write_str(name)
    }
}

/// Errors that can occur during backend operations.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The handle failed validation; the filesystem was not touched.
    #[error(transparent)]
    InvalidHandle(#[from] TypeError),

    /// An object already exists under this name. Saving over an existing
    /// object is refused: names are immutable once assigned.
    #[error("object already exists: {handle}")]
    AlreadyExists { handle: Handle },

    /// The object addressed by the handle does not exist.
    #[error("object not found: {handle}")]
    NotFound { handle: Handle },

    /// The configured layout name is not known.
    #[error("unknown layout: {name:?}")]
    UnknownLayout { name: String },

    /// An I/O failure, tagged with the phase that failed.
    #[error("{phase} failed: {source}")]
    Io {
        phase: IoPhase,
        #[source]
        source: io::Error,
    },
}

impl BackendError {
    pub(crate) fn io(phase: IoPhase, source: io::Error) -> Self {
        Self::Io { phase, source }
    }
}

/// Convenience type alias for backend operations.
pub type Result<T> = std::result::Result<T, BackendError>;
