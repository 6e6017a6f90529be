use thiserror::Error;

use crate::handle::FileType;

/// Errors produced by type-level validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    /// The handle failed validation and must not reach the filesystem.
    #[error("invalid handle {tpe}/{name:?}: {reason}")]
    InvalidHandle {
        tpe: FileType,
        name: String,
        reason: String,
    },
}
