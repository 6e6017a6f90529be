use std::io::Read;

use cairn_types::{FileInfo, FileType, Handle};

use crate::error::Result;
use crate::stream::{Cancellation, NameStream};

/// A storage backend for Cairn repositories.
///
/// All implementations must satisfy these invariants:
/// - Objects are write-once: a successful save makes the content final, and
///   saving over an existing name fails with `AlreadyExists` instead of
///   replacing content.
/// - Readers never observe a partially written object under a name that a
///   save has reported as successful.
/// - The backend never interprets object contents — it stores and retrieves
///   opaque bytes.
/// - Invalid handles are rejected before any storage operation.
/// - All I/O errors are propagated with the failing phase attached; nothing
///   is retried internally.
pub trait Backend: Send + Sync {
    /// Human-readable location of this backend (a directory path for the
    /// local backend).
    fn location(&self) -> &str;

    /// Store the full content of `from` under `handle`, durably and exactly
    /// once. Fails with `AlreadyExists` if an object of this name is
    /// already present.
    fn save(&self, handle: &Handle, from: &mut dyn Read) -> Result<()>;

    /// Open the object at `handle` for reading, starting at `offset`.
    ///
    /// A positive `length` bounds the reader to at most that many bytes;
    /// `length == 0` reads to the end. Reading short when the object ends
    /// before `offset + length` is the reader's ordinary behavior, not an
    /// error. The returned reader is released on drop.
    fn load(&self, handle: &Handle, length: u64, offset: u64) -> Result<Box<dyn Read + Send>>;

    /// Size of the stored object. Fails with `NotFound` if it is absent.
    fn stat(&self, handle: &Handle) -> Result<FileInfo>;

    /// Existence probe. Absence is `Ok(false)`, never an error; any other
    /// I/O failure is surfaced.
    fn contains(&self, handle: &Handle) -> Result<bool>;

    /// Remove the object at `handle`. Removing an absent object fails with
    /// `NotFound`.
    fn remove(&self, handle: &Handle) -> Result<()>;

    /// Stream the names of all objects of `tpe`.
    ///
    /// The listing runs on a background worker and is drained through the
    /// returned iterator. Raising `cancel` terminates the stream early. An
    /// absent root yields an empty stream — for enumeration, unlike
    /// [`Backend::stat`] and [`Backend::load`], absence is not an error.
    fn list(&self, tpe: FileType, cancel: &Cancellation) -> NameStream;

    /// Remove the entire repository and everything in it. Irreversible;
    /// intended for full teardown only.
    fn delete(&self) -> Result<()>;

    /// Release resources held by the backend. The provided backends keep
    /// nothing open across calls, so this defaults to a no-op.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}
