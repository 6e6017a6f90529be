//! Mapping from object handles to filesystem locations.
//!
//! A layout owns all path construction for a repository: which directory
//! holds each file type, where a single object lives, and which directories
//! must exist before the store is usable. The backend itself builds no
//! paths — it asks its layout.

use std::fmt;
use std::path::{Path, PathBuf};

use cairn_types::{FileType, Handle};

use crate::error::{BackendError, Result};

/// Permission bits used on the files and directories a layout describes.
pub mod modes {
    /// Mode for directories created during bootstrap and sharded saves.
    pub const DIR: u32 = 0o700;
    /// Mode for object files while they are being written.
    pub const FILE: u32 = 0o600;
    /// Immutability marker applied after a successful save.
    pub const READONLY: u32 = 0o400;
    /// Mode restored before unlinking; some filesystems refuse to delete
    /// owner-read-only files under restrictive umasks.
    pub const UNLOCK: u32 = 0o660;
}

/// Filesystem layout of a repository.
pub trait Layout: Send + Sync + fmt::Debug {
    /// Absolute path of the file holding the object addressed by `handle`.
    fn filename(&self, handle: &Handle) -> PathBuf;

    /// Root directory holding objects of `tpe`.
    fn dirname(&self, tpe: FileType) -> PathBuf;

    /// Whether objects of `tpe` live in shard subdirectories below their
    /// root directory.
    fn sharded(&self, tpe: FileType) -> bool;

    /// Every directory that must exist for the store to operate. Shard
    /// subdirectories are not included; they are created on first save.
    fn paths(&self) -> Vec<PathBuf>;
}

/// Subdirectory name for each file type. Config is a single file directly
/// under the repository root.
fn type_dir(tpe: FileType) -> &'static str {
    match tpe {
        FileType::Config => "",
        FileType::Data => "data",
        FileType::Key => "keys",
        FileType::Lock => "locks",
        FileType::Snapshot => "snapshots",
        FileType::Index => "index",
    }
}

/// The standard layout: one directory per file type, with the
/// high-cardinality data type sharded into subdirectories keyed by the
/// first two characters of the object name.
///
/// ```text
/// <root>/config
/// <root>/data/<name[0..2]>/<name>
/// <root>/index/<name>
/// <root>/keys/<name>
/// <root>/locks/<name>
/// <root>/snapshots/<name>
/// ```
#[derive(Clone, Debug)]
pub struct DefaultLayout {
    path: PathBuf,
}

impl DefaultLayout {
    /// A default layout rooted at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Layout for DefaultLayout {
    fn filename(&self, handle: &Handle) -> PathBuf {
        if handle.tpe == FileType::Config {
            return self.path.join("config");
        }
        let dir = self.dirname(handle.tpe);
        if self.sharded(handle.tpe) {
            // Names shorter than the shard prefix land directly in the
            // type root.
            if let Some(prefix) = handle.name.get(..2) {
                return dir.join(prefix).join(&handle.name);
            }
        }
        dir.join(&handle.name)
    }

    fn dirname(&self, tpe: FileType) -> PathBuf {
        if tpe == FileType::Config {
            self.path.clone()
        } else {
            self.path.join(type_dir(tpe))
        }
    }

    fn sharded(&self, tpe: FileType) -> bool {
        tpe == FileType::Data
    }

    fn paths(&self) -> Vec<PathBuf> {
        FileType::ALL
            .iter()
            .filter(|tpe| **tpe != FileType::Config)
            .map(|tpe| self.dirname(*tpe))
            .collect()
    }
}

/// A layout without shard subdirectories: every object of a type sits
/// directly in the type's root directory. Suited to filesystems where
/// directory fan-out is cheap, or small repositories.
#[derive(Clone, Debug)]
pub struct FlatLayout {
    path: PathBuf,
}

impl FlatLayout {
    /// A flat layout rooted at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Layout for FlatLayout {
    fn filename(&self, handle: &Handle) -> PathBuf {
        if handle.tpe == FileType::Config {
            return self.path.join("config");
        }
        self.dirname(handle.tpe).join(&handle.name)
    }

    fn dirname(&self, tpe: FileType) -> PathBuf {
        if tpe == FileType::Config {
            self.path.clone()
        } else {
            self.path.join(type_dir(tpe))
        }
    }

    fn sharded(&self, _tpe: FileType) -> bool {
        false
    }

    fn paths(&self) -> Vec<PathBuf> {
        FileType::ALL
            .iter()
            .filter(|tpe| **tpe != FileType::Config)
            .map(|tpe| self.dirname(*tpe))
            .collect()
    }
}

/// Select a layout by name. The empty string selects [`DefaultLayout`].
pub fn parse_layout(name: &str, path: &Path) -> Result<Box<dyn Layout>> {
    match name {
        "" | "default" => Ok(Box::new(DefaultLayout::new(path))),
        "flat" => Ok(Box::new(FlatLayout::new(path))),
        other => Err(BackendError::UnknownLayout {
            name: other.to_string(),
        }),
    }
}
