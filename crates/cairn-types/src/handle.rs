use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// The category of a stored object.
///
/// A Cairn repository holds a small closed set of object categories. All of
/// them except [`FileType::Config`] are content-addressed: the object's name
/// is derived from its content by the layers above the storage backend.
/// `Config` is a singleton with an empty name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// Repository configuration. Singleton; addressed without a name.
    Config,
    /// Packed object data. High-cardinality; stored in shard subdirectories.
    Data,
    /// Key material for repository access.
    Key,
    /// Advisory lock marker.
    Lock,
    /// Point-in-time snapshot description.
    Snapshot,
    /// Index over packed data.
    Index,
}

impl FileType {
    /// Every file type, in a fixed order. Used by layouts to enumerate the
    /// directories a repository consists of.
    pub const ALL: [FileType; 6] = [
        FileType::Config,
        FileType::Data,
        FileType::Key,
        FileType::Lock,
        FileType::Snapshot,
        FileType::Index,
    ];
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config => write!(f, "config"),
            Self::Data => write!(f, "data"),
            Self::Key => write!(f, "key"),
            Self::Lock => write!(f, "lock"),
            Self::Snapshot => write!(f, "snapshot"),
            Self::Index => write!(f, "index"),
        }
    }
}

/// Characters that must not appear anywhere in an object name.
///
/// Names become single filesystem path components; separators and NUL would
/// let a malformed name escape the backend's directory tree.
const FORBIDDEN_CHARS: &[char] = &['/', '\\', '\0'];

/// Identity of a stored object: a file type plus a content-derived name.
///
/// A `Handle` is pure identity. It carries no path information; mapping a
/// handle to a location is the job of a storage backend's layout.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Handle {
    /// The category of the object.
    pub tpe: FileType,
    /// Content-derived name. Empty for the singleton config type.
    pub name: String,
}

impl Handle {
    /// Create a handle for an object of `tpe` named `name`.
    pub fn new(tpe: FileType, name: impl Into<String>) -> Self {
        Self {
            tpe,
            name: name.into(),
        }
    }

    /// The handle addressing the repository config singleton.
    pub fn config() -> Self {
        Self {
            tpe: FileType::Config,
            name: String::new(),
        }
    }

    /// Validate this handle, returning `Ok(())` if it may be used for
    /// storage operations.
    ///
    /// The config type requires an empty name; every other type requires a
    /// non-empty, path-safe name. Backends reject invalid handles before
    /// touching the filesystem.
    pub fn validate(&self) -> Result<(), TypeError> {
        if self.tpe == FileType::Config {
            if !self.name.is_empty() {
                return Err(self.invalid("config handles must not carry a name"));
            }
            return Ok(());
        }

        if self.name.is_empty() {
            return Err(self.invalid("name must not be empty"));
        }

        for ch in FORBIDDEN_CHARS {
            if self.name.contains(*ch) {
                return Err(self.invalid(format!("name contains forbidden character {ch:?}")));
            }
        }

        // `..` and a leading dot would address entries outside the object
        // tree or hide the file from enumeration.
        if self.name.contains("..") {
            return Err(self.invalid("name must not contain '..'"));
        }
        if self.name.starts_with('.') {
            return Err(self.invalid("name must not start with '.'"));
        }

        Ok(())
    }

    fn invalid(&self, reason: impl Into<String>) -> TypeError {
        TypeError::InvalidHandle {
            tpe: self.tpe,
            name: self.name.clone(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "{}", self.tpe)
        } else {
            write!(f, "{}/{}", self.tpe, self.name)
        }
    }
}

/// Stat information about a stored object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Size of the stored object in bytes.
    pub size: u64,
}
