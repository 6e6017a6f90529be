use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for a local-filesystem backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Root directory of the repository.
    pub path: PathBuf,
    /// Layout name. The empty string selects the default layout.
    #[serde(default)]
    pub layout: String,
}

impl LocalConfig {
    /// Configuration for a repository at `path` using the default layout.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            layout: String::new(),
        }
    }

    /// Configuration for a repository at `path` with an explicit layout
    /// name.
    pub fn with_layout(path: impl Into<PathBuf>, layout: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            layout: layout.into(),
        }
    }
}
