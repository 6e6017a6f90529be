use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::RwLock;

use cairn_types::{FileInfo, FileType, Handle};

use crate::error::{BackendError, IoPhase, Result};
use crate::stream::{Cancellation, NameStream};
use crate::traits::Backend;

/// In-memory, HashMap-based storage backend.
///
/// Intended for tests and embedding. It implements the full [`Backend`]
/// contract — including save exclusivity and streaming enumeration — so
/// code exercised against it behaves the same on the local backend.
pub struct InMemoryBackend {
    objects: RwLock<HashMap<Handle, Vec<u8>>>,
}

impl InMemoryBackend {
    /// Create a new empty in-memory backend.
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the backend holds no objects.
    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for InMemoryBackend {
    fn location(&self) -> &str {
        "memory"
    }

    fn save(&self, handle: &Handle, from: &mut dyn Read) -> Result<()> {
        handle.validate()?;

        // Drain the source before taking the lock; a slow reader must not
        // stall concurrent operations.
        let mut data = Vec::new();
        from.read_to_end(&mut data)
            .map_err(|e| BackendError::io(IoPhase::Write, e))?;

        let mut map = self.objects.write().expect("lock poisoned");
        if map.contains_key(handle) {
            return Err(BackendError::AlreadyExists {
                handle: handle.clone(),
            });
        }
        map.insert(handle.clone(), data);
        Ok(())
    }

    fn load(&self, handle: &Handle, length: u64, offset: u64) -> Result<Box<dyn Read + Send>> {
        handle.validate()?;
        let map = self.objects.read().expect("lock poisoned");
        let data = map.get(handle).ok_or_else(|| BackendError::NotFound {
            handle: handle.clone(),
        })?;

        // Same semantics as seeking a file: an offset past the end just
        // reads empty, and a positive length bounds the reader.
        let start = (offset as usize).min(data.len());
        let mut slice = data[start..].to_vec();
        if length > 0 {
            slice.truncate(length as usize);
        }
        Ok(Box::new(Cursor::new(slice)))
    }

    fn stat(&self, handle: &Handle) -> Result<FileInfo> {
        handle.validate()?;
        let map = self.objects.read().expect("lock poisoned");
        let data = map.get(handle).ok_or_else(|| BackendError::NotFound {
            handle: handle.clone(),
        })?;
        Ok(FileInfo {
            size: data.len() as u64,
        })
    }

    fn contains(&self, handle: &Handle) -> Result<bool> {
        handle.validate()?;
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.contains_key(handle))
    }

    fn remove(&self, handle: &Handle) -> Result<()> {
        handle.validate()?;
        let mut map = self.objects.write().expect("lock poisoned");
        match map.remove(handle) {
            Some(_) => Ok(()),
            None => Err(BackendError::NotFound {
                handle: handle.clone(),
            }),
        }
    }

    fn list(&self, tpe: FileType, cancel: &Cancellation) -> NameStream {
        let names: Vec<String> = {
            let map = self.objects.read().expect("lock poisoned");
            map.keys()
                .filter(|h| h.tpe == tpe)
                .map(|h| h.name.clone())
                .collect()
        };

        NameStream::spawn(cancel.clone(), move |sink| {
            for name in names {
                if !sink.push(name) {
                    return;
                }
            }
        })
    }

    fn delete(&self) -> Result<()> {
        self.objects.write().expect("lock poisoned").clear();
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBackend")
            .field("object_count", &self.len())
            .finish()
    }
}
