//! Storage backends for the Cairn backup store.
//!
//! A backend maps object identities ([`Handle`]s) to stored bytes. Objects
//! are opaque to the backend: encryption, chunking, deduplication and
//! indexing all live in the layers above. What a backend guarantees is the
//! I/O contract those layers depend on:
//!
//! 1. Saves are create-once. An existing name is never overwritten; the
//!    second save of a name fails with `AlreadyExists`.
//! 2. A successful save is durable (synced to stable storage) and final
//!    (marked read-only as an advisory immutability marker).
//! 3. Readers never observe a partially written object as a successful
//!    save; create-exclusive file creation is the atomicity boundary.
//! 4. Enumeration streams names through a single-slot handoff and can be
//!    cancelled between items.
//! 5. All failures carry the phase that failed; nothing is retried and
//!    nothing is silently downgraded.
//!
//! # Backends
//!
//! All backends implement the [`Backend`] trait:
//!
//! - [`LocalBackend`] — objects as files below a local directory, arranged
//!   by a pluggable [`Layout`]
//! - [`InMemoryBackend`] — `HashMap`-based backend for tests and embedding
//!
//! # Quick Start
//!
//! ```no_run
//! use cairn_backend::{Backend, Cancellation, LocalBackend, LocalConfig};
//! use cairn_types::{FileType, Handle};
//!
//! let backend = LocalBackend::create(LocalConfig::new("/srv/backup")).unwrap();
//!
//! let handle = Handle::new(FileType::Snapshot, "deadbeef");
//! backend.save(&handle, &mut std::io::Cursor::new(b"snapshot".to_vec())).unwrap();
//!
//! for name in backend.list(FileType::Snapshot, &Cancellation::new()) {
//!     println!("snapshot {name}");
//! }
//! ```

pub mod config;
pub mod error;
pub mod layout;
pub mod local;
pub mod memory;
pub mod stream;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use cairn_types::Handle;
pub use config::LocalConfig;
pub use error::{BackendError, IoPhase, Result};
pub use layout::{modes, parse_layout, DefaultLayout, FlatLayout, Layout};
pub use local::LocalBackend;
pub use memory::InMemoryBackend;
pub use stream::{Cancellation, NameStream};
pub use traits::Backend;
