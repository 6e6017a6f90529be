//! Local-filesystem storage backend.
//!
//! Objects live as plain files below a repository root; a [`Layout`] decides
//! where. The backend is stateless — it holds only the resolved
//! configuration and layout, and the filesystem is the single source of
//! truth. Create-exclusive file creation is the sole concurrency primitive:
//! two saves of the same name race at the filesystem and exactly one wins.

use std::fs::{self, DirBuilder, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use tracing::{debug, warn};

use cairn_types::{FileInfo, FileType, Handle};

use crate::config::LocalConfig;
use crate::error::{BackendError, IoPhase, Result};
use crate::layout::{modes, parse_layout, Layout};
use crate::stream::{Cancellation, NameSink, NameStream};
use crate::traits::Backend;

/// Storage backend in a local directory.
#[derive(Debug)]
pub struct LocalBackend {
    config: LocalConfig,
    location: String,
    layout: Box<dyn Layout>,
}

impl LocalBackend {
    /// Open an existing repository at the configured path.
    ///
    /// Verifies that every directory the layout requires is present. This
    /// is read-only: nothing is created or modified.
    pub fn open(config: LocalConfig) -> Result<Self> {
        debug!(path = %config.path.display(), layout = %config.layout, "open local backend");
        let layout = parse_layout(&config.layout, &config.path)?;

        for dir in layout.paths() {
            fs::metadata(&dir).map_err(|e| BackendError::io(IoPhase::Stat, e))?;
        }

        Ok(Self::bind(config, layout))
    }

    /// Create a fresh repository at the configured path.
    ///
    /// Fails if a config object is already present — the path already
    /// holds a repository. All required directories are created
    /// recursively; directories that already exist are fine. The caller is
    /// expected to save the config object afterwards.
    pub fn create(config: LocalConfig) -> Result<Self> {
        debug!(path = %config.path.display(), layout = %config.layout, "create local backend");
        let layout = parse_layout(&config.layout, &config.path)?;

        let config_handle = Handle::config();
        if layout.filename(&config_handle).symlink_metadata().is_ok() {
            return Err(BackendError::AlreadyExists {
                handle: config_handle,
            });
        }

        for dir in layout.paths() {
            mkdir_all(&dir, modes::DIR).map_err(|e| BackendError::io(IoPhase::CreateDir, e))?;
        }

        Ok(Self::bind(config, layout))
    }

    fn bind(config: LocalConfig, layout: Box<dyn Layout>) -> Self {
        let location = config.path.display().to_string();
        Self {
            config,
            location,
            layout,
        }
    }
}

impl Backend for LocalBackend {
    fn location(&self) -> &str {
        &self.location
    }

    fn save(&self, handle: &Handle, from: &mut dyn Read) -> Result<()> {
        debug!(%handle, "save");
        handle.validate()?;
        let filename = self.layout.filename(handle);

        // Sharded objects live below a shard directory that may not exist
        // yet. Creating it is idempotent.
        if self.layout.sharded(handle.tpe) {
            if let Some(parent) = filename.parent() {
                mkdir_all(parent, modes::DIR)
                    .map_err(|e| BackendError::io(IoPhase::CreateDir, e))?;
            }
        }

        // Create-exclusive open is the atomicity boundary: losing a race
        // for the same name surfaces as AlreadyExists with no bytes
        // written.
        let mut file = open_exclusive(&filename).map_err(|e| {
            if e.kind() == io::ErrorKind::AlreadyExists {
                BackendError::AlreadyExists {
                    handle: handle.clone(),
                }
            } else {
                BackendError::io(IoPhase::OpenFile, e)
            }
        })?;

        // A copy error leaves the partial file behind under its final
        // name. Unlinking it here could race a reader that already opened
        // the path after a mismatched retry; leftover debris is for repair
        // to deal with, not the writer.
        io::copy(from, &mut file).map_err(|e| BackendError::io(IoPhase::Write, e))?;

        // The save only counts once the bytes are on stable storage.
        file.sync_all()
            .map_err(|e| BackendError::io(IoPhase::Sync, e))?;
        drop(file);

        set_mode(&filename, modes::READONLY).map_err(|e| BackendError::io(IoPhase::Chmod, e))
    }

    fn load(&self, handle: &Handle, length: u64, offset: u64) -> Result<Box<dyn Read + Send>> {
        debug!(%handle, length, offset, "load");
        handle.validate()?;

        let mut file = File::open(self.layout.filename(handle))
            .map_err(|e| not_found_or(e, handle, IoPhase::OpenFile))?;

        if offset > 0 {
            file.seek(SeekFrom::Start(offset))
                .map_err(|e| BackendError::io(IoPhase::Seek, e))?;
        }

        if length > 0 {
            Ok(Box::new(file.take(length)))
        } else {
            Ok(Box::new(file))
        }
    }

    fn stat(&self, handle: &Handle) -> Result<FileInfo> {
        debug!(%handle, "stat");
        handle.validate()?;
        let meta = fs::metadata(self.layout.filename(handle))
            .map_err(|e| not_found_or(e, handle, IoPhase::Stat))?;
        Ok(FileInfo { size: meta.len() })
    }

    fn contains(&self, handle: &Handle) -> Result<bool> {
        debug!(%handle, "contains");
        handle.validate()?;
        match fs::metadata(self.layout.filename(handle)) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(BackendError::io(IoPhase::Stat, e)),
        }
    }

    fn remove(&self, handle: &Handle) -> Result<()> {
        debug!(%handle, "remove");
        handle.validate()?;
        let filename = self.layout.filename(handle);

        // The immutability marker has to come off first; some filesystems
        // refuse to unlink owner-read-only files. A chmod failure aborts
        // without attempting the unlink.
        set_mode(&filename, modes::UNLOCK).map_err(|e| not_found_or(e, handle, IoPhase::Chmod))?;

        fs::remove_file(&filename).map_err(|e| not_found_or(e, handle, IoPhase::Remove))
    }

    fn list(&self, tpe: FileType, cancel: &Cancellation) -> NameStream {
        debug!(%tpe, "list");
        let dir = self.layout.dirname(tpe);
        let sharded = self.layout.sharded(tpe);

        NameStream::spawn(cancel.clone(), move |sink| {
            if sharded {
                list_shards(&dir, sink);
            } else {
                list_flat(&dir, sink);
            }
        })
    }

    fn delete(&self) -> Result<()> {
        debug!(path = %self.config.path.display(), "delete repository");
        fs::remove_dir_all(&self.config.path).map_err(|e| BackendError::io(IoPhase::RemoveAll, e))
    }
}

/// Map NotFound to the typed absence error; everything else keeps its
/// phase. Callers distinguish the two by variant, never by message.
fn not_found_or(e: io::Error, handle: &Handle, phase: IoPhase) -> BackendError {
    if e.kind() == io::ErrorKind::NotFound {
        BackendError::NotFound {
            handle: handle.clone(),
        }
    } else {
        BackendError::io(phase, e)
    }
}

/// Recursively create `path` with `mode`. Existing directories are fine.
fn mkdir_all(path: &Path, mode: u32) -> io::Result<()> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;
    builder.create(path)
}

/// Open `path` for writing with create-exclusive semantics.
fn open_exclusive(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(modes::FILE);
    }
    options.open(path)
}

/// Set the permission bits of `path`. No-op on platforms without POSIX
/// modes.
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
        Ok(())
    }
}

/// Push every regular-file entry of `entries` into the sink. Returns
/// `false` once the stream is cancelled or the consumer has gone away.
fn push_dir_entries(entries: fs::ReadDir, sink: &NameSink) -> bool {
    for entry in entries.flatten() {
        // Subdirectories, symlinks and device nodes are not objects.
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if !sink.push(name) {
            return false;
        }
    }
    true
}

/// Stream the regular files of a flat type root. An absent or unreadable
/// root yields an empty listing; for enumeration (unlike stat and load)
/// absence is not an error.
fn list_flat(dir: &Path, sink: &NameSink) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    push_dir_entries(entries, sink);
}

/// Stream the regular files of every shard subdirectory under `dir`.
///
/// A failure listing the root ends the whole enumeration. A failure
/// listing one shard only skips that shard: a single corrupted shard must
/// not abort the listing of every other shard.
fn list_shards(dir: &Path, sink: &NameSink) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        let shard = entry.path();
        let shard_entries = match fs::read_dir(&shard) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(shard = %shard.display(), error = %err, "skipping unlistable shard");
                continue;
            }
        };
        if !push_dir_entries(shard_entries, sink) {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn create_backend() -> (TempDir, LocalBackend) {
        let tmp = TempDir::new().unwrap();
        let backend = LocalBackend::create(LocalConfig::new(tmp.path())).unwrap();
        (tmp, backend)
    }

    fn save_bytes(backend: &LocalBackend, handle: &Handle, data: &[u8]) {
        backend.save(handle, &mut Cursor::new(data.to_vec())).unwrap();
    }

    fn load_all(backend: &LocalBackend, handle: &Handle, length: u64, offset: u64) -> Vec<u8> {
        let mut reader = backend.load(handle, length, offset).unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).unwrap();
        buf
    }

    fn data_handle(name: &str) -> Handle {
        Handle::new(FileType::Data, name)
    }

    fn snapshot_handle(name: &str) -> Handle {
        Handle::new(FileType::Snapshot, name)
    }

    /// Reader that yields a prefix, then fails. Used to simulate a data
    /// source dying mid-save.
    struct FailingReader {
        prefix: Vec<u8>,
        served: bool,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if !self.served {
                self.served = true;
                let n = self.prefix.len().min(buf.len());
                buf[..n].copy_from_slice(&self.prefix[..n]);
                return Ok(n);
            }
            Err(io::Error::other("source went away"))
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    #[test]
    fn create_then_open() {
        let tmp = TempDir::new().unwrap();
        LocalBackend::create(LocalConfig::new(tmp.path())).unwrap();
        let backend = LocalBackend::open(LocalConfig::new(tmp.path())).unwrap();
        assert_eq!(backend.location(), tmp.path().display().to_string());
        backend.close().unwrap();
    }

    #[test]
    fn open_without_repository_fails() {
        let tmp = TempDir::new().unwrap();
        let err = LocalBackend::open(LocalConfig::new(tmp.path())).unwrap_err();
        assert!(matches!(
            err,
            BackendError::Io {
                phase: IoPhase::Stat,
                ..
            }
        ));
    }

    #[test]
    fn create_twice_without_config_object_is_fine() {
        let tmp = TempDir::new().unwrap();
        LocalBackend::create(LocalConfig::new(tmp.path())).unwrap();
        // Directories already exist, but no config object does yet.
        LocalBackend::create(LocalConfig::new(tmp.path())).unwrap();
    }

    #[test]
    fn create_rejects_existing_config_object() {
        let (_tmp, backend) = create_backend();
        save_bytes(&backend, &Handle::config(), b"repository config");

        let err = LocalBackend::create(LocalConfig::new(&backend.config.path)).unwrap_err();
        assert!(matches!(err, BackendError::AlreadyExists { .. }));
    }

    #[test]
    fn unknown_layout_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let err = LocalBackend::create(LocalConfig::with_layout(tmp.path(), "s3")).unwrap_err();
        assert!(matches!(err, BackendError::UnknownLayout { .. }));
    }

    // -----------------------------------------------------------------------
    // Save / Load / Stat
    // -----------------------------------------------------------------------

    #[test]
    fn save_load_roundtrip_for_every_type() {
        let (_tmp, backend) = create_backend();
        let content = b"opaque object bytes";

        for tpe in [
            FileType::Data,
            FileType::Key,
            FileType::Lock,
            FileType::Snapshot,
            FileType::Index,
        ] {
            let handle = Handle::new(tpe, "4ac5d1f6aabb");
            save_bytes(&backend, &handle, content);
            assert_eq!(load_all(&backend, &handle, 0, 0), content, "{tpe}");
            assert_eq!(
                backend.stat(&handle).unwrap(),
                FileInfo {
                    size: content.len() as u64
                }
            );
        }
    }

    #[test]
    fn ranged_reads() {
        let (_tmp, backend) = create_backend();
        let handle = snapshot_handle("deadbeef");
        save_bytes(&backend, &handle, b"0123456789");

        assert_eq!(load_all(&backend, &handle, 4, 3), b"3456");
        assert_eq!(load_all(&backend, &handle, 0, 0), b"0123456789");
        assert_eq!(load_all(&backend, &handle, 0, 5), b"56789");
        // Reading past the end is a short read, not an error.
        assert_eq!(load_all(&backend, &handle, 100, 8), b"89");
    }

    #[test]
    fn resave_fails_and_preserves_content() {
        let (_tmp, backend) = create_backend();
        let handle = snapshot_handle("deadbeef");
        save_bytes(&backend, &handle, b"first");

        let err = backend
            .save(&handle, &mut Cursor::new(b"second".to_vec()))
            .unwrap_err();
        assert!(matches!(err, BackendError::AlreadyExists { .. }));
        assert_eq!(load_all(&backend, &handle, 0, 0), b"first");
    }

    #[test]
    fn load_absent_object_is_not_found() {
        let (_tmp, backend) = create_backend();
        assert!(matches!(
            backend.load(&snapshot_handle("missing"), 0, 0).map(|_| ()),
            Err(BackendError::NotFound { .. })
        ));

        let err = backend.stat(&snapshot_handle("missing")).unwrap_err();
        assert!(matches!(err, BackendError::NotFound { .. }));
    }

    #[test]
    fn invalid_handle_never_reaches_the_filesystem() {
        let (_tmp, backend) = create_backend();
        let bad = Handle::new(FileType::Data, "../escape");

        assert!(matches!(
            backend.save(&bad, &mut Cursor::new(vec![1u8])),
            Err(BackendError::InvalidHandle(_))
        ));
        assert!(matches!(
            backend.load(&bad, 0, 0).map(|_| ()),
            Err(BackendError::InvalidHandle(_))
        ));
        assert!(matches!(
            backend.stat(&bad),
            Err(BackendError::InvalidHandle(_))
        ));
        assert!(matches!(
            backend.contains(&bad),
            Err(BackendError::InvalidHandle(_))
        ));
        assert!(matches!(
            backend.remove(&bad),
            Err(BackendError::InvalidHandle(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn saved_object_carries_immutability_marker() {
        use std::os::unix::fs::PermissionsExt;

        let (_tmp, backend) = create_backend();
        let handle = snapshot_handle("deadbeef");
        save_bytes(&backend, &handle, b"marked");

        let mode = fs::metadata(backend.layout.filename(&handle))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, modes::READONLY);
    }

    #[test]
    fn failed_save_leaves_debris_that_blocks_resave() {
        let (_tmp, backend) = create_backend();
        let handle = data_handle("00aa11bb");

        let mut source = FailingReader {
            prefix: b"part".to_vec(),
            served: false,
        };
        let err = backend.save(&handle, &mut source).unwrap_err();
        assert!(matches!(
            err,
            BackendError::Io {
                phase: IoPhase::Write,
                ..
            }
        ));

        // The partial file stays behind under its final name, and a retry
        // without repair fails instead of silently replacing it.
        assert!(backend.layout.filename(&handle).exists());
        let err = backend
            .save(&handle, &mut Cursor::new(b"complete".to_vec()))
            .unwrap_err();
        assert!(matches!(err, BackendError::AlreadyExists { .. }));
    }

    #[test]
    fn concurrent_saves_of_same_name_elect_one_winner() {
        let (_tmp, backend) = create_backend();
        let handle = data_handle("c0ffee00");

        let outcomes: Vec<Result<()>> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..4)
                .map(|i| {
                    let backend = &backend;
                    let handle = handle.clone();
                    scope.spawn(move || {
                        backend.save(&handle, &mut Cursor::new(vec![i as u8; 64]))
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        let winners = outcomes.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        for outcome in outcomes {
            if let Err(err) = outcome {
                assert!(matches!(err, BackendError::AlreadyExists { .. }));
            }
        }
        assert_eq!(backend.stat(&handle).unwrap().size, 64);
    }

    // -----------------------------------------------------------------------
    // Contains / Remove / Delete
    // -----------------------------------------------------------------------

    #[test]
    fn contains_tracks_object_lifecycle() {
        let (_tmp, backend) = create_backend();
        let handle = snapshot_handle("deadbeef");

        assert!(!backend.contains(&handle).unwrap());
        save_bytes(&backend, &handle, b"x");
        assert!(backend.contains(&handle).unwrap());

        backend.remove(&handle).unwrap();
        assert!(!backend.contains(&handle).unwrap());
    }

    #[test]
    fn contains_with_missing_parent_directory_is_false() {
        let (_tmp, backend) = create_backend();
        // The whole type root disappearing out-of-band is still "absent",
        // not an error.
        fs::remove_dir_all(backend.layout.dirname(FileType::Snapshot)).unwrap();
        assert!(!backend.contains(&snapshot_handle("deadbeef")).unwrap());
    }

    #[test]
    fn remove_absent_object_fails() {
        let (_tmp, backend) = create_backend();
        let err = backend.remove(&snapshot_handle("missing")).unwrap_err();
        assert!(matches!(err, BackendError::NotFound { .. }));
    }

    #[test]
    fn delete_removes_the_whole_repository() {
        let (tmp, backend) = create_backend();
        save_bytes(&backend, &data_handle("00aa11bb"), b"bytes");
        save_bytes(&backend, &snapshot_handle("deadbeef"), b"snap");

        backend.delete().unwrap();
        assert!(!tmp.path().exists());
    }

    // -----------------------------------------------------------------------
    // List
    // -----------------------------------------------------------------------

    #[test]
    fn list_flat_type_yields_every_saved_name() {
        let (_tmp, backend) = create_backend();
        let names = ["aaaa", "bbbb", "cccc", "dddd", "eeee"];
        for name in names {
            save_bytes(&backend, &snapshot_handle(name), b"snap");
        }

        let listed: HashSet<String> = backend
            .list(FileType::Snapshot, &Cancellation::new())
            .collect();
        let expected: HashSet<String> = names.iter().map(|n| n.to_string()).collect();
        assert_eq!(listed, expected);
    }

    #[test]
    fn list_skips_non_regular_entries() {
        let (_tmp, backend) = create_backend();
        save_bytes(&backend, &snapshot_handle("deadbeef"), b"snap");
        fs::create_dir(backend.layout.dirname(FileType::Snapshot).join("subdir")).unwrap();

        let listed: Vec<String> = backend
            .list(FileType::Snapshot, &Cancellation::new())
            .collect();
        assert_eq!(listed, vec!["deadbeef".to_string()]);
    }

    #[test]
    fn list_sharded_type_spans_all_shards() {
        let (_tmp, backend) = create_backend();
        let names = ["00aaaa", "00bbbb", "11cccc", "ffdddd"];
        for name in names {
            save_bytes(&backend, &data_handle(name), b"bytes");
        }

        let listed: HashSet<String> = backend.list(FileType::Data, &Cancellation::new()).collect();
        let expected: HashSet<String> = names.iter().map(|n| n.to_string()).collect();
        assert_eq!(listed, expected);
    }

    #[test]
    fn list_of_absent_root_is_empty_not_an_error() {
        let (_tmp, backend) = create_backend();
        // Intentional asymmetry: enumeration of an absent type root yields
        // zero items, while stat/load of an absent object is an error.
        fs::remove_dir_all(backend.layout.dirname(FileType::Lock)).unwrap();

        let listed: Vec<String> = backend.list(FileType::Lock, &Cancellation::new()).collect();
        assert!(listed.is_empty());
    }

    #[test]
    fn list_stops_after_cancellation() {
        let (_tmp, backend) = create_backend();
        for i in 0..10 {
            save_bytes(&backend, &snapshot_handle(&format!("snap{i:02}")), b"s");
        }

        let cancel = Cancellation::new();
        let mut stream = backend.list(FileType::Snapshot, &cancel);

        let mut taken = Vec::new();
        for _ in 0..3 {
            taken.push(stream.next().unwrap());
        }
        cancel.cancel();

        assert!(stream.next().is_none());
        assert_eq!(taken.len(), 3);
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_shard_is_skipped_not_fatal() {
        use std::os::unix::fs::PermissionsExt;

        let (_tmp, backend) = create_backend();
        for name in ["00aaaa", "11bbbb", "22cccc"] {
            save_bytes(&backend, &data_handle(name), b"bytes");
        }

        let blocked = backend.layout.dirname(FileType::Data).join("11");
        fs::set_permissions(&blocked, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::read_dir(&blocked).is_ok() {
            // Privileged processes can list the shard regardless; the skip
            // path cannot be exercised here.
            fs::set_permissions(&blocked, fs::Permissions::from_mode(0o700)).unwrap();
            return;
        }

        let listed: HashSet<String> = backend.list(FileType::Data, &Cancellation::new()).collect();
        fs::set_permissions(&blocked, fs::Permissions::from_mode(0o700)).unwrap();

        let expected: HashSet<String> = ["00aaaa", "22cccc"].iter().map(|n| n.to_string()).collect();
        assert_eq!(listed, expected);
    }

    #[test]
    fn flat_layout_stores_data_unsharded() {
        let tmp = TempDir::new().unwrap();
        let backend = LocalBackend::create(LocalConfig::with_layout(tmp.path(), "flat")).unwrap();
        let handle = data_handle("4ac5d1f6");
        save_bytes(&backend, &handle, b"bytes");

        assert!(tmp.path().join("data").join("4ac5d1f6").is_file());
        let listed: Vec<String> = backend.list(FileType::Data, &Cancellation::new()).collect();
        assert_eq!(listed, vec!["4ac5d1f6".to_string()]);
    }
}
