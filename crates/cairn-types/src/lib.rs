//! Foundation types for the Cairn backup store.
//!
//! This crate provides the identity types shared by every storage backend:
//! the closed set of object categories a repository contains, the handle
//! addressing one stored object, and the stat information backends report.
//!
//! # Key Types
//!
//! - [`FileType`] — Closed set of object categories (config, data, key, ...)
//! - [`Handle`] — (type, name) identity of a stored object
//! - [`FileInfo`] — Size information returned by stat operations

pub mod error;
pub mod handle;

pub use error::TypeError;
pub use handle::{FileInfo, FileType, Handle};
