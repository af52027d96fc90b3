//! Virtual file store for codeloop.
//!
//! An in-memory `path → file` map standing in for a real filesystem. Tools
//! write into it; file browsers list, read and delete from it. Nothing is
//! persisted across process restarts.

pub mod path;
pub mod seed;
pub mod store;

pub use path::{PathError, normalize_path};
pub use store::{FileRecord, FileStoreError, VirtualFileStore, WriteKind, WriteOutcome};
