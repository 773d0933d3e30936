//! Local Storage Module
//!
//! Holds the index entries a peer is responsible for, plus the short-lived
//! buffers used while entries travel through the overlay.
//!
//! ## Core Concepts
//! - **Tables**: Every backing implements the small `Table` capability trait
//!   (`count`, `get`, `add`, `remove`, `update`, `signature`).
//! - **Bulk files**: Append/scan friendly CSV files used for the inbound and
//!   outbound buffers and for bulk transfers between peers.
//! - **Indexed tables**: Ordered in-memory store answering prefix queries,
//!   with de-duplicated peer records and signature-keyed caches.
//! - **Signatures**: Every mutation mints a fresh token; caches compare tokens
//!   and recompute on mismatch.
//! - **Locking**: One read/write lock per table, plus a path-keyed advisory
//!   lock shared by every table that may alias the same bulk file.

pub mod bulk;
pub mod indexed;
pub mod lock;
pub mod scratch;
pub mod signature;


use crate::index::types::{IndexEntry, TrieKey};
use signature::Signature;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Entry {0} cannot be encoded as a bulk line")]
    Unencodable(String),
}

impl StorageError {
    pub fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Capability shared by every table backing.
///
/// Mutators report how many entries they touched. Storage failures are logged
/// by the implementation and reported as a neutral value (0 / empty).
pub trait Table: Send + Sync {
    fn count(&self) -> usize;

    /// All entries whose key starts with `prefix`, or every entry for `None`.
    fn get(&self, prefix: Option<&TrieKey>) -> Vec<IndexEntry>;

    fn add(&self, entries: &[IndexEntry]) -> usize;

    fn remove(&self, entries: &[IndexEntry]) -> usize;

    fn update(&self, entries: &[IndexEntry]) -> usize;

    fn signature(&self) -> Signature;

    fn is_empty(&self) -> bool {
        self.count() == 0
    }
}
