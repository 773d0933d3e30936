//! Disposable scratch tables with narrow schemas.

use super::Table;
use super::bulk::{BulkTable, TransientFile};
use super::signature::Signature;
use super::StorageResult;
use crate::index::types::{EntryId, IndexEntry, TrieKey};

use std::path::Path;

/// One column: entry ids picked at random from a larger table.
#[derive(Debug, Clone, Default)]
pub struct SampleTable {
    ids: Vec<EntryId>,
}

impl SampleTable {
    pub fn new(ids: Vec<EntryId>) -> Self {
        Self { ids }
    }

    pub fn ids(&self) -> &[EntryId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Staging area for a bulk transfer.
///
/// Entries are staged into a private bulk file; `into_file` hands the file to
/// the distribution engine. Dropping an unsent transfer deletes its file.
pub struct TransferTable {
    table: BulkTable,
    file: TransientFile,
}

impl TransferTable {
    pub fn create_in(dir: &Path) -> StorageResult<Self> {
        let file = TransientFile::create_in(dir)?;
        let table = BulkTable::open(file.path())?;
        Ok(Self { table, file })
    }

    pub fn stage(&self, entries: &[IndexEntry]) -> StorageResult<usize> {
        self.table.try_add(entries)
    }

    pub fn into_file(self) -> TransientFile {
        self.file
    }
}

impl Table for TransferTable {
    fn count(&self) -> usize {
        self.table.count()
    }

    fn get(&self, prefix: Option<&TrieKey>) -> Vec<IndexEntry> {
        self.table.get(prefix)
    }

    fn add(&self, entries: &[IndexEntry]) -> usize {
        self.table.add(entries)
    }

    fn remove(&self, entries: &[IndexEntry]) -> usize {
        self.table.remove(entries)
    }

    fn update(&self, entries: &[IndexEntry]) -> usize {
        self.table.update(entries)
    }

    fn signature(&self) -> Signature {
        self.table.signature()
    }
}
