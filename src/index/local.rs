//! The storage handles of one peer.
//!
//! `LocalIndex` owns the canonical store and the two bulk buffers:
//! - **inbound**: entries delivered by other peers, merged into the canonical
//!   store by the distributor in a separate step;
//! - **outbound**: payloads whose delivery failed, one buffer per operation,
//!   re-sent by the distributor on its next cycle.
//!
//! Every change applied to the canonical store is reported to the type
//! listeners.

use super::keys::KeyRegistry;
use super::listeners::{ChangeKind, TypeListeners};
use super::types::{IndexEntry, TrieKey};
use crate::distribution::partitioner::is_owned;
use crate::distribution::types::Operation;
use crate::storage::bulk::{BulkTable, TransientFile};
use crate::storage::indexed::IndexedTable;
use crate::storage::{StorageResult, Table};

use std::path::{Path, PathBuf};

pub const INBOUND_FILE: &str = "inbound.csv";
pub const SCRATCH_DIR: &str = "scratch";

struct OutboundBuffers {
    delete: BulkTable,
    insert: BulkTable,
    update: BulkTable,
}

impl OutboundBuffers {
    fn get(&self, operation: Operation) -> &BulkTable {
        match operation {
            Operation::Delete => &self.delete,
            Operation::Insert => &self.insert,
            Operation::Update => &self.update,
        }
    }
}

pub struct LocalIndex {
    canonical: IndexedTable,
    inbound: BulkTable,
    outbound: OutboundBuffers,
    scratch_dir: PathBuf,
    listeners: TypeListeners,
}

impl LocalIndex {
    /// Opens the buffers under `data_dir`, creating files as needed.
    ///
    /// Scratch files left behind by a previous run are discarded.
    pub fn open(data_dir: &Path) -> StorageResult<Self> {
        let scratch_dir = data_dir.join(SCRATCH_DIR);
        if scratch_dir.exists()
            && let Err(e) = std::fs::remove_dir_all(&scratch_dir)
        {
            tracing::warn!("Failed to clear scratch dir {}: {}", scratch_dir.display(), e);
        }
        std::fs::create_dir_all(&scratch_dir)
            .map_err(|e| crate::storage::StorageError::io(&scratch_dir, e))?;

        let outbound_path = |op: Operation| data_dir.join(format!("outbound-{}.csv", u8::from(op)));

        let index = Self {
            canonical: IndexedTable::new("canonical"),
            inbound: BulkTable::open(data_dir.join(INBOUND_FILE))?,
            outbound: OutboundBuffers {
                delete: BulkTable::open(outbound_path(Operation::Delete))?,
                insert: BulkTable::open(outbound_path(Operation::Insert))?,
                update: BulkTable::open(outbound_path(Operation::Update))?,
            },
            scratch_dir,
            listeners: TypeListeners::default(),
        };

        tracing::info!(
            "Opened local index at {} (inbound={}, outbound={})",
            data_dir.display(),
            index.inbound.count(),
            index.outbound_count()
        );
        Ok(index)
    }

    pub fn canonical(&self) -> &IndexedTable {
        &self.canonical
    }

    pub fn listeners(&self) -> &TypeListeners {
        &self.listeners
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    pub fn add(&self, entries: &[IndexEntry]) -> usize {
        let added = self.canonical.add(entries);
        self.listeners.notify(ChangeKind::Inserted, entries);
        added
    }

    pub fn update(&self, entries: &[IndexEntry]) -> usize {
        let updated = self.canonical.update(entries);
        self.listeners.notify(ChangeKind::Updated, entries);
        updated
    }

    pub fn remove(&self, entries: &[IndexEntry]) -> usize {
        let removed = self.canonical.remove(entries);
        self.listeners.notify(ChangeKind::Deleted, entries);
        removed
    }

    /// Applies updated entries for a peer at `path`.
    ///
    /// Each key is recomputed from the payload. Entries that still belong to
    /// `path` are updated in place; the others are removed and returned with
    /// their new key so the caller can distribute them again.
    pub fn apply_update(
        &self,
        path: &TrieKey,
        keys: &KeyRegistry,
        entries: Vec<IndexEntry>,
    ) -> Vec<IndexEntry> {
        let mut stay = Vec::new();
        let mut moved = Vec::new();
        let mut stale = Vec::new();

        for entry in entries {
            let key = keys.generate(entry.type_name(), entry.payload());
            let rekeyed = entry.with_key(key);
            if is_owned(path, rekeyed.key()) {
                stay.push(rekeyed);
            } else {
                stale.push(entry);
                moved.push(rekeyed);
            }
        }

        if !stay.is_empty() {
            self.update(&stay);
        }
        if !stale.is_empty() {
            tracing::debug!("{} updated entries left path {}", stale.len(), path);
            self.remove(&stale);
        }
        moved
    }

    pub fn append_inbound(&self, entries: &[IndexEntry]) -> StorageResult<usize> {
        self.inbound.try_add(entries)
    }

    pub fn append_outbound(&self, operation: Operation, entries: &[IndexEntry]) -> StorageResult<usize> {
        self.outbound.get(operation).try_add(entries)
    }

    pub fn inbound_count(&self) -> usize {
        self.inbound.count()
    }

    pub fn outbound_count(&self) -> usize {
        Operation::ALL
            .iter()
            .map(|op| self.outbound.get(*op).count())
            .sum()
    }

    pub fn outbound_entries(&self, operation: Operation) -> Vec<IndexEntry> {
        self.outbound.get(operation).get(None)
    }

    pub fn has_inbound(&self) -> bool {
        !self.inbound.is_empty()
    }

    pub fn has_outbound(&self) -> bool {
        Operation::ALL
            .iter()
            .any(|op| !self.outbound.get(*op).is_empty())
    }

    /// Empties the outbound buffer of `operation` into a transient file.
    pub fn take_outbound(&self, operation: Operation) -> StorageResult<Option<TransientFile>> {
        self.outbound.get(operation).take_into(&self.scratch_dir)
    }

    /// Moves everything in the inbound buffer into the canonical store.
    pub fn merge_inbound(&self) -> StorageResult<usize> {
        let entries = self.inbound.take_all()?;
        if entries.is_empty() {
            return Ok(0);
        }
        let merged = self.add(&entries);
        tracing::debug!("Merged {} inbound entries", merged);
        Ok(merged)
    }
}
