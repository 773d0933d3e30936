//! Indexed Table
//!
//! The canonical store of a peer. Entries are kept ordered by `(key, id)` so a
//! prefix query is a single range scan. Peer records are stored once and
//! referenced by id from every entry they own.

use super::Table;
use super::scratch::SampleTable;
use super::signature::{Signature, SignatureCache};
use crate::index::types::{EntryId, IndexEntry, PeerId, PeerInfo, TrieKey};

use parking_lot::RwLock;
use rand::seq::SliceRandom;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;

/// Entry row without the inline peer record.
#[derive(Debug, Clone)]
struct Row {
    type_name: String,
    peer: PeerId,
    payload: String,
}

#[derive(Debug)]
struct PeerRecord {
    info: PeerInfo,
    rows: usize,
}

struct IndexedState {
    rows: BTreeMap<(TrieKey, EntryId), Row>,
    keys: HashMap<EntryId, TrieKey>,
    peers: HashMap<PeerId, PeerRecord>,
    signature: Signature,
}

impl IndexedState {
    fn materialize(&self, key: &TrieKey, id: &EntryId, row: &Row) -> IndexEntry {
        let peer = self
            .peers
            .get(&row.peer)
            .map(|record| record.info.clone())
            .unwrap_or_else(|| PeerInfo {
                id: row.peer.clone(),
                address: String::new(),
            });
        IndexEntry::from_parts(
            id.clone(),
            key.clone(),
            row.type_name.clone(),
            peer,
            row.payload.clone(),
        )
    }

    fn upsert(&mut self, entry: &IndexEntry) {
        self.delete(entry.id());

        let record = self
            .peers
            .entry(entry.peer().id.clone())
            .or_insert_with(|| PeerRecord {
                info: entry.peer().clone(),
                rows: 0,
            });
        record.info.address = entry.peer().address.clone();
        record.rows += 1;

        self.keys.insert(entry.id().clone(), entry.key().clone());
        self.rows.insert(
            (entry.key().clone(), entry.id().clone()),
            Row {
                type_name: entry.type_name().to_string(),
                peer: entry.peer().id.clone(),
                payload: entry.payload().to_string(),
            },
        );
    }

    fn delete(&mut self, id: &EntryId) -> bool {
        let Some(key) = self.keys.remove(id) else {
            return false;
        };
        if let Some(row) = self.rows.remove(&(key, id.clone()))
            && let Some(record) = self.peers.get_mut(&row.peer)
        {
            record.rows -= 1;
            if record.rows == 0 {
                self.peers.remove(&row.peer);
            }
        }
        true
    }
}

pub struct IndexedTable {
    name: String,
    state: RwLock<IndexedState>,
    count: SignatureCache<usize>,
    sample: SignatureCache<(usize, Arc<SampleTable>)>,
}

impl IndexedTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(IndexedState {
                rows: BTreeMap::new(),
                keys: HashMap::new(),
                peers: HashMap::new(),
                signature: Signature::fresh(),
            }),
            count: SignatureCache::new(),
            sample: SignatureCache::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get_by_id(&self, id: &EntryId) -> Option<IndexEntry> {
        let state = self.state.read();
        let key = state.keys.get(id)?;
        let row = state.rows.get(&(key.clone(), id.clone()))?;
        Some(state.materialize(key, id, row))
    }

    pub fn contains(&self, id: &EntryId) -> bool {
        self.state.read().keys.contains_key(id)
    }

    /// Number of distinct peers referenced by stored entries.
    pub fn peer_count(&self) -> usize {
        self.state.read().peers.len()
    }

    /// Entries whose key is not compatible with `path`, i.e. entries this
    /// table holds but a peer at `path` is not responsible for.
    pub fn foreign_to(&self, path: &TrieKey) -> Vec<IndexEntry> {
        let state = self.state.read();
        state
            .rows
            .iter()
            .filter(|((key, _), _)| !key.is_compatible_with(path))
            .map(|((key, id), row)| state.materialize(key, id, row))
            .collect()
    }

    /// A random subset of at most `size` entry ids.
    ///
    /// The subset is cached until the next mutation; asking for a different
    /// size also recomputes it.
    pub fn sample(&self, size: usize) -> Arc<SampleTable> {
        let state = self.state.read();
        let compute = || {
            let mut ids: Vec<EntryId> = state.keys.keys().cloned().collect();
            ids.shuffle(&mut rand::thread_rng());
            ids.truncate(size);
            (size, Arc::new(SampleTable::new(ids)))
        };

        let (cached_size, table) = self.sample.get_or_refresh(state.signature, compute);
        if cached_size == size {
            return table;
        }

        self.sample.invalidate();
        self.sample.get_or_refresh(state.signature, compute).1
    }
}

impl Table for IndexedTable {
    fn count(&self) -> usize {
        let state = self.state.read();
        self.count.get_or_refresh(state.signature, || state.rows.len())
    }

    fn get(&self, prefix: Option<&TrieKey>) -> Vec<IndexEntry> {
        let state = self.state.read();
        match prefix {
            None => state
                .rows
                .iter()
                .map(|((key, id), row)| state.materialize(key, id, row))
                .collect(),
            Some(prefix) => state
                .rows
                .range((
                    Bound::Included((prefix.clone(), EntryId::default())),
                    Bound::Unbounded,
                ))
                .take_while(|((key, _), _)| prefix.is_prefix_of(key))
                .map(|((key, id), row)| state.materialize(key, id, row))
                .collect(),
        }
    }

    fn add(&self, entries: &[IndexEntry]) -> usize {
        let mut state = self.state.write();
        for entry in entries {
            state.upsert(entry);
        }
        state.signature = Signature::fresh();
        entries.len()
    }

    fn remove(&self, entries: &[IndexEntry]) -> usize {
        let mut state = self.state.write();
        let removed = entries.iter().filter(|e| state.delete(e.id())).count();
        state.signature = Signature::fresh();
        removed
    }

    fn update(&self, entries: &[IndexEntry]) -> usize {
        // Updating an unknown id stores it; callers already decided the entry
        // belongs here.
        self.add(entries)
    }

    fn signature(&self) -> Signature {
        self.state.read().signature
    }
}
