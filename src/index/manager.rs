//! Index Manager
//!
//! The application-facing façade. Turns insert/update/delete calls into local
//! storage changes plus distribution requests, and exposes queries over the
//! canonical store.

use super::keys::KeyRegistry;
use super::listeners::TypeListener;
use super::local::LocalIndex;
use super::types::{EntryId, IndexEntry, TrieKey};
use crate::distribution::distributor::Distributor;
use crate::distribution::partitioner::is_owned;
use crate::distribution::types::{DistributionRequest, Operation, Payload};
use crate::routing::peer::LocalPeer;
use crate::storage::Table;
use crate::storage::scratch::{SampleTable, TransferTable};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexStats {
    pub path: TrieKey,
    pub entries: usize,
    pub peers: usize,
    pub inbound_pending: usize,
    pub outbound_pending: usize,
    pub queued_requests: usize,
    pub in_flight: usize,
}

pub struct IndexManager {
    peer: Arc<LocalPeer>,
    index: Arc<LocalIndex>,
    keys: Arc<KeyRegistry>,
    distributor: Arc<Distributor>,
}

impl IndexManager {
    pub fn new(
        peer: Arc<LocalPeer>,
        index: Arc<LocalIndex>,
        keys: Arc<KeyRegistry>,
        distributor: Arc<Distributor>,
    ) -> Arc<Self> {
        Arc::new(Self {
            peer,
            index,
            keys,
            distributor,
        })
    }

    pub fn peer(&self) -> &Arc<LocalPeer> {
        &self.peer
    }

    pub fn keys(&self) -> &Arc<KeyRegistry> {
        &self.keys
    }

    pub fn local_index(&self) -> &Arc<LocalIndex> {
        &self.index
    }

    /// Creates a new entry owned by the local peer, keyed by its type's
    /// generator.
    pub fn create_entry(&self, type_name: &str, payload: &str) -> IndexEntry {
        IndexEntry::from_parts(
            EntryId::new(),
            self.keys.generate(type_name, payload),
            type_name,
            self.peer.info().clone(),
            payload,
        )
    }

    pub fn register_listener(&self, type_name: &str, listener: Arc<dyn TypeListener>) {
        self.index.listeners().register(type_name, listener);
    }

    /// Stores `items` locally. With `propagate`, the batch is also handed to
    /// the distributor, which routes non-owned entries to their peers and
    /// replicates owned ones.
    pub fn insert(&self, items: Vec<IndexEntry>, propagate: bool) {
        if items.is_empty() {
            return;
        }

        self.index.add(&items);
        tracing::debug!("Inserted {} entries (propagate={})", items.len(), propagate);

        if propagate {
            self.distributor.submit(DistributionRequest::local(
                Operation::Insert,
                Payload::Entries(items),
            ));
        }
    }

    /// Replaces the payload of existing entries.
    ///
    /// The update travels under the key the entry was stored with, so it
    /// reaches the peer holding the old version; that peer recomputes the key
    /// and moves the entry if it changed subtree.
    pub fn update(&self, items: Vec<IndexEntry>) {
        if items.is_empty() {
            return;
        }

        let canonical = self.index.canonical();
        let routed: Vec<IndexEntry> = items
            .iter()
            .map(|item| match canonical.get_by_id(item.id()) {
                Some(stored) => item.with_key(stored.key().clone()),
                None => item.clone(),
            })
            .collect();

        let path = self.peer.path();
        let local: Vec<IndexEntry> = routed
            .iter()
            .filter(|entry| is_owned(&path, entry.key()) || canonical.contains(entry.id()))
            .cloned()
            .collect();
        let moved = self.index.apply_update(&path, &self.keys, local);

        self.distributor.submit(DistributionRequest::local(
            Operation::Update,
            Payload::Entries(routed),
        ));
        if !moved.is_empty() {
            self.distributor.submit(DistributionRequest::local(
                Operation::Insert,
                Payload::Entries(moved),
            ));
        }
    }

    pub fn delete(&self, items: Vec<IndexEntry>, propagate: bool) {
        if items.is_empty() {
            return;
        }

        let removed = self.index.remove(&items);
        tracing::debug!("Deleted {} of {} entries locally", removed, items.len());

        if propagate {
            self.distributor.submit(DistributionRequest::local(
                Operation::Delete,
                Payload::Entries(items),
            ));
        }
    }

    pub fn get(&self, id: &EntryId) -> Option<IndexEntry> {
        self.index.canonical().get_by_id(id)
    }

    /// Entries under `prefix` held by this peer.
    pub fn query(&self, prefix: &TrieKey) -> Vec<IndexEntry> {
        self.index.canonical().get(Some(prefix))
    }

    pub fn sample(&self, size: usize) -> Arc<SampleTable> {
        self.index.canonical().sample(size)
    }

    /// Hands off every entry the local path no longer covers.
    ///
    /// Called after the local path changed. The entries are staged into a
    /// transfer file, removed locally and distributed as one bulk insert.
    pub fn redistribute_foreign(&self) -> Result<usize> {
        let path = self.peer.path();
        let foreign = self.index.canonical().foreign_to(&path);
        if foreign.is_empty() {
            return Ok(0);
        }

        let transfer = TransferTable::create_in(self.index.scratch_dir())?;
        let staged = transfer.stage(&foreign)?;
        self.index.remove(&foreign);

        tracing::info!("Handing off {} entries outside path {}", staged, path);
        self.distributor.submit(DistributionRequest::local(
            Operation::Insert,
            Payload::File(transfer.into_file()),
        ));
        Ok(staged)
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            path: self.peer.path(),
            entries: self.index.canonical().count(),
            peers: self.index.canonical().peer_count(),
            inbound_pending: self.index.inbound_count(),
            outbound_pending: self.index.outbound_count(),
            queued_requests: self.distributor.queues().len(),
            in_flight: self.distributor.entry_modifier().in_flight()
                + self.distributor.file_modifier().in_flight(),
        }
    }
}
