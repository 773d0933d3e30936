//! Modifier Protocol
//!
//! Turns distribution requests into per-level outbound messages and applies
//! the entries that arrive at the responsible peer.
//!
//! ## Flow
//! 1. **Local request**: A super-peer splits the batch against its path and
//!    routes every non-owned level to the sibling subtree at that level; the
//!    owned level is broadcast to the replicas. Other peers forward the whole
//!    batch toward the root and let a better placed peer split it.
//! 2. **Remote arrival**: The receiving peer splits again with its own, longer
//!    path. Each hop refines the split until the owned level captures the
//!    entries; those are applied locally and broadcast to the replicas.
//!    Replica deliveries are applied without splitting or re-broadcasting.
//! 3. **Callbacks**: Failed messages put their payload back on the outbound
//!    buffer; the distributor retries them on its next cycle.
//!
//! There is one engine per payload representation: `EntryModifier` for
//! in-memory collections and `FileModifier` for bulk files.

pub mod attempts;
pub mod entries;
pub mod file;

pub use entries::EntryModifier;
pub use file::FileModifier;

use crate::distribution::distributor::WorkQueues;
use crate::distribution::types::{DistributionRequest, Operation, Payload};
use crate::index::keys::KeyRegistry;
use crate::index::local::LocalIndex;
use crate::index::types::{IndexEntry, TrieKey};
use crate::routing::Router;
use crate::routing::peer::LocalPeer;

use std::sync::Arc;

/// Collaborators shared by both engines.
#[derive(Clone)]
pub struct ModifierContext {
    pub peer: Arc<LocalPeer>,
    pub router: Arc<dyn Router>,
    pub index: Arc<LocalIndex>,
    pub keys: Arc<KeyRegistry>,
    pub queues: Arc<WorkQueues>,
}

impl ModifierContext {
    /// Applies entries this peer (at `path`) is responsible for.
    pub fn apply_owned(&self, path: &TrieKey, operation: Operation, entries: Vec<IndexEntry>) {
        if entries.is_empty() {
            return;
        }

        match operation {
            Operation::Insert => match self.index.append_inbound(&entries) {
                Ok(count) => tracing::debug!("Buffered {} inbound entries", count),
                Err(e) => tracing::error!("Failed to buffer inbound entries: {}", e),
            },
            Operation::Update => {
                let moved = self.index.apply_update(path, &self.keys, entries);
                if !moved.is_empty() {
                    tracing::debug!("Resubmitting {} entries with changed keys", moved.len());
                    self.queues.push(DistributionRequest::local(
                        Operation::Insert,
                        Payload::Entries(moved),
                    ));
                }
            }
            Operation::Delete => {
                let removed = self.index.remove(&entries);
                tracing::debug!("Removed {} entries", removed);
            }
        }
    }

    /// Puts a failed payload back on the outbound buffer and wakes the
    /// distributor.
    pub fn requeue(&self, operation: Operation, entries: &[IndexEntry]) {
        match self.index.append_outbound(operation, entries) {
            Ok(count) => {
                tracing::debug!("Requeued {} {} entries for retry", count, operation);
                self.queues.wake();
            }
            Err(e) => tracing::error!("Failed to requeue {} entries: {}", operation, e),
        }
    }
}
