//! Shared fixtures for unit tests: an in-memory router that records what it
//! is asked to deliver, and a single-peer node wired around it.

use crate::distribution::distributor::Distributor;
use crate::distribution::protocol::ModifierMessage;
use crate::distribution::types::{MessageId, Operation, RequestId};
use crate::index::keys::KeyRegistry;
use crate::index::local::LocalIndex;
use crate::index::manager::IndexManager;
use crate::index::types::{EntryId, IndexEntry, PeerInfo, TrieKey};
use crate::routing::peer::LocalPeer;
use crate::routing::{RouteListener, RouteStrategy, Router};
use crate::storage::bulk::read_file;

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// What the recording router reports back for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Finish,
    Fail,
    /// Keep the listener until [`RecordingRouter::release`] is called.
    Hold,
}

#[derive(Debug, Clone)]
pub struct Routed {
    pub strategy: RouteStrategy,
    /// Target key; `None` for replica broadcasts.
    pub key: Option<TrieKey>,
    pub id: MessageId,
    pub parent_id: RequestId,
    pub operation: Operation,
    pub entries: Vec<IndexEntry>,
    pub from_file: bool,
}

pub struct RecordingRouter {
    greedy_outcome: Mutex<Outcome>,
    replica_outcome: Mutex<Outcome>,
    routed: Mutex<Vec<Routed>>,
    held: Mutex<Vec<(MessageId, Arc<dyn RouteListener>)>>,
}

impl RecordingRouter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            greedy_outcome: Mutex::new(Outcome::Finish),
            replica_outcome: Mutex::new(Outcome::Finish),
            routed: Mutex::new(Vec::new()),
            held: Mutex::new(Vec::new()),
        })
    }

    pub fn set_outcome(&self, outcome: Outcome) {
        *self.greedy_outcome.lock() = outcome;
    }

    pub fn set_replica_outcome(&self, outcome: Outcome) {
        *self.replica_outcome.lock() = outcome;
    }

    pub fn greedy(&self) -> Vec<Routed> {
        self.by_strategy(RouteStrategy::Greedy)
    }

    pub fn replicas(&self) -> Vec<Routed> {
        self.by_strategy(RouteStrategy::Replicas)
    }

    pub fn clear(&self) {
        self.routed.lock().clear();
    }

    /// Reports the outcome of every held message.
    pub fn release(&self, delivered: bool) -> usize {
        let held = std::mem::take(&mut *self.held.lock());
        let count = held.len();
        for (id, listener) in held {
            if delivered {
                listener.finished(&id);
            } else {
                listener.failed(&id);
            }
        }
        count
    }

    fn by_strategy(&self, strategy: RouteStrategy) -> Vec<Routed> {
        self.routed
            .lock()
            .iter()
            .filter(|r| r.strategy == strategy)
            .cloned()
            .collect()
    }

    fn record(
        &self,
        strategy: RouteStrategy,
        key: Option<TrieKey>,
        message: &ModifierMessage,
        listener: Arc<dyn RouteListener>,
        outcome: Outcome,
    ) {
        let (entries, from_file) = match message {
            ModifierMessage::Entries(m) => (m.entries.clone(), false),
            ModifierMessage::File(m) => (read_file(&m.file).unwrap(), true),
        };
        let id = message.id().clone();

        self.routed.lock().push(Routed {
            strategy,
            key,
            id: id.clone(),
            parent_id: message.parent_id().clone(),
            operation: message.operation(),
            entries,
            from_file,
        });

        match outcome {
            Outcome::Finish => listener.finished(&id),
            Outcome::Fail => listener.failed(&id),
            Outcome::Hold => self.held.lock().push((id, listener)),
        }
    }
}

impl Router for RecordingRouter {
    fn route(&self, key: &TrieKey, message: &ModifierMessage, listener: Arc<dyn RouteListener>) {
        let outcome = *self.greedy_outcome.lock();
        self.record(RouteStrategy::Greedy, Some(key.clone()), message, listener, outcome);
    }

    fn route_to_replicas(&self, message: &ModifierMessage, listener: Arc<dyn RouteListener>) {
        let outcome = *self.replica_outcome.lock();
        self.record(RouteStrategy::Replicas, None, message, listener, outcome);
    }
}

pub fn key(bits: &str) -> TrieKey {
    bits.parse().unwrap()
}

/// An entry with an explicit key, owned by peer `p0`.
pub fn entry(bits: &str, payload: &str) -> IndexEntry {
    IndexEntry::from_parts(
        EntryId::new(),
        key(bits),
        "default",
        PeerInfo::new("p0", "127.0.0.1:6000"),
        payload,
    )
}

pub fn sorted_ids(entries: &[IndexEntry]) -> Vec<EntryId> {
    let mut ids: Vec<EntryId> = entries.iter().map(|e| e.id().clone()).collect();
    ids.sort();
    ids
}

/// A peer with real storage in a temp dir and a recording router. The
/// distributor thread is not started; tests drive it with `run_cycle`.
pub struct TestNode {
    pub peer: Arc<LocalPeer>,
    pub index: Arc<LocalIndex>,
    pub keys: Arc<KeyRegistry>,
    pub router: Arc<RecordingRouter>,
    pub distributor: Arc<Distributor>,
    pub manager: Arc<IndexManager>,
    pub dir: TempDir,
}

impl TestNode {
    pub fn new(path: &str, super_peer: bool) -> Self {
        let dir = TempDir::new().unwrap();
        let peer = Arc::new(LocalPeer::new(
            PeerInfo::new("local", "127.0.0.1:6100"),
            key(path),
            super_peer,
        ));
        let index = Arc::new(LocalIndex::open(dir.path()).unwrap());
        let keys = KeyRegistry::new(8);
        let router = RecordingRouter::new();
        let distributor = Distributor::new(
            peer.clone(),
            router.clone(),
            index.clone(),
            keys.clone(),
            Duration::from_millis(200),
        );
        let manager = IndexManager::new(peer.clone(), index.clone(), keys.clone(), distributor.clone());

        Self {
            peer,
            index,
            keys,
            router,
            distributor,
            manager,
            dir,
        }
    }
}
