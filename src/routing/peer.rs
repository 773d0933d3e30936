use crate::index::types::{PeerInfo, TrieKey};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// The local peer: its identity, its current trie path and whether it may
/// split distribution requests itself.
///
/// The path is owned by the exchange protocol and may change at any time;
/// readers take a snapshot per operation.
#[derive(Debug)]
pub struct LocalPeer {
    info: PeerInfo,
    path: RwLock<TrieKey>,
    super_peer: bool,
}

impl LocalPeer {
    pub fn new(info: PeerInfo, path: TrieKey, super_peer: bool) -> Self {
        Self {
            info,
            path: RwLock::new(path),
            super_peer,
        }
    }

    pub fn info(&self) -> &PeerInfo {
        &self.info
    }

    pub fn path(&self) -> TrieKey {
        self.path.read().clone()
    }

    pub fn set_path(&self, path: TrieKey) {
        let mut current = self.path.write();
        tracing::info!("Local path changed: {} -> {}", *current, path);
        *current = path;
    }

    pub fn is_super_peer(&self) -> bool {
        self.super_peer
    }
}

/// A remote peer known to the routing table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerRef {
    pub info: PeerInfo,
    pub path: TrieKey,
}
