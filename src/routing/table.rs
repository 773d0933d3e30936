use super::peer::{LocalPeer, PeerRef};
use crate::index::types::{PeerId, TrieKey};

use parking_lot::RwLock;
use rand::seq::SliceRandom;
use std::sync::Arc;

/// Where a key should be delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The local peer is responsible.
    Local,
    Remote(PeerRef),
    /// No known peer covers the key.
    Unreachable,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Placement {
    Level(usize),
    Replica,
    Ignored,
}

struct Refs {
    levels: Vec<Vec<PeerRef>>,
    replicas: Vec<PeerRef>,
}

pub struct RoutingTable {
    local: Arc<LocalPeer>,
    refs: RwLock<Refs>,
}

impl RoutingTable {
    pub fn new(local: Arc<LocalPeer>) -> Self {
        Self {
            local,
            refs: RwLock::new(Refs {
                levels: Vec::new(),
                replicas: Vec::new(),
            }),
        }
    }

    pub fn local(&self) -> &Arc<LocalPeer> {
        &self.local
    }

    /// Files `peer` under the level where its path leaves the local path, or
    /// as a replica if both paths are identical.
    ///
    /// Paths in a prefix relation with the local path describe an
    /// inconsistent trie and are ignored.
    pub fn add_peer(&self, peer: PeerRef) -> Placement {
        if peer.info.id == self.local.info().id {
            return Placement::Ignored;
        }

        let path = self.local.path();
        let common = path.common_prefix_len(&peer.path);

        let placement = if common == path.len() && common == peer.path.len() {
            Placement::Replica
        } else if common < path.len() && common < peer.path.len() {
            Placement::Level(common)
        } else {
            tracing::warn!(
                "Ignoring peer {:?}: path {} overlaps local path {}",
                peer.info.id,
                peer.path,
                path
            );
            return Placement::Ignored;
        };

        let mut refs = self.refs.write();
        remove_peer(&mut refs, &peer.info.id);
        match placement {
            Placement::Replica => refs.replicas.push(peer),
            Placement::Level(level) => {
                if refs.levels.len() <= level {
                    refs.levels.resize_with(level + 1, Vec::new);
                }
                refs.levels[level].push(peer);
            }
            Placement::Ignored => {}
        }
        placement
    }

    pub fn remove_peer(&self, id: &PeerId) {
        remove_peer(&mut self.refs.write(), id);
    }

    pub fn refs_at(&self, level: usize) -> Vec<PeerRef> {
        self.refs
            .read()
            .levels
            .get(level)
            .cloned()
            .unwrap_or_default()
    }

    pub fn replicas(&self) -> Vec<PeerRef> {
        self.refs.read().replicas.clone()
    }

    pub fn all_peers(&self) -> Vec<PeerRef> {
        let refs = self.refs.read();
        refs.levels
            .iter()
            .flatten()
            .chain(refs.replicas.iter())
            .cloned()
            .collect()
    }

    /// The known peer with the shortest path, i.e. the one best placed to
    /// split a request for the whole key space.
    pub fn closest_to_root(&self) -> Option<PeerRef> {
        self.all_peers()
            .into_iter()
            .min_by_key(|peer| peer.path.len())
    }

    pub fn resolve(&self, key: &TrieKey) -> Resolution {
        if key.is_empty() {
            return match self.closest_to_root() {
                Some(peer) => Resolution::Remote(peer),
                None => Resolution::Unreachable,
            };
        }

        let path = self.local.path();
        let common = path.common_prefix_len(key);
        if common == path.len() || common == key.len() {
            return Resolution::Local;
        }

        match self.refs_at(common).choose(&mut rand::thread_rng()) {
            Some(peer) => Resolution::Remote(peer.clone()),
            None => Resolution::Unreachable,
        }
    }
}

fn remove_peer(refs: &mut Refs, id: &PeerId) {
    for level in refs.levels.iter_mut() {
        level.retain(|peer| &peer.info.id != id);
    }
    refs.replicas.retain(|peer| &peer.info.id != id);
}
