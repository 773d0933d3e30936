//! Node Configuration
//!
//! Settings of a single index node, loaded from a TOML file. Every field has a
//! default, so an empty file (or no file at all) yields a working
//! single-peer node.

use crate::index::keys::DEFAULT_KEY_BITS;
use crate::index::types::{PeerInfo, TrieKey};
use crate::routing::http::{DEFAULT_ROUTE_ATTEMPTS, DEFAULT_ROUTE_TIMEOUT};
use crate::routing::peer::PeerRef;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_IDLE_POLL_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownPeer {
    pub id: String,
    /// HTTP address (`host:port`) of the peer.
    pub address: String,
    pub path: TrieKey,
}

impl KnownPeer {
    pub fn to_ref(&self) -> PeerRef {
        PeerRef {
            info: PeerInfo::new(self.id.clone(), self.address.clone()),
            path: self.path.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Generated when not set.
    pub peer_id: Option<String>,
    pub bind: SocketAddr,
    pub data_dir: PathBuf,
    pub path: TrieKey,
    pub super_peer: bool,
    pub key_bits: usize,
    pub peers: Vec<KnownPeer>,
    pub idle_poll_ms: u64,
    pub route_timeout_ms: u64,
    pub route_attempts: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            peer_id: None,
            bind: SocketAddr::from(([127, 0, 0, 1], 6000)),
            data_dir: PathBuf::from("data"),
            path: TrieKey::empty(),
            super_peer: true,
            key_bits: DEFAULT_KEY_BITS,
            peers: Vec::new(),
            idle_poll_ms: DEFAULT_IDLE_POLL_MS,
            route_timeout_ms: DEFAULT_ROUTE_TIMEOUT.as_millis() as u64,
            route_attempts: DEFAULT_ROUTE_ATTEMPTS,
        }
    }
}

impl NodeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms.max(1))
    }

    pub fn route_timeout(&self) -> Duration {
        Duration::from_millis(self.route_timeout_ms)
    }

    /// Identity advertised to other peers. Resolves a missing id once and
    /// keeps it.
    pub fn peer_info(&mut self) -> PeerInfo {
        let id = self
            .peer_id
            .get_or_insert_with(|| uuid::Uuid::new_v4().to_string())
            .clone();
        PeerInfo::new(id, self.bind.to_string())
    }
}
