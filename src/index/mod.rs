//! Index Module
//!
//! The data model of the distributed index and the peer-local view of it.
//!
//! ## Core Concepts
//! - **Trie keys**: Every entry carries a binary key. The peer whose path is
//!   compatible with that key (one is a prefix of the other) is responsible
//!   for the entry.
//! - **Key generators**: Keys are derived from the payload by a generator
//!   registered per entry type.
//! - **Local index**: The canonical store plus the inbound buffer (entries
//!   accepted but not yet merged) and the outbound buffers (entries whose
//!   delivery failed and must be retried).
//!
//! ## Submodules
//! - **`types`**: `TrieKey`, `IndexEntry`, peer identities.
//! - **`keys`**: Key generators and their registry.
//! - **`listeners`**: Per-type change notifications.
//! - **`local`**: Peer-local storage.
//! - **`manager`**: Application façade (insert, update, delete, query).
//! - **`handlers`** / **`protocol`**: HTTP API.

pub mod handlers;
pub mod keys;
pub mod listeners;
pub mod local;
pub mod manager;
pub mod protocol;
pub mod types;
