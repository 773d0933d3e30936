//! P-Grid Index Distribution Library
//!
//! Keeps the entries of a distributed index at the peers responsible for
//! them. Peers partition a binary key space as the leaves of a virtual trie;
//! this crate routes every insert, update and delete to the subtree owning
//! its key and replicates it across the peers sharing that subtree.
//!
//! ## Architecture Modules
//! - **`config`**: Node settings loaded from TOML.
//! - **`index`**: Data model, key generation, peer-local storage and the
//!   application façade (`IndexManager`).
//! - **`distribution`**: Partitioning by trie level, the modifier engines and
//!   the single-writer `Distributor`.
//! - **`routing`**: Routing table, the HTTP router and its inbound handler.
//! - **`storage`**: Bulk-file and indexed tables, file locks and mutation
//!   signatures.

pub mod config;
pub mod distribution;
pub mod index;
pub mod routing;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_support;
