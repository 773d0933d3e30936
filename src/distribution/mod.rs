//! Index Distribution Module
//!
//! Keeps index entries at the peers responsible for their keys while the
//! trie evolves, and replicates them across peers sharing a path.
//!
//! ## Architecture Overview
//! 1. **Submission**: Application calls and remote deliveries become
//!    `DistributionRequest`s on one of the distributor's four queues.
//! 2. **Partitioning**: The modifier splits each batch by the trie level at
//!    which entry keys leave the local path.
//! 3. **Routing**: Every non-owned level is routed toward the sibling subtree
//!    at that level; the owned level goes to the replicas.
//! 4. **Bookkeeping**: Attempts are tracked until the router reports success
//!    or failure; failed payloads return to the outbound buffer.
//!
//! ## Submodules
//! - **`types`**: Requests, operations, attempts.
//! - **`partitioner`**: `sort_by_level` for collections and bulk files.
//! - **`protocol`**: Modifier messages and their type registry.
//! - **`modifier`**: The two modifier engines.
//! - **`distributor`**: The single-writer worker.

pub mod distributor;
pub mod modifier;
pub mod partitioner;
pub mod protocol;
pub mod types;

#[cfg(test)]
mod tests;
