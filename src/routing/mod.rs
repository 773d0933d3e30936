//! Overlay Routing Module
//!
//! Moves modifier messages between peers.
//!
//! ## Core Concepts
//! - **Routing table**: For every level `i` of the local path, references to
//!   peers in the sibling subtree at `i`, plus the replicas that share the
//!   local path exactly.
//! - **Strategies**: `Greedy` delivers to one peer responsible for a key;
//!   `Replicas` fans a message out to every replica.
//! - **Callbacks**: A router reports exactly one terminal outcome per message
//!   id (`finished` or `failed`) to the listener supplied with the message.
//!
//! ## Submodules
//! - **`peer`**: Identity and mutable path of the local peer.
//! - **`table`**: Per-level references and replica set.
//! - **`http`**: `Router` implementation over HTTP (reqwest).
//! - **`handlers`**: Axum handler receiving routed messages.
//! - **`protocol`**: Endpoints and wire envelope.

pub mod handlers;
pub mod http;
pub mod peer;
pub mod protocol;
pub mod table;


use crate::distribution::protocol::ModifierMessage;
use crate::distribution::types::MessageId;
use crate::index::types::TrieKey;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteStrategy {
    Greedy,
    Replicas,
}

/// Receives the terminal outcome of a routed message.
pub trait RouteListener: Send + Sync {
    fn finished(&self, id: &MessageId);
    fn failed(&self, id: &MessageId);
}

/// Asynchronous message router.
///
/// Both methods return immediately. Implementations must call exactly one of
/// `finished`/`failed` on `listener` for the message id, and must have read
/// any file-backed payload before returning.
pub trait Router: Send + Sync {
    fn route(&self, key: &TrieKey, message: &ModifierMessage, listener: Arc<dyn RouteListener>);

    fn route_to_replicas(&self, message: &ModifierMessage, listener: Arc<dyn RouteListener>);
}
