//! Index API Protocol
//!
//! Endpoints and DTOs of the application-facing HTTP API.

use super::types::{DEFAULT_TYPE, EntryId, IndexEntry};
use serde::{Deserialize, Serialize};

// --- API Endpoints ---

pub const ENDPOINT_INSERT: &str = "/index/insert";
pub const ENDPOINT_UPDATE: &str = "/index/update";
pub const ENDPOINT_DELETE: &str = "/index/delete";
/// Prefix query; the bit-string prefix follows as a path segment.
pub const ENDPOINT_QUERY: &str = "/index/query";
pub const ENDPOINT_STATS: &str = "/index/stats";

// --- Data Transfer Objects ---

/// A new item; the entry id and key are assigned by the receiving peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewItem {
    #[serde(default = "default_type")]
    pub type_name: String,
    pub payload: String,
}

fn default_type() -> String {
    DEFAULT_TYPE.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertRequest {
    pub items: Vec<NewItem>,
    #[serde(default = "propagate_by_default")]
    pub propagate: bool,
}

fn propagate_by_default() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertResponse {
    pub entries: Vec<IndexEntry>,
}

/// New payload for an existing entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateItem {
    pub id: EntryId,
    pub payload: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub items: Vec<UpdateItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub ids: Vec<EntryId>,
    #[serde(default = "propagate_by_default")]
    pub propagate: bool,
}

/// Outcome of an update or delete: how many of the requested ids were known.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeResponse {
    pub accepted: usize,
    pub unknown: Vec<EntryId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub entries: Vec<IndexEntry>,
}
