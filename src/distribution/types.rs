use crate::index::types::IndexEntry;
use crate::storage::bulk::TransientFile;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of change carried by a distribution request.
///
/// The discriminants are the values used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Operation {
    Delete = 0,
    Insert = 1,
    Update = 2,
}

impl Operation {
    pub const ALL: [Operation; 3] = [Operation::Delete, Operation::Insert, Operation::Update];
}

impl From<Operation> for u8 {
    fn from(op: Operation) -> Self {
        op as u8
    }
}

impl TryFrom<u8> for Operation {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Operation::Delete),
            1 => Ok(Operation::Insert),
            2 => Ok(Operation::Update),
            other => Err(format!("unknown operation code {}", other)),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Delete => f.write_str("DELETE"),
            Operation::Insert => f.write_str("INSERT"),
            Operation::Update => f.write_str("UPDATE"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The entries to distribute, either in memory or in a bulk file.
#[derive(Debug)]
pub enum Payload {
    Entries(Vec<IndexEntry>),
    File(TransientFile),
}

/// Where a request came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// Raised on this peer (application call, resubmission or retry).
    Local,
    /// Delivered by another peer.
    Remote {
        message_id: MessageId,
        parent_id: RequestId,
        via_replica: bool,
    },
}

/// One unit of work for the distributor. Consumed exactly once.
#[derive(Debug)]
pub struct DistributionRequest {
    pub id: RequestId,
    pub operation: Operation,
    pub payload: Payload,
    pub origin: Origin,
}

impl DistributionRequest {
    pub fn local(operation: Operation, payload: Payload) -> Self {
        Self {
            id: RequestId::new(),
            operation,
            payload,
            origin: Origin::Local,
        }
    }

    pub fn remote(
        operation: Operation,
        payload: Payload,
        message_id: MessageId,
        parent_id: RequestId,
        via_replica: bool,
    ) -> Self {
        Self {
            id: RequestId::new(),
            operation,
            payload,
            origin: Origin::Remote {
                message_id,
                parent_id,
                via_replica,
            },
        }
    }

    pub fn is_local(&self) -> bool {
        self.origin == Origin::Local
    }
}

/// An outbound message waiting for its terminal callback.
#[derive(Debug)]
pub struct DistributionAttempt<P> {
    pub operation: Operation,
    pub payload: P,
    pub is_local: bool,
}
