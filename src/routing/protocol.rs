//! Routing Network Protocol
//!
//! Endpoint and envelope used to carry modifier messages between peers.
//!
//! The envelope names the message by its integer type id; the body is the
//! message itself as JSON. Bulk-file messages travel with the file's lines
//! inline, since the file handle only has meaning on the sending peer.

use super::RouteStrategy;
use crate::distribution::protocol::{EntriesModifierMessage, MessageKind, ModifierMessage};
use crate::distribution::types::{MessageId, Operation, RequestId};
use crate::index::types::{IndexEntry, PeerId, TrieKey};
use crate::storage::bulk::read_lines;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

// --- API Endpoints ---

/// Internal endpoint receiving routed modifier messages.
pub const ENDPOINT_ROUTE: &str = "/internal/route";

// --- Data Transfer Objects ---

/// A modifier message on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutedEnvelope {
    pub strategy: RouteStrategy,
    pub sender: PeerId,
    /// Registry id of the message carried in `body`.
    pub message_type: u16,
    pub body: serde_json::Value,
}

/// Wire form of a bulk-file message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMessageBody {
    pub id: MessageId,
    pub branch_key: TrieKey,
    pub operation: Operation,
    pub parent_id: RequestId,
    /// Raw bulk-format lines of the file.
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteResponse {
    pub accepted: bool,
}

/// Entries of a received message, as delivered.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundPayload {
    Entries(Vec<IndexEntry>),
    Lines(Vec<String>),
}

/// A decoded message received from another peer.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub id: MessageId,
    pub branch_key: TrieKey,
    pub operation: Operation,
    pub parent_id: RequestId,
    pub payload: InboundPayload,
}

impl RoutedEnvelope {
    /// Wraps `message`. File payloads are read here, on the calling thread.
    pub fn encode(strategy: RouteStrategy, sender: PeerId, message: &ModifierMessage) -> Result<Self> {
        let body = match message {
            ModifierMessage::Entries(m) => serde_json::to_value(m)?,
            ModifierMessage::File(m) => {
                let lines = read_lines(&m.file)
                    .with_context(|| format!("reading payload of message {}", m.id))?;
                serde_json::to_value(FileMessageBody {
                    id: m.id.clone(),
                    branch_key: m.branch_key.clone(),
                    operation: m.operation,
                    parent_id: m.parent_id.clone(),
                    lines,
                })?
            }
        };

        Ok(Self {
            strategy,
            sender,
            message_type: message.kind().type_id(),
            body,
        })
    }

    pub fn decode(self) -> Result<InboundMessage> {
        let kind = MessageKind::from_type_id(self.message_type)
            .ok_or_else(|| anyhow!("unknown message type {}", self.message_type))?;

        let message = match kind {
            MessageKind::EntriesModifier => {
                let m: EntriesModifierMessage = serde_json::from_value(self.body)?;
                InboundMessage {
                    id: m.id,
                    branch_key: m.branch_key,
                    operation: m.operation,
                    parent_id: m.parent_id,
                    payload: InboundPayload::Entries(m.entries),
                }
            }
            MessageKind::FileModifier => {
                let m: FileMessageBody = serde_json::from_value(self.body)?;
                InboundMessage {
                    id: m.id,
                    branch_key: m.branch_key,
                    operation: m.operation,
                    parent_id: m.parent_id,
                    payload: InboundPayload::Lines(m.lines),
                }
            }
        };
        Ok(message)
    }

    pub fn via_replica(&self) -> bool {
        self.strategy == RouteStrategy::Replicas
    }
}
