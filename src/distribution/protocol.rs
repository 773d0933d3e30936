//! Modifier Messages
//!
//! The messages one peer sends another to move index entries toward the
//! peer responsible for them. Messages form a closed set keyed by an integer
//! type id, which is what travels on the wire.

use super::types::{MessageId, Operation, RequestId};
use crate::index::types::{IndexEntry, TrieKey};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Modifier message carrying an in-memory entry collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntriesModifierMessage {
    pub id: MessageId,
    pub branch_key: TrieKey,
    pub operation: Operation,
    pub entries: Vec<IndexEntry>,
    pub parent_id: RequestId,
}

/// Modifier message carrying a bulk file handle.
#[derive(Debug, Clone)]
pub struct FileModifierMessage {
    pub id: MessageId,
    pub branch_key: TrieKey,
    pub operation: Operation,
    pub file: PathBuf,
    pub parent_id: RequestId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    EntriesModifier,
    FileModifier,
}

impl MessageKind {
    pub fn type_id(self) -> u16 {
        match self {
            MessageKind::EntriesModifier => 1,
            MessageKind::FileModifier => 2,
        }
    }

    pub fn from_type_id(type_id: u16) -> Option<Self> {
        match type_id {
            1 => Some(MessageKind::EntriesModifier),
            2 => Some(MessageKind::FileModifier),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ModifierMessage {
    Entries(EntriesModifierMessage),
    File(FileModifierMessage),
}

impl ModifierMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            ModifierMessage::Entries(_) => MessageKind::EntriesModifier,
            ModifierMessage::File(_) => MessageKind::FileModifier,
        }
    }

    pub fn id(&self) -> &MessageId {
        match self {
            ModifierMessage::Entries(m) => &m.id,
            ModifierMessage::File(m) => &m.id,
        }
    }

    pub fn branch_key(&self) -> &TrieKey {
        match self {
            ModifierMessage::Entries(m) => &m.branch_key,
            ModifierMessage::File(m) => &m.branch_key,
        }
    }

    pub fn operation(&self) -> Operation {
        match self {
            ModifierMessage::Entries(m) => m.operation,
            ModifierMessage::File(m) => m.operation,
        }
    }

    pub fn parent_id(&self) -> &RequestId {
        match self {
            ModifierMessage::Entries(m) => &m.parent_id,
            ModifierMessage::File(m) => &m.parent_id,
        }
    }
}
