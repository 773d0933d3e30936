use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Type name given to entries created without an explicit type.
pub const DEFAULT_TYPE: &str = "default";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid trie key {0:?}: only '0' and '1' are allowed")]
pub struct InvalidKey(pub String);

/// Address in the binary trie key space.
///
/// Ordering is plain lexicographic order over the `{0,1}` alphabet, which is
/// exactly what the derived `String` ordering gives us.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TrieKey(String);

impl TrieKey {
    pub fn new(bits: impl Into<String>) -> Result<Self, InvalidKey> {
        let bits = bits.into();
        if bits.bytes().all(|b| b == b'0' || b == b'1') {
            Ok(Self(bits))
        } else {
            Err(InvalidKey(bits))
        }
    }

    pub fn empty() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn bit(&self, index: usize) -> Option<u8> {
        self.0.as_bytes().get(index).map(|b| b - b'0')
    }

    /// Length of the longest common prefix of both keys.
    pub fn common_prefix_len(&self, other: &TrieKey) -> usize {
        self.0
            .bytes()
            .zip(other.0.bytes())
            .take_while(|(a, b)| a == b)
            .count()
    }

    pub fn is_prefix_of(&self, other: &TrieKey) -> bool {
        other.0.starts_with(&self.0)
    }

    /// Two keys are compatible when one is a prefix of the other, i.e. they
    /// address overlapping regions of the trie.
    pub fn is_compatible_with(&self, other: &TrieKey) -> bool {
        self.is_prefix_of(other) || other.is_prefix_of(self)
    }

    pub fn truncate(&self, len: usize) -> TrieKey {
        Self(self.0[..len.min(self.0.len())].to_string())
    }

    pub fn join(&self, suffix: &TrieKey) -> TrieKey {
        Self(format!("{}{}", self.0, suffix.0))
    }

    /// The key of the sibling subtree at `level`: this key cut to `level`
    /// bits, followed by the complement of bit `level`.
    pub fn branch_at(&self, level: usize) -> Option<TrieKey> {
        let flipped = if self.bit(level)? == 0 { "1" } else { "0" };
        Some(self.truncate(level).join(&Self(flipped.to_string())))
    }
}

impl fmt::Display for TrieKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("<root>")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl FromStr for TrieKey {
    type Err = InvalidKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for TrieKey {
    type Error = InvalidKey;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TrieKey> for String {
    fn from(key: TrieKey) -> Self {
        key.0
    }
}

/// Globally unique identifier of an index entry, assigned once at creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(pub String);

impl EntryId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Identity and contact address of a peer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PeerInfo {
    pub id: PeerId,
    pub address: String,
}

impl PeerInfo {
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: PeerId(id.into()),
            address: address.into(),
        }
    }
}

/// A single data item of the distributed index.
///
/// Entries are immutable. Changing the key or payload yields a new value that
/// keeps the original entry id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct IndexEntry {
    id: EntryId,
    key: TrieKey,
    type_name: String,
    peer: PeerInfo,
    payload: String,
}

impl IndexEntry {
    pub fn from_parts(
        id: EntryId,
        key: TrieKey,
        type_name: impl Into<String>,
        peer: PeerInfo,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            id,
            key,
            type_name: type_name.into(),
            peer,
            payload: payload.into(),
        }
    }

    pub fn id(&self) -> &EntryId {
        &self.id
    }

    pub fn key(&self) -> &TrieKey {
        &self.key
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn peer(&self) -> &PeerInfo {
        &self.peer
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn with_key(&self, key: TrieKey) -> Self {
        Self {
            key,
            ..self.clone()
        }
    }

    pub fn with_payload(&self, payload: impl Into<String>, key: TrieKey) -> Self {
        Self {
            key,
            payload: payload.into(),
            ..self.clone()
        }
    }
}

impl PartialOrd for IndexEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| self.id.cmp(&other.id))
            .then_with(|| self.type_name.cmp(&other.type_name))
            .then_with(|| self.payload.cmp(&other.payload))
            .then_with(|| self.peer.id.cmp(&other.peer.id))
            .then_with(|| self.peer.address.cmp(&other.peer.address))
    }
}
