use super::ModifierContext;
use super::attempts::AttemptTable;
use crate::distribution::partitioner::sort_by_level;
use crate::distribution::protocol::{EntriesModifierMessage, ModifierMessage};
use crate::distribution::types::{DistributionAttempt, MessageId, Operation, RequestId};
use crate::index::types::{IndexEntry, TrieKey};
use crate::routing::RouteListener;

use std::sync::Arc;

/// Modifier engine for in-memory entry collections.
pub struct EntryModifier {
    ctx: ModifierContext,
    attempts: AttemptTable<Vec<IndexEntry>>,
}

impl EntryModifier {
    pub fn new(ctx: ModifierContext) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            attempts: AttemptTable::new(),
        })
    }

    pub fn in_flight(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_tracked(&self, id: &MessageId) -> bool {
        self.attempts.contains(id)
    }

    /// Handles a request raised on this peer.
    pub fn local_process(
        self: &Arc<Self>,
        parent: &RequestId,
        operation: Operation,
        entries: Vec<IndexEntry>,
    ) {
        if entries.is_empty() {
            return;
        }

        if !self.ctx.peer.is_super_peer() {
            tracing::debug!(
                "Not a super-peer, forwarding {} {} entries toward the root",
                entries.len(),
                operation
            );
            self.send(TrieKey::empty(), operation, entries, parent, true);
            return;
        }

        let path = self.ctx.peer.path();
        let mut levels = sort_by_level(&path, entries);
        let owned = levels.pop().unwrap_or_default();

        self.send_levels(&path, operation, levels, parent, true);
        self.broadcast(&path, operation, owned, parent);
    }

    /// Handles a message delivered by another peer.
    pub fn remote_process(
        self: &Arc<Self>,
        parent: &RequestId,
        operation: Operation,
        entries: Vec<IndexEntry>,
        via_replica: bool,
    ) {
        let path = self.ctx.peer.path();

        if via_replica {
            self.ctx.apply_owned(&path, operation, entries);
            return;
        }

        let mut levels = sort_by_level(&path, entries);
        let owned = levels.pop().unwrap_or_default();

        self.send_levels(&path, operation, levels, parent, false);
        self.ctx.apply_owned(&path, operation, owned.clone());
        self.broadcast(&path, operation, owned, parent);
    }

    fn send_levels(
        self: &Arc<Self>,
        path: &TrieKey,
        operation: Operation,
        levels: Vec<Vec<IndexEntry>>,
        parent: &RequestId,
        is_local: bool,
    ) {
        for (level, entries) in levels.into_iter().enumerate() {
            if entries.is_empty() {
                continue;
            }
            let Some(branch) = path.branch_at(level) else {
                continue;
            };
            self.send(branch, operation, entries, parent, is_local);
        }
    }

    fn send(
        self: &Arc<Self>,
        branch_key: TrieKey,
        operation: Operation,
        entries: Vec<IndexEntry>,
        parent: &RequestId,
        is_local: bool,
    ) {
        let message = EntriesModifierMessage {
            id: MessageId::new(),
            branch_key: branch_key.clone(),
            operation,
            entries: entries.clone(),
            parent_id: parent.clone(),
        };

        tracing::debug!(
            "Routing {} {} entries to {} (message {})",
            entries.len(),
            operation,
            branch_key,
            message.id
        );

        self.attempts.register(
            message.id.clone(),
            parent.clone(),
            DistributionAttempt {
                operation,
                payload: entries,
                is_local,
            },
        );

        let listener: Arc<dyn RouteListener> = self.clone();
        self.ctx
            .router
            .route(&branch_key, &ModifierMessage::Entries(message), listener);
    }

    /// Best-effort fan-out to the replicas of `path`. Not tracked.
    fn broadcast(
        self: &Arc<Self>,
        path: &TrieKey,
        operation: Operation,
        entries: Vec<IndexEntry>,
        parent: &RequestId,
    ) {
        if entries.is_empty() {
            return;
        }

        let message = EntriesModifierMessage {
            id: MessageId::new(),
            branch_key: path.clone(),
            operation,
            entries,
            parent_id: parent.clone(),
        };

        let listener: Arc<dyn RouteListener> = self.clone();
        self.ctx
            .router
            .route_to_replicas(&ModifierMessage::Entries(message), listener);
    }
}

impl RouteListener for EntryModifier {
    fn finished(&self, id: &MessageId) {
        match self.attempts.complete(id) {
            Some((attempt, parent)) => tracing::debug!(
                "Delivered {} {} entries (message {}, request {:?}, local={})",
                attempt.payload.len(),
                attempt.operation,
                id,
                parent.map(|p| p.0),
                attempt.is_local
            ),
            None => tracing::trace!("Replica delivery {} finished", id),
        }
    }

    fn failed(&self, id: &MessageId) {
        match self.attempts.complete(id) {
            Some((attempt, _)) => {
                tracing::warn!(
                    "Delivery of message {} failed, requeueing {} entries",
                    id,
                    attempt.payload.len()
                );
                self.ctx.requeue(attempt.operation, &attempt.payload);
            }
            None => tracing::debug!("Replica delivery {} failed", id),
        }
    }
}
