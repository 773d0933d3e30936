use super::ModifierContext;
use super::attempts::AttemptTable;
use crate::distribution::partitioner::sort_file_by_level;
use crate::distribution::protocol::{FileModifierMessage, ModifierMessage};
use crate::distribution::types::{DistributionAttempt, MessageId, Operation, RequestId};
use crate::index::types::TrieKey;
use crate::routing::RouteListener;
use crate::storage::bulk::TransientFile;

use std::sync::Arc;

/// Modifier engine for bulk-file payloads.
///
/// Every file handed to this engine is consumed: split files travel with
/// their attempt and are deleted on its terminal callback, everything else is
/// deleted before the call returns.
pub struct FileModifier {
    ctx: ModifierContext,
    attempts: AttemptTable<TransientFile>,
}

impl FileModifier {
    pub fn new(ctx: ModifierContext) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            attempts: AttemptTable::new(),
        })
    }

    pub fn in_flight(&self) -> usize {
        self.attempts.len()
    }

    pub fn local_process(self: &Arc<Self>, parent: &RequestId, operation: Operation, file: TransientFile) {
        if !self.ctx.peer.is_super_peer() {
            tracing::debug!("Not a super-peer, forwarding {} file toward the root", operation);
            self.send(TrieKey::empty(), operation, file, parent, true);
            return;
        }

        let path = self.ctx.peer.path();
        let Some((levels, owned)) = self.split(&path, file) else {
            return;
        };

        self.send_levels(&path, operation, levels, parent, true);
        if let Some(owned) = owned {
            self.broadcast(&path, operation, &owned, parent);
        }
    }

    pub fn remote_process(
        self: &Arc<Self>,
        parent: &RequestId,
        operation: Operation,
        file: TransientFile,
        via_replica: bool,
    ) {
        let path = self.ctx.peer.path();

        if via_replica {
            self.apply(&path, operation, &file);
            return;
        }

        let Some((levels, owned)) = self.split(&path, file) else {
            return;
        };

        self.send_levels(&path, operation, levels, parent, false);
        if let Some(owned) = owned {
            self.apply(&path, operation, &owned);
            self.broadcast(&path, operation, &owned, parent);
        }
    }

    #[allow(clippy::type_complexity)]
    fn split(
        &self,
        path: &TrieKey,
        file: TransientFile,
    ) -> Option<(Vec<Option<TransientFile>>, Option<TransientFile>)> {
        match sort_file_by_level(path, file, self.ctx.index.scratch_dir()) {
            Ok(mut levels) => {
                let owned = levels.pop().flatten();
                Some((levels, owned))
            }
            Err(e) => {
                tracing::error!("Failed to split bulk file against {}: {}", path, e);
                None
            }
        }
    }

    fn apply(&self, path: &TrieKey, operation: Operation, file: &TransientFile) {
        match file.entries() {
            Ok(entries) => self.ctx.apply_owned(path, operation, entries),
            Err(e) => tracing::error!("Failed to read owned bulk file: {}", e),
        }
    }

    fn send_levels(
        self: &Arc<Self>,
        path: &TrieKey,
        operation: Operation,
        levels: Vec<Option<TransientFile>>,
        parent: &RequestId,
        is_local: bool,
    ) {
        for (level, file) in levels.into_iter().enumerate() {
            let Some(file) = file else {
                continue;
            };
            let Some(branch) = path.branch_at(level) else {
                continue;
            };
            self.send(branch, operation, file, parent, is_local);
        }
    }

    fn send(
        self: &Arc<Self>,
        branch_key: TrieKey,
        operation: Operation,
        file: TransientFile,
        parent: &RequestId,
        is_local: bool,
    ) {
        let message = FileModifierMessage {
            id: MessageId::new(),
            branch_key: branch_key.clone(),
            operation,
            file: file.path().to_path_buf(),
            parent_id: parent.clone(),
        };

        tracing::debug!(
            "Routing {} file {} to {} (message {})",
            operation,
            file.path().display(),
            branch_key,
            message.id
        );

        self.attempts.register(
            message.id.clone(),
            parent.clone(),
            DistributionAttempt {
                operation,
                payload: file,
                is_local,
            },
        );

        let listener: Arc<dyn RouteListener> = self.clone();
        self.ctx
            .router
            .route(&branch_key, &ModifierMessage::File(message), listener);
    }

    fn broadcast(
        self: &Arc<Self>,
        path: &TrieKey,
        operation: Operation,
        file: &TransientFile,
        parent: &RequestId,
    ) {
        let message = FileModifierMessage {
            id: MessageId::new(),
            branch_key: path.clone(),
            operation,
            file: file.path().to_path_buf(),
            parent_id: parent.clone(),
        };

        let listener: Arc<dyn RouteListener> = self.clone();
        self.ctx
            .router
            .route_to_replicas(&ModifierMessage::File(message), listener);
    }
}

impl RouteListener for FileModifier {
    fn finished(&self, id: &MessageId) {
        match self.attempts.complete(id) {
            Some((attempt, _)) => tracing::debug!(
                "Delivered {} file {} (local={})",
                attempt.operation,
                attempt.payload.path().display(),
                attempt.is_local
            ),
            None => tracing::trace!("Replica delivery {} finished", id),
        }
    }

    fn failed(&self, id: &MessageId) {
        let Some((attempt, _)) = self.attempts.complete(id) else {
            tracing::debug!("Replica delivery {} failed", id);
            return;
        };

        match attempt.payload.entries() {
            Ok(entries) => {
                tracing::warn!(
                    "Delivery of message {} failed, requeueing {} entries",
                    id,
                    entries.len()
                );
                self.ctx.requeue(attempt.operation, &entries);
            }
            Err(e) => tracing::error!("Failed to read undelivered file for message {}: {}", id, e),
        }
    }
}
