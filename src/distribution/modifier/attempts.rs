use crate::distribution::types::{DistributionAttempt, MessageId, RequestId};

use dashmap::DashMap;

/// In-flight outbound messages of one modifier engine.
///
/// An attempt lives from "message handed to the router" until its terminal
/// callback, and is removed by whichever callback arrives.
pub struct AttemptTable<P> {
    attempts: DashMap<MessageId, DistributionAttempt<P>>,
    parents: DashMap<MessageId, RequestId>,
}

impl<P> AttemptTable<P> {
    pub fn new() -> Self {
        Self {
            attempts: DashMap::new(),
            parents: DashMap::new(),
        }
    }

    /// Must be called before the message is routed, since the callback may
    /// fire before `route` returns.
    pub fn register(&self, id: MessageId, parent: RequestId, attempt: DistributionAttempt<P>) {
        self.parents.insert(id.clone(), parent);
        self.attempts.insert(id, attempt);
    }

    /// Removes and returns the attempt for `id`, if it was tracked.
    pub fn complete(&self, id: &MessageId) -> Option<(DistributionAttempt<P>, Option<RequestId>)> {
        let (_, attempt) = self.attempts.remove(id)?;
        let parent = self.parents.remove(id).map(|(_, parent)| parent);
        Some((attempt, parent))
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.attempts.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }
}

impl<P> Default for AttemptTable<P> {
    fn default() -> Self {
        Self::new()
    }
}
