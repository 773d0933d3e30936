use super::types::IndexEntry;

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Receives changes applied to the canonical store for one entry type.
pub trait TypeListener: Send + Sync {
    fn entries_inserted(&self, _entries: &[IndexEntry]) {}
    fn entries_updated(&self, _entries: &[IndexEntry]) {}
    fn entries_deleted(&self, _entries: &[IndexEntry]) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Inserted,
    Updated,
    Deleted,
}

#[derive(Default)]
pub struct TypeListeners {
    listeners: DashMap<String, Vec<Arc<dyn TypeListener>>>,
}

impl TypeListeners {
    pub fn register(&self, type_name: &str, listener: Arc<dyn TypeListener>) {
        self.listeners
            .entry(type_name.to_string())
            .or_default()
            .push(listener);
        tracing::debug!("Registered listener for type {}", type_name);
    }

    pub fn listener_count(&self, type_name: &str) -> usize {
        self.listeners
            .get(type_name)
            .map(|listeners| listeners.len())
            .unwrap_or(0)
    }

    /// Groups `entries` by type and hands each group to that type's listeners.
    pub fn notify(&self, kind: ChangeKind, entries: &[IndexEntry]) {
        if entries.is_empty() || self.listeners.is_empty() {
            return;
        }

        let mut by_type: BTreeMap<&str, Vec<IndexEntry>> = BTreeMap::new();
        for entry in entries {
            by_type
                .entry(entry.type_name())
                .or_default()
                .push(entry.clone());
        }

        for (type_name, group) in by_type {
            // Clone the handles so no map shard is held while listeners run.
            let listeners = match self.listeners.get(type_name) {
                Some(listeners) => listeners.clone(),
                None => continue,
            };
            for listener in listeners {
                match kind {
                    ChangeKind::Inserted => listener.entries_inserted(&group),
                    ChangeKind::Updated => listener.entries_updated(&group),
                    ChangeKind::Deleted => listener.entries_deleted(&group),
                }
            }
        }
    }
}
