//! Level partitioning of entry batches against a trie path.
//!
//! For a path `P` of length `L`, an entry with key `K` lands in bucket `c`,
//! the length of the common prefix of `P` and `K`, unless `K` runs out or
//! `P` is fully matched, in which case the entry is owned and lands in the
//! last bucket `L`.

use crate::index::types::{IndexEntry, TrieKey};
use crate::storage::StorageResult;
use crate::storage::bulk::{TransientFile, scan_file};

use std::path::Path;

/// Bucket index of `key` relative to `path`.
pub fn level_of(path: &TrieKey, key: &TrieKey) -> usize {
    let common = path.common_prefix_len(key);
    if common == path.len() || common == key.len() {
        path.len()
    } else {
        common
    }
}

/// Whether a peer at `path` is responsible for `key`.
pub fn is_owned(path: &TrieKey, key: &TrieKey) -> bool {
    level_of(path, key) == path.len()
}

/// Splits `entries` into `path.len() + 1` buckets; the last one is owned.
pub fn sort_by_level(path: &TrieKey, entries: Vec<IndexEntry>) -> Vec<Vec<IndexEntry>> {
    let mut levels: Vec<Vec<IndexEntry>> = vec![Vec::new(); path.len() + 1];
    for entry in entries {
        let level = level_of(path, entry.key());
        levels[level].push(entry);
    }
    levels
}

/// Bulk-file variant of [`sort_by_level`].
///
/// Streams `source`, writing one transient file into `dir` per non-empty
/// level. The source is always consumed: it is deleted when this function
/// returns, whether the split succeeded or not.
pub fn sort_file_by_level(
    path: &TrieKey,
    source: TransientFile,
    dir: &Path,
) -> StorageResult<Vec<Option<TransientFile>>> {
    const CHUNK: usize = 512;

    let mut levels: Vec<Option<TransientFile>> = (0..=path.len()).map(|_| None).collect();
    let mut pending: Vec<Vec<IndexEntry>> = vec![Vec::new(); path.len() + 1];
    let mut failure = None;

    let flush = |level: usize,
                 batch: &mut Vec<IndexEntry>,
                 levels: &mut Vec<Option<TransientFile>>|
     -> StorageResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let file = match levels[level].take() {
            Some(file) => file,
            None => TransientFile::create_in(dir)?,
        };
        file.append(batch)?;
        levels[level] = Some(file);
        batch.clear();
        Ok(())
    };

    let scanned = scan_file(source.path(), |entry| {
        if failure.is_some() {
            return;
        }
        let level = level_of(path, entry.key());
        pending[level].push(entry);
        if pending[level].len() >= CHUNK
            && let Err(e) = flush(level, &mut pending[level], &mut levels)
        {
            failure = Some(e);
        }
    });
    drop(source);

    scanned?;
    if let Some(e) = failure {
        return Err(e);
    }
    for (level, batch) in pending.iter_mut().enumerate() {
        flush(level, batch, &mut levels)?;
    }

    Ok(levels)
}
