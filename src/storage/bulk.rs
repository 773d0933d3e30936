//! Bulk File Tables
//!
//! Plain CSV files with one entry per line:
//!
//! ```text
//! KEY,ID,ENTRY_ID,HOST_ADDRESS,HOST_ID
//! ```
//!
//! `ID` carries the entry's data identifier as `type:payload`, each half
//! base64 encoded. Bulk files are used for throwaway data (inbound/outbound
//! buffers, per-level split files, transfers) so they skip any transactional
//! machinery: appends go straight to the end of the file and everything else
//! is a full scan.

use super::lock::{FILE_LOCKS, FileAccess};
use super::signature::{Signature, SignatureCache};
use super::{StorageError, StorageResult, Table};
use crate::index::types::{EntryId, IndexEntry, PeerInfo, TrieKey};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const FIELD_COUNT: usize = 5;

/// Encodes an entry as one bulk line (without the trailing newline).
///
/// Type name and payload are free-form, so both halves of `ID` are written
/// as unpadded URL-safe base64. Returns `None` if one of the remaining
/// fields contains a separator and would corrupt the file.
pub fn encode_line(entry: &IndexEntry) -> Option<String> {
    let id = format!(
        "{}:{}",
        URL_SAFE_NO_PAD.encode(entry.type_name()),
        URL_SAFE_NO_PAD.encode(entry.payload())
    );
    let fields = [
        entry.key().as_str(),
        id.as_str(),
        entry.id().0.as_str(),
        entry.peer().address.as_str(),
        entry.peer().id.0.as_str(),
    ];

    if fields.iter().any(|f| f.contains([',', '\n', '\r'])) {
        return None;
    }
    Some(fields.join(","))
}

fn decode_text(field: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(field).ok()?;
    String::from_utf8(bytes).ok()
}

/// Decodes one bulk line. Malformed lines are logged and skipped.
pub fn decode_line(line: &str) -> Option<IndexEntry> {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() != FIELD_COUNT {
        tracing::warn!(
            "Dropping bulk line with {} fields (expected {}): {:?}",
            fields.len(),
            FIELD_COUNT,
            line
        );
        return None;
    }

    let key = match TrieKey::new(fields[0]) {
        Ok(key) => key,
        Err(e) => {
            tracing::warn!("Dropping bulk line: {}", e);
            return None;
        }
    };

    let Some((type_name, payload)) = fields[1]
        .split_once(':')
        .and_then(|(t, p)| Some((decode_text(t)?, decode_text(p)?)))
    else {
        tracing::warn!("Dropping bulk line with undecodable ID field: {:?}", line);
        return None;
    };

    Some(IndexEntry::from_parts(
        EntryId(fields[2].to_string()),
        key,
        type_name,
        PeerInfo::new(fields[4], fields[3]),
        payload,
    ))
}

/// Streams every well-formed entry of `path` into `visit`.
///
/// Holds the shared file lock of `path` for the duration of the scan.
pub fn scan_file(path: &Path, mut visit: impl FnMut(IndexEntry)) -> StorageResult<usize> {
    let _guard = FILE_LOCKS.acquire(path, FileAccess::Read);
    scan_unlocked(path, &mut visit)
}

fn scan_unlocked(path: &Path, visit: &mut impl FnMut(IndexEntry)) -> StorageResult<usize> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(StorageError::io(path, e)),
    };

    let mut visited = 0;
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| StorageError::io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        if let Some(entry) = decode_line(&line) {
            visit(entry);
            visited += 1;
        }
    }
    Ok(visited)
}

pub fn read_file(path: &Path) -> StorageResult<Vec<IndexEntry>> {
    let mut entries = Vec::new();
    scan_file(path, |entry| entries.push(entry))?;
    Ok(entries)
}

/// Appends `entries` to `path`, creating the file if needed.
pub fn append_file(path: &Path, entries: &[IndexEntry]) -> StorageResult<usize> {
    let _guard = FILE_LOCKS.acquire(path, FileAccess::Write);
    append_unlocked(path, entries)
}

fn append_unlocked(path: &Path, entries: &[IndexEntry]) -> StorageResult<usize> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| StorageError::io(path, e))?;
    let mut writer = BufWriter::new(file);

    let mut written = 0;
    for entry in entries {
        match encode_line(entry) {
            Some(line) => {
                writeln!(writer, "{}", line).map_err(|e| StorageError::io(path, e))?;
                written += 1;
            }
            None => tracing::warn!("Skipping unencodable entry {}", entry.id().0),
        }
    }
    writer.flush().map_err(|e| StorageError::io(path, e))?;
    Ok(written)
}

/// Appends raw lines as received from a peer. Lines are validated lazily,
/// when the file is scanned.
pub fn append_lines(path: &Path, lines: &[String]) -> StorageResult<usize> {
    let _guard = FILE_LOCKS.acquire(path, FileAccess::Write);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| StorageError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    for line in lines {
        writeln!(writer, "{}", line.trim_end()).map_err(|e| StorageError::io(path, e))?;
    }
    writer.flush().map_err(|e| StorageError::io(path, e))?;
    Ok(lines.len())
}

pub fn read_lines(path: &Path) -> StorageResult<Vec<String>> {
    let _guard = FILE_LOCKS.acquire(path, FileAccess::Read);
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StorageError::io(path, e)),
    };
    BufReader::new(file)
        .lines()
        .filter(|line| !matches!(line, Ok(l) if l.trim().is_empty()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| StorageError::io(path, e))
}

fn rewrite_unlocked(path: &Path, entries: &[IndexEntry]) -> StorageResult<()> {
    let staging = path.with_extension("rewrite");
    if let Err(e) = fs::remove_file(&staging)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        return Err(StorageError::io(&staging, e));
    }
    append_unlocked(&staging, entries)?;
    fs::rename(&staging, path).map_err(|e| StorageError::io(path, e))
}

/// A bulk file scheduled for deletion.
///
/// Per-level split files and in-flight transfer payloads are owned by exactly
/// one holder at a time; the file is removed when the holder drops it, on
/// every path including errors and unwinding.
#[derive(Debug)]
pub struct TransientFile {
    path: PathBuf,
}

impl TransientFile {
    /// Creates a new, empty transient file with a unique name in `dir`.
    pub fn create_in(dir: &Path) -> StorageResult<Self> {
        fs::create_dir_all(dir).map_err(|e| StorageError::io(dir, e))?;
        let path = dir.join(format!("{}.csv", uuid::Uuid::new_v4().simple()));
        File::create(&path).map_err(|e| StorageError::io(&path, e))?;
        Ok(Self { path })
    }

    /// Takes ownership of an existing file.
    pub fn adopt(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, entries: &[IndexEntry]) -> StorageResult<usize> {
        append_file(&self.path, entries)
    }

    pub fn append_lines(&self, lines: &[String]) -> StorageResult<usize> {
        append_lines(&self.path, lines)
    }

    pub fn entries(&self) -> StorageResult<Vec<IndexEntry>> {
        read_file(&self.path)
    }

    pub fn lines(&self) -> StorageResult<Vec<String>> {
        read_lines(&self.path)
    }
}

impl Drop for TransientFile {
    fn drop(&mut self) {
        let _guard = FILE_LOCKS.acquire(&self.path, FileAccess::Write);
        match fs::remove_file(&self.path) {
            Ok(()) => tracing::trace!("Released transient file {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::error!(
                "Failed to release transient file {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

/// A table backed by one bulk file.
pub struct BulkTable {
    path: PathBuf,
    state: RwLock<Signature>,
    count: SignatureCache<usize>,
}

impl BulkTable {
    /// Opens (creating if missing) the bulk file at `path`.
    pub fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| StorageError::io(&path, e))?;

        Ok(Self {
            path,
            state: RwLock::new(Signature::fresh()),
            count: SignatureCache::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn try_add(&self, entries: &[IndexEntry]) -> StorageResult<usize> {
        let mut signature = self.state.write();
        let written = append_file(&self.path, entries)?;
        *signature = Signature::fresh();
        Ok(written)
    }

    pub fn try_get(&self, prefix: Option<&TrieKey>) -> StorageResult<Vec<IndexEntry>> {
        let _signature = self.state.read();
        let mut entries = Vec::new();
        scan_file(&self.path, |entry| {
            if prefix.is_none_or(|p| p.is_prefix_of(entry.key())) {
                entries.push(entry);
            }
        })?;
        Ok(entries)
    }

    /// Rewrites the file through `edit`, which returns the number of entries
    /// it touched.
    fn try_rewrite(
        &self,
        edit: impl FnOnce(&mut Vec<IndexEntry>) -> usize,
    ) -> StorageResult<usize> {
        let mut signature = self.state.write();
        let _guard = FILE_LOCKS.acquire(&self.path, FileAccess::Write);

        let mut entries = Vec::new();
        scan_unlocked(&self.path, &mut |entry| entries.push(entry))?;
        let touched = edit(&mut entries);
        if touched > 0 {
            rewrite_unlocked(&self.path, &entries)?;
        }
        *signature = Signature::fresh();
        Ok(touched)
    }

    pub fn try_remove(&self, removed: &[IndexEntry]) -> StorageResult<usize> {
        let ids: std::collections::HashSet<&EntryId> = removed.iter().map(|e| e.id()).collect();
        self.try_rewrite(|entries| {
            let before = entries.len();
            entries.retain(|entry| !ids.contains(entry.id()));
            before - entries.len()
        })
    }

    pub fn try_update(&self, updated: &[IndexEntry]) -> StorageResult<usize> {
        let by_id: HashMap<&EntryId, &IndexEntry> = updated.iter().map(|e| (e.id(), e)).collect();
        self.try_rewrite(|entries| {
            let mut touched = 0;
            for entry in entries.iter_mut() {
                if let Some(replacement) = by_id.get(entry.id()) {
                    *entry = (*replacement).clone();
                    touched += 1;
                }
            }
            touched
        })
    }

    /// Reads every entry and empties the file in one step.
    pub fn take_all(&self) -> StorageResult<Vec<IndexEntry>> {
        let mut signature = self.state.write();
        let _guard = FILE_LOCKS.acquire(&self.path, FileAccess::Write);

        let mut entries = Vec::new();
        scan_unlocked(&self.path, &mut |entry| entries.push(entry))?;
        File::create(&self.path).map_err(|e| StorageError::io(&self.path, e))?;
        *signature = Signature::fresh();
        Ok(entries)
    }

    /// Moves the current contents into a new transient file in `dir` and
    /// leaves this table empty. Returns `None` when there was nothing to move.
    pub fn take_into(&self, dir: &Path) -> StorageResult<Option<TransientFile>> {
        let mut signature = self.state.write();
        let target = TransientFile::create_in(dir)?;
        let _guard = FILE_LOCKS.acquire(&self.path, FileAccess::Write);

        let mut entries = Vec::new();
        scan_unlocked(&self.path, &mut |entry| entries.push(entry))?;
        if entries.is_empty() {
            return Ok(None);
        }

        append_file(target.path(), &entries)?;
        File::create(&self.path).map_err(|e| StorageError::io(&self.path, e))?;
        *signature = Signature::fresh();
        Ok(Some(target))
    }

    pub fn clear(&self) -> StorageResult<()> {
        let mut signature = self.state.write();
        let _guard = FILE_LOCKS.acquire(&self.path, FileAccess::Write);
        File::create(&self.path).map_err(|e| StorageError::io(&self.path, e))?;
        *signature = Signature::fresh();
        Ok(())
    }

    fn scan_count(&self) -> usize {
        match scan_file(&self.path, |_| {}) {
            Ok(count) => count,
            Err(e) => {
                tracing::error!("Failed to count {}: {}", self.path.display(), e);
                0
            }
        }
    }
}

impl Table for BulkTable {
    fn count(&self) -> usize {
        let signature = self.state.read();
        self.count.get_or_refresh(*signature, || self.scan_count())
    }

    fn get(&self, prefix: Option<&TrieKey>) -> Vec<IndexEntry> {
        self.try_get(prefix).unwrap_or_else(|e| {
            tracing::error!("Bulk read failed: {}", e);
            Vec::new()
        })
    }

    fn add(&self, entries: &[IndexEntry]) -> usize {
        self.try_add(entries).unwrap_or_else(|e| {
            tracing::error!("Bulk append failed: {}", e);
            0
        })
    }

    fn remove(&self, entries: &[IndexEntry]) -> usize {
        self.try_remove(entries).unwrap_or_else(|e| {
            tracing::error!("Bulk remove failed: {}", e);
            0
        })
    }

    fn update(&self, entries: &[IndexEntry]) -> usize {
        self.try_update(entries).unwrap_or_else(|e| {
            tracing::error!("Bulk update failed: {}", e);
            0
        })
    }

    fn signature(&self) -> Signature {
        *self.state.read()
    }
}
