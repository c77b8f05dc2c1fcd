// src/dedup.rs
//! Durable "never act on the same headline twice" state: a content fingerprint
//! per headline plus a bounded, insertion-ordered set persisted as a small JSON
//! record. Writes go to a temp file and are renamed into place, so a crash never
//! leaves a partially-written record.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::StoreError;

pub type HeadlineId = String;

/// Deterministic fingerprint of `(source, guid, title)`. Stable across process
/// restarts; any differing input yields a different id. Fields are separated by
/// an ASCII unit separator so concatenation ambiguity cannot collide ids.
pub fn fingerprint(source: &str, guid: &str, title: &str) -> HeadlineId {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update([0x1f]);
    hasher.update(guid.as_bytes());
    hasher.update([0x1f]);
    hasher.update(title.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        let _ = write!(&mut out, "{b:02x}");
    }
    out
}

/// Insertion-ordered set of acted-upon headline ids, bounded at `cap`.
/// Treated with value semantics: `mark_seen` consumes and returns the set, and
/// the caller's copy is authoritative for the remainder of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenSet {
    ids: Vec<HeadlineId>,
    cap: usize,
}

impl SeenSet {
    pub fn empty(cap: usize) -> Self {
        Self { ids: Vec::new(), cap }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|x| x == id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Add `id` as the most recent entry, evicting the oldest past capacity.
    /// Re-marking an already-seen id refreshes its recency instead of duplicating.
    #[must_use]
    pub fn mark_seen(mut self, id: HeadlineId) -> Self {
        self.ids.retain(|x| x != &id);
        self.ids.push(id);
        if self.ids.len() > self.cap {
            let excess = self.ids.len() - self.cap;
            self.ids.drain(0..excess);
        }
        self
    }

    pub fn ids(&self) -> &[HeadlineId] {
        &self.ids
    }
}

/// On-disk shape: `{"headline_ids": [...], "count": n, "last_updated": ISO-8601}`.
#[derive(Debug, Serialize, Deserialize)]
struct SeenRecord {
    headline_ids: Vec<HeadlineId>,
    count: usize,
    last_updated: String,
}

/// File-backed store for the [`SeenSet`]. One process, one thread: the atomic
/// rename on save is the only write discipline required.
#[derive(Debug, Clone)]
pub struct SeenStore {
    path: PathBuf,
    cap: usize,
}

impl SeenStore {
    pub fn new(path: impl Into<PathBuf>, cap: usize) -> Self {
        Self { path: path.into(), cap }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted record. Any I/O or parse error degrades to an empty
    /// set with a warning; a fresh deployment simply has no file yet.
    pub fn load(&self) -> SeenSet {
        match self.try_load() {
            Ok(set) => set,
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "seen-store unreadable, starting with empty set"
                );
                SeenSet::empty(self.cap)
            }
        }
    }

    fn try_load(&self) -> Result<SeenSet, StoreError> {
        let raw = fs::read_to_string(&self.path)?;
        let rec: SeenRecord = serde_json::from_str(&raw)?;
        let mut set = SeenSet::empty(self.cap);
        for id in rec.headline_ids {
            set = set.mark_seen(id);
        }
        Ok(set)
    }

    /// Persist the set, truncated to the `cap` most recent entries.
    /// Write-to-temp then rename; `save(load())` is idempotent modulo
    /// `last_updated`.
    pub fn save(&self, set: &SeenSet) -> Result<(), StoreError> {
        let start = set.ids.len().saturating_sub(self.cap);
        let rec = SeenRecord {
            headline_ids: set.ids[start..].to_vec(),
            count: set.ids.len() - start,
            last_updated: Utc::now().to_rfc3339(),
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(&rec)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
