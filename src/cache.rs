//! Persisted mapping from release tag to its extracted template.
//!
//! The whole mapping lives in one pretty-printed JSON file at the cache root
//! and is rewritten in full on every commit. There is no locking: the last
//! writer wins.

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::trace;

/// A release that has been downloaded and extracted into the cache root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseRecord {
    pub tag: String,

    /// When the release was published upstream
    #[serde(rename = "time")]
    pub published_at: DateTime<Utc>,

    /// Directory name relative to the cache root
    pub path: String,
}

impl ReleaseRecord {
    /// Record for a release extracted to `<cache root>/<tag>`.
    #[must_use]
    pub fn new(tag: &str, published_at: DateTime<Utc>) -> Self {
        Self {
            tag: tag.to_string(),
            published_at,
            path: tag.to_string(),
        }
    }
}

fn recency(a: &ReleaseRecord, b: &ReleaseRecord) -> Ordering {
    a.published_at
        .cmp(&b.published_at)
        .then_with(|| a.tag.cmp(&b.tag))
}

#[derive(Debug)]
pub struct ReleaseCache {
    root: PathBuf,
    file: PathBuf,
    records: BTreeMap<String, ReleaseRecord>,
}

impl ReleaseCache {
    /// Reads the record file. A missing or unparseable file yields an empty
    /// cache.
    #[must_use]
    pub fn load(root: &Path, file: &Path) -> Self {
        let records = match std::fs::read_to_string(file) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                trace!("Ignoring unreadable cache {}: {e}", file.display());
                BTreeMap::new()
            }),
            Err(e) => {
                trace!("No cache at {}: {e}", file.display());
                BTreeMap::new()
            }
        };

        Self {
            root: root.to_owned(),
            file: file.to_owned(),
            records,
        }
    }

    #[must_use]
    pub fn lookup(&self, tag: &str) -> Option<&ReleaseRecord> {
        self.records.get(tag)
    }

    /// The record with the latest publish time. Ties go to the
    /// lexicographically greatest tag.
    #[must_use]
    pub fn most_recent(&self) -> Option<&ReleaseRecord> {
        self.records.values().max_by(|a, b| recency(a, b))
    }

    /// Like [`ReleaseCache::most_recent`], skipping records whose directory
    /// is gone.
    #[must_use]
    pub fn most_recent_on_disk(&self) -> Option<&ReleaseRecord> {
        self.records
            .values()
            .filter(|r| self.path_of(r).is_dir())
            .max_by(|a, b| recency(a, b))
    }

    /// Records sorted from most to least recently published.
    #[must_use]
    pub fn by_recency(&self) -> Vec<&ReleaseRecord> {
        let mut records: Vec<_> = self.records.values().collect();
        records.sort_by(|a, b| recency(b, a));
        records
    }

    /// Inserts or replaces the record for `tag` and rewrites the record file.
    ///
    /// # Errors
    ///
    /// Returns an [`Err`] if the file can not be written. The in-memory entry
    /// is kept either way.
    pub fn commit(&mut self, tag: &str, record: ReleaseRecord) -> anyhow::Result<()> {
        self.records.insert(tag.to_string(), record);

        let contents = serde_json::to_string_pretty(&self.records)?;
        std::fs::write(&self.file, contents)
            .with_context(|| format!("Failed to write cache {}", self.file.display()))?;

        trace!("Wrote {} records to {}", self.records.len(), self.file.display());

        Ok(())
    }

    /// Absolute location of a record's extracted template.
    #[must_use]
    pub fn path_of(&self, record: &ReleaseRecord) -> PathBuf {
        self.root.join(&record.path)
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }
}
