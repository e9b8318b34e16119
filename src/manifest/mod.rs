//! Content-addressed manifest of every attachment ever saved.
//!
//! The manifest maps a [`Fingerprint`] to the metadata recorded the first time
//! that content was seen. Entries are append-only: once recorded they are never
//! mutated or removed by normal operation.

pub mod format;
pub mod reader;
pub mod store;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::digest::Fingerprint;
use crate::error::{Result, SortError};

/// First-seen metadata for one distinct attachment content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Name of the file the content was saved under in the destination directory.
    pub filename: String,

    /// Identifier of the message the content was first seen on.
    pub message_id: String,

    /// When the content was first recorded.
    pub timestamp: DateTime<Utc>,
}

impl ManifestEntry {
    /// Build an entry stamped with the current time.
    pub fn now(filename: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            message_id: message_id.into(),
            timestamp: Utc::now(),
        }
    }
}

/// In-memory manifest.
///
/// Keys are kept sorted so that serializing the same manifest twice yields
/// identical bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: BTreeMap<Fingerprint, ManifestEntry>,
}

impl Manifest {
    /// An empty manifest (first run).
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_entries(entries: BTreeMap<Fingerprint, ManifestEntry>) -> Self {
        Self { entries }
    }

    pub(crate) fn entries(&self) -> &BTreeMap<Fingerprint, ManifestEntry> {
        &self.entries
    }

    /// Return the entry for `fingerprint`, if the content has been seen before.
    pub fn lookup(&self, fingerprint: &Fingerprint) -> Option<&ManifestEntry> {
        self.entries.get(fingerprint)
    }

    /// Record a newly seen fingerprint.
    ///
    /// Callers must check [`Manifest::lookup`] first; recording a known
    /// fingerprint fails with [`SortError::DuplicateKey`] and leaves the
    /// existing entry untouched.
    pub fn record(&mut self, fingerprint: Fingerprint, entry: ManifestEntry) -> Result<()> {
        use std::collections::btree_map::Entry;

        match self.entries.entry(fingerprint) {
            Entry::Occupied(_) => Err(SortError::DuplicateKey(fingerprint)),
            Entry::Vacant(slot) => {
                slot.insert(entry);
                Ok(())
            }
        }
    }

    /// Number of distinct fingerprints recorded.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in fingerprint order.
    pub fn iter(&self) -> impl Iterator<Item = (&Fingerprint, &ManifestEntry)> {
        self.entries.iter()
    }
}
