//! On-disk manifest format.
//!
//! ```text
//! {
//!   "version": 1,
//!   "entries": {
//!     "<sha256 hex>": {
//!       "filename": "invoice 1042.pdf",
//!       "message_id": "AAMkAD...",
//!       "timestamp": "2026-03-14T09:21:07.512Z"
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::digest::Fingerprint;

use super::ManifestEntry;

/// Current manifest format version.
pub const VERSION: u32 = 1;

/// Default manifest file name.
pub const FILE_NAME: &str = "attachment_manifest.json";

/// Owned document, as read from disk.
#[derive(Debug, Deserialize)]
pub struct ManifestDocument {
    /// Format version (must equal [`VERSION`]).
    pub version: u32,
    /// Fingerprint → first-seen metadata.
    pub entries: BTreeMap<Fingerprint, ManifestEntry>,
}

/// Borrowed document, as written to disk.
#[derive(Debug, Serialize)]
pub struct ManifestDocumentRef<'a> {
    pub version: u32,
    pub entries: &'a BTreeMap<Fingerprint, ManifestEntry>,
}

impl ManifestDocument {
    /// Validate that the document matches the current format.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.version != VERSION {
            return Err(format!(
                "Incompatible version: expected {VERSION}, found {}",
                self.version
            ));
        }
        Ok(())
    }
}
