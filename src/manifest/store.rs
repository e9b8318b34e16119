//! Manifest loading and atomic persistence.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Result, SortError};
use crate::manifest::format::{ManifestDocument, ManifestDocumentRef, FILE_NAME, VERSION};
use crate::manifest::Manifest;

/// Durable home of a [`Manifest`].
#[derive(Debug, Clone)]
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    /// A store backed by the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the manifest file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the manifest.
    ///
    /// A missing file yields an empty manifest. Anything else that cannot be
    /// read back as a valid manifest is [`SortError::ManifestCorrupt`].
    pub fn load(&self) -> Result<Manifest> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No manifest yet, starting empty");
                return Ok(Manifest::new());
            }
            Err(e) => return Err(SortError::io(&self.path, e)),
        };

        if data.is_empty() {
            return Err(self.corrupt("file is empty"));
        }

        let document: ManifestDocument = serde_json::from_slice(&data)
            .map_err(|e| self.corrupt(format!("parse failed: {e}")))?;
        document.validate().map_err(|reason| self.corrupt(reason))?;

        let manifest = Manifest::from_entries(document.entries);
        debug!(
            path = %self.path.display(),
            count = manifest.len(),
            "Loaded manifest"
        );
        Ok(manifest)
    }

    /// Write the full manifest, replacing the previous file atomically.
    ///
    /// The document is written to a temporary file in the same directory,
    /// synced, then renamed over the target. A crash at any point leaves either
    /// the old file or the new one, never a partial write.
    pub fn save(&self, manifest: &Manifest) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| SortError::io(&dir, e))?;

        let document = ManifestDocumentRef {
            version: VERSION,
            entries: manifest.entries(),
        };
        let mut bytes = serde_json::to_vec_pretty(&document)?;
        bytes.push(b'\n');

        let mut temp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| SortError::io(&dir, e))?;
        temp.write_all(&bytes)
            .map_err(|e| SortError::io(temp.path(), e))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| SortError::io(temp.path(), e))?;
        temp.persist(&self.path)
            .map_err(|e| SortError::io(&self.path, e.error))?;

        debug!(
            path = %self.path.display(),
            count = manifest.len(),
            "Manifest saved"
        );
        Ok(())
    }

    fn corrupt(&self, reason: impl Into<String>) -> SortError {
        SortError::ManifestCorrupt {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }
}

/// Default manifest location: next to the running executable.
///
/// Kept out of the attachment destination so that purging or reorganizing
/// saved files never loses history.
pub fn default_manifest_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(FILE_NAME)
}
