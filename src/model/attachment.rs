//! Attachment payloads as delivered by the mail API.
//!
//! Attachments are ephemeral: only their fingerprint and first-seen metadata
//! ever reach the manifest.

/// A single file attachment, fully downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Filename declared by the sender. Untrusted; sanitized before use on disk.
    pub filename: String,

    /// Raw decoded bytes.
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }

    /// Lowercase extension of the declared filename, without the dot.
    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.filename)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
    }
}
