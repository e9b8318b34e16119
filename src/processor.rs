//! Per-attachment deduplication and the message-level category policy.
//!
//! [`AttachmentProcessor::process`] decides whether an attachment is new or a
//! duplicate by content fingerprint, saves new content to the destination
//! directory, and records it in the manifest only once the bytes are safely
//! on disk. [`message_outcome`] folds the per-attachment outcomes of one
//! message into the single category applied to it.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::{CategoryConfig, MailConfig};
use crate::digest::{fingerprint, fingerprint_reader, Fingerprint};
use crate::error::{Result, SortError};
use crate::mail::MailApi;
use crate::manifest::{Manifest, ManifestEntry};
use crate::model::attachment::Attachment;
use crate::model::message::MessageHandle;

/// Highest numeric suffix tried when a filename is taken by different content.
const MAX_SUFFIX: u32 = 999;

/// Maximum length of a saved filename, in bytes. Filesystems cap names at 255
/// bytes, and a multibyte name reaches that long before 255 characters.
const MAX_NAME_BYTES: usize = 200;

/// Result of checking one attachment against the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// First time this content has been seen.
    New,
    /// Content already recorded in the manifest.
    Duplicate,
}

/// What happened to one attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Processed {
    pub outcome: Outcome,
    pub fingerprint: Fingerprint,
    /// Filename the content lives under in the destination directory.
    pub filename: String,
    /// Bytes written by this call (0 for duplicates, reused files and dry runs).
    pub bytes_written: u64,
}

/// Saves new attachments and classifies every attachment it is given.
#[derive(Debug, Clone)]
pub struct AttachmentProcessor {
    destination: PathBuf,
    allowed_extensions: Vec<String>,
    sender_labels: BTreeMap<String, String>,
    dry_run: bool,
}

impl AttachmentProcessor {
    /// A processor saving into `destination`, accepting every attachment.
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
            allowed_extensions: Vec::new(),
            sender_labels: BTreeMap::new(),
            dry_run: false,
        }
    }

    /// Build from the `[mail]` config section.
    pub fn from_config(mail: &MailConfig) -> Self {
        Self::new(&mail.destination)
            .with_allowed_extensions(mail.allowed_extensions.clone())
            .with_sender_labels(mail.sender_labels.clone())
    }

    /// Only process attachments with one of these extensions (case-insensitive).
    pub fn with_allowed_extensions(mut self, extensions: Vec<String>) -> Self {
        self.allowed_extensions = extensions
            .into_iter()
            .map(|e| e.trim_start_matches('.').to_lowercase())
            .collect();
        self
    }

    /// Append a label to saved filenames for senders from these domains.
    /// Domains match case-insensitively.
    pub fn with_sender_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.sender_labels = labels
            .into_iter()
            .map(|(domain, label)| (domain.trim().to_lowercase(), label))
            .collect();
        self
    }

    /// Classify without writing files. Entries are still recorded in memory so
    /// that repeats within the same run are reported as duplicates.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Whether the extension filter lets this attachment through.
    pub fn accepts(&self, attachment: &Attachment) -> bool {
        if self.allowed_extensions.is_empty() {
            return true;
        }
        attachment
            .extension()
            .is_some_and(|ext| self.allowed_extensions.contains(&ext))
    }

    /// Classify one attachment and, if it is new, save and record it.
    ///
    /// On a save failure the manifest is left untouched so that the next run
    /// treats the content as new again.
    pub fn process(
        &self,
        manifest: &mut Manifest,
        message: &MessageHandle,
        filename: &str,
        bytes: &[u8],
    ) -> Result<Processed> {
        let fp = fingerprint(bytes);

        if let Some(existing) = manifest.lookup(&fp) {
            debug!(
                fingerprint = %fp.short(),
                message = %message.id,
                first_seen = %existing.message_id,
                saved_as = %existing.filename,
                "Duplicate attachment"
            );
            return Ok(Processed {
                outcome: Outcome::Duplicate,
                fingerprint: fp,
                filename: existing.filename.clone(),
                bytes_written: 0,
            });
        }

        let name = self.target_name(message, filename);
        let (saved_name, written) = if self.dry_run {
            (name, 0)
        } else {
            self.save(&name, &fp, bytes)?
        };

        manifest.record(fp, ManifestEntry::now(&saved_name, &message.id))?;
        info!(
            fingerprint = %fp.short(),
            message = %message.id,
            file = %saved_name,
            bytes = bytes.len(),
            "New attachment"
        );

        Ok(Processed {
            outcome: Outcome::New,
            fingerprint: fp,
            filename: saved_name,
            bytes_written: written,
        })
    }

    /// Filename to save under: sanitized, with the sender label if any.
    fn target_name(&self, message: &MessageHandle, declared: &str) -> String {
        let clean = sanitize_filename(declared);
        let label = self
            .sender_labels
            .iter()
            .find(|(domain, _)| !domain.is_empty() && message.sender.contains(domain.as_str()))
            .map(|(_, label)| sanitize_filename(label));

        match label {
            Some(label) => {
                let (stem, ext) = split_name(&clean);
                fit_name(stem, &format!(" {label}"), ext)
            }
            None => clean,
        }
    }

    /// Write `bytes` under `name`, or a suffixed variant if the name is taken
    /// by different content. Identical content already on disk is reused.
    fn save(&self, name: &str, fp: &Fingerprint, bytes: &[u8]) -> Result<(String, u64)> {
        let dir = &self.destination;
        std::fs::create_dir_all(dir).map_err(|e| SortError::io(dir, e))?;

        let (stem, ext) = split_name(name);
        let mut pending: Option<tempfile::NamedTempFile> = None;
        let mut index = 0;

        while index <= MAX_SUFFIX {
            let candidate_name = if index == 0 {
                name.to_string()
            } else {
                fit_name(stem, &format!("_{index}"), ext)
            };
            let candidate = dir.join(&candidate_name);

            if candidate.exists() {
                if file_has_fingerprint(&candidate, fp)? {
                    debug!(file = %candidate.display(), "Identical file already on disk");
                    return Ok((candidate_name, 0));
                }
                index += 1;
                continue;
            }

            let temp = match pending.take() {
                Some(t) => t,
                None => write_temp(dir, bytes)?,
            };
            match temp.persist_noclobber(&candidate) {
                Ok(_) => return Ok((candidate_name, bytes.len() as u64)),
                // Lost a race for this name; look at it again.
                Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                    pending = Some(e.file);
                }
                Err(e) => return Err(SortError::io(&candidate, e.error)),
            }
        }

        Err(SortError::io(
            dir.join(name),
            std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "no free filename left for this attachment",
            ),
        ))
    }
}

/// Message-level outcome for a set of attachment outcomes.
///
/// A duplicate anywhere on the message wins over new content, because the
/// duplicate is the case that needs an operator's attention. `None` when no
/// attachment was successfully processed.
pub fn message_outcome(outcomes: &[Outcome]) -> Option<Outcome> {
    if outcomes.contains(&Outcome::Duplicate) {
        Some(Outcome::Duplicate)
    } else if outcomes.contains(&Outcome::New) {
        Some(Outcome::New)
    } else {
        None
    }
}

/// Apply the category for `outcome` to a message.
///
/// The category is written even if the message already shows it, which also
/// restores categories that were cleared by hand.
pub fn apply_category(
    api: &dyn MailApi,
    message: &MessageHandle,
    outcome: Outcome,
    categories: &CategoryConfig,
    mark_read_on_new: bool,
) -> Result<()> {
    let category = match outcome {
        Outcome::New => &categories.new,
        Outcome::Duplicate => &categories.duplicate,
    };
    api.set_category(message, category)?;
    debug!(message = %message.id, category = %category, "Category applied");

    if outcome == Outcome::New && mark_read_on_new {
        if let Err(e) = api.mark_read(message) {
            warn!(message = %message.id, error = %e, "Failed to mark message read");
        }
    }
    Ok(())
}

/// Make a declared filename safe to use inside the destination directory.
///
/// Path separators and control characters become `_`, leading dots and spaces
/// are dropped, and the name is truncated to a byte budget on a character
/// boundary.
pub fn sanitize_filename(name: &str) -> String {
    let mapped: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || " -_.()&,+'".contains(c) {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = mapped.trim_start_matches(['.', ' ']).trim_end();

    let (stem, ext) = split_name(trimmed);
    let ext: Option<String> = ext.map(|e| e.chars().take(16).collect());

    if stem.is_empty() {
        join_name("attachment", ext.as_deref())
    } else {
        fit_name(stem, "", ext.as_deref())
    }
}

/// `stem` + `suffix` + `.ext`, with the stem cut so the whole name stays
/// within [`MAX_NAME_BYTES`]. The suffix and extension are never cut.
fn fit_name(stem: &str, suffix: &str, ext: Option<&str>) -> String {
    let reserved = suffix.len() + ext.map_or(0, |e| e.len() + 1);
    let budget = MAX_NAME_BYTES.saturating_sub(reserved);
    let stem = truncate_bytes(stem, budget).trim_end();
    join_name(&format!("{stem}{suffix}"), ext)
}

fn truncate_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn split_name(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(pos) if pos > 0 && pos + 1 < name.len() => (&name[..pos], Some(&name[pos + 1..])),
        _ => (name, None),
    }
}

fn join_name(stem: &str, ext: Option<&str>) -> String {
    match ext {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem.to_string(),
    }
}

fn file_has_fingerprint(path: &Path, fp: &Fingerprint) -> Result<bool> {
    let file = std::fs::File::open(path).map_err(|e| SortError::io(path, e))?;
    let on_disk =
        fingerprint_reader(std::io::BufReader::new(file)).map_err(|e| SortError::io(path, e))?;
    Ok(on_disk == *fp)
}

fn write_temp(dir: &Path, bytes: &[u8]) -> Result<tempfile::NamedTempFile> {
    let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(|e| SortError::io(dir, e))?;
    // Durable before the manifest can record it.
    temp.write_all(bytes)
        .and_then(|()| temp.flush())
        .and_then(|()| temp.as_file().sync_all())
        .map_err(|e| SortError::io(temp.path(), e))?;
    Ok(temp)
}
