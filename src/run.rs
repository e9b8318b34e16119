//! Run orchestration: one pass over a folder.
//!
//! 1. Load the manifest (fatal if it cannot be parsed).
//! 2. Walk every message with attachments, in the order the mail API lists them.
//! 3. Classify each attachment, then apply one category per message.
//! 4. Save the manifest (fatal if the save fails).
//!
//! Per-message failures are recorded in the [`RunSummary`] and never abort the
//! run. Nothing reaches the manifest file until a save completes, so an
//! interrupted run leaves the previous manifest intact.

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::{CategoryConfig, SaveMode};
use crate::error::{Result, SortError};
use crate::mail::MailApi;
use crate::manifest::store::ManifestStore;
use crate::manifest::Manifest;
use crate::model::message::MessageHandle;
use crate::processor::{apply_category, message_outcome, AttachmentProcessor, Outcome};

/// Run-wide settings that are not owned by the processor.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub save_mode: SaveMode,
    pub categories: CategoryConfig,
    pub mark_read_on_new: bool,
    /// Flag messages complete when none of their attachments is eligible.
    pub flag_without_eligible: bool,
}

/// A failure confined to one message or attachment.
#[derive(Debug, Clone, Serialize)]
pub struct RunError {
    /// Message the failure belongs to; empty for listing failures.
    pub message_id: String,
    /// Subject of that message, for reports.
    pub subject: String,
    /// Attachment filename, when the failure is specific to one attachment.
    pub attachment: Option<String>,
    pub reason: String,
}

/// Counts and errors accumulated over one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// Messages with attachments visited.
    pub messages: usize,
    /// Attachments seen for the first time.
    pub new: usize,
    /// Attachments whose content was already recorded.
    pub duplicates: usize,
    /// Attachments ignored by the extension filter.
    pub skipped: usize,
    /// Messages categorized as new.
    pub messages_new: usize,
    /// Messages categorized as duplicate.
    pub messages_duplicate: usize,
    /// Messages flagged complete because nothing on them was eligible.
    pub messages_flagged: usize,
    /// Bytes written to the destination directory.
    pub bytes_saved: u64,
    /// Manifest size after the run.
    pub manifest_entries: usize,
    /// Number of completed manifest saves.
    pub saves: usize,
    /// Whether the run only simulated its side effects.
    pub dry_run: bool,
    pub errors: Vec<RunError>,
}

impl RunSummary {
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    fn push_error(
        &mut self,
        message: Option<&MessageHandle>,
        attachment: Option<&str>,
        err: &SortError,
    ) {
        self.errors.push(RunError {
            message_id: message.map(|m| m.id.clone()).unwrap_or_default(),
            subject: message.map(|m| m.subject.clone()).unwrap_or_default(),
            attachment: attachment.map(str::to_string),
            reason: err.to_string(),
        });
    }
}

/// Drives the attachment processor over a folder and owns the manifest for
/// the duration of the run.
pub struct RunOrchestrator<'a> {
    api: &'a dyn MailApi,
    store: &'a ManifestStore,
    processor: &'a AttachmentProcessor,
    options: RunOptions,
}

impl<'a> RunOrchestrator<'a> {
    pub fn new(
        api: &'a dyn MailApi,
        store: &'a ManifestStore,
        processor: &'a AttachmentProcessor,
        options: RunOptions,
    ) -> Self {
        Self {
            api,
            store,
            processor,
            options,
        }
    }

    /// Process every attachment in `folder` and return the summary.
    ///
    /// Errors are returned only for failures that must stop the run: an
    /// unreadable manifest, an unknown folder, or a failed manifest save.
    pub fn run(&self, folder: &str, progress: Option<&dyn Fn(&RunSummary)>) -> Result<RunSummary> {
        let mut manifest = self.store.load()?;
        let mut summary = RunSummary {
            dry_run: self.processor.is_dry_run(),
            ..RunSummary::default()
        };
        info!(
            folder = %folder,
            manifest = %self.store.path().display(),
            known = manifest.len(),
            dry_run = summary.dry_run,
            "Starting run"
        );

        for item in self.api.list_messages_with_attachments(folder)? {
            let message = match item {
                Ok(message) => message,
                Err(e) => {
                    error!(error = %e, "Message listing failed, stopping enumeration");
                    summary.push_error(None, None, &e);
                    break;
                }
            };
            summary.messages += 1;
            self.process_message(&mut manifest, &message, &mut summary)?;
            if let Some(report) = progress {
                report(&summary);
            }
        }

        if !summary.dry_run {
            self.save(&manifest, &mut summary)?;
        }
        summary.manifest_entries = manifest.len();

        info!(
            messages = summary.messages,
            new = summary.new,
            duplicates = summary.duplicates,
            skipped = summary.skipped,
            errors = summary.error_count(),
            "Run complete"
        );
        Ok(summary)
    }

    fn process_message(
        &self,
        manifest: &mut Manifest,
        message: &MessageHandle,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let attachments = match self.api.get_attachments(message) {
            Ok(a) => a,
            Err(e) => {
                warn!(
                    message = %message.id,
                    subject = %message.subject,
                    error = %e,
                    "Failed to download attachments"
                );
                summary.push_error(Some(message), None, &e);
                return Ok(());
            }
        };

        let errors_before = summary.error_count();
        let mut outcomes = Vec::with_capacity(attachments.len());
        for attachment in &attachments {
            if !self.processor.accepts(attachment) {
                summary.skipped += 1;
                continue;
            }
            match self
                .processor
                .process(manifest, message, &attachment.filename, &attachment.bytes)
            {
                Ok(processed) => {
                    outcomes.push(processed.outcome);
                    match processed.outcome {
                        Outcome::New => {
                            summary.new += 1;
                            summary.bytes_saved += processed.bytes_written;
                            if self.options.save_mode == SaveMode::Incremental && !summary.dry_run {
                                self.save(manifest, summary)?;
                            }
                        }
                        Outcome::Duplicate => summary.duplicates += 1,
                    }
                }
                Err(e @ SortError::DuplicateKey(_)) => return Err(e),
                Err(e) => {
                    warn!(
                        message = %message.id,
                        subject = %message.subject,
                        attachment = %attachment.filename,
                        error = %e,
                        "Failed to process attachment"
                    );
                    summary.push_error(Some(message), Some(&attachment.filename), &e);
                }
            }
        }

        let Some(outcome) = message_outcome(&outcomes) else {
            if summary.error_count() == errors_before {
                self.flag_ineligible(message, summary);
            }
            return Ok(());
        };
        match outcome {
            Outcome::New => summary.messages_new += 1,
            Outcome::Duplicate => summary.messages_duplicate += 1,
        }

        if summary.dry_run {
            info!(message = %message.id, outcome = ?outcome, "Dry run: category not applied");
            return Ok(());
        }
        if let Err(e) = apply_category(
            self.api,
            message,
            outcome,
            &self.options.categories,
            self.options.mark_read_on_new,
        ) {
            warn!(message = %message.id, error = %e, "Failed to set category");
            summary.push_error(Some(message), None, &e);
        }
        Ok(())
    }

    /// Mark a message with nothing eligible as handled, when enabled.
    fn flag_ineligible(&self, message: &MessageHandle, summary: &mut RunSummary) {
        if !self.options.flag_without_eligible {
            return;
        }
        if summary.dry_run {
            info!(message = %message.id, "Dry run: flag not applied");
            return;
        }
        match self.api.flag_complete(message) {
            Ok(()) => {
                debug!(message = %message.id, "No eligible attachment, flagged complete");
                summary.messages_flagged += 1;
            }
            Err(e) => {
                warn!(message = %message.id, error = %e, "Failed to flag message");
                summary.push_error(Some(message), None, &e);
            }
        }
    }

    fn save(&self, manifest: &Manifest, summary: &mut RunSummary) -> Result<()> {
        self.store.save(manifest).inspect_err(|e| {
            error!(
                path = %self.store.path().display(),
                error = %e,
                "Manifest save failed; this run's new entries are not persisted"
            );
        })?;
        summary.saves += 1;
        Ok(())
    }
}
