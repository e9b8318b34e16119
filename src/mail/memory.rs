//! In-memory mailbox.
//!
//! Holds folders of messages with attachments, records every category write,
//! and can be told to fail specific calls.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::{Result, SortError};
use crate::model::attachment::Attachment;
use crate::model::message::MessageHandle;

use super::{MailApi, MessageIter};

#[derive(Debug, Clone)]
struct StoredMessage {
    handle: MessageHandle,
    attachments: Vec<(String, Vec<u8>)>,
}

/// A [`MailApi`] backed by plain collections.
#[derive(Debug, Default)]
pub struct InMemoryMailbox {
    folders: BTreeMap<String, Vec<StoredMessage>>,
    applied: RefCell<HashMap<String, Vec<String>>>,
    current: RefCell<HashMap<String, String>>,
    read: RefCell<HashSet<String>>,
    flagged: RefCell<HashSet<String>>,
    failing_downloads: HashSet<String>,
    failing_categories: HashSet<String>,
    list_failure_after: Option<usize>,
}

impl InMemoryMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message to `folder`, creating the folder if needed.
    pub fn add_message<N, B>(
        &mut self,
        folder: &str,
        handle: MessageHandle,
        attachments: impl IntoIterator<Item = (N, B)>,
    ) where
        N: Into<String>,
        B: AsRef<[u8]>,
    {
        let attachments = attachments
            .into_iter()
            .map(|(name, bytes)| (name.into(), bytes.as_ref().to_vec()))
            .collect();
        self.folders
            .entry(folder.to_string())
            .or_default()
            .push(StoredMessage {
                handle,
                attachments,
            });
    }

    /// Create an empty folder.
    pub fn add_folder(&mut self, folder: &str) {
        self.folders.entry(folder.to_string()).or_default();
    }

    /// Make attachment downloads for message `id` fail.
    pub fn fail_downloads_for(&mut self, id: &str) {
        self.failing_downloads.insert(id.to_string());
    }

    /// Make category writes for message `id` fail.
    pub fn fail_categories_for(&mut self, id: &str) {
        self.failing_categories.insert(id.to_string());
    }

    /// Make listings yield an error after `n` messages.
    pub fn fail_listing_after(&mut self, n: usize) {
        self.list_failure_after = Some(n);
    }

    /// Category currently shown on message `id`.
    pub fn category_of(&self, id: &str) -> Option<String> {
        self.current.borrow().get(id).cloned()
    }

    /// Every category ever applied to message `id`, oldest first.
    pub fn category_history(&self, id: &str) -> Vec<String> {
        self.applied.borrow().get(id).cloned().unwrap_or_default()
    }

    /// Remove the category from message `id`, as a user would by hand.
    pub fn clear_category(&self, id: &str) {
        self.current.borrow_mut().remove(id);
    }

    /// Whether message `id` has been marked read.
    pub fn is_read(&self, id: &str) -> bool {
        self.read.borrow().contains(id)
    }

    /// Whether message `id` has been flagged complete.
    pub fn is_flagged(&self, id: &str) -> bool {
        self.flagged.borrow().contains(id)
    }

    fn find(&self, id: &str) -> Option<&StoredMessage> {
        self.folders
            .values()
            .flat_map(|msgs| msgs.iter())
            .find(|m| m.handle.id == id)
    }
}

impl MailApi for InMemoryMailbox {
    fn list_messages_with_attachments<'a>(&'a self, folder: &str) -> Result<MessageIter<'a>> {
        let messages = self
            .folders
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(folder))
            .map(|(_, msgs)| msgs)
            .ok_or_else(|| SortError::FolderNotFound(folder.to_string()))?;

        let fail_after = self.list_failure_after;
        let iter = messages
            .iter()
            .filter(|m| !m.attachments.is_empty())
            .map(|m| Ok(m.handle.clone()))
            .enumerate()
            .map(move |(i, item)| match fail_after {
                Some(n) if i >= n => Err(SortError::api(503, "list messages", "injected failure")),
                _ => item,
            })
            .scan(false, |failed, item| {
                if *failed {
                    return None;
                }
                *failed = item.is_err();
                Some(item)
            });
        Ok(Box::new(iter))
    }

    fn get_attachments(&self, message: &MessageHandle) -> Result<Vec<Attachment>> {
        if self.failing_downloads.contains(&message.id) {
            return Err(SortError::api(500, "download attachments", "injected failure"));
        }
        let stored = self
            .find(&message.id)
            .ok_or_else(|| SortError::api(404, "download attachments", "no such message"))?;
        Ok(stored
            .attachments
            .iter()
            .map(|(name, bytes)| Attachment::new(name, bytes.clone()))
            .collect())
    }

    fn set_category(&self, message: &MessageHandle, category: &str) -> Result<()> {
        if self.failing_categories.contains(&message.id) {
            return Err(SortError::api(503, "set category", "injected failure"));
        }
        self.applied
            .borrow_mut()
            .entry(message.id.clone())
            .or_default()
            .push(category.to_string());
        self.current
            .borrow_mut()
            .insert(message.id.clone(), category.to_string());
        Ok(())
    }

    fn mark_read(&self, message: &MessageHandle) -> Result<()> {
        self.read.borrow_mut().insert(message.id.clone());
        Ok(())
    }

    fn flag_complete(&self, message: &MessageHandle) -> Result<()> {
        self.flagged.borrow_mut().insert(message.id.clone());
        Ok(())
    }
}
