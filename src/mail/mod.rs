//! Mail API capability interface.
//!
//! The run orchestrator only ever talks to a mailbox through [`MailApi`].
//! [`graph::GraphClient`] is the Microsoft Graph implementation;
//! [`memory::InMemoryMailbox`] backs tests and dry experiments.

pub mod graph;
pub mod memory;

use crate::error::Result;
use crate::model::attachment::Attachment;
use crate::model::message::MessageHandle;

/// Lazy, finite, single-pass sequence of messages.
///
/// An `Err` item ends the listing: pagination cannot resume past a failed page.
pub type MessageIter<'a> = Box<dyn Iterator<Item = Result<MessageHandle>> + 'a>;

/// Operations the attachment workflow needs from a remote mailbox.
pub trait MailApi {
    /// List messages carrying attachments in `folder`, in provider order.
    ///
    /// Fails up front if the folder cannot be resolved.
    fn list_messages_with_attachments<'a>(&'a self, folder: &str) -> Result<MessageIter<'a>>;

    /// Download every file attachment of a message, in provider order.
    fn get_attachments(&self, message: &MessageHandle) -> Result<Vec<Attachment>>;

    /// Set the category shown on the message.
    fn set_category(&self, message: &MessageHandle, category: &str) -> Result<()>;

    /// Mark the message as read.
    fn mark_read(&self, message: &MessageHandle) -> Result<()>;

    /// Set the message's follow-up flag to complete.
    fn flag_complete(&self, message: &MessageHandle) -> Result<()>;
}
