//! Core data model types for mail messages and their attachments.

pub mod attachment;
pub mod message;
