//! `attachsort`: save mailbox attachments once, tag the messages that carried them.
//!
//! Attachments are identified by the SHA-256 fingerprint of their content. A
//! persistent manifest remembers every fingerprint ever saved, so each distinct
//! content lands in the destination directory exactly once no matter how many
//! messages carry it, and each message is tagged as holding new or repeated
//! content.

pub mod config;
pub mod credentials;
pub mod digest;
pub mod error;
pub mod export;
pub mod mail;
pub mod manifest;
pub mod model;
pub mod processor;
pub mod run;
pub mod verify;
