//! Message handles returned by folder listings.

/// Lightweight reference to a remote message.
///
/// Carries only what the attachment workflow needs; bodies are never fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHandle {
    /// Provider-assigned message identifier.
    pub id: String,

    /// Decoded subject line.
    pub subject: String,

    /// Sender address, lowercased. Empty when the API omits it.
    pub sender: String,
}

impl MessageHandle {
    /// A handle with only an id, for callers that know nothing else.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            subject: String::new(),
            sender: String::new(),
        }
    }

    /// Builder-style sender setter.
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = sender.into().to_lowercase();
        self
    }

    /// Builder-style subject setter.
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }
}
