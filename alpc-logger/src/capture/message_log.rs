use std::sync::Mutex;

use super::lock;
use crate::trace_data::Message;

/// Completed messages, kept until drained
#[derive(Debug, Default)]
pub struct MessageLog {
    messages: Mutex<Vec<Message>>,
}

impl MessageLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, message: Message) {
        lock(&self.messages).push(message);
    }

    /// Take every message, leaving the log empty
    pub fn drain(&self) -> Vec<Message> {
        std::mem::take(&mut *lock(&self.messages))
    }

    /// Copy of the current contents; the log is left as is
    #[must_use]
    pub fn snapshot(&self) -> Vec<Message> {
        lock(&self.messages).clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.messages).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.messages).is_empty()
    }
}
