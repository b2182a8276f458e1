//! src/controller/messages.rs
//! ============================================================================
//! Buffered diagnostics shown to the host when an instance finishes.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Info,
    Warning,
    Error,
}

impl MessageLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            MessageLevel::Info => "info",
            MessageLevel::Warning => "warning",
            MessageLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedMessage {
    pub level: MessageLevel,
    pub text: CompactString,
    pub repeats: u32,
}

impl std::fmt::Display for BufferedMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.repeats > 1 {
            write!(f, "[{}] {} ({} times)", self.level.as_str(), self.text, self.repeats)
        } else {
            write!(f, "[{}] {}", self.level.as_str(), self.text)
        }
    }
}

/// Coalescing message buffer: identical `(level, text)` pairs bump a counter.
#[derive(Debug, Default)]
pub struct MessageBuffer {
    messages: Vec<BufferedMessage>,
}

impl MessageBuffer {
    pub fn push(&mut self, level: MessageLevel, text: &str) {
        if let Some(existing) = self
            .messages
            .iter_mut()
            .find(|m| m.level == level && m.text == text)
        {
            existing.repeats += 1;
            return;
        }

        self.messages.push(BufferedMessage {
            level,
            text: CompactString::from(text),
            repeats: 1,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn take(&mut self) -> Vec<BufferedMessage> {
        std::mem::take(&mut self.messages)
    }
}
