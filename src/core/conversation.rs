use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::ChatMessage;
use crate::core::message::{Message, Role};

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Timestamp-based id that is also safe to use as a file stem.
    pub fn generate() -> Self {
        let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        let stamp = Utc::now().format("%Y%m%d-%H%M%S%3f");
        Self(format!("{stamp}-{counter}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id can name a file inside the data directory without
    /// escaping it.
    pub fn is_file_safe(&self) -> bool {
        !self.0.is_empty()
            && !self.0.contains("..")
            && !self.0.contains(['/', '\\', ':', '\0'])
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    #[serde(default)]
    pub title: Option<String>,
    pub model: String,
    #[serde(default)]
    messages: Vec<Message>,
    #[serde(default)]
    next_sequence: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    in_flight: bool,
}

impl Conversation {
    pub fn new(model: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::generate(),
            title: None,
            model: model.into(),
            messages: Vec::new(),
            next_sequence: 0,
            created_at: now,
            updated_at: now,
            in_flight: false,
        }
    }

    pub fn with_system_prompt(model: impl Into<String>, system_prompt: Option<&str>) -> Self {
        let mut conversation = Self::new(model);
        if let Some(prompt) = system_prompt.map(str::trim).filter(|p| !p.is_empty()) {
            conversation.append(Role::System, prompt);
        }
        conversation
    }

    /// Repairs the sequence counter after deserialization so that a
    /// hand-edited or older file can never cause a sequence to be reused.
    pub fn normalize(&mut self) {
        let floor = self
            .messages
            .iter()
            .map(|m| m.sequence + 1)
            .max()
            .unwrap_or(0);
        self.next_sequence = self.next_sequence.max(floor);
        self.in_flight = false;
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub(crate) fn set_in_flight(&mut self, in_flight: bool) {
        self.in_flight = in_flight;
    }

    /// Appends a message and returns the sequence number it was assigned.
    pub fn append(&mut self, role: Role, content: impl Into<String>) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.messages.push(Message {
            role,
            content: content.into(),
            sequence,
        });
        self.updated_at = Utc::now();
        sequence
    }

    pub fn remove_sequence(&mut self, sequence: u64) -> Option<Message> {
        let index = self.messages.iter().position(|m| m.sequence == sequence)?;
        self.updated_at = Utc::now();
        Some(self.messages.remove(index))
    }

    pub fn api_messages(&self) -> Vec<ChatMessage> {
        self.messages.iter().map(Message::to_api).collect()
    }

    pub fn display_title(&self) -> String {
        if let Some(title) = self.title.as_deref().filter(|t| !t.trim().is_empty()) {
            return title.trim().to_string();
        }
        self.messages
            .iter()
            .find(|m| m.is_user())
            .map(|m| {
                let first_line = m.content.lines().next().unwrap_or_default().trim();
                if first_line.is_empty() {
                    "Untitled chat".to_string()
                } else {
                    first_line.to_string()
                }
            })
            .unwrap_or_else(|| "New chat".to_string())
    }
}
