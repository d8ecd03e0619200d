//! Conversation history.

use std::fmt;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::attachments::Attachment;

/// Stable identity of a message; keys the playback slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    /// First eight hex digits, enough to tell messages apart in logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let simple = self.0.simple().to_string();
        f.write_str(&simple[..8])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Model,
}

impl Role {
    /// Role name on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub text: String,
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn user(text: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        Self::new(Role::User, text.into(), attachments)
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self::new(Role::Model, text.into(), Vec::new())
    }

    fn new(role: Role, text: String, attachments: Vec<Attachment>) -> Self {
        Self {
            id: MessageId::new(),
            role,
            text,
            attachments,
            created_at: Utc::now(),
        }
    }
}

/// Ordered message list, sent as history with every chat request.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `message` and return its id.
    pub fn push(&mut self, message: Message) -> MessageId {
        let id = message.id;
        self.messages.push(message);
        id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// 1-based lookup, matching the numbering shown to the user.
    pub fn nth(&self, number: usize) -> Option<&Message> {
        number.checked_sub(1).and_then(|i| self.messages.get(i))
    }

    pub fn last_model_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::Model)
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_display_short() {
        let (a, b) = (MessageId::new(), MessageId::new());
        assert_ne!(a, b);
        assert_eq!(a.to_string().len(), 8);
    }

    #[test]
    fn nth_is_one_based() {
        let mut conv = Conversation::new();
        let first = conv.push(Message::user("hi", Vec::new()));
        conv.push(Message::model("hello"));

        assert_eq!(conv.nth(1).map(|m| m.id), Some(first));
        assert_eq!(conv.nth(2).map(|m| m.role), Some(Role::Model));
        assert!(conv.nth(0).is_none());
        assert!(conv.nth(3).is_none());
    }

    #[test]
    fn last_model_message_skips_user_turns() {
        let mut conv = Conversation::new();
        conv.push(Message::model("one"));
        let two = conv.push(Message::model("two"));
        conv.push(Message::user("thanks", Vec::new()));

        assert_eq!(conv.last_model_message().map(|m| m.id), Some(two));
        assert_eq!(conv.get(two).map(|m| m.text.as_str()), Some("two"));
    }

    #[test]
    fn messages_are_stamped_in_order() {
        let before = Utc::now();
        let first = Message::user("hi", Vec::new());
        let second = Message::model("hello");
        assert!(before <= first.created_at);
        assert!(first.created_at <= second.created_at);
    }

    #[test]
    fn clear_empties_history() {
        let mut conv = Conversation::new();
        conv.push(Message::user("hi", Vec::new()));
        conv.clear();
        assert!(conv.is_empty());
        assert_eq!(conv.len(), 0);
    }
}
