//! Chat with the model: conversation history and the chat collaborator.

pub mod client;
pub mod message;

pub use client::{ChatClient, ChatError, GeminiChat};
pub use message::{Conversation, Message, MessageId, Role};
