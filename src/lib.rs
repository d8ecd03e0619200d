//! Terminal chat client for Gemini with image attachments and spoken replies.

pub mod app;
pub mod attachments;
pub mod audio;
pub mod chat;
pub mod config;
pub mod gemini;
pub mod speech;
