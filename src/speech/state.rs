//! Playback state and session events.

use crate::chat::MessageId;

/// Phase of the single playback slot.
///
/// ```text
/// Idle ──speak(a)──▶ Requesting ──audio decoded──▶ Playing ──end──▶ Idle
///                    │                             │
///                    └──stop / speak(a) / error────┴──▶ Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Requesting,
    Playing,
}

impl PlaybackState {
    /// `true` while a session occupies the slot.
    ///
    /// ```
    /// use gemini_chat::speech::PlaybackState;
    ///
    /// assert!(!PlaybackState::Idle.is_active());
    /// assert!(PlaybackState::Requesting.is_active());
    /// assert!(PlaybackState::Playing.is_active());
    /// ```
    pub fn is_active(&self) -> bool {
        !matches!(self, PlaybackState::Idle)
    }

    pub fn label(&self) -> &'static str {
        match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Requesting => "requesting",
            PlaybackState::Playing => "playing",
        }
    }
}

/// Session lifecycle notifications, published on a broadcast channel.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    Requesting(MessageId),
    Playing(MessageId),
    /// Playback reached the end of the audio.
    Finished(MessageId),
    /// Stopped explicitly, toggled off, or superseded by another message.
    Stopped(MessageId),
    Failed { message_id: MessageId, error: String },
}

impl PlaybackEvent {
    pub fn message_id(&self) -> MessageId {
        match self {
            PlaybackEvent::Requesting(id)
            | PlaybackEvent::Playing(id)
            | PlaybackEvent::Finished(id)
            | PlaybackEvent::Stopped(id) => *id,
            PlaybackEvent::Failed { message_id, .. } => *message_id,
        }
    }
}

/// What a `speak` call ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakOutcome {
    /// Audio is now playing for the requested message.
    Started,
    /// The message was already active; the call stopped it.
    Stopped,
    /// The session was stopped or superseded while synthesis was in flight;
    /// its result was dropped.
    Discarded,
}
