//! `ChatApp`: the context object owning both pipelines.
//!
//! # Architecture
//!
//! [`ChatApp`] is created once in `main` and owns:
//!
//! * the [`Conversation`] sent as history with every turn,
//! * the [`AttachmentPipeline`] holding images for the next message,
//! * the [`SpeechPlayer`] that reads replies aloud,
//! * the injected collaborators: [`ChatClient`], and optionally a
//!   [`SpeechRecognizer`].
//!
//! Nothing here is global; [`ChatApp::shutdown`] tears everything down.
//! The REPL maps each [`Command`] onto one method.

pub mod command;

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;

pub use command::{Command, CommandError, HELP};

use crate::attachments::{
    clipboard, parse_dropped_paths, Attachment, AttachmentPipeline, BatchReceipt, ClipboardError,
    IngestError, InputSurface, PathFile, RawFile,
};
use crate::audio::AudioOutput;
use crate::chat::{ChatClient, ChatError, Conversation, Message, MessageId};
use crate::config::{AppConfig, ConfigError, PlaybackRate, Voice};
use crate::speech::{
    RecognitionError, SpeakOutcome, SpeechError, SpeechPlayer, SpeechRecognizer, SpeechSynthesizer,
};

// ---------------------------------------------------------------------------
// AppError
// ---------------------------------------------------------------------------

/// Everything a user action can fail with.
#[derive(Debug, Error)]
pub enum AppError {
    /// An optional capability was not provided at construction.
    #[error("{0} is not supported on this system")]
    UnsupportedCapability(&'static str),

    #[error("attachments are still being processed, try again in a moment")]
    StillProcessing,

    #[error("type a message or attach an image first")]
    EmptyMessage,

    #[error("there is no message #{0}")]
    NoSuchMessage(usize),

    #[error("there is no reply to speak yet")]
    NothingToSpeak,

    #[error("there is no attachment #{0}")]
    NoSuchAttachment(usize),

    #[error("the clipboard holds no image, data URL or file path")]
    NothingToPaste,

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("clipboard: {0}")]
    Clipboard(#[from] ClipboardError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("chat failed: {0}")]
    Chat(#[from] ChatError),

    #[error(transparent)]
    Speech(#[from] SpeechError),

    #[error(transparent)]
    Recognition(#[from] RecognitionError),

    #[error("background task failed: {0}")]
    Internal(String),
}

// ---------------------------------------------------------------------------
// ChatApp
// ---------------------------------------------------------------------------

pub struct ChatApp {
    config: AppConfig,
    settings_path: Option<PathBuf>,
    conversation: Conversation,
    attachments: AttachmentPipeline,
    speech: SpeechPlayer,
    chat: Arc<dyn ChatClient>,
    recognizer: Option<Arc<dyn SpeechRecognizer>>,
}

impl ChatApp {
    pub fn new(
        config: AppConfig,
        chat: Arc<dyn ChatClient>,
        synth: Arc<dyn SpeechSynthesizer>,
        output: Arc<dyn AudioOutput>,
        recognizer: Option<Arc<dyn SpeechRecognizer>>,
    ) -> Self {
        let attachments = AttachmentPipeline::new(config.attachments.max_file_bytes);
        let speech = SpeechPlayer::new(
            synth,
            output,
            config.speech.voice,
            config.speech.playback_rate,
        );
        Self {
            config,
            settings_path: None,
            conversation: Conversation::new(),
            attachments,
            speech,
            chat,
            recognizer,
        }
    }

    /// Persist rate and voice changes to `path`.
    pub fn with_settings_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings_path = Some(path.into());
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn attachments(&self) -> &AttachmentPipeline {
        &self.attachments
    }

    pub fn speech(&self) -> &SpeechPlayer {
        &self.speech
    }

    // ---- attachments -------------------------------------------------------

    /// Attach files chosen by path.
    pub fn attach_paths(&self, paths: Vec<PathBuf>) -> Result<BatchReceipt, AppError> {
        self.submit(InputSurface::Picker, path_files(paths))
    }

    /// Attach files dropped onto the terminal (pasted, possibly quoted paths).
    pub fn attach_dropped(&self, paths: Vec<PathBuf>) -> Result<BatchReceipt, AppError> {
        self.submit(InputSurface::Drop, path_files(paths))
    }

    /// Like [`attach_dropped`](Self::attach_dropped) for raw pasted text.
    pub fn attach_dropped_text(&self, text: &str) -> Result<BatchReceipt, AppError> {
        self.attach_dropped(parse_dropped_paths(text))
    }

    /// Attach whatever the system clipboard holds.
    pub async fn paste(&self) -> Result<BatchReceipt, AppError> {
        let files = tokio::task::spawn_blocking(clipboard::read_files)
            .await
            .map_err(|e| AppError::Internal(e.to_string()))??;
        if files.is_empty() {
            return Err(AppError::NothingToPaste);
        }
        self.submit(InputSurface::Clipboard, files)
    }

    /// Attach already-open files from any surface.
    pub fn attach_files(
        &self,
        surface: InputSurface,
        files: Vec<Box<dyn RawFile>>,
    ) -> Result<BatchReceipt, AppError> {
        self.submit(surface, files)
    }

    fn submit(
        &self,
        surface: InputSurface,
        files: Vec<Box<dyn RawFile>>,
    ) -> Result<BatchReceipt, AppError> {
        Ok(self.attachments.submit_files(surface, files)?)
    }

    /// Remove pending attachment `number` (1-based).
    pub fn remove_attachment(&self, number: usize) -> Result<Attachment, AppError> {
        number
            .checked_sub(1)
            .and_then(|i| self.attachments.remove_attachment(i))
            .ok_or(AppError::NoSuchAttachment(number))
    }

    pub fn clear_attachments(&self) {
        self.attachments.clear_attachments();
    }

    /// Cancel conversions still in flight; returns how many were cancelled.
    pub fn cancel_conversions(&self) -> usize {
        self.attachments.cancel_all()
    }

    // ---- chat --------------------------------------------------------------

    /// Send `text` plus the pending attachments; returns the reply's id.
    ///
    /// The attachments move into the outgoing message.  If the chat call
    /// fails, neither turn is recorded and the attachments are gone.
    pub async fn send(&mut self, text: &str) -> Result<MessageId, AppError> {
        if self.attachments.is_processing() {
            return Err(AppError::StillProcessing);
        }
        let text = text.trim();
        if text.is_empty() && self.attachments.attachment_count() == 0 {
            return Err(AppError::EmptyMessage);
        }

        let attachments = self.attachments.take_attachments();
        log::info!(
            "Sending message ({} chars, {} attachment(s))",
            text.len(),
            attachments.len()
        );

        let reply = self
            .chat
            .send(self.conversation.messages(), text, &attachments)
            .await?;

        self.conversation.push(Message::user(text, attachments));
        Ok(self.conversation.push(Message::model(reply)))
    }

    /// Drop the history and stop any speech.
    pub fn new_conversation(&mut self) {
        self.speech.stop();
        self.conversation.clear();
        log::info!("Started a new conversation");
    }

    // ---- speech ------------------------------------------------------------

    /// Message `number` (1-based), or the latest reply.
    fn speakable(&self, number: Option<usize>) -> Result<&Message, AppError> {
        match number {
            Some(n) => self.conversation.nth(n).ok_or(AppError::NoSuchMessage(n)),
            None => self
                .conversation
                .last_model_message()
                .ok_or(AppError::NothingToSpeak),
        }
    }

    /// Speak (or toggle off) a message and wait until playback starts.
    pub async fn speak(&self, number: Option<usize>) -> Result<SpeakOutcome, AppError> {
        let message = self.speakable(number)?;
        let (id, text) = (message.id, message.text.clone());
        Ok(self.speech.speak(id, &text).await?)
    }

    /// Like [`speak`](Self::speak) but runs in the background, so the caller
    /// can keep accepting input (for example `/stop`) while audio is fetched.
    pub fn spawn_speak(
        &self,
        number: Option<usize>,
    ) -> Result<JoinHandle<Result<SpeakOutcome, SpeechError>>, AppError> {
        let message = self.speakable(number)?;
        let (id, text) = (message.id, message.text.clone());
        let speech = self.speech.clone();
        Ok(tokio::spawn(async move { speech.speak(id, &text).await }))
    }

    pub fn stop_speech(&self) -> bool {
        self.speech.stop()
    }

    pub fn set_playback_rate(&mut self, rate: f32) -> Result<PlaybackRate, AppError> {
        let rate = PlaybackRate::new(rate)?;
        self.speech.set_playback_rate(rate);
        self.config.speech.playback_rate = rate;
        self.persist();
        Ok(rate)
    }

    pub fn set_voice(&mut self, name: &str) -> Result<Voice, AppError> {
        let voice: Voice = name.parse()?;
        self.speech.set_voice(voice);
        self.config.speech.voice = voice;
        self.persist();
        Ok(voice)
    }

    /// Capture one utterance with the injected recognizer.
    pub async fn dictate(&self) -> Result<String, AppError> {
        let recognizer = self
            .recognizer
            .as_ref()
            .ok_or(AppError::UnsupportedCapability("speech recognition"))?;
        Ok(recognizer.recognize().await?)
    }

    fn persist(&self) {
        let Some(path) = &self.settings_path else {
            return;
        };
        if let Err(e) = self.config.save_to(path) {
            log::warn!("Failed to save settings to {}: {e}", path.display());
        }
    }

    // ---- teardown ----------------------------------------------------------

    /// Cancel conversions, stop speech and close the audio output.
    pub fn shutdown(&self) {
        let cancelled = self.attachments.cancel_all();
        if cancelled > 0 {
            log::debug!("cancelled {cancelled} conversion(s) on shutdown");
        }
        self.speech.shutdown();
        log::info!("Shut down");
    }
}

fn path_files(paths: Vec<PathBuf>) -> Vec<Box<dyn RawFile>> {
    paths
        .into_iter()
        .map(|p| Box::new(PathFile::new(p)) as Box<dyn RawFile>)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
