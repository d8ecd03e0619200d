//! Single-flight speech playback.
//!
//! [`SpeechPlayer`] owns the one playback slot.  Every `speak` stops
//! whatever occupies the slot before starting, so two sessions are never
//! audible together.  Each session gets a generation number and a
//! [`CancellationToken`]; any synthesis result, decode result or failure
//! that arrives for a generation no longer in the slot is dropped.
//!
//! The audio output context is opened lazily on the first `speak`, resumed
//! once if it starts suspended, and closed by [`SpeechPlayer::shutdown`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::{broadcast, OnceCell};
use tokio_util::sync::CancellationToken;

use super::state::{PlaybackEvent, PlaybackState, SpeakOutcome};
use super::synth::{SpeechSynthesizer, SynthesisError};
use crate::audio::{
    apply_playback_rate, decode_audio, AudioOutput, AudioSink, DecodeError, HaltHandle, SinkError,
    OUTPUT_SAMPLE_RATE,
};
use crate::chat::MessageId;
use crate::config::{PlaybackRate, Voice};

const EVENT_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// SpeechError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("speech synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("could not decode speech audio: {0}")]
    Decode(#[from] DecodeError),

    #[error("audio output failed: {0}")]
    Output(#[from] SinkError),

    #[error("speech task failed: {0}")]
    Internal(String),
}

fn join_error(e: tokio::task::JoinError) -> SpeechError {
    SpeechError::Internal(e.to_string())
}

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

struct Session {
    message_id: MessageId,
    generation: u64,
    phase: PlaybackState,
    cancel: CancellationToken,
    halt: Option<HaltHandle>,
}

/// Audio ready to hand to the sink.
struct Prepared {
    sink: Arc<dyn AudioSink>,
    samples: Vec<f32>,
    rate: PlaybackRate,
}

#[derive(Default)]
struct Slot {
    session: Option<Session>,
    generation: u64,
}

struct Settings {
    voice: Voice,
    rate: PlaybackRate,
}

struct PlayerShared {
    synth: Arc<dyn SpeechSynthesizer>,
    output: Arc<dyn AudioOutput>,
    sink: OnceCell<Arc<dyn AudioSink>>,
    settings: Mutex<Settings>,
    slot: Mutex<Slot>,
    events: broadcast::Sender<PlaybackEvent>,
}

// ---------------------------------------------------------------------------
// SpeechPlayer
// ---------------------------------------------------------------------------

/// Turns message text into audio through the injected collaborators.
///
/// Cheap to clone; clones share the slot and the output context.
#[derive(Clone)]
pub struct SpeechPlayer {
    shared: Arc<PlayerShared>,
}

impl SpeechPlayer {
    pub fn new(
        synth: Arc<dyn SpeechSynthesizer>,
        output: Arc<dyn AudioOutput>,
        voice: Voice,
        rate: PlaybackRate,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(PlayerShared {
                synth,
                output,
                sink: OnceCell::new(),
                settings: Mutex::new(Settings { voice, rate }),
                slot: Mutex::new(Slot::default()),
                events,
            }),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.shared.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn settings(&self) -> MutexGuard<'_, Settings> {
        self.shared
            .settings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: PlaybackEvent) {
        // No subscribers is fine.
        let _ = self.shared.events.send(event);
    }

    /// Speak `text` for `message_id`, or stop it if that message is already
    /// requesting or playing.
    ///
    /// Resolves once playback has *started* (or the call was a toggle-off,
    /// or the session was superseded while in flight).  Natural completion
    /// is reported as [`PlaybackEvent::Finished`].
    ///
    /// # Errors
    ///
    /// Synthesis, decode and output failures of the current session.  The
    /// slot is back to idle before the error is returned.
    pub async fn speak(&self, message_id: MessageId, text: &str) -> Result<SpeakOutcome, SpeechError> {
        let (generation, cancel) = {
            let mut slot = self.slot();
            if slot
                .session
                .as_ref()
                .is_some_and(|s| s.message_id == message_id)
            {
                self.stop_locked(&mut slot);
                return Ok(SpeakOutcome::Stopped);
            }
            self.stop_locked(&mut slot);

            slot.generation += 1;
            let generation = slot.generation;
            let cancel = CancellationToken::new();
            slot.session = Some(Session {
                message_id,
                generation,
                phase: PlaybackState::Requesting,
                cancel: cancel.clone(),
                halt: None,
            });
            (generation, cancel)
        };
        log::debug!("speech {message_id}: Idle -> Requesting");
        self.emit(PlaybackEvent::Requesting(message_id));

        let prepared = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::debug!("speech {message_id}: request abandoned");
                return Ok(SpeakOutcome::Discarded);
            }
            result = self.prepare(text) => result,
        };

        match prepared {
            Ok(prepared) => self.start_playback(message_id, generation, prepared),
            Err(e) => self.fail(message_id, generation, e),
        }
    }

    /// Output context, resumed, then synthesised audio decoded and
    /// rendered at the playback rate.
    async fn prepare(&self, text: &str) -> Result<Prepared, SpeechError> {
        let sink = self.output_context().await?;

        if sink.is_suspended() {
            let resuming = Arc::clone(&sink);
            tokio::task::spawn_blocking(move || resuming.resume())
                .await
                .map_err(join_error)??;
            log::debug!("audio output resumed");
        }

        let voice = self.voice();
        let encoded = self
            .shared
            .synth
            .synthesize(text, voice)
            .await?
            .filter(|data| !data.trim().is_empty())
            .ok_or(SynthesisError::NoAudio)?;

        let rate = self.playback_rate();
        let device_rate = sink.device_rate();
        let samples = tokio::task::spawn_blocking(move || {
            let buffer = decode_audio(&encoded)?;
            log::debug!("decoded {:.2}s of speech", buffer.duration_secs());
            Ok::<_, DecodeError>(apply_playback_rate(&buffer, rate, device_rate))
        })
        .await
        .map_err(join_error)??;

        Ok(Prepared {
            sink,
            samples,
            rate,
        })
    }

    /// The shared output context, opened on first use.
    async fn output_context(&self) -> Result<Arc<dyn AudioSink>, SpeechError> {
        let sink = self
            .shared
            .sink
            .get_or_try_init(|| async {
                let output = Arc::clone(&self.shared.output);
                tokio::task::spawn_blocking(move || output.open(OUTPUT_SAMPLE_RATE))
                    .await
                    .map_err(join_error)
                    .and_then(|opened| opened.map_err(SpeechError::from))
            })
            .await?;
        Ok(Arc::clone(sink))
    }

    fn start_playback(
        &self,
        message_id: MessageId,
        generation: u64,
        prepared: Prepared,
    ) -> Result<SpeakOutcome, SpeechError> {
        let Prepared {
            sink,
            samples,
            rate,
        } = prepared;
        let mut slot = self.slot();
        let Some(session) = slot
            .session
            .as_mut()
            .filter(|s| s.generation == generation)
        else {
            log::debug!("speech {message_id}: audio arrived after stop, dropped");
            return Ok(SpeakOutcome::Discarded);
        };

        let handle = match sink.play(samples) {
            Ok(handle) => handle,
            Err(e) => {
                slot.session = None;
                drop(slot);
                return self.report_failure(message_id, e.into());
            }
        };
        let (halt, finished) = handle.into_parts();
        session.halt = Some(halt);
        session.phase = PlaybackState::Playing;
        drop(slot);

        log::debug!("speech {message_id}: Requesting -> Playing at {rate}");
        self.emit(PlaybackEvent::Playing(message_id));

        let player = self.clone();
        tokio::spawn(async move {
            // Errors when halted, replaced or closed; only a natural end completes.
            if finished.await.is_ok() {
                player.complete(generation);
            }
        });

        Ok(SpeakOutcome::Started)
    }

    fn fail(
        &self,
        message_id: MessageId,
        generation: u64,
        error: SpeechError,
    ) -> Result<SpeakOutcome, SpeechError> {
        let mut slot = self.slot();
        if !slot
            .session
            .as_ref()
            .is_some_and(|s| s.generation == generation)
        {
            log::debug!("speech {message_id}: failure after stop ignored: {error}");
            return Ok(SpeakOutcome::Discarded);
        }
        slot.session = None;
        drop(slot);
        self.report_failure(message_id, error)
    }

    fn report_failure(
        &self,
        message_id: MessageId,
        error: SpeechError,
    ) -> Result<SpeakOutcome, SpeechError> {
        log::error!("speech {message_id} failed: {error}");
        self.emit(PlaybackEvent::Failed {
            message_id,
            error: error.to_string(),
        });
        Err(error)
    }

    fn complete(&self, generation: u64) {
        let mut slot = self.slot();
        let finished = slot
            .session
            .as_ref()
            .filter(|s| s.generation == generation && s.phase == PlaybackState::Playing)
            .map(|s| s.message_id);
        if let Some(message_id) = finished {
            slot.session = None;
            drop(slot);
            log::debug!("speech {message_id}: Playing -> Idle (finished)");
            self.emit(PlaybackEvent::Finished(message_id));
        }
    }

    /// Tear down the session in the slot, if any.
    fn stop_locked(&self, slot: &mut Slot) -> Option<MessageId> {
        let session = slot.session.take()?;
        session.cancel.cancel();
        if let Some(halt) = &session.halt {
            halt.halt();
        }
        log::debug!(
            "speech {}: {} -> Idle (stopped)",
            session.message_id,
            session.phase.label()
        );
        self.emit(PlaybackEvent::Stopped(session.message_id));
        Some(session.message_id)
    }

    /// Stop whatever is requesting or playing.  Returns `false` when idle.
    pub fn stop(&self) -> bool {
        let mut slot = self.slot();
        self.stop_locked(&mut slot).is_some()
    }

    /// The active message and its phase, if any.
    pub fn status(&self) -> Option<(MessageId, PlaybackState)> {
        self.slot()
            .session
            .as_ref()
            .map(|s| (s.message_id, s.phase))
    }

    /// Phase of `message_id`: idle unless it owns the slot.
    pub fn state_for(&self, message_id: MessageId) -> PlaybackState {
        match self.status() {
            Some((active, phase)) if active == message_id => phase,
            _ => PlaybackState::Idle,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.shared.events.subscribe()
    }

    /// Applies from the next playback on.
    pub fn set_playback_rate(&self, rate: PlaybackRate) {
        self.settings().rate = rate;
    }

    pub fn playback_rate(&self) -> PlaybackRate {
        self.settings().rate
    }

    pub fn set_voice(&self, voice: Voice) {
        self.settings().voice = voice;
    }

    pub fn voice(&self) -> Voice {
        self.settings().voice
    }

    /// Stop playback and close the output context if it was opened.
    pub fn shutdown(&self) {
        self.stop();
        if let Some(sink) = self.shared.sink.get() {
            sink.close();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
