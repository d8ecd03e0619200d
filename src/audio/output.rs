//! Audio output capability.
//!
//! [`AudioOutput`] opens the process-wide output context; the resulting
//! [`AudioSink`] plays one voice at a time.  Each [`AudioSink::play`]
//! returns a [`PlaybackHandle`] that can halt the voice and resolves when
//! the voice runs out of samples.
//!
//! [`render`] is the device-independent mixing step used by the cpal
//! callback: it copies the active voice into an interleaved output buffer,
//! duplicating mono samples into every channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::oneshot;


// ---------------------------------------------------------------------------
// SinkError
// ---------------------------------------------------------------------------

/// Errors from opening or driving the output device.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("no output device found on the default audio host")]
    NoDevice,

    #[error("failed to query default output config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start output stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("audio output thread failed: {0}")]
    Thread(String),

    #[error("audio output has been closed")]
    Closed,
}

// ---------------------------------------------------------------------------
// Capability traits
// ---------------------------------------------------------------------------

/// Opens the shared output context.
pub trait AudioOutput: Send + Sync {
    /// Open an output context configured for `sample_rate`.  May block.
    fn open(&self, sample_rate: u32) -> Result<Arc<dyn AudioSink>, SinkError>;
}

/// An open output context.
pub trait AudioSink: Send + Sync {
    /// `true` until the context has been resumed for the first time.
    fn is_suspended(&self) -> bool;

    /// Start the underlying stream.  May block.
    fn resume(&self) -> Result<(), SinkError>;

    /// Sample rate the device consumes mono samples at.
    fn device_rate(&self) -> u32;

    /// Start playing `samples`, already rendered at [`device_rate`], replacing
    /// any voice still playing.  Must not block.
    ///
    /// [`device_rate`]: AudioSink::device_rate
    fn play(&self, samples: Vec<f32>) -> Result<PlaybackHandle, SinkError>;

    /// Release the device.  Later `play` calls fail with [`SinkError::Closed`].
    fn close(&self);
}

// ---------------------------------------------------------------------------
// PlaybackHandle / HaltHandle / VoiceSignal
// ---------------------------------------------------------------------------

/// Caller side of one playing voice.
#[derive(Debug)]
pub struct PlaybackHandle {
    halt: HaltHandle,
    finished: oneshot::Receiver<()>,
}

impl PlaybackHandle {
    /// Create a linked handle / signal pair.  The sink keeps the signal.
    pub fn pair() -> (PlaybackHandle, VoiceSignal) {
        let halted = Arc::new(AtomicBool::new(false));
        let (tx, rx) = oneshot::channel();
        let handle = PlaybackHandle {
            halt: HaltHandle(Arc::clone(&halted)),
            finished: rx,
        };
        let signal = VoiceSignal {
            halted,
            finished: Some(tx),
        };
        (handle, signal)
    }

    /// Split into the halt switch and the natural-completion receiver.
    ///
    /// The receiver yields `Ok(())` only when the voice played to the end;
    /// it errors if the voice was halted, replaced or the sink closed.
    pub fn into_parts(self) -> (HaltHandle, oneshot::Receiver<()>) {
        (self.halt, self.finished)
    }
}

/// Stops a voice.  Halting a finished or never-started voice does nothing.
#[derive(Debug, Clone)]
pub struct HaltHandle(Arc<AtomicBool>);

impl HaltHandle {
    pub fn halt(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_halted(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Sink side of one playing voice.
#[derive(Debug)]
pub struct VoiceSignal {
    halted: Arc<AtomicBool>,
    finished: Option<oneshot::Sender<()>>,
}

impl VoiceSignal {
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// Report natural completion.  Only the first call has an effect.
    pub fn complete(&mut self) {
        if let Some(tx) = self.finished.take() {
            let _ = tx.send(());
        }
    }
}

// ---------------------------------------------------------------------------
// ActiveVoice / render
// ---------------------------------------------------------------------------

/// Samples being played plus their completion signal.
#[derive(Debug)]
pub struct ActiveVoice {
    samples: Vec<f32>,
    pos: usize,
    signal: VoiceSignal,
}

impl ActiveVoice {
    pub fn new(samples: Vec<f32>, signal: VoiceSignal) -> Self {
        Self {
            samples,
            pos: 0,
            signal,
        }
    }

    fn next_sample(&mut self) -> Option<f32> {
        if self.signal.is_halted() {
            return None;
        }
        let sample = self.samples.get(self.pos).copied();
        if sample.is_some() {
            self.pos += 1;
        }
        sample
    }

    fn exhausted(&self) -> bool {
        self.pos >= self.samples.len()
    }
}

/// Fill interleaved `out` from the voice in `slot`, then retire the voice
/// if it was halted or has no samples left.
pub fn render(out: &mut [f32], channels: usize, slot: &mut Option<ActiveVoice>) {
    let channels = channels.max(1);
    for frame in out.chunks_mut(channels) {
        let sample = slot
            .as_mut()
            .and_then(ActiveVoice::next_sample)
            .unwrap_or(0.0);
        frame.fill(sample);
    }

    let retire = match slot.as_mut() {
        Some(voice) if voice.signal.is_halted() => true,
        Some(voice) if voice.exhausted() => {
            voice.signal.complete();
            true
        }
        _ => false,
    };
    if retire {
        *slot = None;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn voice(samples: Vec<f32>) -> (Option<ActiveVoice>, PlaybackHandle) {
        let (handle, signal) = PlaybackHandle::pair();
        (Some(ActiveVoice::new(samples, signal)), handle)
    }

    #[test]
    fn mono_samples_fill_every_channel() {
        let (mut slot, _handle) = voice(vec![0.1, 0.2, 0.3, 0.4]);
        let mut out = [9.0_f32; 4];
        render(&mut out, 2, &mut slot);
        assert_eq!(out, [0.1, 0.1, 0.2, 0.2]);
        assert!(slot.is_some());
    }

    #[test]
    fn exhausted_voice_completes_and_pads_with_silence() {
        let (mut slot, handle) = voice(vec![0.5, 0.5]);
        let (_halt, mut finished) = handle.into_parts();

        let mut out = [9.0_f32; 4];
        render(&mut out, 1, &mut slot);

        assert_eq!(out, [0.5, 0.5, 0.0, 0.0]);
        assert!(slot.is_none());
        assert!(finished.try_recv().is_ok());
    }

    #[test]
    fn halted_voice_goes_silent_without_completing() {
        let (mut slot, handle) = voice(vec![0.5; 8]);
        let (halt, mut finished) = handle.into_parts();
        halt.halt();

        let mut out = [9.0_f32; 4];
        render(&mut out, 1, &mut slot);

        assert_eq!(out, [0.0; 4]);
        assert!(slot.is_none());
        assert!(finished.try_recv().is_err());
    }

    #[test]
    fn halting_after_completion_is_harmless() {
        let (mut slot, handle) = voice(vec![0.1]);
        let (halt, _finished) = handle.into_parts();
        let mut out = [0.0_f32; 2];
        render(&mut out, 1, &mut slot);
        halt.halt();
        halt.halt();
        assert!(halt.is_halted());
    }

    #[test]
    fn empty_slot_renders_silence() {
        let mut slot = None;
        let mut out = [1.0_f32; 6];
        render(&mut out, 3, &mut slot);
        assert_eq!(out, [0.0; 6]);
    }

    #[test]
    fn voice_spans_multiple_callbacks() {
        let (mut slot, _handle) = voice(vec![0.1, 0.2, 0.3]);
        let mut out = [0.0_f32; 2];
        render(&mut out, 1, &mut slot);
        assert_eq!(out, [0.1, 0.2]);
        render(&mut out, 1, &mut slot);
        assert_eq!(out, [0.3, 0.0]);
        assert!(slot.is_none());
    }
}
