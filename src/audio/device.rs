//! Speaker output via `cpal`.
//!
//! `cpal::Stream` is not `Send` on every platform, so [`CpalOutput::open`]
//! builds the stream on a dedicated `audio-output` thread that owns it for
//! its whole life.  The returned [`CpalSink`] talks to that thread over a
//! command channel and shares the active voice with the render callback
//! through an `Arc<Mutex<Option<ActiveVoice>>>`.
//!
//! The stream is built paused, so a fresh sink reports itself suspended
//! until the first [`AudioSink::resume`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, PoisonError};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use super::output::{render, ActiveVoice, AudioOutput, AudioSink, PlaybackHandle, SinkError};

type SharedVoice = Arc<Mutex<Option<ActiveVoice>>>;

enum DeviceCommand {
    Resume(mpsc::Sender<Result<(), SinkError>>),
    Close,
}

// ---------------------------------------------------------------------------
// CpalOutput
// ---------------------------------------------------------------------------

/// [`AudioOutput`] backed by the default cpal output device.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalOutput;

impl CpalOutput {
    pub fn new() -> Self {
        Self
    }
}

impl AudioOutput for CpalOutput {
    fn open(&self, sample_rate: u32) -> Result<Arc<dyn AudioSink>, SinkError> {
        let voice: SharedVoice = Arc::new(Mutex::new(None));
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(u32, u16), SinkError>>();
        let (command_tx, command_rx) = mpsc::channel::<DeviceCommand>();

        let voice_cb = Arc::clone(&voice);
        std::thread::Builder::new()
            .name("audio-output".into())
            .spawn(move || {
                let (stream, device_rate, channels) = match build_stream(sample_rate, voice_cb) {
                    Ok(built) => built,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok((device_rate, channels)));

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DeviceCommand::Resume(reply) => {
                            let _ = reply.send(stream.play().map_err(SinkError::from));
                        }
                        DeviceCommand::Close => break,
                    }
                }
                drop(stream);
                log::debug!("audio-output thread exiting");
            })
            .map_err(|e| SinkError::Thread(e.to_string()))?;

        let (device_rate, channels) = ready_rx
            .recv()
            .map_err(|_| SinkError::Thread("output thread exited during setup".into()))??;

        log::info!("Audio output opened ({device_rate} Hz, {channels} ch)");

        Ok(Arc::new(CpalSink {
            commands: Mutex::new(command_tx),
            voice,
            device_rate,
            suspended: AtomicBool::new(true),
            closed: AtomicBool::new(false),
        }))
    }
}

/// Build the output stream, preferring an f32 config at `preferred_rate`.
fn build_stream(
    preferred_rate: u32,
    voice: SharedVoice,
) -> Result<(cpal::Stream, u32, u16), SinkError> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or(SinkError::NoDevice)?;
    let config = pick_config(&device, preferred_rate)?;

    let channels = config.channels;
    let device_rate = config.sample_rate.0;

    let stream = device.build_output_stream(
        &config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            let mut slot = voice.lock().unwrap_or_else(PoisonError::into_inner);
            render(data, channels as usize, &mut slot);
        },
        |err: cpal::StreamError| {
            log::error!("cpal output stream error: {err}");
        },
        None, // no timeout
    )?;

    // Some hosts start streams immediately; hold it until the first resume.
    if let Err(e) = stream.pause() {
        log::debug!("output stream could not be paused after build: {e}");
    }

    Ok((stream, device_rate, channels))
}

fn pick_config(device: &cpal::Device, preferred_rate: u32) -> Result<cpal::StreamConfig, SinkError> {
    let wanted = cpal::SampleRate(preferred_rate);

    if let Ok(mut ranges) = device.supported_output_configs() {
        let matching = ranges.find(|range| {
            range.sample_format() == cpal::SampleFormat::F32
                && range.min_sample_rate() <= wanted
                && wanted <= range.max_sample_rate()
        });
        if let Some(range) = matching {
            return Ok(range.with_sample_rate(wanted).into());
        }
    }

    log::debug!("no f32 output config at {preferred_rate} Hz; using device default");
    Ok(device.default_output_config()?.into())
}

// ---------------------------------------------------------------------------
// CpalSink
// ---------------------------------------------------------------------------

/// Handle to the open cpal output stream.
pub struct CpalSink {
    commands: Mutex<mpsc::Sender<DeviceCommand>>,
    voice: SharedVoice,
    device_rate: u32,
    suspended: AtomicBool,
    closed: AtomicBool,
}

impl CpalSink {
    fn send(&self, command: DeviceCommand) -> Result<(), SinkError> {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send(command)
            .map_err(|_| SinkError::Closed)
    }
}

impl AudioSink for CpalSink {
    fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire)
    }

    fn resume(&self) -> Result<(), SinkError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SinkError::Closed);
        }
        let (reply_tx, reply_rx) = mpsc::channel();
        self.send(DeviceCommand::Resume(reply_tx))?;
        reply_rx.recv().map_err(|_| SinkError::Closed)??;
        self.suspended.store(false, Ordering::Release);
        Ok(())
    }

    fn device_rate(&self) -> u32 {
        self.device_rate
    }

    fn play(&self, samples: Vec<f32>) -> Result<PlaybackHandle, SinkError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SinkError::Closed);
        }
        let (handle, signal) = PlaybackHandle::pair();

        // Replacing the slot drops the previous voice's signal.
        *self.voice.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(ActiveVoice::new(samples, signal));
        Ok(handle)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.voice
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let _ = self.send(DeviceCommand::Close);
        log::info!("Audio output closed");
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.close();
    }
}
