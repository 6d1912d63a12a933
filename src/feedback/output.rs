use anyhow::{anyhow, Context, Result};
use rodio::{OutputStream, OutputStreamHandle, Sink};
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, Sender};
use std::thread;

use super::tones::{ContinuousTone, ToneBurst, ToneControl, ToneSpec};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Lifecycle of the underlying audio context, mirroring what the platform reports.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AudioContextState {
    Suspended,
    Running,
    Closed,
}

impl Default for AudioContextState {
    fn default() -> Self {
        AudioContextState::Closed
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContinuousSetting {
    pub frequency_hz: f32,
    pub gain: f32,
}

/// Tone output device. Playback calls are fire-and-forget.
pub trait AudioOutput: Send {
    fn context_state(&self) -> AudioContextState;

    /// Open a fresh context. A new context starts out `Suspended`. May block
    /// on the device; callers on an async runtime use the blocking pool.
    fn create_context(&mut self) -> Result<()>;

    fn resume(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    /// Play the tones back to back as one request. Each call builds its own
    /// sources; nothing is left running afterwards.
    fn play_tones(&mut self, tones: &[ToneSpec], gain: f32) -> Result<()>;

    /// `None` silences the continuous tone.
    fn set_continuous_tone(&mut self, setting: Option<ContinuousSetting>) -> Result<()>;

    /// Platforms that only start audio from inside a user gesture.
    fn requires_explicit_unlock(&self) -> bool {
        false
    }
}

enum OutputCommand {
    Create(Sender<Result<(), String>>),
    Resume,
    Close,
    Play { tones: Vec<ToneSpec>, gain: f32 },
    Continuous(bool),
}

/// rodio-backed audio context. rodio streams are not `Send`, so the stream
/// lives on a dedicated thread and this handle talks to it over a channel.
pub struct RodioOutput {
    tx: Option<Sender<OutputCommand>>,
    state: AudioContextState,
    control: ToneControl,
}

impl RodioOutput {
    pub fn new() -> Self {
        Self {
            tx: None,
            state: AudioContextState::Closed,
            control: ToneControl::new(),
        }
    }

    fn ensure_thread(&mut self) -> Result<Sender<OutputCommand>> {
        if let Some(tx) = self.tx.as_ref() {
            return Ok(tx.clone());
        }

        let (tx, rx) = mpsc::channel::<OutputCommand>();
        let control = self.control.clone();

        // Spawn dedicated audio thread holding non-Send audio objects
        thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                let mut context: Option<RodioContext> = None;

                while let Ok(cmd) = rx.recv() {
                    match cmd {
                        OutputCommand::Create(reply) => {
                            context = None;
                            let result = RodioContext::open(control.clone());
                            let outcome = match result {
                                Ok(ctx) => {
                                    context = Some(ctx);
                                    Ok(())
                                }
                                Err(e) => Err(e),
                            };
                            let _ = reply.send(outcome);
                        }
                        OutputCommand::Resume => {
                            if let Some(ctx) = context.as_mut() {
                                ctx.running = true;
                                if ctx.continuous_on {
                                    ctx.continuous.play();
                                }
                            }
                        }
                        OutputCommand::Close => {
                            if let Some(ctx) = context.take() {
                                ctx.continuous.stop();
                            }
                        }
                        OutputCommand::Play { tones, gain } => {
                            if let Some(ctx) = context.as_ref() {
                                ctx.play(&tones, gain);
                            }
                        }
                        OutputCommand::Continuous(on) => {
                            if let Some(ctx) = context.as_mut() {
                                ctx.continuous_on = on;
                                if on && ctx.running {
                                    ctx.continuous.play();
                                } else {
                                    ctx.continuous.pause();
                                }
                            }
                        }
                    }
                }
            })
            .context("failed to spawn audio output thread")?;

        self.tx = Some(tx.clone());
        Ok(tx)
    }

    fn send(&mut self, cmd: OutputCommand) -> Result<()> {
        let tx = self.ensure_thread()?;
        if tx.send(cmd).is_err() {
            // The thread is gone; the next create_context starts a new one.
            self.tx = None;
            self.state = AudioContextState::Closed;
            return Err(anyhow!("audio output thread has exited"));
        }
        Ok(())
    }
}

impl Default for RodioOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutput for RodioOutput {
    fn context_state(&self) -> AudioContextState {
        self.state
    }

    fn create_context(&mut self) -> Result<()> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.send(OutputCommand::Create(reply_tx))?;
        reply_rx
            .recv()
            .context("audio output thread dropped the create request")?
            .map_err(|e| anyhow!(e))?;
        self.state = AudioContextState::Suspended;
        log_info!("Audio output context created");
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        if self.state == AudioContextState::Closed {
            return Err(anyhow!("cannot resume a closed audio context"));
        }
        self.send(OutputCommand::Resume)?;
        self.state = AudioContextState::Running;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.state == AudioContextState::Closed {
            return Ok(());
        }
        self.state = AudioContextState::Closed;
        self.send(OutputCommand::Close)
    }

    fn play_tones(&mut self, tones: &[ToneSpec], gain: f32) -> Result<()> {
        if self.state != AudioContextState::Running {
            log_warn!("Dropping tone request, audio context is {:?}", self.state);
            return Ok(());
        }
        self.send(OutputCommand::Play {
            tones: tones.to_vec(),
            gain,
        })
    }

    fn set_continuous_tone(&mut self, setting: Option<ContinuousSetting>) -> Result<()> {
        match setting {
            Some(s) => {
                self.control.set(s.frequency_hz, s.gain);
                self.send(OutputCommand::Continuous(true))
            }
            None => {
                self.control.set(self.control.frequency_hz(), 0.0);
                self.send(OutputCommand::Continuous(false))
            }
        }
    }
}

struct RodioContext {
    _stream: OutputStream,
    handle: OutputStreamHandle,
    continuous: Sink,
    continuous_on: bool,
    running: bool,
}

impl RodioContext {
    fn open(control: ToneControl) -> Result<Self, String> {
        let (stream, handle) = OutputStream::try_default()
            .map_err(|e| format!("Failed to create audio output stream: {}", e))?;
        let continuous = Sink::try_new(&handle)
            .map_err(|e| format!("Failed to create audio sink: {}", e))?;
        continuous.pause();
        continuous.append(ContinuousTone::new(control));

        Ok(Self {
            _stream: stream,
            handle,
            continuous,
            continuous_on: false,
            running: false,
        })
    }

    fn play(&self, tones: &[ToneSpec], gain: f32) {
        if !self.running {
            return;
        }
        // A fresh sink per request; detach lets it finish and clean itself up.
        match Sink::try_new(&self.handle) {
            Ok(sink) => {
                sink.set_volume(gain.clamp(0.0, 1.0));
                for tone in tones {
                    sink.append(ToneBurst::new(*tone));
                }
                sink.detach();
            }
            Err(e) => log_warn!("Failed to create tone sink: {}", e),
        }
    }
}
