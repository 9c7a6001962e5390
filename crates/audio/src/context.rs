use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Sender, TrySendError};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use fretwise_domain::EngineError;

use crate::backend::{OutputBackend, StreamConfig};
use crate::clock::AudioClock;
use crate::render::{AnalyserTap, Ramp, RenderCommand, Renderer};

/// Initial master gain; headroom for the compressor stage.
pub const DEFAULT_MASTER_VOLUME: f32 = 0.8;

/// Smoothing time constant for volume changes, in seconds.
pub(crate) const VOLUME_SMOOTHING: f32 = 0.01;

/// Command queue depth between control threads and the renderer.
const COMMAND_QUEUE_DEPTH: usize = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextState {
    Uninitialized,
    Initializing,
    Ready,
    Suspended,
    Disposed,
}

impl ContextState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ContextState::Initializing,
            2 => ContextState::Ready,
            3 => ContextState::Suspended,
            4 => ContextState::Disposed,
            _ => ContextState::Uninitialized,
        }
    }
}

/// Shared, lock-free view of the context state. The handle reads it to
/// answer `is_ready` without touching the context itself.
#[derive(Debug)]
struct StateCell(AtomicU8);

impl StateCell {
    fn new(state: ContextState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    fn get(&self) -> ContextState {
        ContextState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: ContextState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// Control-side record of the master volume. The context's setter and the
/// mixer's master fade/mute both read and write it, so a mute always
/// restores whatever was configured last.
#[derive(Debug)]
pub(crate) struct MasterVolumeCell(AtomicU32);

impl MasterVolumeCell {
    fn new(volume: f32) -> Self {
        Self(AtomicU32::new(volume.to_bits()))
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, volume: f32) {
        self.0.store(volume.to_bits(), Ordering::Release);
    }
}

/// Cheap clone handed to the mixer, bus, and scheduler. Carries everything
/// they need to talk to the renderer without borrowing the context.
#[derive(Clone)]
pub struct EngineHandle {
    sender: Sender<RenderCommand>,
    clock: Arc<AudioClock>,
    state: Arc<StateCell>,
    master: Arc<MasterVolumeCell>,
    sample_rate: u32,
}

impl EngineHandle {
    pub fn is_ready(&self) -> bool {
        self.state.get() == ContextState::Ready
    }

    /// Configured master volume (what a mute or fade restores to).
    pub fn master_volume(&self) -> f32 {
        self.master.get()
    }

    /// Current audio-clock time in seconds.
    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Enqueues a command for the renderer. Returns false when the queue
    /// is full or the renderer is gone; callers decide how to degrade.
    pub(crate) fn send(&self, command: RenderCommand) -> bool {
        match self.sender.try_send(command) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                error!("render command queue is full, dropping command");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                error!("render thread is gone, dropping command");
                false
            }
        }
    }
}

/// Point-in-time snapshot of the engine, suitable for diagnostics.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct EngineState {
    pub state: ContextState,
    pub sample_rate: u32,
    pub current_time: f64,
    pub master_volume: f32,
    pub is_unlocked: bool,
}

/// Owns the output backend and the engine lifecycle. Everything audible
/// flows through the master chain this type configures: channel mix →
/// master gain → compressor → analyser → device.
pub struct AudioContextManager {
    backend: Box<dyn OutputBackend>,
    handle: Option<EngineHandle>,
    state: Arc<StateCell>,
    analyser: AnalyserTap,
    master: Arc<MasterVolumeCell>,
    unlocked: bool,
}

impl AudioContextManager {
    pub fn new(backend: Box<dyn OutputBackend>) -> Self {
        Self {
            backend,
            handle: None,
            state: Arc::new(StateCell::new(ContextState::Uninitialized)),
            analyser: AnalyserTap::new(),
            master: Arc::new(MasterVolumeCell::new(DEFAULT_MASTER_VOLUME)),
            unlocked: false,
        }
    }

    /// Opens the output stream and brings the engine to `Ready`. On a
    /// live context this only ensures resumption; nothing is rebuilt.
    pub fn initialize(&mut self) -> Result<(), EngineError> {
        match self.state.get() {
            ContextState::Ready => return Ok(()),
            ContextState::Suspended => return self.ensure_resumed(),
            ContextState::Disposed => {
                return Err(EngineError::context("context has been disposed"))
            }
            ContextState::Uninitialized | ContextState::Initializing => {}
        }

        self.state.set(ContextState::Initializing);
        let config: StreamConfig = self.backend.config();
        let (sender, receiver) = bounded(COMMAND_QUEUE_DEPTH);
        let clock = AudioClock::new(config.sample_rate);
        let renderer = Renderer::new(
            receiver,
            clock.clone(),
            self.analyser.clone(),
            self.master.get(),
        );
        if let Err(e) = self.backend.start(renderer) {
            self.state.set(ContextState::Uninitialized);
            return Err(e);
        }

        self.handle = Some(EngineHandle {
            sender,
            clock,
            state: self.state.clone(),
            master: self.master.clone(),
            sample_rate: config.sample_rate,
        });
        self.state.set(ContextState::Ready);
        info!(sample_rate = config.sample_rate, "audio context initialized");
        Ok(())
    }

    /// First-interaction hook: initializes if needed, resumes if
    /// suspended, and marks the engine unlocked. Safe to call repeatedly.
    pub fn unlock_audio(&mut self) -> Result<(), EngineError> {
        if self.unlocked && self.state.get() == ContextState::Ready {
            return Ok(());
        }
        self.initialize()?;
        self.ensure_resumed()?;
        if !self.unlocked {
            self.unlocked = true;
            debug!("audio unlocked");
        }
        Ok(())
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    pub fn state(&self) -> ContextState {
        self.state.get()
    }

    /// Handle for mixers, buses, and schedulers. Fails before
    /// [`initialize`](Self::initialize) has run.
    pub fn handle(&self) -> Result<EngineHandle, EngineError> {
        self.handle
            .clone()
            .ok_or_else(|| EngineError::context("audio context is not initialized"))
    }

    pub fn analyser(&self) -> AnalyserTap {
        self.analyser.clone()
    }

    pub fn master_volume(&self) -> f32 {
        self.master.get()
    }

    /// Sets the master gain, clamped to [0, 1] and smoothed.
    pub fn set_master_volume(&mut self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        self.master.set(volume);
        if let Some(handle) = &self.handle {
            handle.send(RenderCommand::SetMasterGain {
                target: volume,
                ramp: Ramp::Smooth {
                    time_constant: VOLUME_SMOOTHING,
                },
            });
        }
    }

    pub fn suspend(&mut self) -> Result<(), EngineError> {
        if self.state.get() != ContextState::Ready {
            return Ok(());
        }
        self.backend.pause()?;
        self.state.set(ContextState::Suspended);
        debug!("audio context suspended");
        Ok(())
    }

    /// Resumes a suspended context; a ready context is left alone.
    pub fn ensure_resumed(&mut self) -> Result<(), EngineError> {
        match self.state.get() {
            ContextState::Suspended => {
                self.backend.resume()?;
                self.state.set(ContextState::Ready);
                debug!("audio context resumed");
                Ok(())
            }
            ContextState::Ready => Ok(()),
            ContextState::Uninitialized | ContextState::Initializing | ContextState::Disposed => {
                Err(EngineError::context("audio context is not running"))
            }
        }
    }

    /// Tears the engine down. The context cannot be re-initialized after
    /// this; create a new one instead.
    pub fn dispose(&mut self) {
        if self.state.get() == ContextState::Disposed {
            return;
        }
        if let Err(e) = self.backend.pause() {
            warn!(error = %e, "backend pause failed during dispose");
        }
        self.handle = None;
        self.unlocked = false;
        self.state.set(ContextState::Disposed);
        info!("audio context disposed");
    }

    pub fn snapshot(&self) -> EngineState {
        EngineState {
            state: self.state.get(),
            sample_rate: self
                .handle
                .as_ref()
                .map(|h| h.sample_rate)
                .unwrap_or_else(|| self.backend.config().sample_rate),
            current_time: self.handle.as_ref().map(|h| h.now()).unwrap_or(0.0),
            master_volume: self.master.get(),
            is_unlocked: self.unlocked,
        }
    }

    /// Drives an offline backend by `frames`; no-op on device backends.
    pub fn process_frames(&mut self, frames: usize) {
        self.backend.process(frames);
    }
}
