use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use super::idle::{IdleAnimation, IdleLoop};
use super::session::{PlaybackSession, SessionReport};
use crate::animation::{GestureLibrary, Preparer};
use crate::config::EngineConfig;
use crate::error::FaceSyncError;
use crate::livelink::{EncodedFrameSequence, EncodingContext, EncodingProfile};
use crate::{AudioPlayer, FaceInference, FacialSequence, FrameTransport};

/// Attempts at spawning the idle thread before a resume gives up.
const IDLE_SPAWN_ATTEMPTS: u32 = 3;
const IDLE_SPAWN_BACKOFF: Duration = Duration::from_millis(10);

/// Where the engine is in the idle/session handoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Idle loop running, no session.
    Idle,
    /// Idle loop told to stop, waiting for it to exit.
    Suspending,
    /// Session units spawned and parked on the start gate.
    Armed,
    /// Audio and frames streaming.
    Streaming,
    /// Session finished, idle loop restarting.
    Resuming,
    Stopped,
}

/// The idle loop currently holding the transport, or the live context waiting
/// for the next one.
struct IdleSlot {
    running: Option<IdleLoop>,
    context: Option<EncodingContext>,
}

/// Counts a session against `max_pending_sessions` until dropped.
struct SessionTicket {
    pending: Arc<AtomicUsize>,
}

impl Drop for SessionTicket {
    fn drop(&mut self) {
        self.pending.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Owns the transport and the idle loop, and hands the transport to one
/// producer at a time.
///
/// The idle loop runs whenever no session is streaming. [`PlaybackEngine::play`]
/// stops it, streams audio and frames from a common start, and restarts it.
/// Concurrent `play` calls are served one after another.
pub struct PlaybackEngine {
    config: EngineConfig,
    preparer: Preparer,
    idle_profile: EncodingProfile,
    transport: Arc<dyn FrameTransport>,
    audio: Arc<dyn AudioPlayer>,
    idle_animation: Arc<IdleAnimation>,
    /// Guards every idle loop start and stop.
    idle: Mutex<IdleSlot>,
    stop_signal: Arc<AtomicBool>,
    /// Held for a whole session, from suspending the idle loop to resuming it.
    session: Mutex<()>,
    pending: Arc<AtomicUsize>,
    state: Mutex<PlaybackState>,
    completed: AtomicUsize,
    stopped: AtomicBool,
}

impl PlaybackEngine {
    /// Validate the config and spawn the first idle loop.
    pub fn start(
        config: EngineConfig,
        transport: Arc<dyn FrameTransport>,
        audio: Arc<dyn AudioPlayer>,
        library: Arc<GestureLibrary>,
        idle_animation: IdleAnimation,
    ) -> Result<Self, FaceSyncError> {
        let profile = EncodingProfile::from_config(&config);
        Self::start_with_profile(config, profile, transport, audio, library, idle_animation)
    }

    /// Like [`PlaybackEngine::start`] with custom channel calibration.
    ///
    /// The profile's frame rate is replaced by `config.fps` for sessions and
    /// `config.idle_fps` for the idle loop, the rates frames are paced at.
    pub fn start_with_profile(
        config: EngineConfig,
        mut profile: EncodingProfile,
        transport: Arc<dyn FrameTransport>,
        audio: Arc<dyn AudioPlayer>,
        library: Arc<GestureLibrary>,
        idle_animation: IdleAnimation,
    ) -> Result<Self, FaceSyncError> {
        config.validate()?;

        profile.fps = config.fps;
        let mut idle_profile = profile.clone();
        idle_profile.fps = config.idle_fps;

        let engine = Self {
            preparer: Preparer::new(library, profile, &config),
            idle: Mutex::new(IdleSlot {
                running: None,
                context: Some(idle_profile.new_context()),
            }),
            idle_profile,
            transport,
            audio,
            idle_animation: Arc::new(idle_animation),
            stop_signal: Arc::new(AtomicBool::new(false)),
            session: Mutex::new(()),
            pending: Arc::new(AtomicUsize::new(0)),
            state: Mutex::new(PlaybackState::Resuming),
            completed: AtomicUsize::new(0),
            stopped: AtomicBool::new(false),
            config,
        };
        engine.resume_idle()?;

        log::info!(
            "Playback engine started: {} gesture clips, session {} fps, idle {} fps",
            engine.preparer.library().len(),
            engine.config.fps,
            engine.config.idle_fps
        );
        Ok(engine)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> PlaybackState {
        *self.state.lock()
    }

    pub fn is_idle_running(&self) -> bool {
        self.idle
            .lock()
            .running
            .as_ref()
            .is_some_and(IdleLoop::is_running)
    }

    /// Sessions that have returned to idle.
    pub fn sessions_completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    /// Validate, blend and encode generated facial data. Touches no playback state.
    pub fn prepare(&self, raw: &FacialSequence) -> Result<EncodedFrameSequence, FaceSyncError> {
        self.preparer.prepare(raw)
    }

    /// Play one session and block until the idle loop is back.
    ///
    /// Emission failures are reported in the returned [`SessionReport`]. An
    /// error means the idle loop could not be restarted; the engine stays in
    /// [`PlaybackState::Resuming`] and the next `play` retries the restart.
    pub fn play(
        &self,
        frames: &EncodedFrameSequence,
        audio: &[u8],
    ) -> Result<SessionReport, FaceSyncError> {
        let ticket = self.admit()?;
        self.play_admitted(ticket, frames, audio)
    }

    /// Run [`PlaybackEngine::play`] on a background thread.
    ///
    /// Admission is checked before returning, so a full queue is reported here
    /// rather than from the handle.
    pub fn spawn_play(
        engine: &Arc<Self>,
        frames: EncodedFrameSequence,
        audio: Vec<u8>,
    ) -> Result<PlaybackHandle, FaceSyncError> {
        let ticket = engine.admit()?;
        let engine = Arc::clone(engine);
        let handle = thread::Builder::new()
            .name("facesync-session".to_string())
            .spawn(move || engine.play_admitted(ticket, &frames, &audio))?;
        Ok(PlaybackHandle { handle })
    }

    /// Infer facial data for `audio`, prepare it, and play it.
    pub fn speak<I: FaceInference + ?Sized>(
        &self,
        inference: &I,
        audio: &[u8],
    ) -> Result<SessionReport, FaceSyncError> {
        let generated = inference
            .infer(audio)?
            .filter(|sequence| !sequence.is_empty())
            .ok_or_else(|| {
                log::warn!("Inference produced no facial data for {} audio bytes", audio.len());
                FaceSyncError::InferenceFailure("model returned no frames".to_string())
            })?;
        let encoded = self.prepare(&generated)?;
        self.play(&encoded, audio)
    }

    /// Stop the idle loop and close the transport. Waits for a streaming
    /// session to finish first. Later calls to `play` fail.
    pub fn stop(&self) {
        let _session = self.session.lock();
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }

        let mut slot = self.idle.lock();
        self.stop_signal.store(true, Ordering::Release);
        if let Some(idle) = slot.running.take() {
            slot.context = idle.join();
        }
        drop(slot);

        self.set_state(PlaybackState::Stopped);
        self.transport.close();
        log::info!(
            "Playback engine stopped after {} session(s)",
            self.sessions_completed()
        );
    }

    fn admit(&self) -> Result<SessionTicket, FaceSyncError> {
        let limit = self.config.max_pending_sessions;
        self.pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < limit).then_some(n + 1)
            })
            .map_err(|pending| {
                log::warn!("Rejecting session: {pending} already in flight");
                FaceSyncError::Busy { pending }
            })?;
        Ok(SessionTicket {
            pending: Arc::clone(&self.pending),
        })
    }

    fn play_admitted(
        &self,
        _ticket: SessionTicket,
        frames: &EncodedFrameSequence,
        audio: &[u8],
    ) -> Result<SessionReport, FaceSyncError> {
        let _session = self.session.lock();
        if self.stopped.load(Ordering::Acquire) {
            return Err(FaceSyncError::EngineStopped);
        }

        self.suspend_idle();

        log::info!(
            "Playing {} frames ({:.2?}) with {} audio bytes",
            frames.len(),
            frames.duration(),
            audio.len()
        );
        let report = PlaybackSession::new(audio, frames).run(
            self.audio.as_ref(),
            self.transport.as_ref(),
            self.config.fps,
            |state| self.set_state(state),
        );
        if report.is_clean() {
            log::info!("Session finished in {:.2?}", report.elapsed);
        } else {
            log::warn!("Session finished with errors in {:.2?}", report.elapsed);
        }

        if let Err(e) = self.resume_idle() {
            log::error!("Failed to restart idle loop after session: {e}");
            return Err(e);
        }
        self.completed.fetch_add(1, Ordering::AcqRel);
        Ok(report)
    }

    fn suspend_idle(&self) {
        let mut slot = self.idle.lock();
        self.set_state(PlaybackState::Suspending);
        self.stop_signal.store(true, Ordering::Release);
        if let Some(idle) = slot.running.take() {
            slot.context = idle.join();
        }
    }

    fn resume_idle(&self) -> Result<(), FaceSyncError> {
        let mut slot = self.idle.lock();
        self.set_state(PlaybackState::Resuming);
        self.stop_signal.store(false, Ordering::Release);

        let idle = retry(IDLE_SPAWN_ATTEMPTS, IDLE_SPAWN_BACKOFF, || {
            // a failed spawn drops the context, later attempts start afresh
            let context = slot
                .context
                .take()
                .unwrap_or_else(|| self.idle_profile.new_context());
            IdleLoop::spawn(
                Arc::clone(&self.idle_animation),
                context,
                Arc::clone(&self.transport),
                Arc::clone(&self.stop_signal),
                self.config.idle_fps,
            )
        })?;
        slot.running.replace(idle);
        self.set_state(PlaybackState::Idle);
        Ok(())
    }

    fn set_state(&self, next: PlaybackState) {
        let mut state = self.state.lock();
        if *state != next {
            log::debug!("Playback state {:?} -> {:?}", *state, next);
            *state = next;
        }
    }
}

/// Run `op` up to `attempts` times, sleeping `backoff` between failures.
fn retry<T>(
    attempts: u32,
    backoff: Duration,
    mut op: impl FnMut() -> Result<T, FaceSyncError>,
) -> Result<T, FaceSyncError> {
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts => {
                log::warn!("Attempt {attempt}/{attempts} failed: {e}");
                attempt += 1;
                thread::sleep(backoff);
            }
            Err(e) => return Err(e),
        }
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A session running on its own thread.
pub struct PlaybackHandle {
    handle: JoinHandle<Result<SessionReport, FaceSyncError>>,
}

impl PlaybackHandle {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the session and the idle loop restart.
    pub fn join(self) -> Result<SessionReport, FaceSyncError> {
        self.handle
            .join()
            .unwrap_or_else(|_| Err(FaceSyncError::Emission("session thread panicked".to_string())))
    }
}
