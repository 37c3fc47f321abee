use std::io;
use std::thread::{self, ScopedJoinHandle};
use std::time::{Duration, Instant};

use super::engine::PlaybackState;
use super::gate::{GateOutcome, StartGate};
use crate::error::FaceSyncError;
use crate::livelink::EncodedFrameSequence;
use crate::{AudioPlayer, FrameTransport};

pub(crate) const AUDIO_THREAD_NAME: &str = "facesync-audio";
pub(crate) const FRAME_THREAD_NAME: &str = "facesync-frames";

/// Outcome of one session. Each emission unit reports independently.
#[derive(Debug)]
pub struct SessionReport {
    pub audio: Result<(), FaceSyncError>,
    /// Number of frames sent.
    pub frames: Result<usize, FaceSyncError>,
    pub elapsed: Duration,
}

impl SessionReport {
    pub fn is_clean(&self) -> bool {
        self.audio.is_ok() && self.frames.is_ok()
    }
}

/// One audio clip and its encoded frames, released together by a start gate.
pub struct PlaybackSession<'a> {
    audio: &'a [u8],
    frames: &'a EncodedFrameSequence,
    gate: StartGate,
}

impl<'a> PlaybackSession<'a> {
    pub fn new(audio: &'a [u8], frames: &'a EncodedFrameSequence) -> Self {
        Self {
            audio,
            frames,
            gate: StartGate::new(2),
        }
    }

    /// Run both emission units to completion.
    ///
    /// A failure or panic in one unit is reported, never propagated: the other
    /// unit is always joined.
    pub fn run(
        self,
        player: &dyn AudioPlayer,
        transport: &dyn FrameTransport,
        fps: u32,
        on_state: impl Fn(PlaybackState),
    ) -> SessionReport {
        let started = Instant::now();
        let Self { audio, frames, gate } = self;
        let gate = &gate;

        let (audio, frames) = thread::scope(|scope| {
            let audio_unit = thread::Builder::new()
                .name(AUDIO_THREAD_NAME.to_string())
                .spawn_scoped(scope, move || match gate.arrive_and_wait() {
                    GateOutcome::Open => player.play(audio),
                    GateOutcome::Aborted => Err(aborted()),
                });
            let frame_unit = thread::Builder::new()
                .name(FRAME_THREAD_NAME.to_string())
                .spawn_scoped(scope, move || match gate.arrive_and_wait() {
                    GateOutcome::Open => emit_frames(frames, transport, fps),
                    GateOutcome::Aborted => Err(aborted()),
                });

            if audio_unit.is_ok() && frame_unit.is_ok() {
                on_state(PlaybackState::Armed);
                if gate.open_when_armed() == GateOutcome::Open {
                    on_state(PlaybackState::Streaming);
                }
            } else {
                gate.abort();
            }

            (join_unit("audio", audio_unit), join_unit("frame", frame_unit))
        });

        SessionReport {
            audio,
            frames,
            elapsed: started.elapsed(),
        }
    }
}

fn aborted() -> FaceSyncError {
    FaceSyncError::Emission("session aborted before start".to_string())
}

fn join_unit<T>(
    unit: &str,
    spawned: io::Result<ScopedJoinHandle<'_, Result<T, FaceSyncError>>>,
) -> Result<T, FaceSyncError> {
    let result = match spawned {
        Err(e) => Err(FaceSyncError::Emission(format!(
            "failed to spawn {unit} unit: {e}"
        ))),
        Ok(handle) => handle
            .join()
            .unwrap_or_else(|_| Err(FaceSyncError::Emission(format!("{unit} unit panicked")))),
    };
    if let Err(e) = &result {
        log::error!("{unit} emission failed: {e}");
    }
    result
}

/// Send every packet at a fixed rate, paced from the first send.
pub fn emit_frames(
    frames: &EncodedFrameSequence,
    transport: &dyn FrameTransport,
    fps: u32,
) -> Result<usize, FaceSyncError> {
    let period = Duration::from_secs_f64(1.0 / fps.max(1) as f64);
    let start = Instant::now();

    for (i, packet) in frames.packets().iter().enumerate() {
        transport.send(packet)?;
        let target = start + period.mul_f64((i + 1) as f64);
        let now = Instant::now();
        if target > now {
            thread::sleep(target - now);
        }
    }

    Ok(frames.len())
}

#[cfg(test)]
mod tests {
    use super::{emit_frames, PlaybackSession, FRAME_THREAD_NAME};
    use crate::livelink::{encode_sequence, EncodedFrameSequence, EncodingProfile};
    use crate::playback::testing::{RecordingPlayer, RecordingTransport};
    use crate::playback::PlaybackState;
    use crate::FacialSequence;
    use parking_lot::Mutex;
    use std::time::{Duration, Instant};

    fn encoded(frames: usize) -> EncodedFrameSequence {
        let sequence = FacialSequence::new(vec![vec![0.4; 68]; frames]);
        encode_sequence(&sequence, &mut EncodingProfile::new("dev", "face", 60).new_context())
    }

    #[test]
    fn emits_at_target_rate() {
        let transport = RecordingTransport::default();
        let start = Instant::now();
        let sent = emit_frames(&encoded(12), &transport, 60).unwrap();
        assert_eq!(sent, 12);
        // 12 frames at 60 fps take 200 ms
        assert!(start.elapsed() >= Duration::from_millis(190));
        assert_eq!(transport.sent().len(), 12);
    }

    #[test]
    fn session_reports_both_units_and_states() {
        let transport = RecordingTransport::default();
        let player = RecordingPlayer::holding(Duration::from_millis(30));
        let frames = encoded(6);
        let states = Mutex::new(Vec::new());

        let report = PlaybackSession::new(b"audio", &frames).run(&player, &transport, 60, |s| {
            states.lock().push(s)
        });

        assert!(report.is_clean());
        assert_eq!(report.frames.unwrap(), 6);
        assert_eq!(
            *states.lock(),
            vec![PlaybackState::Armed, PlaybackState::Streaming]
        );
        assert_eq!(player.calls().len(), 1);
        assert!(transport
            .sent()
            .iter()
            .all(|s| s.thread_name.as_deref() == Some(FRAME_THREAD_NAME)));
    }

    #[test]
    fn failed_frame_unit_still_joins_audio() {
        let transport = RecordingTransport::failing_for(FRAME_THREAD_NAME);
        let player = RecordingPlayer::holding(Duration::from_millis(40));
        let frames = encoded(6);

        let report = PlaybackSession::new(b"audio", &frames).run(&player, &transport, 60, |_| {});
        assert!(report.audio.is_ok());
        assert!(report.frames.is_err());
        assert_eq!(player.calls().len(), 1);
    }
}
