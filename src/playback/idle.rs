use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::BlinkSettings;
use crate::error::FaceSyncError;
use crate::livelink::encoder::{EYE_BLINK_LEFT, EYE_BLINK_RIGHT};
use crate::livelink::{EncodingContext, BLENDSHAPE_COUNT};
use crate::{FacialSequence, FrameTransport};

pub(crate) const IDLE_THREAD_NAME: &str = "facesync-idle";

/// The looping animation shown while no session holds the transport.
#[derive(Debug, Clone)]
pub struct IdleAnimation {
    frames: FacialSequence,
}

impl IdleAnimation {
    pub fn from_sequence(frames: FacialSequence) -> Result<Self, FaceSyncError> {
        if frames.is_empty() {
            return Err(FaceSyncError::Config(
                "idle animation needs at least one frame".to_string(),
            ));
        }
        Ok(Self { frames })
    }

    /// A resting face that blinks once per `blink.interval_frames`.
    pub fn neutral(blink: &BlinkSettings) -> Self {
        let duration = blink.duration_frames.max(1);
        let len = blink.interval_frames.max(duration);
        let blink_start = len - duration;

        let frames = (0..len)
            .map(|i| {
                let mut frame = vec![0.0; BLENDSHAPE_COUNT];
                if i >= blink_start {
                    // triangular envelope peaking mid-blink
                    let t = (i - blink_start) as f32 + 0.5;
                    let closed = 1.0 - (2.0 * t / duration as f32 - 1.0).abs();
                    frame[EYE_BLINK_LEFT] = closed;
                    frame[EYE_BLINK_RIGHT] = closed;
                }
                frame
            })
            .collect();

        Self {
            frames: FacialSequence::new(frames),
        }
    }

    pub fn frames(&self) -> &FacialSequence {
        &self.frames
    }
}

/// A running idle loop thread.
///
/// The thread owns the live encoding context while it runs and hands it back
/// on [`IdleLoop::join`].
pub struct IdleLoop {
    handle: JoinHandle<EncodingContext>,
}

impl IdleLoop {
    /// Spawn the loop. `stop` must be cleared by the caller beforehand.
    pub fn spawn(
        animation: Arc<IdleAnimation>,
        context: EncodingContext,
        transport: Arc<dyn FrameTransport>,
        stop: Arc<AtomicBool>,
        fps: u32,
    ) -> Result<Self, FaceSyncError> {
        let handle = thread::Builder::new()
            .name(IDLE_THREAD_NAME.to_string())
            .spawn(move || run_idle(&animation, context, transport.as_ref(), &stop, fps))?;
        log::debug!("Idle loop started");
        Ok(Self { handle })
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Wait for the loop to exit. The stop signal must already be raised.
    ///
    /// Returns `None` if the loop panicked and its context was lost.
    pub fn join(self) -> Option<EncodingContext> {
        match self.handle.join() {
            Ok(context) => {
                log::debug!("Idle loop stopped at frame {}", context.frame_number());
                Some(context)
            }
            Err(_) => {
                log::error!("Idle loop panicked");
                None
            }
        }
    }
}

fn run_idle(
    animation: &IdleAnimation,
    mut context: EncodingContext,
    transport: &dyn FrameTransport,
    stop: &AtomicBool,
    fps: u32,
) -> EncodingContext {
    let period = Duration::from_secs_f64(1.0 / fps.max(1) as f64);
    let mut next = Instant::now();
    let mut failing = false;

    'outer: while !stop.load(Ordering::Acquire) {
        for frame in animation.frames().frames() {
            if stop.load(Ordering::Acquire) {
                break 'outer;
            }

            let packet = context.encode_frame(frame);
            match transport.send(&packet) {
                Ok(()) if failing => {
                    log::info!("Idle loop transport recovered");
                    failing = false;
                }
                Ok(()) => {}
                Err(e) if !failing => {
                    log::warn!("Idle loop failed to send frame: {e}");
                    failing = true;
                }
                Err(_) => {}
            }

            next += period;
            let now = Instant::now();
            if next > now {
                thread::sleep(next - now);
            } else {
                // fell behind; don't burst to catch up
                next = now;
            }
        }
    }

    context
}

#[cfg(test)]
mod tests {
    use super::{IdleAnimation, IdleLoop, IDLE_THREAD_NAME};
    use crate::config::BlinkSettings;
    use crate::livelink::encoder::{EYE_BLINK_LEFT, EYE_BLINK_RIGHT};
    use crate::livelink::EncodingProfile;
    use crate::playback::testing::RecordingTransport;
    use crate::FacialSequence;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn neutral_animation_blinks_at_interval_end() {
        let blink = BlinkSettings {
            interval_frames: 20,
            duration_frames: 4,
        };
        let animation = IdleAnimation::neutral(&blink);
        let frames = animation.frames().frames();
        assert_eq!(frames.len(), 20);
        assert!(frames[..16].iter().all(|f| f[EYE_BLINK_LEFT] == 0.0));
        assert!(frames[17][EYE_BLINK_LEFT] > 0.5);
        assert_eq!(frames[17][EYE_BLINK_LEFT], frames[17][EYE_BLINK_RIGHT]);
        assert!(frames.iter().flatten().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn rejects_empty_idle_sequence() {
        assert!(IdleAnimation::from_sequence(FacialSequence::default()).is_err());
    }

    #[test]
    fn loop_emits_until_stopped_and_returns_context() {
        let transport = Arc::new(RecordingTransport::default());
        let stop = Arc::new(AtomicBool::new(false));
        let animation = Arc::new(IdleAnimation::neutral(&BlinkSettings::default()));
        let context = EncodingProfile::new("dev", "face", 60).new_context();

        let idle = IdleLoop::spawn(animation, context, transport.clone(), stop.clone(), 60).unwrap();
        thread::sleep(Duration::from_millis(100));
        assert!(idle.is_running());

        let raised = Instant::now();
        stop.store(true, Ordering::Release);
        let context = idle.join().unwrap();
        assert!(raised.elapsed() < Duration::from_millis(100));

        let sent = transport.sent();
        assert!(sent.len() >= 3, "only {} idle frames", sent.len());
        assert!(sent.iter().all(|s| s.thread_name.as_deref() == Some(IDLE_THREAD_NAME)));
        assert_eq!(context.frame_number() as usize, sent.len());
    }

    #[test]
    fn transport_failures_do_not_end_the_loop() {
        let transport = Arc::new(RecordingTransport::failing_for(IDLE_THREAD_NAME));
        let stop = Arc::new(AtomicBool::new(false));
        let animation = Arc::new(IdleAnimation::neutral(&BlinkSettings::default()));
        let context = EncodingProfile::new("dev", "face", 60).new_context();

        let idle = IdleLoop::spawn(animation, context, transport, stop.clone(), 60).unwrap();
        thread::sleep(Duration::from_millis(60));
        assert!(idle.is_running());
        stop.store(true, Ordering::Release);
        assert!(idle.join().is_some());
    }
}
