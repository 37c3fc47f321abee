//! # facesync-rs
//!
//! A Rust library that plays speech-driven facial animation in lock-step with
//! audio over a LiveLink connection.
//!
//! ## Features
//!
//! - **Emotion-aware gestures**: the dominant emotion of a generated sequence picks
//!   a stock gesture clip, which is crossfaded into the first frames
//! - **Synchronized start**: audio and animation frames are released by a shared gate
//! - **Idle handoff**: a default idle animation runs whenever no session holds the transport
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! facesync-rs = "2026.10"
//! ```
//!
//! ```no_run
//! use std::sync::Arc;
//! use facesync_rs::{
//!     animation::GestureLibrary, audio::WavClockPlayer, config::EngineConfig,
//!     livelink::UdpTransport, playback::{IdleAnimation, PlaybackEngine},
//!     FacialSequence,
//! };
//!
//! let config = EngineConfig::default();
//! let transport = Arc::new(UdpTransport::connect(&config.livelink_addr)?);
//! let library = Arc::new(GestureLibrary::load_dir("gestures".as_ref())?);
//! let idle = IdleAnimation::neutral(&config.blink);
//! let engine = PlaybackEngine::start(config, transport, Arc::new(WavClockPlayer), library, idle)?;
//!
//! let generated = FacialSequence::new(vec![vec![0.0; 68]; 120]);
//! let encoded = engine.prepare(&generated)?;
//! let audio = std::fs::read("speech.wav")?;
//! engine.play(&encoded, &audio)?;
//! engine.stop();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod animation;
pub mod audio;
pub mod config;
pub mod error;
pub mod livelink;
pub mod playback;

pub use error::FaceSyncError;

use serde::{Deserialize, Serialize};

/// Channels below this index are blendshape, head and eye controls. A frame
/// must carry strictly more channels than this to be accepted.
pub const MIN_CHANNELS: usize = 61;

/// One frame of facial control values (blendshapes followed by auxiliary channels).
pub type FacialFrame = Vec<f32>;

/// An ordered animation clip, either generated from audio or a stock gesture.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FacialSequence {
    frames: Vec<FacialFrame>,
}

impl FacialSequence {
    pub fn new(frames: Vec<FacialFrame>) -> Self {
        Self { frames }
    }

    pub fn frames(&self) -> &[FacialFrame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Smallest channel count across all frames, `0` for an empty sequence.
    pub fn min_channels(&self) -> usize {
        self.frames.iter().map(Vec::len).min().unwrap_or(0)
    }
}

impl From<Vec<FacialFrame>> for FacialSequence {
    fn from(frames: Vec<FacialFrame>) -> Self {
        Self::new(frames)
    }
}

/// The live connection that carries encoded frames to the rendering host.
///
/// Implementations must be shareable across threads; the playback engine makes
/// sure only one producer writes at a time.
pub trait FrameTransport: Send + Sync {
    /// Send one encoded frame.
    fn send(&self, packet: &[u8]) -> Result<(), FaceSyncError>;

    /// Release the connection. Sends after this point may fail.
    fn close(&self) {}
}

/// Plays an audio payload to completion on the calling thread.
pub trait AudioPlayer: Send + Sync {
    fn play(&self, audio: &[u8]) -> Result<(), FaceSyncError>;
}

/// Turns raw audio into generated facial frames.
///
/// `Ok(None)` means the model produced nothing for this audio.
pub trait FaceInference {
    fn infer(&self, audio: &[u8]) -> Result<Option<FacialSequence>, FaceSyncError>;
}

impl<F> FaceInference for F
where
    F: Fn(&[u8]) -> Result<Option<FacialSequence>, FaceSyncError>,
{
    fn infer(&self, audio: &[u8]) -> Result<Option<FacialSequence>, FaceSyncError> {
        self(audio)
    }
}
