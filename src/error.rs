#[derive(thiserror::Error, Debug)]
pub enum FaceSyncError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("WAV decode error: {0}")]
    Wav(#[from] hound::Error),
    #[error(
        "Insufficient frame data: {frames} frame(s), every frame needs more than {min_channels} channels"
    )]
    InsufficientFrameData { frames: usize, min_channels: usize },
    #[error("Inference returned no facial data: {0}")]
    InferenceFailure(String),
    #[error("Emission failed: {0}")]
    Emission(String),
    #[error("Playback queue is full ({pending} session(s) in flight)")]
    Busy { pending: usize },
    #[error("Failed to parse gesture file: {0}")]
    GestureParse(String),
    #[error("Malformed LiveLink packet: {0}")]
    Packet(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Playback engine has been stopped")]
    EngineStopped,
}

impl FaceSyncError {
    /// True for input that was rejected before any playback started.
    pub fn is_rejected_input(&self) -> bool {
        matches!(
            self,
            Self::InsufficientFrameData { .. } | Self::InferenceFailure(_)
        )
    }
}
