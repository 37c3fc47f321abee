//! Audio payload helpers.
//!
//! Actual audio output belongs to the host application; [`WavClockPlayer`]
//! stands in for an output device when running headless.

use std::io::Cursor;
use std::time::Duration;

use crate::error::FaceSyncError;
use crate::AudioPlayer;

/// Length of a WAV payload.
pub fn wav_duration(audio: &[u8]) -> Result<Duration, FaceSyncError> {
    let reader = hound::WavReader::new(Cursor::new(audio))?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Err(FaceSyncError::Wav(hound::Error::FormatError("zero sample rate")));
    }
    // `duration` counts frames per channel
    Ok(Duration::from_secs_f64(
        reader.duration() as f64 / spec.sample_rate as f64,
    ))
}

/// Decodes WAV payloads and blocks for their duration without producing sound.
#[derive(Debug, Clone, Copy, Default)]
pub struct WavClockPlayer;

impl AudioPlayer for WavClockPlayer {
    fn play(&self, audio: &[u8]) -> Result<(), FaceSyncError> {
        let duration = wav_duration(audio)?;
        log::debug!("Holding audio clock for {duration:.2?}");
        std::thread::sleep(duration);
        Ok(())
    }
}
