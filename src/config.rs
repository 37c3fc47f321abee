//! Engine configuration.
//!
//! Loaded from JSON with [`EngineConfig::from_json_file`] or assembled in code
//! with [`EngineConfigBuilder`]. Every field has a default, so a config file only
//! needs the keys it changes:
//!
//! ```json
//! { "livelink_addr": "192.168.1.20:11111", "subject_name": "metahuman" }
//! ```

use std::path::Path;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::FaceSyncError;
use crate::MIN_CHANNELS;

/// Default LiveLink face port on the local machine.
pub const DEFAULT_LIVELINK_ADDR: &str = "127.0.0.1:11111";

/// Eye blinks inserted into the generated idle animation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlinkSettings {
    /// Frames between the start of consecutive blinks.
    pub interval_frames: usize,
    /// Length of one blink in frames.
    pub duration_frames: usize,
}

impl Default for BlinkSettings {
    fn default() -> Self {
        Self {
            interval_frames: 240,
            duration_frames: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[serde(default)]
#[builder(default, setter(into))]
pub struct EngineConfig {
    /// Frame rate of speech-driven sessions.
    pub fps: u32,
    /// Cadence of the idle loop.
    pub idle_fps: u32,
    /// Number of leading frames a gesture is crossfaded into.
    pub blend_window: usize,
    /// Weight of the gesture inside the blend window.
    pub blend_alpha: f32,
    /// Frames must carry strictly more channels than this. Never below
    /// [`MIN_CHANNELS`], the blendshape count.
    pub min_channels: usize,
    pub livelink_addr: String,
    pub subject_name: String,
    pub device_id: String,
    /// Sessions allowed in flight (streaming plus waiting) before `play` answers `Busy`.
    pub max_pending_sessions: usize,
    pub blink: BlinkSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fps: 60,
            idle_fps: 60,
            blend_window: 32,
            blend_alpha: 0.7,
            min_channels: MIN_CHANNELS,
            livelink_addr: DEFAULT_LIVELINK_ADDR.to_string(),
            subject_name: "face".to_string(),
            device_id: "facesync".to_string(),
            max_pending_sessions: 4,
            blink: BlinkSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Load and validate a JSON config file. Missing keys keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, FaceSyncError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        log::info!("Loaded engine config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), FaceSyncError> {
        if self.fps == 0 || self.idle_fps == 0 {
            return Err(FaceSyncError::Config("fps must be positive".to_string()));
        }
        if self.blend_window == 0 {
            return Err(FaceSyncError::Config(
                "blend_window must be at least one frame".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.blend_alpha) {
            return Err(FaceSyncError::Config(format!(
                "blend_alpha {} is outside [0, 1]",
                self.blend_alpha
            )));
        }
        if self.min_channels < MIN_CHANNELS {
            return Err(FaceSyncError::Config(format!(
                "min_channels {} is below the {MIN_CHANNELS} blendshape channels",
                self.min_channels
            )));
        }
        if self.max_pending_sessions == 0 {
            return Err(FaceSyncError::Config(
                "max_pending_sessions must be at least 1".to_string(),
            ));
        }
        if self.blink.duration_frames == 0 || self.blink.interval_frames == 0 {
            return Err(FaceSyncError::Config(
                "blink interval and duration must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{EngineConfig, EngineConfigBuilder, DEFAULT_LIVELINK_ADDR};
    use crate::error::FaceSyncError;
    use std::io::Write;

    #[test]
    fn defaults_match_livelink_playback() {
        let config = EngineConfig::default();
        assert_eq!(config.fps, 60);
        assert_eq!(config.blend_window, 32);
        assert!((config.blend_alpha - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.min_channels, 61);
        assert_eq!(config.livelink_addr, DEFAULT_LIVELINK_ADDR);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn json_file_overrides_only_given_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "subject_name": "metahuman", "blink": {{ "interval_frames": 120 }} }}"#
        )
        .unwrap();

        let config = EngineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.subject_name, "metahuman");
        assert_eq!(config.blink.interval_frames, 120);
        assert_eq!(config.blink.duration_frames, 10);
        assert_eq!(config.fps, 60);
    }

    #[test]
    fn rejects_alpha_outside_unit_range() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "blend_alpha": 1.5 }}"#).unwrap();
        assert!(EngineConfig::from_json_file(file.path()).is_err());
    }

    #[test]
    fn rejects_min_channels_below_blendshape_count() {
        let config = EngineConfigBuilder::default()
            .min_channels(0usize)
            .build()
            .unwrap();
        assert!(matches!(config.validate(), Err(FaceSyncError::Config(_))));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "min_channels": 60 }}"#).unwrap();
        assert!(EngineConfig::from_json_file(file.path()).is_err());

        let stricter = EngineConfigBuilder::default()
            .min_channels(68usize)
            .build()
            .unwrap();
        assert!(stricter.validate().is_ok());
    }

    #[test]
    fn builder_fills_unset_fields_with_defaults() {
        let config = EngineConfigBuilder::default()
            .fps(30u32)
            .subject_name("avatar")
            .build()
            .unwrap();
        assert_eq!(config.fps, 30);
        assert_eq!(config.subject_name, "avatar");
        assert_eq!(config.idle_fps, 60);
    }
}
