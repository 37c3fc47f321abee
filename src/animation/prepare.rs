use std::sync::Arc;

use rand::Rng;

use super::blend::blend_gesture;
use super::emotion::dominant_emotion;
use super::gestures::GestureLibrary;
use crate::config::EngineConfig;
use crate::error::FaceSyncError;
use crate::livelink::{encode_sequence, EncodedFrameSequence, EncodingProfile};
use crate::{FacialSequence, MIN_CHANNELS};

/// Turns generated facial data into transport-ready packets.
///
/// Validation, emotion classification, gesture crossfade and encoding. Each call
/// encodes through a fresh context from the profile, never the idle loop's.
#[derive(Debug, Clone)]
pub struct Preparer {
    library: Arc<GestureLibrary>,
    profile: EncodingProfile,
    blend_window: usize,
    blend_alpha: f32,
    min_channels: usize,
}

impl Preparer {
    pub fn new(library: Arc<GestureLibrary>, profile: EncodingProfile, config: &EngineConfig) -> Self {
        Self {
            library,
            profile,
            blend_window: config.blend_window,
            blend_alpha: config.blend_alpha,
            min_channels: config.min_channels.max(MIN_CHANNELS),
        }
    }

    pub fn library(&self) -> &GestureLibrary {
        &self.library
    }

    pub fn prepare(&self, raw: &FacialSequence) -> Result<EncodedFrameSequence, FaceSyncError> {
        self.prepare_with_rng(raw, &mut rand::thread_rng())
    }

    /// Like [`Preparer::prepare`] with a caller-supplied gesture picker.
    pub fn prepare_with_rng<R: Rng + ?Sized>(
        &self,
        raw: &FacialSequence,
        rng: &mut R,
    ) -> Result<EncodedFrameSequence, FaceSyncError> {
        let blended = self.blend(raw, rng)?;
        let mut context = self.profile.new_context();
        Ok(encode_sequence(&blended, &mut context))
    }

    /// Validate and crossfade without encoding.
    pub fn blend<R: Rng + ?Sized>(
        &self,
        raw: &FacialSequence,
        rng: &mut R,
    ) -> Result<FacialSequence, FaceSyncError> {
        validate(raw, self.min_channels)?;

        let emotion = dominant_emotion(raw);
        log::info!("Dominant emotion: {emotion}");

        match self.library.choose(emotion, rng) {
            Some(gesture) => {
                log::debug!(
                    "Blending {}-frame {emotion} gesture into {} generated frames",
                    gesture.len(),
                    raw.len()
                );
                Ok(blend_gesture(raw, gesture, self.blend_window, self.blend_alpha))
            }
            None => {
                log::debug!("No {emotion} gesture available, using generated frames as-is");
                Ok(raw.clone())
            }
        }
    }
}

/// Reject empty sequences and frames with `min_channels` channels or fewer.
pub fn validate(sequence: &FacialSequence, min_channels: usize) -> Result<(), FaceSyncError> {
    if sequence.is_empty() || sequence.min_channels() <= min_channels {
        log::warn!(
            "Rejecting facial data: {} frame(s), narrowest frame has {} channels",
            sequence.len(),
            sequence.min_channels()
        );
        return Err(FaceSyncError::InsufficientFrameData {
            frames: sequence.len(),
            min_channels,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{validate, Preparer};
    use crate::animation::{Emotion, GestureLibrary};
    use crate::config::{EngineConfig, EngineConfigBuilder};
    use crate::error::FaceSyncError;
    use crate::livelink::{decode_packet, EncodingProfile};
    use crate::FacialSequence;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn generated(frames: usize, emotion: Emotion) -> FacialSequence {
        let rows = (0..frames)
            .map(|i| {
                let mut frame = vec![0.0; 68];
                for (c, value) in frame.iter_mut().enumerate().take(61) {
                    *value = ((i * 7 + c) % 50) as f32 / 100.0;
                }
                frame[emotion.channel()] = 0.8;
                frame
            })
            .collect();
        FacialSequence::new(rows)
    }

    fn preparer(library: GestureLibrary) -> Preparer {
        let config = EngineConfig::default();
        Preparer::new(
            Arc::new(library),
            EncodingProfile::from_config(&config),
            &config,
        )
    }

    #[test]
    fn rejects_empty_and_narrow_input() {
        let preparer = preparer(GestureLibrary::new());
        assert!(matches!(
            preparer.prepare(&FacialSequence::default()),
            Err(FaceSyncError::InsufficientFrameData { frames: 0, .. })
        ));

        let narrow = FacialSequence::new(vec![vec![0.0; 61]; 10]);
        let err = preparer.prepare(&narrow).unwrap_err();
        assert!(err.is_rejected_input());

        let mixed = FacialSequence::new(vec![vec![0.0; 68], vec![0.0; 40]]);
        assert!(validate(&mixed, 61).is_err());
        assert!(validate(&FacialSequence::new(vec![vec![0.0; 62]]), 61).is_ok());
    }

    #[test]
    fn loose_channel_minimum_still_rejects_narrow_frames() {
        let config = EngineConfigBuilder::default()
            .min_channels(0usize)
            .build()
            .unwrap();
        let preparer = Preparer::new(
            Arc::new(GestureLibrary::new()),
            EncodingProfile::from_config(&config),
            &config,
        );
        assert!(matches!(
            preparer.prepare(&FacialSequence::new(vec![vec![0.5; 5]; 10])),
            Err(FaceSyncError::InsufficientFrameData { frames: 10, min_channels: 61 })
        ));
    }

    #[test]
    fn happy_gesture_blends_first_32_frames() {
        let mut library = GestureLibrary::new();
        library.insert(Emotion::Happy, FacialSequence::new(vec![vec![0.9; 68]; 40]));
        library.insert(Emotion::Sad, FacialSequence::new(vec![vec![0.0; 68]; 40]));
        let preparer = preparer(library);

        let raw = generated(100, Emotion::Happy);
        let encoded = preparer
            .prepare_with_rng(&raw, &mut StdRng::seed_from_u64(1))
            .unwrap();
        assert_eq!(encoded.len(), 100);

        for (i, packet) in encoded.packets().iter().enumerate() {
            let values = decode_packet(packet).unwrap().blendshapes;
            let source = &raw.frames()[i];
            for (c, &value) in values.iter().enumerate() {
                let want = if i < 32 {
                    0.7 * 0.9 + (1.0 - 0.7) * source[c]
                } else {
                    source[c]
                };
                assert!((value - want).abs() < 1e-6, "frame {i} channel {c}");
            }
        }
    }

    #[test]
    fn passes_through_without_matching_gesture() {
        let mut library = GestureLibrary::new();
        library.insert(Emotion::Angry, FacialSequence::new(vec![vec![1.0; 68]; 40]));
        let preparer = preparer(library);

        let raw = generated(20, Emotion::Neutral);
        let blended = preparer
            .blend(&raw, &mut StdRng::seed_from_u64(3))
            .unwrap();
        assert_eq!(blended, raw);
    }

    #[test]
    fn repeated_preparation_is_independent() {
        let preparer = preparer(GestureLibrary::new());
        let raw = generated(8, Emotion::Sad);
        let first = preparer.prepare(&raw).unwrap();
        let second = preparer.prepare(&raw).unwrap();
        assert_eq!(first, second);
        assert_eq!(decode_packet(&second.packets()[0]).unwrap().frame_number, 0);
    }
}
