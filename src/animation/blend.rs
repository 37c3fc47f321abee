use crate::FacialSequence;

/// Crossfade `gesture` into the leading frames of `generated`.
///
/// Frame `i < min(window, gesture.len(), generated.len())` becomes
/// `alpha * gesture[i] + (1 - alpha) * generated[i]` on every channel both frames
/// carry. All other frames and channels are copied from `generated`, so the
/// result always has `generated.len()` frames.
pub fn blend_gesture(
    generated: &FacialSequence,
    gesture: &FacialSequence,
    window: usize,
    alpha: f32,
) -> FacialSequence {
    let overlap = window.min(gesture.len()).min(generated.len());
    let mut frames = generated.frames().to_vec();

    for (dst, src) in frames.iter_mut().zip(gesture.frames()).take(overlap) {
        for (value, &gesture_value) in dst.iter_mut().zip(src.iter()) {
            *value = alpha * gesture_value + (1.0 - alpha) * *value;
        }
    }

    FacialSequence::new(frames)
}

#[cfg(test)]
mod tests {
    use super::blend_gesture;
    use crate::FacialSequence;

    fn constant(frames: usize, channels: usize, value: f32) -> FacialSequence {
        FacialSequence::new(vec![vec![value; channels]; frames])
    }

    fn expected(gesture: f32, generated: f32) -> f32 {
        0.7 * gesture + (1.0 - 0.7) * generated
    }

    #[test]
    fn blends_window_and_copies_the_rest() {
        let generated = constant(100, 68, 0.2);
        let gesture = constant(40, 68, 0.9);
        let out = blend_gesture(&generated, &gesture, 32, 0.7);

        assert_eq!(out.len(), 100);
        for frame in &out.frames()[..32] {
            assert!(frame.iter().all(|&v| (v - expected(0.9, 0.2)).abs() < 1e-6));
        }
        assert_eq!(&out.frames()[32..], &generated.frames()[32..]);
    }

    #[test]
    fn short_gesture_truncates_the_window() {
        let generated = constant(50, 68, 0.0);
        let gesture = constant(10, 68, 1.0);
        let out = blend_gesture(&generated, &gesture, 32, 0.7);

        assert!((out.frames()[9][0] - 0.7).abs() < 1e-6);
        assert_eq!(out.frames()[10], generated.frames()[10]);
        assert_eq!(out.len(), 50);
    }

    #[test]
    fn short_generated_sequence_keeps_its_length() {
        let generated = constant(5, 68, 0.4);
        let gesture = constant(40, 68, 0.4);
        let out = blend_gesture(&generated, &gesture, 32, 0.7);
        assert_eq!(out.len(), 5);
    }

    #[test]
    fn narrow_gesture_leaves_extra_channels_untouched() {
        let generated = constant(4, 68, 0.5);
        let gesture = constant(4, 61, 1.0);
        let out = blend_gesture(&generated, &gesture, 32, 0.7);

        let frame = &out.frames()[0];
        assert!((frame[60] - expected(1.0, 0.5)).abs() < 1e-6);
        assert_eq!(frame[61], 0.5);
        assert_eq!(frame.len(), 68);
    }
}
