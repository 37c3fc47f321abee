use std::fmt;

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::FacialSequence;

/// First channel holding an emotion score.
pub const EMOTION_CHANNEL_OFFSET: usize = 61;

/// Number of emotion score channels.
pub const EMOTION_COUNT: usize = 7;

/// Emotions scored by the inference model, in channel order.
///
/// The declaration order doubles as the tie-break order: when two emotions share
/// the highest score, the one declared first wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Emotion {
    Angry,
    Disgusted,
    Fearful,
    Happy,
    Neutral,
    Sad,
    Surprised,
}

impl Emotion {
    pub const ALL: [Emotion; EMOTION_COUNT] = [
        Emotion::Angry,
        Emotion::Disgusted,
        Emotion::Fearful,
        Emotion::Happy,
        Emotion::Neutral,
        Emotion::Sad,
        Emotion::Surprised,
    ];

    /// Index of this emotion's score in a facial frame.
    pub fn channel(self) -> usize {
        EMOTION_CHANNEL_OFFSET + self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Emotion::Angry => "Angry",
            Emotion::Disgusted => "Disgusted",
            Emotion::Fearful => "Fearful",
            Emotion::Happy => "Happy",
            Emotion::Neutral => "Neutral",
            Emotion::Sad => "Sad",
            Emotion::Surprised => "Surprised",
        }
    }

    /// Case-insensitive lookup by name, e.g. a gesture directory name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|e| e.name().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Sum of each emotion channel over all frames.
///
/// Channels a frame does not carry count as zero.
pub fn emotion_scores(sequence: &FacialSequence) -> Array1<f32> {
    let mut scores = Array2::<f32>::zeros((sequence.len(), EMOTION_COUNT));
    for (i, frame) in sequence.frames().iter().enumerate() {
        let mut row = scores.row_mut(i);
        for (slot, &value) in row
            .iter_mut()
            .zip(frame.iter().skip(EMOTION_CHANNEL_OFFSET))
        {
            *slot = value;
        }
    }
    scores.sum_axis(Axis(0))
}

/// The emotion with the highest aggregate score across the sequence.
///
/// Callers validate the sequence first; an empty or score-less sequence
/// resolves to the first emotion in tie-break order.
pub fn dominant_emotion(sequence: &FacialSequence) -> Emotion {
    let scores = emotion_scores(sequence);
    let mut best = Emotion::ALL[0];
    let mut best_score = scores[0];
    for emotion in Emotion::ALL.into_iter().skip(1) {
        let score = scores[emotion as usize];
        // strict comparison keeps the earlier emotion on ties; NaN never wins
        if score > best_score || (best_score.is_nan() && !score.is_nan()) {
            best = emotion;
            best_score = score;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::{dominant_emotion, emotion_scores, Emotion, EMOTION_CHANNEL_OFFSET};
    use crate::FacialSequence;

    fn frame_with(emotion: Emotion, score: f32) -> Vec<f32> {
        let mut frame = vec![0.0; 68];
        frame[emotion.channel()] = score;
        frame
    }

    #[test]
    fn picks_highest_aggregate_score() {
        let sequence = FacialSequence::new(vec![
            frame_with(Emotion::Sad, 0.9),
            frame_with(Emotion::Happy, 0.6),
            frame_with(Emotion::Happy, 0.6),
        ]);
        assert_eq!(dominant_emotion(&sequence), Emotion::Happy);
    }

    #[test]
    fn ties_resolve_to_declaration_order() {
        let mut frame = vec![0.0; 68];
        frame[Emotion::Sad.channel()] = 0.5;
        frame[Emotion::Fearful.channel()] = 0.5;
        let sequence = FacialSequence::new(vec![frame]);
        assert_eq!(dominant_emotion(&sequence), Emotion::Fearful);
    }

    #[test]
    fn missing_emotion_channels_score_zero() {
        let mut frame = vec![0.0; EMOTION_CHANNEL_OFFSET + 2];
        frame[Emotion::Disgusted.channel()] = 0.2;
        let scores = emotion_scores(&FacialSequence::new(vec![frame]));
        assert_eq!(scores.len(), 7);
        assert!((scores[1] - 0.2).abs() < 1e-6);
        assert_eq!(scores[6], 0.0);
        assert_eq!(
            dominant_emotion(&FacialSequence::new(vec![vec![0.0; 63]])),
            Emotion::Angry
        );
    }

    #[test]
    fn names_round_trip_case_insensitively() {
        for emotion in Emotion::ALL {
            assert_eq!(Emotion::from_name(&emotion.name().to_lowercase()), Some(emotion));
        }
        assert_eq!(Emotion::from_name("bored"), None);
    }
}
