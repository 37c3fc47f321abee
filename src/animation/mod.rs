//! Emotion classification and gesture blending for generated facial data.
//!
//! Generated frames carry 61 blendshape/head/eye channels followed by seven
//! emotion scores. The dominant emotion selects a stock gesture clip, which is
//! crossfaded into the leading frames before encoding.
//!
//! # Gesture Directory Layout
//!
//! ```text
//! gestures/
//! ├── Happy/
//! │   ├── nod.npy        # float32 [frames, channels]
//! │   └── smile.npy
//! └── Sad/
//!     └── sigh.npy
//! ```

pub mod blend;
pub mod emotion;
pub mod gestures;
pub mod prepare;

pub use blend::blend_gesture;
pub use emotion::{dominant_emotion, emotion_scores, Emotion};
pub use gestures::{parse_npy, GestureLibrary};
pub use prepare::{validate, Preparer};
