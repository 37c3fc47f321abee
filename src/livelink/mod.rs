//! LiveLink face output.
//!
//! Frames are encoded into self-describing packets (device id, subject name,
//! frame time, 61 blendshape values) and sent over UDP to the rendering host.
//!
//! ```text
//! u8  version (6)
//! u32 device id length, device id bytes
//! u32 subject length,   subject bytes
//! u32 frame number, f32 subframe, u32 fps, u32 fps denominator
//! u8  blendshape count (61), then 61 x f32
//! ```
//!
//! All multi-byte fields are big-endian.

pub mod encoder;
pub mod transport;

pub use encoder::{
    decode_packet, encode_sequence, ChannelCalibration, EncodedFrameSequence, EncodingContext,
    EncodingProfile, LiveLinkFrame, BLENDSHAPE_COUNT,
};
pub use transport::UdpTransport;
