use std::time::Duration;

use crate::config::EngineConfig;
use crate::error::FaceSyncError;
use crate::FacialSequence;

/// Blendshape channels carried by a LiveLink face packet.
pub const BLENDSHAPE_COUNT: usize = 61;

/// Packet format version written in the first byte.
pub const PROTOCOL_VERSION: u8 = 6;

/// LiveLink index of the left eye blink blendshape.
pub const EYE_BLINK_LEFT: usize = 0;

/// LiveLink index of the right eye blink blendshape.
pub const EYE_BLINK_RIGHT: usize = 7;

/// Linear correction applied to one channel before it is written.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelCalibration {
    pub scale: f32,
    pub offset: f32,
}

impl Default for ChannelCalibration {
    fn default() -> Self {
        Self {
            scale: 1.0,
            offset: 0.0,
        }
    }
}

impl ChannelCalibration {
    fn apply(&self, value: f32) -> f32 {
        (value * self.scale + self.offset).clamp(-1.0, 1.0)
    }
}

/// Everything needed to create encoding contexts for one LiveLink subject.
///
/// Each [`EncodingContext`] created from a profile is independent, so the idle
/// loop and sequence preparation never share encoder state.
#[derive(Debug, Clone)]
pub struct EncodingProfile {
    pub device_id: String,
    pub subject: String,
    pub fps: u32,
    calibration: [ChannelCalibration; BLENDSHAPE_COUNT],
}

impl EncodingProfile {
    pub fn new(device_id: impl Into<String>, subject: impl Into<String>, fps: u32) -> Self {
        Self {
            device_id: device_id.into(),
            subject: subject.into(),
            fps,
            calibration: [ChannelCalibration::default(); BLENDSHAPE_COUNT],
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(&config.device_id, &config.subject_name, config.fps)
    }

    /// Override the calibration of one blendshape channel. Out-of-range
    /// channels are ignored.
    pub fn with_calibration(mut self, channel: usize, calibration: ChannelCalibration) -> Self {
        if let Some(slot) = self.calibration.get_mut(channel) {
            *slot = calibration;
        } else {
            log::warn!("Ignoring calibration for channel {channel} (only {BLENDSHAPE_COUNT} blendshapes)");
        }
        self
    }

    /// A fresh context with neutral blendshapes and frame number zero.
    pub fn new_context(&self) -> EncodingContext {
        EncodingContext {
            profile: self.clone(),
            blendshapes: [0.0; BLENDSHAPE_COUNT],
            frame_number: 0,
        }
    }
}

/// Mutable encoder state: the current blendshape values and frame counter.
///
/// Channels a frame does not carry keep their previous value.
#[derive(Debug, Clone)]
pub struct EncodingContext {
    profile: EncodingProfile,
    blendshapes: [f32; BLENDSHAPE_COUNT],
    frame_number: u32,
}

impl EncodingContext {
    pub fn frame_number(&self) -> u32 {
        self.frame_number
    }

    pub fn blendshapes(&self) -> &[f32; BLENDSHAPE_COUNT] {
        &self.blendshapes
    }

    /// Update the blendshape state from a facial frame. Channels past
    /// [`BLENDSHAPE_COUNT`] (emotion scores) are not transmitted.
    pub fn set_frame(&mut self, frame: &[f32]) {
        for ((slot, calibration), &value) in self
            .blendshapes
            .iter_mut()
            .zip(self.profile.calibration.iter())
            .zip(frame.iter())
        {
            *slot = calibration.apply(value);
        }
    }

    /// Serialize the current state as one packet and advance the frame counter.
    pub fn encode(&mut self) -> Vec<u8> {
        let device = self.profile.device_id.as_bytes();
        let subject = self.profile.subject.as_bytes();
        let mut packet =
            Vec::with_capacity(1 + 8 + device.len() + subject.len() + 16 + 1 + BLENDSHAPE_COUNT * 4);

        packet.push(PROTOCOL_VERSION);
        packet.extend_from_slice(&(device.len() as u32).to_be_bytes());
        packet.extend_from_slice(device);
        packet.extend_from_slice(&(subject.len() as u32).to_be_bytes());
        packet.extend_from_slice(subject);

        packet.extend_from_slice(&self.frame_number.to_be_bytes());
        packet.extend_from_slice(&0f32.to_be_bytes()); // subframe
        packet.extend_from_slice(&self.profile.fps.to_be_bytes());
        packet.extend_from_slice(&1u32.to_be_bytes());

        packet.push(BLENDSHAPE_COUNT as u8);
        for value in &self.blendshapes {
            packet.extend_from_slice(&value.to_be_bytes());
        }

        self.frame_number = self.frame_number.wrapping_add(1);
        packet
    }

    pub fn encode_frame(&mut self, frame: &[f32]) -> Vec<u8> {
        self.set_frame(frame);
        self.encode()
    }
}

/// Transport-ready packets for one facial sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFrameSequence {
    packets: Vec<Vec<u8>>,
    fps: u32,
}

impl EncodedFrameSequence {
    pub fn packets(&self) -> &[Vec<u8>] {
        &self.packets
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Playback length at the encoded frame rate.
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.packets.len() as f64 / self.fps.max(1) as f64)
    }
}

/// Encode every frame of `sequence` through `context`, one packet per frame.
pub fn encode_sequence(sequence: &FacialSequence, context: &mut EncodingContext) -> EncodedFrameSequence {
    let packets = sequence
        .frames()
        .iter()
        .map(|frame| context.encode_frame(frame))
        .collect();
    EncodedFrameSequence {
        packets,
        fps: context.profile.fps,
    }
}

/// A decoded LiveLink face packet.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveLinkFrame {
    pub device_id: String,
    pub subject: String,
    pub frame_number: u32,
    pub fps: u32,
    pub blendshapes: Vec<f32>,
}

/// Parse a packet produced by [`EncodingContext::encode`].
pub fn decode_packet(packet: &[u8]) -> Result<LiveLinkFrame, FaceSyncError> {
    let mut reader = PacketReader { buf: packet, pos: 0 };

    let version = reader.take(1)?[0];
    if version != PROTOCOL_VERSION {
        return Err(FaceSyncError::Packet(format!("unsupported version {version}")));
    }
    let device_id = reader.string()?;
    let subject = reader.string()?;
    let frame_number = reader.u32()?;
    let _subframe = reader.take(4)?;
    let fps = reader.u32()?;
    let _denominator = reader.u32()?;

    let count = reader.take(1)?[0] as usize;
    let mut blendshapes = Vec::with_capacity(count);
    for _ in 0..count {
        let bytes = reader.take(4)?;
        blendshapes.push(f32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]));
    }

    Ok(LiveLinkFrame {
        device_id,
        subject,
        frame_number,
        fps,
        blendshapes,
    })
}

struct PacketReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], FaceSyncError> {
        let end = self.pos + n;
        if end > self.buf.len() {
            return Err(FaceSyncError::Packet(format!(
                "need {end} bytes, packet has {}",
                self.buf.len()
            )));
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32, FaceSyncError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn string(&mut self) -> Result<String, FaceSyncError> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| FaceSyncError::Packet("string field is not UTF-8".to_string()))
    }
}
