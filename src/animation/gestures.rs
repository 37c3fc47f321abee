use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use rand::seq::SliceRandom;
use rand::Rng;

use super::emotion::Emotion;
use crate::error::FaceSyncError;
use crate::FacialSequence;

/// Stock gesture clips grouped by emotion.
///
/// Loaded once at startup and shared read-only afterwards. Clips are stored as
/// NumPy `.npy` arrays of shape `[frames, channels]`, one file per clip, under a
/// directory named after the emotion (`Happy/wave.npy`).
#[derive(Debug, Clone, Default)]
pub struct GestureLibrary {
    clips: BTreeMap<Emotion, Vec<FacialSequence>>,
}

impl GestureLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `<root>/<Emotion>/*.npy` clip.
    ///
    /// Directory names match emotions case-insensitively; anything else is
    /// skipped. Clips within one emotion are loaded in file name order.
    pub fn load_dir(root: &Path) -> Result<Self, FaceSyncError> {
        let mut library = Self::new();

        let mut dirs: Vec<_> = fs::read_dir(root)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        dirs.sort();

        for dir in dirs {
            let dir_name = dir
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            let Some(emotion) = Emotion::from_name(&dir_name) else {
                log::warn!("Skipping gesture directory {dir_name:?}: not an emotion");
                continue;
            };

            let mut files: Vec<_> = fs::read_dir(&dir)?
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("npy"))
                .collect();
            files.sort();

            for file in files {
                let data = fs::read(&file)?;
                let clip = parse_npy(&data, &file.display().to_string())?;
                library.insert(emotion, clip);
            }
        }

        log::info!(
            "Loaded {} gesture clips for {} emotions from {}",
            library.len(),
            library.clips.len(),
            root.display()
        );
        Ok(library)
    }

    /// Load clips from an `.npz` archive whose entries are named `<Emotion>/<clip>.npy`.
    #[cfg(feature = "npz")]
    pub fn load_npz(path: &Path) -> Result<Self, FaceSyncError> {
        use std::io::Read;

        let file = fs::File::open(path)?;
        let mut zip = zip::ZipArchive::new(file).map_err(|e| {
            FaceSyncError::GestureParse(format!("Failed to open zip archive: {e}"))
        })?;

        let mut library = Self::new();
        let mut names: Vec<String> = zip.file_names().map(str::to_string).collect();
        names.sort();

        for raw_name in names {
            if raw_name.ends_with('/') || !raw_name.ends_with(".npy") {
                continue;
            }
            let Some((dir, _clip)) = raw_name.split_once('/') else {
                log::warn!("Skipping archive entry {raw_name:?}: no emotion directory");
                continue;
            };
            let Some(emotion) = Emotion::from_name(dir) else {
                log::warn!("Skipping archive entry {raw_name:?}: not an emotion");
                continue;
            };

            let mut entry = zip.by_name(&raw_name).map_err(|e| {
                FaceSyncError::GestureParse(format!("Failed to read zip entry {raw_name}: {e}"))
            })?;
            let mut data = Vec::new();
            entry.read_to_end(&mut data).map_err(|e| {
                FaceSyncError::GestureParse(format!("Failed to read {raw_name}: {e}"))
            })?;

            library.insert(emotion, parse_npy(&data, &raw_name)?);
        }

        log::info!("Loaded {} gesture clips from {}", library.len(), path.display());
        Ok(library)
    }

    pub fn insert(&mut self, emotion: Emotion, clip: FacialSequence) {
        self.clips.entry(emotion).or_default().push(clip);
    }

    pub fn candidates(&self, emotion: Emotion) -> &[FacialSequence] {
        self.clips.get(&emotion).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Pick one clip for `emotion` uniformly at random.
    pub fn choose<R: Rng + ?Sized>(&self, emotion: Emotion, rng: &mut R) -> Option<&FacialSequence> {
        self.candidates(emotion).choose(rng)
    }

    /// Emotions with at least one clip, in tie-break order.
    pub fn emotions(&self) -> impl Iterator<Item = Emotion> + '_ {
        self.clips
            .iter()
            .filter(|(_, clips)| !clips.is_empty())
            .map(|(emotion, _)| *emotion)
    }

    /// Total number of clips.
    pub fn len(&self) -> usize {
        self.clips.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NpyDtype {
    F32,
    F64,
}

/// Parse a numpy .npy file into a facial sequence.
///
/// Expects a little-endian float32 or float64 array of shape `[frames, channels]`
/// in C order.
pub fn parse_npy(data: &[u8], name: &str) -> Result<FacialSequence, FaceSyncError> {
    if data.len() < 10 {
        return Err(FaceSyncError::GestureParse(format!(
            "{name}: file too short ({} bytes)",
            data.len()
        )));
    }

    if &data[0..6] != b"\x93NUMPY" {
        return Err(FaceSyncError::GestureParse(format!(
            "{name}: invalid numpy magic bytes"
        )));
    }

    // version 1.x stores the header length as u16, 2.x and later as u32
    let (header_len, header_start) = match data[6] {
        1 => (u16::from_le_bytes([data[8], data[9]]) as usize, 10),
        _ if data.len() >= 12 => (
            u32::from_le_bytes([data[8], data[9], data[10], data[11]]) as usize,
            12,
        ),
        major => {
            return Err(FaceSyncError::GestureParse(format!(
                "{name}: truncated header for format version {major}"
            )))
        }
    };
    let data_offset = header_start + header_len;

    if data.len() < data_offset {
        return Err(FaceSyncError::GestureParse(format!(
            "{name}: header truncated (need {data_offset} bytes, got {})",
            data.len()
        )));
    }

    let header = std::str::from_utf8(&data[header_start..data_offset])
        .map_err(|_| FaceSyncError::GestureParse(format!("{name}: header is not UTF-8")))?;
    let (dtype, frames, channels) = parse_header(header, name)?;

    let width = match dtype {
        NpyDtype::F32 => 4,
        NpyDtype::F64 => 8,
    };
    if channels == 0 {
        return Err(FaceSyncError::GestureParse(format!(
            "{name}: shape ({frames}, 0) has no channels"
        )));
    }
    let body = &data[data_offset..];
    let expected = frames
        .checked_mul(channels)
        .and_then(|n| n.checked_mul(width))
        .ok_or_else(|| {
            FaceSyncError::GestureParse(format!(
                "{name}: shape ({frames}, {channels}) is too large"
            ))
        })?;
    if body.len() < expected {
        return Err(FaceSyncError::GestureParse(format!(
            "{name}: expected {expected} data bytes for shape ({frames}, {channels}), got {}",
            body.len()
        )));
    }

    let values: Vec<f32> = body[..expected]
        .chunks_exact(width)
        .map(|bytes| match dtype {
            NpyDtype::F32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            NpyDtype::F64 => f64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ]) as f32,
        })
        .collect();

    let rows = values.chunks_exact(channels).map(<[f32]>::to_vec).collect();
    Ok(FacialSequence::new(rows))
}

/// Extract dtype and 2-D shape from a header like
/// `{'descr': '<f4', 'fortran_order': False, 'shape': (40, 68), }`.
fn parse_header(header: &str, name: &str) -> Result<(NpyDtype, usize, usize), FaceSyncError> {
    let descr = header
        .split("'descr':")
        .nth(1)
        .and_then(|rest| rest.split('\'').nth(1))
        .ok_or_else(|| FaceSyncError::GestureParse(format!("{name}: missing descr")))?;
    let dtype = match descr {
        "<f4" => NpyDtype::F32,
        "<f8" => NpyDtype::F64,
        other => {
            return Err(FaceSyncError::GestureParse(format!(
                "{name}: unsupported dtype {other:?} (expected <f4 or <f8)"
            )))
        }
    };

    if header.contains("'fortran_order': True") {
        return Err(FaceSyncError::GestureParse(format!(
            "{name}: Fortran-ordered arrays are not supported"
        )));
    }

    let shape = header
        .split("'shape':")
        .nth(1)
        .and_then(|rest| rest.split_once('('))
        .and_then(|(_, rest)| rest.split_once(')'))
        .map(|(dims, _)| dims)
        .ok_or_else(|| FaceSyncError::GestureParse(format!("{name}: missing shape")))?;
    let dims = shape
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(|d| {
            d.parse::<usize>()
                .map_err(|_| FaceSyncError::GestureParse(format!("{name}: bad dimension {d:?}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    match dims.as_slice() {
        [frames, channels] => Ok((dtype, *frames, *channels)),
        _ => Err(FaceSyncError::GestureParse(format!(
            "{name}: expected a 2-D array, got shape {dims:?}"
        ))),
    }
}
