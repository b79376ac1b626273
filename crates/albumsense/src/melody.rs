//! Melody fingerprints: absolute, relative, and first-tone pitch histograms.
//!
//! A melody is an ordered sequence of MIDI pitches. Converting recorded audio
//! into that sequence is the job of an external pitch tracker; this module
//! only needs the pitches, delivered through a [`PitchSource`].
//!
//! Three distributions are extracted:
//!
//! - **ATB** (absolute tone based): 128 bins over `[0, 127]`.
//! - **RTB** (relative tone based): 255 bins over `[-127, 127]` of successive
//!   pitch differences.
//! - **FTB** (first tone based): 255 bins over `[-127, 127]` of the distance
//!   of every pitch from the first one.
//!
//! Each histogram is normalised so its bins sum to one over the values that
//! fell in range. A histogram with no in-range values is all zeros.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::{RetrievalError, RetrievalResult};

/// Highest valid MIDI pitch.
pub const MIDI_MAX: i32 = 127;

pub const ATB_BINS: usize = 128;
pub const RTB_BINS: usize = 255;
pub const FTB_BINS: usize = 255;

/// Length of the concatenated `[ATB, RTB, FTB]` vector.
pub const MELODY_FEATURE_LEN: usize = ATB_BINS + RTB_BINS + FTB_BINS;

/// Segment lengths of the concatenated vector, in order.
pub const MELODY_SEGMENTS: [usize; 3] = [ATB_BINS, RTB_BINS, FTB_BINS];

/// Default per-histogram weights for the weighted cosine score.
pub const MELODY_WEIGHTS: [f64; 3] = [0.4, 0.4, 0.2];

/// File suffix of pitch sidecars next to catalog audio files.
pub const NOTES_SUFFIX: &str = ".notes.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MelodyConfig {
    /// Z-score the pitches before building histograms.
    pub normalize: bool,
}

impl Default for MelodyConfig {
    fn default() -> Self {
        Self { normalize: true }
    }
}

/// The three histograms of one melody.
#[derive(Debug, Clone, PartialEq)]
pub struct MelodyFeatures {
    pub atb: Vec<f64>,
    pub rtb: Vec<f64>,
    pub ftb: Vec<f64>,
}

impl MelodyFeatures {
    pub fn zeros() -> Self {
        Self {
            atb: vec![0.0; ATB_BINS],
            rtb: vec![0.0; RTB_BINS],
            ftb: vec![0.0; FTB_BINS],
        }
    }

    /// `[ATB, RTB, FTB]` as one vector of [`MELODY_FEATURE_LEN`] values.
    pub fn concat(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(MELODY_FEATURE_LEN);
        out.extend_from_slice(&self.atb);
        out.extend_from_slice(&self.rtb);
        out.extend_from_slice(&self.ftb);
        out
    }
}

/// Subtract the mean and divide by the population standard deviation.
///
/// A constant melody has zero deviation; it is divided by one instead.
pub fn normalize_pitches(pitches: &[u8]) -> Vec<f64> {
    if pitches.is_empty() {
        return Vec::new();
    }
    let n = pitches.len() as f64;
    let mean = pitches.iter().map(|&p| p as f64).sum::<f64>() / n;
    let var = pitches
        .iter()
        .map(|&p| {
            let d = p as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    let std = if var.sqrt() == 0.0 { 1.0 } else { var.sqrt() };
    pitches.iter().map(|&p| (p as f64 - mean) / std).collect()
}

/// Unit-width histogram with bin edges `lo, lo+1, ..., lo+bins`.
///
/// The last bin is closed on the right. Values outside the edges (and NaN)
/// are ignored. Counts are divided by the number of in-range values.
pub fn histogram<I>(values: I, lo: i32, bins: usize) -> Vec<f64>
where
    I: IntoIterator<Item = f64>,
{
    let mut counts = vec![0.0; bins];
    let lo = lo as f64;
    let hi = lo + bins as f64;
    let mut total = 0usize;

    for v in values {
        if !(v >= lo && v <= hi) {
            continue;
        }
        let idx = ((v - lo).floor() as usize).min(bins - 1);
        counts[idx] += 1.0;
        total += 1;
    }

    if total > 0 {
        let total = total as f64;
        counts.iter_mut().for_each(|c| *c /= total);
    }
    counts
}

/// Build the ATB/RTB/FTB triple for a pitch sequence.
pub fn extract(pitches: &[u8], config: &MelodyConfig) -> MelodyFeatures {
    if pitches.is_empty() {
        return MelodyFeatures::zeros();
    }

    let tones: Vec<f64> = if config.normalize {
        normalize_pitches(pitches)
    } else {
        pitches.iter().map(|&p| p as f64).collect()
    };

    let atb = histogram(tones.iter().copied(), 0, ATB_BINS);

    let mut intervals: Vec<f64> = tones.windows(2).map(|w| w[1] - w[0]).collect();
    if intervals.is_empty() {
        intervals.push(0.0);
    }
    let rtb = histogram(intervals, -MIDI_MAX, RTB_BINS);

    let first = tones[0];
    let ftb = histogram(tones.iter().map(|t| t - first), -MIDI_MAX, FTB_BINS);

    MelodyFeatures { atb, rtb, ftb }
}

/// Supplies the pitch sequence of a catalog audio item.
pub trait PitchSource: Send + Sync {
    fn pitches(&self, item: &Path) -> RetrievalResult<Vec<u8>>;
}

/// Reads `<stem>.notes.json` sidecars written by the pitch tracker.
///
/// The sidecar lives next to the audio file unless a separate notes
/// directory is configured.
#[derive(Debug, Clone, Default)]
pub struct JsonNotesSource {
    notes_dir: Option<PathBuf>,
}

impl JsonNotesSource {
    pub fn new(notes_dir: Option<PathBuf>) -> Self {
        Self { notes_dir }
    }

    /// Sidecar path for an audio file.
    pub fn sidecar_path(&self, item: &Path) -> PathBuf {
        let stem = item
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_name = format!("{stem}{NOTES_SUFFIX}");
        match &self.notes_dir {
            Some(dir) => dir.join(file_name),
            None => item.with_file_name(file_name),
        }
    }
}

impl PitchSource for JsonNotesSource {
    fn pitches(&self, item: &Path) -> RetrievalResult<Vec<u8>> {
        let path = self.sidecar_path(item);
        let bytes = std::fs::read(&path).map_err(|e| {
            RetrievalError::Decode(format!("Cannot read pitch sidecar {}: {e}", path.display()))
        })?;
        parse_pitch_json(&bytes)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PitchDocument {
    Bare(Vec<i64>),
    Wrapped { pitches: Vec<i64> },
}

/// Parse `[60, 62, ...]` or `{"pitches": [60, 62, ...]}`.
pub fn parse_pitch_json(bytes: &[u8]) -> RetrievalResult<Vec<u8>> {
    let doc: PitchDocument = serde_json::from_slice(bytes)
        .map_err(|e| RetrievalError::Decode(format!("Invalid pitch document: {e}")))?;
    let raw = match doc {
        PitchDocument::Bare(p) | PitchDocument::Wrapped { pitches: p } => p,
    };
    raw.into_iter()
        .map(|p| {
            u8::try_from(p)
                .ok()
                .filter(|&v| v as i32 <= MIDI_MAX)
                .ok_or_else(|| RetrievalError::Decode(format!("Pitch {p} is outside 0..=127")))
        })
        .collect()
}
