//! Sealed segment metadata.
//!
//! A `Segment` describes one immutable, time-bounded unit of captured audio.
//! It carries no sample data; samples are fetched from storage on demand.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::timebase;

/// Fixed PCM format shared by every segment the system produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioFormat {
    /// Frames per second (Hz).
    pub sample_rate: u32,
    /// Interleaved channels per frame.
    pub channels: u16,
    /// Bits per sample. Storage is signed 16-bit PCM.
    pub bits_per_sample: u16,
}

impl AudioFormat {
    pub const fn mono16(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
            bits_per_sample: 16,
        }
    }

    pub fn wav_spec(&self) -> hound::WavSpec {
        hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: self.bits_per_sample,
            sample_format: hound::SampleFormat::Int,
        }
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::mono16(16_000)
    }
}

/// Container used to persist a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SegmentCodec {
    /// Plain PCM WAV. Seekable, so ranged reads decode only what they need.
    Wav,
    /// WAV deflated inside a single-entry zip archive.
    ZippedWav,
}

impl SegmentCodec {
    pub fn extension(self) -> &'static str {
        match self {
            SegmentCodec::Wav => "wav",
            SegmentCodec::ZippedWav => "wav.zip",
        }
    }
}

/// Segment identity, derived from the segment's start timestamp.
///
/// Fixed width, so lexical order equals time order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentId(String);

impl SegmentId {
    pub fn from_start(start: DateTime<Utc>) -> Self {
        Self(start.format("%Y%m%d_%H%M%S%.9f").to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A sealed, immutable segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub id: SegmentId,
    pub start_time: DateTime<Utc>,
    /// `start_time + sample_count / sample_rate`, computed by [`timebase::add_frames`].
    pub end_time: DateTime<Utc>,
    /// Frames per channel.
    pub sample_count: u64,
    pub format: AudioFormat,
    pub codec: SegmentCodec,
    /// Where the compressed bytes live.
    pub location: PathBuf,
}

impl Segment {
    pub fn new(
        start_time: DateTime<Utc>,
        sample_count: u64,
        format: AudioFormat,
        codec: SegmentCodec,
        location: PathBuf,
    ) -> Self {
        Self {
            id: SegmentId::from_start(start_time),
            start_time,
            end_time: timebase::add_frames(start_time, sample_count, format.sample_rate),
            sample_count,
            format,
            codec,
            location,
        }
    }

    pub fn duration(&self) -> TimeDelta {
        self.end_time - self.start_time
    }

    pub fn duration_secs(&self) -> f64 {
        self.sample_count as f64 / self.format.sample_rate as f64
    }

    /// Half-open overlap test against `[start, end)`.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start_time < end && self.end_time > start
    }
}
