//! Reconstruction results.

use std::io::{Cursor, Seek, Write};
use std::ops::Range;

use chrono::{DateTime, TimeDelta, Utc};
use hound::WavWriter;
use serde::Serialize;

use super::QueryWindow;
use crate::{
    error::Result,
    segment::{AudioFormat, SegmentId},
};

/// Sample data (or its absence) for one resolved span.
#[derive(Debug, Clone, PartialEq)]
pub enum SpanContent {
    /// Interleaved samples, exactly `frames.len() * channels` long.
    Audio { segment: SegmentId, samples: Vec<i16> },
    /// No captured audio.
    Gap,
    /// The segment exists but could not be read; substituted in lenient mode.
    Unreadable { segment: SegmentId, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RangeSpan {
    pub frames: Range<u64>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub content: SpanContent,
}

impl RangeSpan {
    /// True for any span without captured audio, including unreadable segments.
    pub fn is_gap(&self) -> bool {
        !matches!(self.content, SpanContent::Audio { .. })
    }

    pub fn samples(&self) -> Option<&[i16]> {
        match &self.content {
            SpanContent::Audio { samples, .. } => Some(samples),
            _ => None,
        }
    }
}

/// Ordered `(data, is_gap)` spans covering exactly the query window.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconstructedRange {
    pub window: QueryWindow,
    pub format: AudioFormat,
    pub total_frames: u64,
    pub spans: Vec<RangeSpan>,
}

impl ReconstructedRange {
    /// Stitch spans into one buffer, filling gaps and unreadable spans with silence.
    pub fn into_continuous(self) -> ContinuousAudio {
        let channels = self.format.channels as usize;
        let mut samples = vec![0i16; self.total_frames as usize * channels];
        let mut discontinuities = Vec::new();

        for span in self.spans {
            let kind = match span.content {
                SpanContent::Audio { samples: data, .. } => {
                    let at = span.frames.start as usize * channels;
                    samples[at..at + data.len()].copy_from_slice(&data);
                    continue;
                }
                SpanContent::Gap => DiscontinuityKind::Gap,
                SpanContent::Unreadable { segment, reason } => {
                    DiscontinuityKind::Unreadable { segment, reason }
                }
            };
            discontinuities.push(Discontinuity {
                frames: span.frames,
                start_time: span.start_time,
                end_time: span.end_time,
                kind,
            });
        }

        ContinuousAudio {
            window: self.window,
            format: self.format,
            samples,
            discontinuities,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum DiscontinuityKind {
    Gap,
    Unreadable { segment: SegmentId, reason: String },
}

/// A silence-filled interval in a continuous result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Discontinuity {
    pub frames: Range<u64>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub kind: DiscontinuityKind,
}

/// One seamless buffer covering the whole query window.
#[derive(Debug, Clone)]
pub struct ContinuousAudio {
    window: QueryWindow,
    format: AudioFormat,
    samples: Vec<i16>,
    discontinuities: Vec<Discontinuity>,
}

impl ContinuousAudio {
    pub fn sample_rate(&self) -> u32 {
        self.format.sample_rate
    }

    pub fn channel_count(&self) -> u16 {
        self.format.channels
    }

    pub fn bit_depth(&self) -> u16 {
        self.format.bits_per_sample
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Interleaved 16-bit samples.
    pub fn sample_data(&self) -> &[i16] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<i16> {
        self.samples
    }

    pub fn total_frames(&self) -> u64 {
        (self.samples.len() / self.format.channels as usize) as u64
    }

    /// Always `window.end - window.start`, gaps included.
    pub fn total_duration(&self) -> TimeDelta {
        self.window.duration()
    }

    /// Duration implied by the frame count.
    pub fn duration_secs(&self) -> f64 {
        self.total_frames() as f64 / self.format.sample_rate as f64
    }

    pub fn window(&self) -> QueryWindow {
        self.window
    }

    /// Gap and unreadable intervals that were filled with silence.
    pub fn discontinuities(&self) -> &[Discontinuity] {
        &self.discontinuities
    }

    pub fn is_seamless(&self) -> bool {
        self.discontinuities.is_empty()
    }

    /// Encode as a WAV stream.
    pub fn write_wav<W: Write + Seek>(&self, writer: W) -> Result<()> {
        let mut wav = WavWriter::new(writer, self.format.wav_spec())?;
        let mut pcm = wav.get_i16_writer(self.samples.len() as u32);
        for &s in &self.samples {
            pcm.write_sample(s);
        }
        pcm.flush()?;
        wav.finalize()?;
        Ok(())
    }

    pub fn to_wav_bytes(&self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::with_capacity(44 + self.samples.len() * 2));
        self.write_wav(&mut cursor)?;
        Ok(cursor.into_inner())
    }
}
