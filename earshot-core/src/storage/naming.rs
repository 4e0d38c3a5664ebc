//! Segment location encoding.
//!
//! `YYYYMMDD_HHMMSS.nnnnnnnnn_<frames>f.<ext>`, UTC. The name alone is
//! enough to recover a segment's start time and frame count, so the index
//! never needs a side database.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::segment::{SegmentCodec, SegmentId};

const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S%.9f";

/// File name for a sealed segment.
pub fn file_name(start: DateTime<Utc>, frames: u64, codec: SegmentCodec) -> String {
    format!(
        "{}_{}f.{}",
        SegmentId::from_start(start),
        frames,
        codec.extension()
    )
}

/// Hidden staging name used while a segment is being written.
pub fn partial_name(final_name: &str) -> String {
    format!(".{final_name}.partial")
}

/// Recover `(start_time, frames, codec)` from a segment file name.
///
/// Returns `None` for hidden files, staging files and anything that does
/// not follow the encoding.
pub fn parse_file_name(name: &str) -> Option<(DateTime<Utc>, u64, SegmentCodec)> {
    if name.starts_with('.') {
        return None;
    }

    let (stem, codec) = if let Some(stem) = name.strip_suffix(".wav.zip") {
        (stem, SegmentCodec::ZippedWav)
    } else if let Some(stem) = name.strip_suffix(".wav") {
        (stem, SegmentCodec::Wav)
    } else {
        return None;
    };

    let (stamp, frames) = stem.rsplit_once('_')?;
    let frames: u64 = frames.strip_suffix('f')?.parse().ok()?;
    if frames == 0 {
        return None;
    }

    let start = NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT)
        .ok()?
        .and_utc();
    Some((start, frames, codec))
}
