//! Multi-segment zip bundles for bulk download.

use std::io::{Seek, Write};

use chrono::NaiveDate;
use tracing::{debug, info};
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

use crate::{
    error::Result,
    index::SegmentIndex,
    reconstruct::QueryWindow,
    segment::{Segment, SegmentCodec},
    storage::SegmentStore,
};

/// Archive name for segments recorded between two dates, e.g.
/// `recordings_from_20261001_to_20261017.zip`.
pub fn bundle_file_name(from: NaiveDate, to: NaiveDate) -> String {
    format!(
        "recordings_from_{}_to_{}.zip",
        from.format("%Y%m%d"),
        to.format("%Y%m%d")
    )
}

/// Write every segment overlapping `window` into a zip archive, each under
/// its stored file name, and return the bundled segments in time order.
///
/// Zipped segments are stored as-is; plain WAVs are deflated. An empty
/// archive is valid.
///
/// # Errors
/// `StorageRead` for the first segment whose bytes cannot be read, or an
/// archive error from the writer.
pub fn write_bundle<W: Write + Seek>(
    index: &SegmentIndex,
    store: &dyn SegmentStore,
    window: QueryWindow,
    writer: W,
) -> Result<Vec<Segment>> {
    let segments: Vec<Segment> = index
        .find_overlapping(window.start(), window.end())
        .into_iter()
        .cloned()
        .collect();
    write_segments(store, &segments, writer)?;

    info!(
        segments = segments.len(),
        start = %window.start(),
        end = %window.end(),
        "bundle written"
    );
    Ok(segments)
}

/// Like [`write_bundle`], but selects segments whose UTC start date falls
/// in `from..=to`, matching the names [`bundle_file_name`] gives.
pub fn write_dated_bundle<W: Write + Seek>(
    index: &SegmentIndex,
    store: &dyn SegmentStore,
    from: NaiveDate,
    to: NaiveDate,
    writer: W,
) -> Result<Vec<Segment>> {
    let segments: Vec<Segment> = index.filter_by_date(Some(from), Some(to)).cloned().collect();
    write_segments(store, &segments, writer)?;

    info!(segments = segments.len(), %from, %to, "bundle written");
    Ok(segments)
}

fn write_segments<W: Write + Seek>(store: &dyn SegmentStore, segments: &[Segment], writer: W) -> Result<()> {
    let mut zip = ZipWriter::new(writer);
    for segment in segments {
        let bytes = store.read_raw(segment)?;
        let method = match segment.codec {
            SegmentCodec::ZippedWav => CompressionMethod::Stored,
            SegmentCodec::Wav => CompressionMethod::Deflated,
        };
        zip.start_file(entry_name(segment), SimpleFileOptions::default().compression_method(method))?;
        zip.write_all(&bytes)?;
        debug!(segment = %segment.id, bytes = bytes.len(), "bundled");
    }
    zip.finish()?;
    Ok(())
}

fn entry_name(segment: &Segment) -> String {
    segment
        .location
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("{}.{}", segment.id, segment.codec.extension()))
}
