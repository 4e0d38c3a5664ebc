//! Segment container encode/decode.
//!
//! Both containers hold the same 16-bit PCM WAV. `Wav` files are seekable and
//! a ranged read decodes only the covering frames. `ZippedWav` entries are a
//! deflate stream, so a ranged read decodes up to the last needed frame and
//! discards the lead-in.

use std::fs::File;
use std::io::{BufReader, Cursor, Read, Write};
use std::ops::Range;

use hound::{WavReader, WavWriter};
use zip::{write::SimpleFileOptions, CompressionMethod, ZipArchive, ZipWriter};

use crate::{
    error::{EarshotError, Result},
    segment::{AudioFormat, Segment, SegmentCodec},
};

/// Name of the single entry inside a zipped segment.
const ENTRY_NAME: &str = "segment.wav";

/// Encode interleaved samples into the bytes of a container.
pub fn encode(format: &AudioFormat, codec: SegmentCodec, samples: &[i16]) -> Result<Vec<u8>> {
    let wav = encode_wav(format, samples)?;
    match codec {
        SegmentCodec::Wav => Ok(wav),
        SegmentCodec::ZippedWav => {
            let mut zip = ZipWriter::new(Cursor::new(Vec::with_capacity(wav.len() / 2)));
            let options =
                SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
            zip.start_file(ENTRY_NAME, options)?;
            zip.write_all(&wav)?;
            Ok(zip.finish()?.into_inner())
        }
    }
}

fn encode_wav(format: &AudioFormat, samples: &[i16]) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = WavWriter::new(&mut cursor, format.wav_spec())?;
        let mut pcm = writer.get_i16_writer(samples.len() as u32);
        for &s in samples {
            pcm.write_sample(s);
        }
        pcm.flush()?;
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Decode frames `frames` (per-channel positions) of a stored segment.
///
/// Every failure, including a header that disagrees with the segment's
/// metadata, is reported as `StorageRead` for that segment.
pub fn decode_frames(segment: &Segment, frames: Range<u64>) -> Result<Vec<i16>> {
    let frames = frames.start.min(segment.sample_count)..frames.end.min(segment.sample_count);
    if frames.is_empty() {
        return Ok(Vec::new());
    }

    let err = |e: &dyn std::fmt::Display| EarshotError::storage_read(&segment.id, e);
    let file = File::open(&segment.location).map_err(|e| err(&e))?;

    match segment.codec {
        SegmentCodec::Wav => {
            let mut reader = WavReader::new(BufReader::new(file)).map_err(|e| err(&e))?;
            check_header(segment, &reader)?;
            reader.seek(frames.start as u32).map_err(|e| err(&e))?;
            read_interleaved(segment, &mut reader, 0, frames.end - frames.start)
        }
        SegmentCodec::ZippedWav => {
            let mut archive = ZipArchive::new(BufReader::new(file)).map_err(|e| err(&e))?;
            let entry = archive.by_index(0).map_err(|e| err(&e))?;
            let mut reader = WavReader::new(entry).map_err(|e| err(&e))?;
            check_header(segment, &reader)?;
            read_interleaved(segment, &mut reader, frames.start, frames.end - frames.start)
        }
    }
}

fn check_header<R: Read>(segment: &Segment, reader: &WavReader<R>) -> Result<()> {
    let spec = reader.spec();
    let expected = segment.format.wav_spec();
    if spec != expected {
        return Err(EarshotError::storage_read(
            &segment.id,
            format!("container format {spec:?} does not match {expected:?}"),
        ));
    }
    if reader.duration() as u64 != segment.sample_count {
        return Err(EarshotError::storage_read(
            &segment.id,
            format!(
                "container holds {} frames, location says {}",
                reader.duration(),
                segment.sample_count
            ),
        ));
    }
    Ok(())
}

fn read_interleaved<R: Read>(
    segment: &Segment,
    reader: &mut WavReader<R>,
    skip_frames: u64,
    take_frames: u64,
) -> Result<Vec<i16>> {
    let channels = segment.format.channels as usize;
    let wanted = take_frames as usize * channels;
    let samples = reader
        .samples::<i16>()
        .skip(skip_frames as usize * channels)
        .take(wanted)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| EarshotError::storage_read(&segment.id, e))?;

    if samples.len() != wanted {
        return Err(EarshotError::storage_read(
            &segment.id,
            format!("truncated: wanted {wanted} samples, got {}", samples.len()),
        ));
    }
    Ok(samples)
}
