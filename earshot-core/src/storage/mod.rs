//! Durable segment storage.
//!
//! The store is the single source of truth: a segment exists exactly when
//! its file is present under a parseable name. Publishing is atomic (write a
//! hidden staging file, `sync_all`, rename), so a scan never observes a
//! partially written segment.

pub mod codec;
pub mod naming;

use std::fs;
use std::io::Write;
use std::ops::Range;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::{
    error::{EarshotError, Result},
    segment::{AudioFormat, Segment, SegmentCodec},
};

/// Contract for segment persistence backends.
///
/// Sealed segments are immutable; implementations must make `publish`
/// atomic with respect to `scan`.
pub trait SegmentStore: Send + Sync + 'static {
    /// The fixed format every segment in this store uses.
    fn format(&self) -> AudioFormat;

    /// Persist one sealed segment starting at `start`.
    ///
    /// `samples` are interleaved; their length must be a whole number of frames.
    fn publish(&self, start: DateTime<Utc>, samples: &[i16]) -> Result<Segment>;

    /// All sealed segments, ordered by start time.
    fn scan(&self) -> Result<Vec<Segment>>;

    /// Decode a per-channel frame range of one segment.
    fn read_frames(&self, segment: &Segment, frames: Range<u64>) -> Result<Vec<i16>>;

    /// The stored container bytes of one segment, for individual downloads.
    fn read_raw(&self, segment: &Segment) -> Result<Vec<u8>>;
}

/// Filesystem-backed store: one file per segment in a flat directory.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
    format: AudioFormat,
    codec: SegmentCodec,
}

impl DirStore {
    /// Open (creating if needed) a store rooted at `root`.
    ///
    /// `codec` only affects newly published segments; scans read both containers.
    ///
    /// # Errors
    /// `Storage` for a format segments cannot be written in: zero rate,
    /// zero channels, or anything other than 16-bit samples.
    pub fn open(root: impl Into<PathBuf>, format: AudioFormat, codec: SegmentCodec) -> Result<Self> {
        if format.sample_rate == 0 || format.channels == 0 || format.bits_per_sample != 16 {
            return Err(EarshotError::Storage(format!(
                "unsupported segment format: {} Hz, {} channel(s), {} bits",
                format.sample_rate, format.channels, format.bits_per_sample
            )));
        }
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            format,
            codec,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn codec(&self) -> SegmentCodec {
        self.codec
    }
}

impl SegmentStore for DirStore {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn publish(&self, start: DateTime<Utc>, samples: &[i16]) -> Result<Segment> {
        let channels = self.format.channels as usize;
        if samples.is_empty() || samples.len() % channels != 0 {
            return Err(EarshotError::Storage(format!(
                "refusing to publish {} samples for {} channel(s)",
                samples.len(),
                channels
            )));
        }
        let frames = (samples.len() / channels) as u64;

        let name = naming::file_name(start, frames, self.codec);
        let final_path = self.root.join(&name);
        let staging_path = self.root.join(naming::partial_name(&name));

        let bytes = codec::encode(&self.format, self.codec, samples)?;
        let written = (|| -> std::io::Result<()> {
            let mut file = fs::File::create(&staging_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            fs::rename(&staging_path, &final_path)
        })();

        if let Err(e) = written {
            let _ = fs::remove_file(&staging_path);
            return Err(EarshotError::Storage(format!("{name}: {e}")));
        }

        debug!(segment = %name, frames, bytes = bytes.len(), "segment published");
        Ok(Segment::new(
            start,
            frames,
            self.format,
            self.codec,
            final_path,
        ))
    }

    fn scan(&self) -> Result<Vec<Segment>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(root = %self.root.display(), "segment directory missing");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut segments = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            match naming::parse_file_name(name) {
                Some((start, frames, codec)) => {
                    segments.push(Segment::new(start, frames, self.format, codec, entry.path()));
                }
                None => warn!(file = name, "skipping unrecognised file in segment directory"),
            }
        }

        segments.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)));
        Ok(segments)
    }

    fn read_frames(&self, segment: &Segment, frames: Range<u64>) -> Result<Vec<i16>> {
        codec::decode_frames(segment, frames)
    }

    fn read_raw(&self, segment: &Segment) -> Result<Vec<u8>> {
        fs::read(&segment.location).map_err(|e| EarshotError::storage_read(&segment.id, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ramp(len: usize) -> Vec<i16> {
        (0..len).map(|i| (i % 30_000) as i16).collect()
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 10, 0, 0).unwrap()
    }

    #[test]
    fn publish_then_scan_recovers_metadata_from_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirStore::open(dir.path(), AudioFormat::mono16(16_000), SegmentCodec::ZippedWav)
            .unwrap();

        let first = store.publish(start(), &ramp(16_000)).unwrap();
        let second = store.publish(first.end_time, &ramp(8_000)).unwrap();

        let scanned = store.scan().unwrap();
        assert_eq!(scanned, vec![first.clone(), second]);
        assert_eq!(scanned[1].start_time, first.end_time);
    }

    #[test]
    fn ranged_reads_match_source_for_both_containers() {
        for codec in [SegmentCodec::Wav, SegmentCodec::ZippedWav] {
            let dir = tempfile::tempdir().unwrap();
            let store = DirStore::open(dir.path(), AudioFormat::mono16(16_000), codec).unwrap();
            let samples = ramp(20_000);
            let seg = store.publish(start(), &samples).unwrap();

            let slice = store.read_frames(&seg, 1_234..5_678).unwrap();
            assert_eq!(slice, samples[1_234..5_678], "codec {codec:?}");

            let all = store.read_frames(&seg, 0..seg.sample_count).unwrap();
            assert_eq!(all, samples, "codec {codec:?}");
        }
    }

    #[test]
    fn stereo_frames_are_interleaved() {
        let dir = tempfile::tempdir().unwrap();
        let format = AudioFormat {
            sample_rate: 8_000,
            channels: 2,
            bits_per_sample: 16,
        };
        let store = DirStore::open(dir.path(), format, SegmentCodec::Wav).unwrap();
        let samples = ramp(200);
        let seg = store.publish(start(), &samples).unwrap();
        assert_eq!(seg.sample_count, 100);
        assert_eq!(store.read_frames(&seg, 10..20).unwrap(), samples[20..40]);
    }

    #[test]
    fn corrupt_bytes_surface_as_storage_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirStore::open(dir.path(), AudioFormat::mono16(16_000), SegmentCodec::ZippedWav)
            .unwrap();
        let seg = store.publish(start(), &ramp(4_000)).unwrap();
        fs::write(&seg.location, b"definitely not a zip archive").unwrap();

        match store.read_frames(&seg, 0..10) {
            Err(EarshotError::StorageRead { segment, .. }) => assert_eq!(segment, seg.id),
            other => panic!("expected StorageRead, got {other:?}"),
        }
    }

    #[test]
    fn frame_count_mismatch_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let store =
            DirStore::open(dir.path(), AudioFormat::mono16(16_000), SegmentCodec::Wav).unwrap();
        let seg = store.publish(start(), &ramp(4_000)).unwrap();

        let renamed = dir
            .path()
            .join(naming::file_name(seg.start_time, 5_000, SegmentCodec::Wav));
        fs::rename(&seg.location, &renamed).unwrap();
        let lying = store.scan().unwrap().remove(0);
        assert_eq!(lying.sample_count, 5_000);
        assert!(matches!(
            store.read_frames(&lying, 0..10),
            Err(EarshotError::StorageRead { .. })
        ));
    }

    #[test]
    fn scan_ignores_staging_and_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let store =
            DirStore::open(dir.path(), AudioFormat::mono16(16_000), SegmentCodec::Wav).unwrap();
        store.publish(start(), &ramp(100)).unwrap();
        fs::write(dir.path().join(".20261017_100001.000000000_100f.wav.partial"), b"x").unwrap();
        fs::write(dir.path().join("readme.txt"), b"x").unwrap();

        assert_eq!(store.scan().unwrap().len(), 1);
    }

    #[test]
    fn empty_publish_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store =
            DirStore::open(dir.path(), AudioFormat::mono16(16_000), SegmentCodec::Wav).unwrap();
        assert!(matches!(
            store.publish(start(), &[]),
            Err(EarshotError::Storage(_))
        ));
    }

    #[test]
    fn unwritable_formats_are_refused_at_open() {
        let dir = tempfile::tempdir().unwrap();
        for format in [
            AudioFormat {
                sample_rate: 8_000,
                channels: 0,
                bits_per_sample: 16,
            },
            AudioFormat {
                sample_rate: 8_000,
                channels: 1,
                bits_per_sample: 24,
            },
            AudioFormat {
                sample_rate: 0,
                channels: 1,
                bits_per_sample: 16,
            },
        ] {
            let err = DirStore::open(dir.path(), format, SegmentCodec::Wav).unwrap_err();
            assert!(matches!(err, EarshotError::Storage(_)), "{format:?}: {err:?}");
        }
        assert!(DirStore::open(dir.path(), AudioFormat::mono16(8_000), SegmentCodec::Wav).is_ok());
    }
}
