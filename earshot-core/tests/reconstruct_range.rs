//! End-to-end reconstruction over a real directory store.

use std::io::Cursor;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use earshot_core::{
    reconstruct::{DiscontinuityKind, SpanContent},
    AudioFormat, CancelFlag, CorruptionPolicy, DirStore, EarshotError, GapPolicy, RangeLimits,
    ReconstructOptions, Reconstructor, Segment, SegmentCodec, SegmentStore,
};

const RATE: u32 = 16_000;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 17, 10, 0, 0).unwrap()
}

fn secs(s: i64) -> TimeDelta {
    TimeDelta::seconds(s)
}

fn ms(m: i64) -> TimeDelta {
    TimeDelta::milliseconds(m)
}

/// Non-zero ramp so silence is distinguishable from audio.
fn ramp(len: usize, offset: usize) -> Vec<i16> {
    (0..len).map(|i| ((i + offset) % 1_000) as i16 + 1).collect()
}

struct Fixture {
    _dir: tempfile::TempDir,
    store: Arc<DirStore>,
}

impl Fixture {
    fn new(codec: SegmentCodec) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(DirStore::open(dir.path(), AudioFormat::mono16(RATE), codec).unwrap());
        Self { _dir: dir, store }
    }

    fn reconstructor(&self) -> Reconstructor {
        Reconstructor::new(self.store.clone())
    }

    /// Publish `count` contiguous one-second segments starting at `start`.
    fn session(&self, start: DateTime<Utc>, count: usize) -> Vec<Segment> {
        let mut next = start;
        (0..count)
            .map(|i| {
                let seg = self
                    .store
                    .publish(next, &ramp(RATE as usize, i * RATE as usize))
                    .unwrap();
                next = seg.end_time;
                seg
            })
            .collect()
    }
}

#[test]
fn boundary_trim_starts_at_local_offset() {
    for codec in [SegmentCodec::Wav, SegmentCodec::ZippedWav] {
        let fx = Fixture::new(codec);
        let samples = ramp(10 * RATE as usize, 0);
        fx.store.publish(t0(), &samples).unwrap();

        let audio = fx
            .reconstructor()
            .reconstruct(t0() + secs(2), t0() + secs(5), &ReconstructOptions::default())
            .unwrap();

        assert_eq!(audio.sample_data().len(), 3 * 16_000);
        assert_eq!(audio.sample_data(), &samples[32_000..80_000]);
        assert!(audio.is_seamless());
        assert_eq!(audio.sample_rate(), RATE);
        assert_eq!(audio.channel_count(), 1);
        assert_eq!(audio.bit_depth(), 16);
    }
}

#[test]
fn window_inside_session_has_full_coverage() {
    let fx = Fixture::new(SegmentCodec::ZippedWav);
    fx.session(t0(), 3);

    let (start, end) = (t0() + ms(500), t0() + ms(2_700));
    let audio = fx
        .reconstructor()
        .reconstruct(start, end, &ReconstructOptions::default())
        .unwrap();

    assert_eq!(audio.total_duration(), end - start);
    assert_eq!(audio.total_frames(), 35_200);
    assert!(audio.is_seamless());

    let expected: Vec<i16> = (8_000..43_200).map(|i| (i % 1_000) as i16 + 1).collect();
    assert_eq!(audio.sample_data(), expected.as_slice());
}

#[test]
fn inter_session_gap_is_silence_of_exact_length() {
    let fx = Fixture::new(SegmentCodec::Wav);
    fx.session(t0(), 2);
    fx.session(t0() + secs(5), 2);

    let audio = fx
        .reconstructor()
        .reconstruct(t0() + secs(1), t0() + secs(6), &ReconstructOptions::default())
        .unwrap();

    assert_eq!(audio.total_frames(), 5 * 16_000);
    let gaps = audio.discontinuities();
    assert_eq!(gaps.len(), 1);
    assert_eq!(gaps[0].kind, DiscontinuityKind::Gap);
    assert_eq!(gaps[0].frames, 16_000..64_000);
    assert_eq!(gaps[0].start_time, t0() + secs(2));
    assert_eq!(gaps[0].end_time, t0() + secs(5));

    let data = audio.sample_data();
    assert!(data[16_000..64_000].iter().all(|&s| s == 0));
    assert!(data[..16_000].iter().all(|&s| s != 0));
    assert!(data[64_000..].iter().all(|&s| s != 0));
}

#[test]
fn reconstruction_is_idempotent() {
    let fx = Fixture::new(SegmentCodec::ZippedWav);
    fx.session(t0(), 3);
    let r = fx.reconstructor();
    let opts = ReconstructOptions::default();
    let (start, end) = (t0() + ms(123), t0() + ms(2_987));

    let a = r.reconstruct(start, end, &opts).unwrap();
    let b = r.reconstruct(start, end, &opts).unwrap();
    assert_eq!(a.sample_data(), b.sample_data());
    assert_eq!(a.to_wav_bytes().unwrap(), b.to_wav_bytes().unwrap());
}

#[test]
fn window_outside_all_segments_is_one_gap() {
    let fx = Fixture::new(SegmentCodec::Wav);
    fx.session(t0(), 1);
    let r = fx.reconstructor();

    for (start, end) in [
        (t0() - secs(10), t0() - secs(8)),
        (t0() + secs(30), t0() + secs(31)),
    ] {
        let range = r.resolve(start, end, &ReconstructOptions::default()).unwrap();
        assert_eq!(range.spans.len(), 1);
        assert_eq!(range.spans[0].content, SpanContent::Gap);
        assert_eq!(range.spans[0].start_time, start);
        assert_eq!(range.spans[0].end_time, end);

        let audio = range.into_continuous();
        assert_eq!(audio.total_duration(), end - start);
        assert!(audio.sample_data().iter().all(|&s| s == 0));
    }
}

#[test]
fn empty_store_is_not_an_error() {
    let fx = Fixture::new(SegmentCodec::ZippedWav);
    let audio = fx
        .reconstructor()
        .reconstruct(t0(), t0() + ms(250), &ReconstructOptions::default())
        .unwrap();
    assert_eq!(audio.total_frames(), 4_000);
    assert_eq!(audio.discontinuities().len(), 1);
}

#[test]
fn corrupt_middle_segment_is_isolated_in_lenient_mode() {
    let fx = Fixture::new(SegmentCodec::Wav);
    let segs = fx.session(t0(), 3);
    std::fs::write(&segs[1].location, b"definitely not a wav file").unwrap();

    let (start, end) = (t0() + ms(500), t0() + ms(2_500));
    let audio = fx
        .reconstructor()
        .reconstruct(start, end, &ReconstructOptions::default())
        .unwrap();

    assert_eq!(audio.total_duration(), end - start);
    assert_eq!(audio.total_frames(), 32_000);

    let gaps = audio.discontinuities();
    assert_eq!(gaps.len(), 1);
    assert_eq!(gaps[0].frames, 8_000..24_000);
    match &gaps[0].kind {
        DiscontinuityKind::Unreadable { segment, .. } => assert_eq!(segment, &segs[1].id),
        other => panic!("expected unreadable discontinuity, got {other:?}"),
    }

    let data = audio.sample_data();
    assert!(data[..8_000].iter().all(|&s| s != 0));
    assert!(data[8_000..24_000].iter().all(|&s| s == 0));
    assert!(data[24_000..].iter().all(|&s| s != 0));
}

#[test]
fn corrupt_segment_fails_whole_range_in_strict_mode() {
    let fx = Fixture::new(SegmentCodec::ZippedWav);
    let segs = fx.session(t0(), 3);
    std::fs::remove_file(&segs[2].location).unwrap();
    std::fs::write(&segs[2].location, [0u8; 16]).unwrap();

    let opts = ReconstructOptions {
        corruption_policy: CorruptionPolicy::Strict,
        ..Default::default()
    };
    let err = fx
        .reconstructor()
        .reconstruct(t0(), t0() + secs(3), &opts)
        .unwrap_err();
    match err {
        EarshotError::StorageRead { segment, .. } => assert_eq!(segment, segs[2].id),
        other => panic!("expected StorageRead, got {other:?}"),
    }
}

#[test]
fn inverted_window_is_rejected() {
    let fx = Fixture::new(SegmentCodec::Wav);
    let r = fx.reconstructor();
    for end in [t0(), t0() - ms(1)] {
        let err = r
            .reconstruct(t0(), end, &ReconstructOptions::default())
            .unwrap_err();
        assert!(matches!(err, EarshotError::InvalidWindow { .. }), "{err:?}");
    }
}

#[test]
fn limits_reject_oversized_ranges_before_reading() {
    let fx = Fixture::new(SegmentCodec::Wav);
    fx.session(t0(), 3);
    let r = fx.reconstructor();

    let too_many = ReconstructOptions {
        limits: RangeLimits {
            max_span: None,
            max_segments: Some(2),
        },
        ..Default::default()
    };
    let err = r.reconstruct(t0(), t0() + secs(3), &too_many).unwrap_err();
    assert!(matches!(err, EarshotError::RangeTooLarge { .. }), "{err:?}");
    assert!(r.reconstruct(t0(), t0() + secs(2), &too_many).is_ok());

    let too_long = ReconstructOptions {
        limits: RangeLimits {
            max_span: Some(TimeDelta::minutes(1)),
            max_segments: None,
        },
        ..Default::default()
    };
    let err = r.reconstruct(t0(), t0() + secs(61), &too_long).unwrap_err();
    assert!(matches!(err, EarshotError::RangeTooLarge { .. }), "{err:?}");

    let unbounded = ReconstructOptions {
        limits: RangeLimits::unbounded(),
        ..Default::default()
    };
    assert!(r.plan(t0(), t0() + TimeDelta::days(2), &unbounded.limits).is_ok());
}

#[test]
fn reject_policy_reports_the_first_gap() {
    let fx = Fixture::new(SegmentCodec::Wav);
    fx.session(t0(), 1);
    fx.session(t0() + secs(3), 1);

    let opts = ReconstructOptions {
        gap_policy: GapPolicy::Reject,
        ..Default::default()
    };
    let r = fx.reconstructor();
    let err = r.reconstruct(t0(), t0() + secs(4), &opts).unwrap_err();
    match err {
        EarshotError::GapRejected { start, end } => {
            assert_eq!(start, t0() + secs(1));
            assert_eq!(end, t0() + secs(3));
        }
        other => panic!("expected GapRejected, got {other:?}"),
    }
    assert!(r.reconstruct(t0(), t0() + secs(1), &opts).is_ok());
}

#[test]
fn cancelled_request_returns_cancelled() {
    let fx = Fixture::new(SegmentCodec::Wav);
    fx.session(t0(), 2);

    let cancel = CancelFlag::new();
    cancel.cancel();
    let opts = ReconstructOptions {
        cancel: Some(cancel),
        ..Default::default()
    };
    let err = fx
        .reconstructor()
        .reconstruct(t0(), t0() + secs(2), &opts)
        .unwrap_err();
    assert!(matches!(err, EarshotError::Cancelled { .. }), "{err:?}");
}

#[test]
fn plan_reports_gaps_without_reading_samples() {
    let fx = Fixture::new(SegmentCodec::Wav);
    let first = fx.session(t0(), 1);
    fx.session(t0() + secs(4), 1);
    // Unreadable bytes do not matter when only planning.
    std::fs::write(&first[0].location, b"junk").unwrap();

    let plan = fx
        .reconstructor()
        .plan(t0() - secs(1), t0() + secs(6), &RangeLimits::default())
        .unwrap();

    assert_eq!(plan.total_frames, 7 * 16_000);
    assert_eq!(plan.segment_count(), 2);
    let gaps: Vec<_> = plan.gaps().map(|g| g.frames.clone()).collect();
    assert_eq!(gaps, [0..16_000, 32_000..80_000, 96_000..112_000]);
}

#[test]
fn exported_wav_matches_reconstruction() {
    let fx = Fixture::new(SegmentCodec::ZippedWav);
    fx.session(t0(), 2);
    let audio = fx
        .reconstructor()
        .reconstruct(t0() + ms(250), t0() + ms(1_750), &ReconstructOptions::default())
        .unwrap();

    let bytes = audio.to_wav_bytes().unwrap();
    let mut reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.sample_rate, RATE);
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.bits_per_sample, 16);
    let decoded: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(decoded, audio.sample_data());
    approx::assert_abs_diff_eq!(audio.duration_secs(), 1.5, epsilon = 1e-9);
}

#[test]
fn sub_second_windows_round_to_nearest_frame() {
    let fx = Fixture::new(SegmentCodec::Wav);
    fx.session(t0(), 1);
    // 31.25 us is exactly half a frame at 16 kHz: rounds away from zero.
    let start = t0() + TimeDelta::nanoseconds(31_250);
    let end = t0() + TimeDelta::nanoseconds(31_250 + 1_000_000);
    let range = fx
        .reconstructor()
        .resolve(start, end, &ReconstructOptions::default())
        .unwrap();
    assert_eq!(range.total_frames, 16);
    let audio = range.into_continuous();
    assert!(audio.is_seamless());
    assert_eq!(audio.sample_data()[0], 2);
}
