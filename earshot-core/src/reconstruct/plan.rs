//! Span planning: which frames of which segment land where in the output.
//!
//! Planning reads no sample data. It maps a query window onto output frame
//! positions `[0, N)`, `N = round((end - start) * rate)`, and tiles that
//! range exactly with audio spans and gap spans. A window shorter than half
//! a frame has `N = 0` and no spans, wherever it falls.

use std::ops::Range;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::QueryWindow;
use crate::{
    segment::{AudioFormat, Segment},
    timebase::{add_frames, frames_between},
};

/// Where a planned span's frames come from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum SpanSource {
    /// Frames `local` of `segment`. If `local` is shorter than the span
    /// (one-frame rounding skew) the remainder is silence.
    Segment { segment: Segment, local: Range<u64> },
    /// No captured audio for this interval.
    Gap,
}

/// One contiguous piece of the output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedSpan {
    /// Output frame positions covered by this span.
    pub frames: Range<u64>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub source: SpanSource,
}

impl PlannedSpan {
    pub fn is_gap(&self) -> bool {
        matches!(self.source, SpanSource::Gap)
    }

    pub fn frame_count(&self) -> u64 {
        self.frames.end - self.frames.start
    }
}

/// Metadata-only resolution of a query window.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RangePlan {
    pub window: QueryWindow,
    pub format: AudioFormat,
    pub total_frames: u64,
    pub spans: Vec<PlannedSpan>,
}

impl RangePlan {
    /// Gap spans, in time order. These are the explicit discontinuities.
    pub fn gaps(&self) -> impl Iterator<Item = &PlannedSpan> + '_ {
        self.spans.iter().filter(|s| s.is_gap())
    }

    pub fn segment_count(&self) -> usize {
        self.spans.iter().filter(|s| !s.is_gap()).count()
    }
}

/// Plan `window` against the ordered segments that overlap it.
pub fn plan_window(window: QueryWindow, format: AudioFormat, overlapping: &[&Segment]) -> RangePlan {
    let rate = format.sample_rate;
    let (ws, we) = (window.start(), window.end());
    let total = frames_between(ws, we, rate).max(0) as u64;

    let time_at = |pos: u64| -> DateTime<Utc> {
        if pos >= total {
            we
        } else {
            add_frames(ws, pos, rate)
        }
    };
    let span = |frames: Range<u64>, source: SpanSource| PlannedSpan {
        start_time: time_at(frames.start),
        end_time: time_at(frames.end),
        frames,
        source,
    };
    let clamp = |f: i64| -> u64 { f.clamp(0, total as i64) as u64 };

    if total == 0 {
        return RangePlan {
            window,
            format,
            total_frames: 0,
            spans: Vec::new(),
        };
    }

    if overlapping.is_empty() {
        return RangePlan {
            window,
            format,
            total_frames: total,
            spans: vec![span(0..total, SpanSource::Gap)],
        };
    }

    let mut spans = Vec::with_capacity(overlapping.len() * 2 + 1);
    let mut cursor = 0u64;

    for &seg in overlapping {
        let place_start = clamp(frames_between(ws, seg.start_time, rate));
        let place_end = clamp(frames_between(ws, seg.end_time, rate));

        // Earlier audio wins where segments overlap.
        let out_start = place_start.max(cursor);
        if out_start >= place_end {
            continue;
        }
        if out_start > cursor {
            spans.push(span(cursor..out_start, SpanSource::Gap));
        }

        let trim_start = frames_between(seg.start_time, ws, rate).max(0) as u64;
        let trim_end = frames_between(seg.start_time, we, rate)
            .clamp(0, seg.sample_count as i64) as u64;

        let local_start = trim_start + (out_start - place_start);
        let local_end = trim_end
            .min(local_start + (place_end - out_start))
            .max(local_start);

        spans.push(span(
            out_start..place_end,
            SpanSource::Segment {
                segment: seg.clone(),
                local: local_start..local_end,
            },
        ));
        cursor = place_end;
    }

    if cursor < total {
        spans.push(span(cursor..total, SpanSource::Gap));
    }

    RangePlan {
        window,
        format,
        total_frames: total,
        spans,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::SegmentCodec;
    use chrono::{TimeDelta, TimeZone};
    use std::path::PathBuf;

    const RATE: u32 = 16_000;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 10, 0, 0).unwrap() + TimeDelta::seconds(secs)
    }

    fn seg(start: DateTime<Utc>, frames: u64) -> Segment {
        Segment::new(
            start,
            frames,
            AudioFormat::mono16(RATE),
            SegmentCodec::Wav,
            PathBuf::from("s.wav"),
        )
    }

    fn plan(start: DateTime<Utc>, end: DateTime<Utc>, segs: &[Segment]) -> RangePlan {
        let refs: Vec<&Segment> = segs.iter().collect();
        plan_window(
            QueryWindow::new(start, end).unwrap(),
            AudioFormat::mono16(RATE),
            &refs,
        )
    }

    fn local(span: &PlannedSpan) -> Range<u64> {
        match &span.source {
            SpanSource::Segment { local, .. } => local.clone(),
            SpanSource::Gap => panic!("expected audio span"),
        }
    }

    fn assert_tiles(p: &RangePlan) {
        let mut cursor = 0;
        for s in &p.spans {
            assert_eq!(s.frames.start, cursor, "spans must be contiguous");
            cursor = s.frames.end;
        }
        assert_eq!(cursor, p.total_frames);
    }

    #[test]
    fn boundary_trim_inside_one_segment() {
        let p = plan(t(2), t(5), &[seg(t(0), 10 * RATE as u64)]);
        assert_eq!(p.total_frames, 48_000);
        assert_eq!(p.spans.len(), 1);
        assert_eq!(p.spans[0].frames, 0..48_000);
        assert_eq!(local(&p.spans[0]), 32_000..80_000);
        assert_eq!(p.gaps().count(), 0);
    }

    #[test]
    fn inter_session_gap_is_positioned_exactly() {
        let a = seg(t(0), 10 * RATE as u64);
        let b = seg(t(15), 10 * RATE as u64);
        let p = plan(t(5), t(20), &[a, b]);

        assert_tiles(&p);
        assert_eq!(p.spans.len(), 3);
        assert_eq!(local(&p.spans[0]), 80_000..160_000);
        assert!(p.spans[1].is_gap());
        assert_eq!(p.spans[1].frames, 80_000..160_000);
        assert_eq!(p.spans[1].start_time, t(10));
        assert_eq!(p.spans[1].end_time, t(15));
        assert_eq!(local(&p.spans[2]), 0..80_000);
    }

    #[test]
    fn leading_and_trailing_gaps() {
        let p = plan(t(-3), t(12), &[seg(t(0), 10 * RATE as u64)]);
        assert_tiles(&p);
        assert_eq!(p.spans.len(), 3);
        assert!(p.spans[0].is_gap());
        assert_eq!(p.spans[0].frame_count(), 3 * RATE as u64);
        assert_eq!(local(&p.spans[1]), 0..160_000);
        assert!(p.spans[2].is_gap());
        assert_eq!(p.spans[2].frame_count(), 2 * RATE as u64);
        assert_eq!(p.spans[2].end_time, t(12));
    }

    #[test]
    fn no_overlap_is_one_gap_over_the_whole_window() {
        let p = plan(t(100), t(101), &[]);
        assert_eq!(p.spans.len(), 1);
        assert!(p.spans[0].is_gap());
        assert_eq!(p.spans[0].frames, 0..RATE as u64);
        assert_eq!(p.spans[0].start_time, t(100));
        assert_eq!(p.spans[0].end_time, t(101));
    }

    #[test]
    fn contiguous_segments_produce_no_gaps() {
        let a = seg(t(0), 10 * RATE as u64);
        let b = seg(a.end_time, 10 * RATE as u64);
        let c = seg(b.end_time, 5 * RATE as u64);
        let p = plan(t(3), t(24), &[a, b, c]);
        assert_tiles(&p);
        assert_eq!(p.gaps().count(), 0);
        assert_eq!(p.segment_count(), 3);
        assert_eq!(local(&p.spans[2]), 0..4 * RATE as u64);
    }

    #[test]
    fn sub_frame_boundaries_still_tile_exactly() {
        // Start a third of a frame into a segment, end mid-frame in the next.
        let a = seg(t(0), RATE as u64);
        let b = seg(a.end_time, RATE as u64);
        let start = t(0) + TimeDelta::nanoseconds(20_833);
        let end = t(1) + TimeDelta::nanoseconds(500_020_000);
        let p = plan(start, end, &[a, b]);
        assert_tiles(&p);
        assert_eq!(p.total_frames, frames_between(start, end, RATE) as u64);
        assert_eq!(p.gaps().count(), 0);
    }

    #[test]
    fn overlapping_segments_keep_earlier_audio() {
        let a = seg(t(0), 10 * RATE as u64);
        let b = seg(t(8), 4 * RATE as u64);
        let p = plan(t(0), t(12), &[a, b]);
        assert_tiles(&p);
        assert_eq!(p.spans.len(), 2);
        assert_eq!(p.spans[0].frames, 0..160_000);
        // b's first two seconds are shadowed by a.
        assert_eq!(p.spans[1].frames, 160_000..192_000);
        assert_eq!(local(&p.spans[1]), 32_000..64_000);
    }

    #[test]
    fn sub_frame_window_has_no_spans_anywhere() {
        let a = seg(t(0), RATE as u64);
        let tiny = TimeDelta::nanoseconds(10);

        let mid = t(0) + TimeDelta::milliseconds(500);
        let inside = plan(mid, mid + tiny, &[a]);
        let in_gap = plan(t(5), t(5) + tiny, &[]);

        for p in [&inside, &in_gap] {
            assert_eq!(p.total_frames, 0);
            assert!(p.spans.is_empty());
            assert_eq!(p.gaps().count(), 0);
        }
    }
}
