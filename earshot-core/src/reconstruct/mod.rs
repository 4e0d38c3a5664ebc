//! Range reconstruction: query window → exact sample data.
//!
//! ## Stages
//!
//! ```text
//! QueryWindow ─► SegmentIndex::find_overlapping ─► plan_window      (metadata only)
//!                                                      │
//!                                      SegmentStore::read_frames    (per audio span)
//!                                                      │
//!                                            ReconstructedRange     (explicit spans)
//!                                                      │
//!                                             ContinuousAudio       (gaps → silence)
//! ```
//!
//! Every request is independent: it works on its own buffers and holds no
//! shared mutable state, so any number can run alongside each other and
//! alongside the capture writer.

pub mod output;
pub mod plan;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info_span, warn};

use crate::{
    error::{EarshotError, Result},
    index::SegmentIndex,
    storage::SegmentStore,
};

pub use output::{
    ContinuousAudio, Discontinuity, DiscontinuityKind, RangeSpan, ReconstructedRange, SpanContent,
};
pub use plan::{plan_window, PlannedSpan, RangePlan, SpanSource};

/// A validated half-open `[start, end)` window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl QueryWindow {
    /// # Errors
    /// `InvalidWindow` when `end <= start`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if end <= start {
            return Err(EarshotError::InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }
}

/// What to do with intervals that have no captured audio.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GapPolicy {
    /// Fill with silence and report the interval as a discontinuity.
    #[default]
    FillSilence,
    /// Fail with `GapRejected` if the window contains any gap.
    Reject,
}

/// What to do with a segment whose bytes are missing or corrupt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CorruptionPolicy {
    /// Abort the whole request with the `StorageRead` error.
    Strict,
    /// Substitute silence for that segment's span and keep going.
    #[default]
    Lenient,
}

/// Resource bounds checked before any sample data is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeLimits {
    pub max_span: Option<TimeDelta>,
    pub max_segments: Option<usize>,
}

impl Default for RangeLimits {
    fn default() -> Self {
        Self {
            max_span: Some(TimeDelta::hours(6)),
            max_segments: Some(2048),
        }
    }
}

impl RangeLimits {
    pub const fn unbounded() -> Self {
        Self {
            max_span: None,
            max_segments: None,
        }
    }

    fn check_span(&self, window: &QueryWindow) -> Result<()> {
        match self.max_span {
            Some(max) if window.duration() > max => Err(EarshotError::RangeTooLarge {
                start: window.start,
                end: window.end,
                limit: format!("span exceeds {}s", max.num_seconds()),
            }),
            _ => Ok(()),
        }
    }

    fn check_segments(&self, window: &QueryWindow, count: usize) -> Result<()> {
        match self.max_segments {
            Some(max) if count > max => Err(EarshotError::RangeTooLarge {
                start: window.start,
                end: window.end,
                limit: format!("{count} segments exceeds {max}"),
            }),
            _ => Ok(()),
        }
    }
}

/// Cooperative cancellation for an in-flight request (e.g. client disconnect).
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Caller tolerance for one request.
#[derive(Debug, Clone, Default)]
pub struct ReconstructOptions {
    pub gap_policy: GapPolicy,
    pub corruption_policy: CorruptionPolicy,
    pub limits: RangeLimits,
    pub cancel: Option<CancelFlag>,
}

/// Stateless read path over a segment store.
#[derive(Clone)]
pub struct Reconstructor {
    store: Arc<dyn SegmentStore>,
}

impl std::fmt::Debug for Reconstructor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconstructor").finish_non_exhaustive()
    }
}

impl Reconstructor {
    pub fn new(store: Arc<dyn SegmentStore>) -> Self {
        Self { store }
    }

    /// A fresh index from the store's current listing.
    pub fn index(&self) -> Result<SegmentIndex> {
        SegmentIndex::scan(self.store.as_ref())
    }

    /// Metadata-only resolution: spans and explicit gaps, no sample reads.
    pub fn plan(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limits: &RangeLimits,
    ) -> Result<RangePlan> {
        let window = QueryWindow::new(start, end)?;
        limits.check_span(&window)?;
        self.plan_with_index(&self.index()?, window, limits)
    }

    pub fn plan_with_index(
        &self,
        index: &SegmentIndex,
        window: QueryWindow,
        limits: &RangeLimits,
    ) -> Result<RangePlan> {
        limits.check_span(&window)?;
        let overlapping = index.find_overlapping(window.start, window.end);
        limits.check_segments(&window, overlapping.len())?;
        Ok(plan_window(window, self.store.format(), &overlapping))
    }

    /// Resolve a window into ordered spans carrying sample data.
    pub fn resolve(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        options: &ReconstructOptions,
    ) -> Result<ReconstructedRange> {
        let window = QueryWindow::new(start, end)?;
        options.limits.check_span(&window)?;
        self.resolve_with_index(&self.index()?, window, options)
    }

    pub fn resolve_with_index(
        &self,
        index: &SegmentIndex,
        window: QueryWindow,
        options: &ReconstructOptions,
    ) -> Result<ReconstructedRange> {
        let span = info_span!("reconstruct", start = %window.start, end = %window.end);
        let _enter = span.enter();

        let plan = self.plan_with_index(index, window, &options.limits)?;

        if options.gap_policy == GapPolicy::Reject {
            if let Some(gap) = plan.gaps().next() {
                return Err(EarshotError::GapRejected {
                    start: gap.start_time,
                    end: gap.end_time,
                });
            }
        }

        let channels = plan.format.channels as usize;
        let mut spans = Vec::with_capacity(plan.spans.len());
        let mut unreadable = 0usize;

        for planned in plan.spans {
            let content = match planned.source {
                SpanSource::Gap => SpanContent::Gap,
                SpanSource::Segment { segment, local } => {
                    if options.cancel.as_ref().is_some_and(CancelFlag::is_cancelled) {
                        debug!("reconstruction cancelled");
                        return Err(EarshotError::Cancelled {
                            start: window.start,
                            end: window.end,
                        });
                    }

                    match self.store.read_frames(&segment, local) {
                        Ok(mut samples) => {
                            let frames = (planned.frames.end - planned.frames.start) as usize;
                            samples.resize(frames * channels, 0);
                            SpanContent::Audio {
                                segment: segment.id,
                                samples,
                            }
                        }
                        Err(e) if options.corruption_policy == CorruptionPolicy::Strict => {
                            return Err(e);
                        }
                        Err(e) => {
                            warn!(segment = %segment.id, "substituting silence: {e}");
                            unreadable += 1;
                            SpanContent::Unreadable {
                                segment: segment.id,
                                reason: e.to_string(),
                            }
                        }
                    }
                }
            };
            spans.push(RangeSpan {
                frames: planned.frames,
                start_time: planned.start_time,
                end_time: planned.end_time,
                content,
            });
        }

        debug!(
            frames = plan.total_frames,
            spans = spans.len(),
            unreadable,
            "range resolved"
        );

        Ok(ReconstructedRange {
            window,
            format: plan.format,
            total_frames: plan.total_frames,
            spans,
        })
    }

    /// Resolve a window into one continuous buffer whose length always
    /// matches the window, gaps included.
    pub fn reconstruct(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        options: &ReconstructOptions,
    ) -> Result<ContinuousAudio> {
        Ok(self.resolve(start, end, options)?.into_continuous())
    }

    pub fn reconstruct_with_index(
        &self,
        index: &SegmentIndex,
        window: QueryWindow,
        options: &ReconstructOptions,
    ) -> Result<ContinuousAudio> {
        Ok(self
            .resolve_with_index(index, window, options)?
            .into_continuous())
    }
}
