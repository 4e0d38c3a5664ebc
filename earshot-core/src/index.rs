//! Segment index: a derived, rebuildable view over storage.
//!
//! Nothing here is persisted. `SegmentIndex::scan` re-reads the store's
//! listing, so discarding an index and scanning again is always safe.

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, warn};

use crate::{error::Result, segment::Segment, storage::SegmentStore};

/// Time-ordered snapshot of sealed segment metadata.
#[derive(Debug, Clone, Default)]
pub struct SegmentIndex {
    segments: Vec<Segment>,
    /// `max_end[i]` = latest `end_time` among `segments[..=i]`. Monotone even
    /// when two sessions overlap after a wall-clock step.
    max_end: Vec<DateTime<Utc>>,
}

impl SegmentIndex {
    /// Build an index from the store's current listing.
    pub fn scan(store: &dyn SegmentStore) -> Result<Self> {
        let segments = store.scan()?;
        debug!(segments = segments.len(), "segment index rebuilt");
        Ok(Self::from_segments(segments))
    }

    /// Build an index from metadata already in hand. Sorts by start time.
    pub fn from_segments(mut segments: Vec<Segment>) -> Self {
        segments.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)));

        let mut max_end = Vec::with_capacity(segments.len());
        let mut latest: Option<DateTime<Utc>> = None;
        for seg in &segments {
            if let Some(prev_end) = latest {
                if seg.start_time < prev_end {
                    warn!(
                        segment = %seg.id,
                        overlap_until = %prev_end,
                        "segment overlaps an earlier segment"
                    );
                }
            }
            let end = latest.map_or(seg.end_time, |l| l.max(seg.end_time));
            latest = Some(end);
            max_end.push(end);
        }

        Self { segments, max_end }
    }

    /// Lazily iterate segment metadata in time order. Restartable: each call
    /// starts from the beginning of the snapshot.
    pub fn list_segments(&self) -> impl Iterator<Item = &Segment> + '_ {
        self.segments.iter()
    }

    /// Segments in reverse time order, the way a listing page shows them.
    pub fn newest_first(&self) -> impl Iterator<Item = &Segment> + '_ {
        self.segments.iter().rev()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Ordered segments with `start_time < end && end_time > start`.
    ///
    /// Binary-searches the first candidate, then scans forward: O(log n + k).
    /// An empty result is valid and means the window lies in a gap.
    pub fn find_overlapping(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<&Segment> {
        let first = self.max_end.partition_point(|&e| e <= start);
        self.segments[first..]
            .iter()
            .take_while(|s| s.start_time < end)
            .filter(|s| s.end_time > start)
            .collect()
    }

    /// Segments whose UTC start date falls within `[from, to]` (both inclusive,
    /// either optional).
    pub fn filter_by_date(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> impl Iterator<Item = &Segment> + '_ {
        self.segments.iter().filter(move |s| {
            let day = s.start_time.date_naive();
            from.map_or(true, |f| day >= f) && to.map_or(true, |t| day <= t)
        })
    }

    /// Span covered by the index, first start to latest end.
    pub fn extent(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let first = self.segments.first()?;
        let last = *self.max_end.last()?;
        Some((first.start_time, last))
    }
}
