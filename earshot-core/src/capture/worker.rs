//! Blocking capture loop.
//!
//! ## Per iteration
//!
//! ```text
//! 1. Check the fault slot and running flag
//! 2. Drain up to DRAIN_CHUNK samples from the ring
//! 3. Resample to the storage rate, convert to i16
//! 4. Seal every full `segment_frames` block, carrying the surplus
//! ```
//!
//! On stop or fault the ring is drained, the resampler flushed and the
//! remainder sealed as a short final segment.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, error, info, info_span, warn};

use crate::{
    audio::{resample::RateConverter, FaultSlot},
    buffering::{pending::PendingSegment, AudioConsumer, Consumer, Observer},
    error::{EarshotError, Result},
    ipc::events::{CaptureStatus, SessionEndReason, SessionEvent, SessionId},
    segment::Segment,
    storage::SegmentStore,
    timebase,
};

/// Samples drained from the ring per iteration (20 ms at 48 kHz).
pub const DRAIN_CHUNK: usize = 960;

const SLEEP_EMPTY: Duration = Duration::from_millis(5);

#[derive(Default)]
pub struct CaptureDiagnostics {
    pub frames_drained: AtomicUsize,
    pub frames_resampled: AtomicUsize,
    pub segments_sealed: AtomicUsize,
    pub short_segments: AtomicUsize,
    pub publish_failures: AtomicUsize,
}

impl CaptureDiagnostics {
    pub fn reset(&self) {
        self.frames_drained.store(0, Ordering::Relaxed);
        self.frames_resampled.store(0, Ordering::Relaxed);
        self.segments_sealed.store(0, Ordering::Relaxed);
        self.short_segments.store(0, Ordering::Relaxed);
        self.publish_failures.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            frames_drained: self.frames_drained.load(Ordering::Relaxed),
            frames_resampled: self.frames_resampled.load(Ordering::Relaxed),
            segments_sealed: self.segments_sealed.load(Ordering::Relaxed),
            short_segments: self.short_segments.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub frames_drained: usize,
    pub frames_resampled: usize,
    pub segments_sealed: usize,
    pub short_segments: usize,
    pub publish_failures: usize,
}

/// Outcome of one capture session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub session: SessionId,
    /// Sealed segments in time order.
    pub segments: Vec<Segment>,
    pub end: SessionEndReason,
    pub diagnostics: DiagnosticsSnapshot,
}

/// Everything the worker needs, moved onto its thread in one piece.
pub struct WorkerContext {
    pub session: SessionId,
    pub store: Arc<dyn SegmentStore>,
    pub consumer: AudioConsumer,
    pub running: Arc<AtomicBool>,
    pub fault: FaultSlot,
    pub capture_sample_rate: u32,
    pub segment_frames: usize,
    pub events: broadcast::Sender<SessionEvent>,
    pub status: Arc<Mutex<CaptureStatus>>,
    pub diagnostics: Arc<CaptureDiagnostics>,
}

/// Turns pending frames into sealed, contiguous segments.
struct Sealer {
    store: Arc<dyn SegmentStore>,
    pending: PendingSegment,
    segment_frames: usize,
    /// Start of the next segment; `None` until the first sample arrives.
    next_start: Option<DateTime<Utc>>,
    sealed: Vec<Segment>,
}

impl Sealer {
    fn seal(&mut self, frames: usize, ctx: &WorkerContext) -> Result<()> {
        let Some(start) = self.next_start else {
            return Ok(());
        };
        let segment = self.store.publish(start, self.pending.head(frames))?;
        self.pending.consume(frames);
        self.next_start = Some(segment.end_time);

        ctx.diagnostics.segments_sealed.fetch_add(1, Ordering::Relaxed);
        if frames < self.segment_frames {
            ctx.diagnostics.short_segments.fetch_add(1, Ordering::Relaxed);
        }
        info!(segment = %segment.id, frames = segment.sample_count, "segment sealed");

        let _ = ctx.events.send(SessionEvent::SegmentSealed {
            session: ctx.session,
            segment: segment.clone(),
        });
        self.sealed.push(segment);
        Ok(())
    }

    fn seal_full(&mut self, ctx: &WorkerContext) -> Result<()> {
        while self.pending.frames() >= self.segment_frames {
            self.seal(self.segment_frames, ctx)?;
        }
        Ok(())
    }

    fn seal_remainder(&mut self, ctx: &WorkerContext) -> Result<()> {
        self.seal_full(ctx)?;
        if !self.pending.is_empty() {
            self.seal(self.pending.frames(), ctx)?;
        }
        Ok(())
    }
}

pub fn run(mut ctx: WorkerContext) -> SessionReport {
    let span = info_span!("capture", session = ctx.session);
    let _enter = span.enter();

    let format = ctx.store.format();
    info!(
        capture_rate = ctx.capture_sample_rate,
        storage_rate = format.sample_rate,
        segment_frames = ctx.segment_frames,
        "capture worker started"
    );

    let mut sealer = Sealer {
        store: Arc::clone(&ctx.store),
        pending: PendingSegment::new(format.channels, ctx.segment_frames + DRAIN_CHUNK),
        segment_frames: ctx.segment_frames.max(1),
        next_start: None,
        sealed: Vec::new(),
    };

    let end = match RateConverter::new(ctx.capture_sample_rate, format.sample_rate, DRAIN_CHUNK) {
        Ok(mut resampler) => capture_loop(&mut ctx, &mut sealer, &mut resampler),
        Err(e) => {
            error!("failed to create resampler: {e}");
            SessionEndReason::Faulted {
                reason: e.to_string(),
            }
        }
    };

    ctx.running.store(false, Ordering::SeqCst);
    *ctx.status.lock() = if end.is_fault() {
        CaptureStatus::Faulted
    } else {
        CaptureStatus::Stopped
    };
    let _ = ctx.events.send(SessionEvent::Ended {
        session: ctx.session,
        reason: end.clone(),
        segments: sealer.sealed.len(),
    });

    let diagnostics = ctx.diagnostics.snapshot();
    info!(
        frames_drained = diagnostics.frames_drained,
        frames_resampled = diagnostics.frames_resampled,
        segments_sealed = diagnostics.segments_sealed,
        short_segments = diagnostics.short_segments,
        publish_failures = diagnostics.publish_failures,
        "capture worker stopped"
    );

    SessionReport {
        session: ctx.session,
        segments: sealer.sealed,
        end,
        diagnostics,
    }
}

fn capture_loop(
    ctx: &mut WorkerContext,
    sealer: &mut Sealer,
    resampler: &mut RateConverter,
) -> SessionEndReason {
    let mut raw = vec![0f32; DRAIN_CHUNK];

    loop {
        if ctx.fault.is_set() || !ctx.running.load(Ordering::Relaxed) {
            break;
        }

        let n = ctx.consumer.pop_slice(&mut raw);
        if n == 0 {
            std::thread::sleep(SLEEP_EMPTY);
            continue;
        }

        if let Err(end) = ingest(ctx, sealer, resampler, &raw[..n]) {
            return end;
        }
    }

    // Whatever reached the ring before the stop or fault still belongs to this session.
    loop {
        let n = ctx.consumer.pop_slice(&mut raw);
        if n == 0 {
            break;
        }
        if let Err(end) = ingest(ctx, sealer, resampler, &raw[..n]) {
            return end;
        }
    }

    match resampler.flush() {
        Ok(tail) if !tail.is_empty() => {
            ctx.diagnostics
                .frames_resampled
                .fetch_add(tail.len(), Ordering::Relaxed);
            sealer.pending.extend_from_f32(&tail);
        }
        Ok(_) => {}
        Err(e) => return conversion_failed(ctx, sealer, e),
    }
    if let Err(e) = sealer.seal_remainder(ctx) {
        return publish_failed(ctx, e);
    }

    match ctx.fault.get() {
        Some(reason) => {
            warn!(%reason, "session ended by device fault");
            SessionEndReason::Faulted { reason }
        }
        None => SessionEndReason::Stopped,
    }
}

/// Resample one drained block into the pending segment and seal what is full.
///
/// `Err` carries the reason the session must end.
fn ingest(
    ctx: &WorkerContext,
    sealer: &mut Sealer,
    resampler: &mut RateConverter,
    raw: &[f32],
) -> std::result::Result<(), SessionEndReason> {
    if sealer.next_start.is_none() {
        // Everything still queued behind this block was captured before it arrived here.
        let backlog = raw.len() + ctx.consumer.occupied_len();
        let anchor =
            Utc::now() - timebase::frames_to_duration(backlog as u64, ctx.capture_sample_rate);
        sealer.next_start = Some(anchor);
        info!(anchor = %anchor, backlog, "session anchored");
    }

    ctx.diagnostics
        .frames_drained
        .fetch_add(raw.len(), Ordering::Relaxed);

    let resampled = match resampler.process(raw) {
        Ok(resampled) => resampled,
        Err(e) => return Err(conversion_failed(ctx, sealer, e)),
    };
    if resampled.is_empty() {
        return Ok(());
    }
    ctx.diagnostics
        .frames_resampled
        .fetch_add(resampled.len(), Ordering::Relaxed);
    sealer.pending.extend_from_f32(&resampled);
    debug!(raw = raw.len(), resampled = resampled.len(), pending = sealer.pending.frames(), "drained");

    sealer.seal_full(ctx).map_err(|e| publish_failed(ctx, e))
}

/// Audio lost in conversion would shift every later timestamp, so the
/// session ends here with what was already converted sealed.
fn conversion_failed(ctx: &WorkerContext, sealer: &mut Sealer, e: EarshotError) -> SessionEndReason {
    error!("sample conversion failed, ending session: {e}");
    ctx.fault.report(e.to_string());
    if let Err(e) = sealer.seal_remainder(ctx) {
        return publish_failed(ctx, e);
    }
    SessionEndReason::Faulted {
        reason: e.to_string(),
    }
}

fn publish_failed(ctx: &WorkerContext, e: EarshotError) -> SessionEndReason {
    ctx.diagnostics
        .publish_failures
        .fetch_add(1, Ordering::Relaxed);
    error!("segment publish failed, ending session: {e}");
    SessionEndReason::Faulted {
        reason: e.to_string(),
    }
}
