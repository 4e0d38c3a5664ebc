//! `CaptureWriter`: session lifecycle over a segment store.
//!
//! ## Lifecycle
//!
//! ```text
//! CaptureWriter::new()
//!     └─► start_session()   → input open, worker spawned, status = Capturing
//!         └─► stop_session() → running=false, remainder sealed, worker joined
//! ```
//!
//! ## Threading
//!
//! The input is opened *inside* the worker thread because `cpal::Stream` is
//! `!Send`. A sync channel carries the open result back to `start_session`,
//! so device errors surface to the caller before it returns. The worker is a
//! plain OS thread so `stop_session` can join it and hand back the report.

pub mod source;
pub mod worker;

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    mpsc, Arc,
};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::{
    audio::{CaptureSink, FaultSlot},
    buffering::create_audio_ring,
    error::{EarshotError, Result},
    ipc::events::{CaptureStatus, SessionEndReason, SessionEvent, SessionId},
    storage::SegmentStore,
    timebase,
};

pub use source::{CaptureSource, CpalSource, OpenedInput};
pub use worker::{CaptureDiagnostics, DiagnosticsSnapshot, SessionReport};

/// Session events buffered for slow subscribers.
const BROADCAST_CAP: usize = 256;

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Length of every segment except a session's last. Default: 60 s.
    pub segment_duration: Duration,
    /// Input device name; falls back to the system default when absent or missing.
    pub preferred_input_device: Option<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            segment_duration: Duration::from_secs(60),
            preferred_input_device: None,
        }
    }
}

struct ActiveSession {
    id: SessionId,
    handle: JoinHandle<worker::SessionReport>,
}

/// Single writer that rotates live input into sealed segments.
pub struct CaptureWriter {
    config: CaptureConfig,
    store: Arc<dyn SegmentStore>,
    running: Arc<AtomicBool>,
    status: Arc<Mutex<CaptureStatus>>,
    active: Mutex<Option<ActiveSession>>,
    next_session: AtomicU64,
    events: broadcast::Sender<SessionEvent>,
    diagnostics: Arc<CaptureDiagnostics>,
}

impl CaptureWriter {
    pub fn new(config: CaptureConfig, store: Arc<dyn SegmentStore>) -> Self {
        let (events, _) = broadcast::channel(BROADCAST_CAP);
        Self {
            config,
            store,
            running: Arc::new(AtomicBool::new(false)),
            status: Arc::new(Mutex::new(CaptureStatus::Idle)),
            active: Mutex::new(None),
            next_session: AtomicU64::new(1),
            events,
            diagnostics: Arc::new(CaptureDiagnostics::default()),
        }
    }

    /// Frames per full segment at the store's rate.
    pub fn segment_frames(&self) -> usize {
        timebase::frames_in(self.config.segment_duration, self.store.format().sample_rate).max(1)
            as usize
    }

    /// Start capturing from the configured microphone.
    pub fn start_session(&self) -> Result<SessionId> {
        let source = CpalSource::new(self.config.preferred_input_device.clone());
        self.start_session_with(Box::new(source))
    }

    /// Start capturing from an arbitrary source.
    ///
    /// # Errors
    /// `AlreadyRunning` while a session is live; the source's open error
    /// (normally `DeviceUnavailable`) if the input cannot be opened.
    pub fn start_session_with(&self, source: Box<dyn CaptureSource>) -> Result<SessionId> {
        let mut active = self.active.lock();
        if let Some(previous) = active.take() {
            if !previous.handle.is_finished() {
                *active = Some(previous);
                return Err(EarshotError::AlreadyRunning);
            }
            // Ended on its own (fault) and nobody collected the report.
            match previous.handle.join() {
                Ok(report) => warn!(
                    session = report.session,
                    segments = report.segments.len(),
                    "discarding report of unclaimed session"
                ),
                Err(_) => warn!(session = previous.id, "previous capture worker panicked"),
            }
        }

        let format = self.store.format();
        if format.channels != 1 || format.bits_per_sample != 16 {
            return Err(EarshotError::Storage(format!(
                "capture writes 16-bit mono; store format is {} channel(s) at {} bits",
                format.channels, format.bits_per_sample
            )));
        }

        let session = self.next_session.fetch_add(1, Ordering::Relaxed);
        self.diagnostics.reset();
        self.running.store(true, Ordering::SeqCst);

        let (producer, consumer) = create_audio_ring();
        let fault = FaultSlot::new();
        let sink = CaptureSink {
            producer,
            running: Arc::clone(&self.running),
            fault: fault.clone(),
        };

        let store = Arc::clone(&self.store);
        let running = Arc::clone(&self.running);
        let status = Arc::clone(&self.status);
        let events = self.events.clone();
        let diagnostics = Arc::clone(&self.diagnostics);
        let segment_frames = self.segment_frames();

        let (open_tx, open_rx) = mpsc::channel::<Result<u32>>();

        let spawned = std::thread::Builder::new()
            .name(format!("earshot-capture-{session}"))
            .spawn(move || {
                // Opened on this thread: the guard may not be `Send`.
                let opened = match source.open(sink) {
                    Ok(opened) => opened,
                    Err(e) => {
                        running.store(false, Ordering::SeqCst);
                        *status.lock() = CaptureStatus::Faulted;
                        let _ = open_tx.send(Err(e));
                        return worker::SessionReport {
                            session,
                            segments: Vec::new(),
                            end: SessionEndReason::Faulted {
                                reason: "input could not be opened".into(),
                            },
                            diagnostics: DiagnosticsSnapshot::default(),
                        };
                    }
                };

                *status.lock() = CaptureStatus::Capturing;
                let _ = events.send(SessionEvent::Started {
                    session,
                    sample_rate: format.sample_rate,
                    capture_sample_rate: opened.sample_rate,
                });
                let _ = open_tx.send(Ok(opened.sample_rate));

                let report = worker::run(worker::WorkerContext {
                    session,
                    store,
                    consumer,
                    running,
                    fault,
                    capture_sample_rate: opened.sample_rate,
                    segment_frames,
                    events,
                    status,
                    diagnostics,
                });

                // Input released on this thread.
                drop(opened.guard);
                report
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(EarshotError::Io(e));
            }
        };

        match open_rx.recv() {
            Ok(Ok(capture_rate)) => {
                info!(session, capture_rate, "capture session started");
                *active = Some(ActiveSession {
                    id: session,
                    handle,
                });
                Ok(session)
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                warn!(session, "capture session failed to start: {e}");
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                self.running.store(false, Ordering::SeqCst);
                *self.status.lock() = CaptureStatus::Faulted;
                Err(EarshotError::Other(anyhow::anyhow!(
                    "capture worker died before opening the input"
                )))
            }
        }
    }

    /// Seal the partial segment, release the input and collect the session report.
    ///
    /// Also collects a session that already ended on a fault.
    ///
    /// # Errors
    /// `NotRunning` when no session was started since the last stop.
    pub fn stop_session(&self) -> Result<SessionReport> {
        let Some(active) = self.active.lock().take() else {
            return Err(EarshotError::NotRunning);
        };

        self.running.store(false, Ordering::SeqCst);
        info!(session = active.id, "capture stop requested");

        active.handle.join().map_err(|_| {
            *self.status.lock() = CaptureStatus::Faulted;
            EarshotError::Other(anyhow::anyhow!(
                "capture worker for session {} panicked",
                active.id
            ))
        })
    }

    /// True while the worker is sealing segments.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> CaptureStatus {
        *self.status.lock()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    pub fn store(&self) -> &Arc<dyn SegmentStore> {
        &self.store
    }
}

impl Drop for CaptureWriter {
    fn drop(&mut self) {
        if self.active.lock().is_some() {
            if let Err(e) = self.stop_session() {
                warn!("capture session did not stop cleanly: {e}");
            }
        }
    }
}
