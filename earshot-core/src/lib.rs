//! # earshot-core
//!
//! Continuous microphone capture into sealed, timestamped segments, and
//! sample-accurate reconstruction of any time window from them.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → AudioCapture → SPSC RingBuffer → capture worker (OS thread)
//!                                                    │
//!                                        resample + PendingSegment
//!                                                    │
//!                                   SegmentStore::publish (atomic rename)
//!                                                    │
//!            SegmentIndex::scan ◄────────── segment files on disk
//!                    │
//!            Reconstructor::reconstruct → ContinuousAudio / WAV / bundle
//! ```
//!
//! The audio callback only pushes into the ring. Sealed segments are
//! immutable, so readers never coordinate with the writer.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod bundle;
pub mod capture;
pub mod error;
pub mod index;
pub mod ipc;
pub mod reconstruct;
pub mod segment;
pub mod storage;
pub mod timebase;

// Convenience re-exports for downstream crates
pub use audio::device::{list_input_devices, InputDevice};
pub use bundle::{bundle_file_name, write_bundle, write_dated_bundle};
pub use capture::{
    CaptureConfig, CaptureSource, CaptureWriter, CpalSource, DiagnosticsSnapshot, SessionReport,
};
pub use error::{EarshotError, Result};
pub use index::SegmentIndex;
pub use ipc::events::{CaptureStatus, SessionEndReason, SessionEvent, SessionId};
pub use reconstruct::{
    CancelFlag, ContinuousAudio, CorruptionPolicy, GapPolicy, QueryWindow, RangeLimits,
    ReconstructOptions, ReconstructedRange, Reconstructor,
};
pub use segment::{AudioFormat, Segment, SegmentCodec, SegmentId};
pub use storage::{DirStore, SegmentStore};
