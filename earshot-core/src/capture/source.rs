//! Where captured samples come from.

use std::any::Any;

use crate::{
    audio::{AudioCapture, CaptureSink},
    error::Result,
};

/// A live input, opened by the capture worker.
pub struct OpenedInput {
    /// Rate of the mono f32 samples pushed into the sink.
    pub sample_rate: u32,
    /// Keeps the input alive; dropped on the worker thread when the session ends.
    pub guard: Box<dyn Any>,
}

/// Seam between an audio input and the capture writer.
///
/// `open` runs on the worker thread, so the returned guard never has to be
/// `Send`. Implementations push mono f32 samples into `sink.producer` until
/// `sink.running` is cleared, and report unrecoverable read errors through
/// `sink.fault`.
pub trait CaptureSource: Send + 'static {
    /// # Errors
    /// `DeviceUnavailable` (or `AudioStream`) when the input cannot be opened.
    fn open(self: Box<Self>, sink: CaptureSink) -> Result<OpenedInput>;
}

/// The system microphone via cpal.
#[derive(Debug, Clone, Default)]
pub struct CpalSource {
    preferred_device: Option<String>,
}

impl CpalSource {
    pub fn new(preferred_device: Option<String>) -> Self {
        Self { preferred_device }
    }
}

impl CaptureSource for CpalSource {
    fn open(self: Box<Self>, sink: CaptureSink) -> Result<OpenedInput> {
        let capture = AudioCapture::open_with_preference(sink, self.preferred_device.as_deref())?;
        Ok(OpenedInput {
            sample_rate: capture.sample_rate,
            guard: Box::new(capture),
        })
    }
}
