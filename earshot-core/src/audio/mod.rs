//! Microphone input via the cpal backend.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated priority.
//! It **must not**:
//! - Allocate heap memory on the mono path
//! - Block on a mutex or condvar
//! - Perform I/O
//!
//! Samples are downmixed to mono f32 and written straight into the SPSC
//! ring producer, whose `push_slice` is lock-free and allocation-free.
//! Stream errors go to the session's [`FaultSlot`]; that path may lock,
//! since it only runs once the stream is already failing.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS). `AudioCapture` is therefore opened and dropped on the capture
//! worker thread, never moved across threads.

pub mod device;
pub mod resample;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, StreamTrait},
    SampleFormat, Stream, StreamConfig,
};
use parking_lot::Mutex;
#[cfg(feature = "audio-cpal")]
use tracing::{error, info, warn};

use crate::{
    buffering::{AudioProducer, Producer},
    error::{EarshotError, Result},
};

/// First-error-wins slot the input stream uses to report a device failure
/// to the capture worker.
#[derive(Debug, Clone, Default)]
pub struct FaultSlot(Arc<Mutex<Option<String>>>);

impl FaultSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure. Later reports are ignored.
    pub fn report(&self, reason: impl Into<String>) {
        let mut slot = self.0.lock();
        if slot.is_none() {
            *slot = Some(reason.into());
        }
    }

    pub fn get(&self) -> Option<String> {
        self.0.lock().clone()
    }

    pub fn is_set(&self) -> bool {
        self.0.lock().is_some()
    }
}

/// Everything an input stream needs to feed the capture worker.
pub struct CaptureSink {
    /// Mono f32 samples in [-1.0, 1.0] at the input's native rate.
    pub producer: AudioProducer,
    /// Cleared by `stop_session`; the callback no-ops once it is `false`.
    pub running: Arc<AtomicBool>,
    /// Where read errors are reported.
    pub fault: FaultSlot,
}

/// Handle to an active cpal input stream.
///
/// **Not `Send`**: create and drop this type on the same OS thread.
pub struct AudioCapture {
    /// Kept alive so the stream is not dropped prematurely.
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    running: Arc<AtomicBool>,
    /// Native capture sample rate reported by the device (Hz).
    pub sample_rate: u32,
}

impl AudioCapture {
    /// Open an input device by preferred name, otherwise fall back to the
    /// default input device and then the first available device.
    ///
    /// # Errors
    /// `DeviceUnavailable` when no usable input exists or its config cannot
    /// be read; `AudioStream` if cpal fails to build or start the stream.
    #[cfg(feature = "audio-cpal")]
    pub fn open_with_preference(sink: CaptureSink, preferred_device_name: Option<&str>) -> Result<Self> {
        let CaptureSink {
            mut producer,
            running,
            fault,
        } = sink;

        let device = select_input_device(preferred_device_name)?;

        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening input device"
        );

        let supported = device
            .default_input_config()
            .map_err(|e| EarshotError::DeviceUnavailable(e.to_string()))?;

        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();
        info!(sample_rate, channels, "input config selected");

        let config = StreamConfig {
            channels,
            sample_rate: supported.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };

        let ch = channels.max(1) as usize;
        let cb_running = Arc::clone(&running);
        let overflow = fault.clone();
        let on_error = move |err: cpal::StreamError| {
            error!("audio stream error: {err}");
            fault.report(err.to_string());
        };

        let stream = match supported.sample_format() {
            SampleFormat::F32 => {
                let mut mix: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[f32], _info| {
                        if !cb_running.load(Ordering::Relaxed) {
                            return;
                        }
                        if ch == 1 {
                            push_or_fault(&mut producer, data, &overflow);
                            return;
                        }
                        downmix(data, ch, &mut mix, |s| s);
                        push_or_fault(&mut producer, &mix, &overflow);
                    },
                    on_error,
                    None,
                )
            }

            SampleFormat::I16 => {
                let mut mix: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[i16], _info| {
                        if !cb_running.load(Ordering::Relaxed) {
                            return;
                        }
                        downmix(data, ch, &mut mix, |s| s as f32 / 32768.0);
                        push_or_fault(&mut producer, &mix, &overflow);
                    },
                    on_error,
                    None,
                )
            }

            SampleFormat::U8 => {
                let mut mix: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[u8], _info| {
                        if !cb_running.load(Ordering::Relaxed) {
                            return;
                        }
                        downmix(data, ch, &mut mix, |s| (s as f32 - 128.0) / 128.0);
                        push_or_fault(&mut producer, &mix, &overflow);
                    },
                    on_error,
                    None,
                )
            }

            fmt => {
                return Err(EarshotError::AudioStream(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }
        .map_err(|e| EarshotError::AudioStream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| EarshotError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            running,
            sample_rate,
        })
    }

    /// Signal the callback to no-op on its next invocation.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
impl AudioCapture {
    pub fn open_with_preference(_sink: CaptureSink, _preferred_device_name: Option<&str>) -> Result<Self> {
        Err(EarshotError::DeviceUnavailable(
            "compiled without audio-cpal feature".into(),
        ))
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Preferred name, then the host default, then the first listed input.
#[cfg(feature = "audio-cpal")]
fn select_input_device(preferred: Option<&str>) -> Result<cpal::Device> {
    use cpal::traits::HostTrait;

    let host = cpal::default_host();

    if let Some(wanted) = preferred {
        let found = host
            .input_devices()
            .map_err(|e| warn!("cannot list inputs to find '{wanted}': {e}"))
            .ok()
            .and_then(|mut inputs| inputs.find(|d| d.name().is_ok_and(|n| n == wanted)));
        match found {
            Some(device) => return Ok(device),
            None => warn!(device = wanted, "preferred input not present, using default"),
        }
    }

    if let Some(device) = host.default_input_device() {
        return Ok(device);
    }

    warn!("host reports no default input, trying the first one listed");
    host.input_devices()
        .map_err(|e| EarshotError::DeviceUnavailable(e.to_string()))?
        .next()
        .ok_or_else(|| EarshotError::DeviceUnavailable("no input device found".into()))
}

/// Average interleaved frames into `mix` (reused between callbacks).
#[cfg(feature = "audio-cpal")]
fn downmix<T: Copy>(data: &[T], ch: usize, mix: &mut Vec<f32>, to_f32: impl Fn(T) -> f32) {
    let frames = data.len() / ch;
    mix.resize(frames, 0.0);
    for (f, out) in mix.iter_mut().enumerate() {
        let base = f * ch;
        let sum: f32 = data[base..base + ch].iter().map(|&s| to_f32(s)).sum();
        *out = sum / ch as f32;
    }
}

/// Push into the ring; a short write ends the session through `fault`.
///
/// Segment timestamps are derived from frame counts, so a dropped block
/// would shift every later segment. Capture stops instead.
#[cfg_attr(not(feature = "audio-cpal"), allow(dead_code))]
pub(crate) fn push_or_fault(producer: &mut AudioProducer, samples: &[f32], fault: &FaultSlot) -> usize {
    let written = producer.push_slice(samples);
    if written < samples.len() {
        fault.report(format!(
            "capture ring full: dropped {} frames",
            samples.len() - written
        ));
    }
    written
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringbuf::{traits::Split, HeapRb};

    #[test]
    fn fault_slot_keeps_first_report() {
        let slot = FaultSlot::new();
        assert!(!slot.is_set());
        slot.report("device unplugged");
        slot.clone().report("stream closed");
        assert_eq!(slot.get().as_deref(), Some("device unplugged"));
    }

    #[test]
    fn full_ring_reports_dropped_frames_as_fault() {
        let (mut producer, _consumer) = HeapRb::<f32>::new(8).split();
        let fault = FaultSlot::new();

        assert_eq!(push_or_fault(&mut producer, &[0.5; 6], &fault), 6);
        assert!(!fault.is_set());

        assert_eq!(push_or_fault(&mut producer, &[0.5; 6], &fault), 2);
        assert_eq!(
            fault.get().as_deref(),
            Some("capture ring full: dropped 4 frames")
        );
    }

    #[cfg(not(feature = "audio-cpal"))]
    #[test]
    fn open_without_backend_reports_unavailable_device() {
        let (producer, _consumer) = HeapRb::<f32>::new(8).split();
        let sink = CaptureSink {
            producer,
            running: Arc::new(AtomicBool::new(true)),
            fault: FaultSlot::new(),
        };
        let opened = AudioCapture::open_with_preference(sink, None);
        assert!(matches!(opened, Err(EarshotError::DeviceUnavailable(_))));
    }
}
