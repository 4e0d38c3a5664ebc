//! Sample-rate conversion from the device's native rate to the storage rate.
//!
//! Devices commonly capture at 44.1 or 48 kHz while segments are stored at
//! the configured rate (16 kHz by default). `RateConverter` wraps a rubato
//! `FastFixedIn` resampler on the capture worker thread, where allocation is
//! allowed. Equal rates skip rubato entirely.
//!
//! ```ignore
//! let mut rc = RateConverter::new(48_000, 16_000, 960)?;
//! let out = rc.process(&raw_samples)?;
//! let tail = rc.flush()?; // at end of session
//! ```

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::debug;

use crate::error::{EarshotError, Result};

/// Converts f32 mono audio from one fixed sample rate to another.
pub struct RateConverter {
    /// `None` in passthrough mode.
    resampler: Option<FastFixedIn<f32>>,
    /// Input held back until a full chunk is available.
    input_buf: Vec<f32>,
    chunk_size: usize,
    /// `[1][output_frames_max]`, reused between calls.
    output_buf: Vec<Vec<f32>>,
    ratio: f64,
}

impl RateConverter {
    /// # Errors
    /// `AudioStream` if rubato rejects the rate pair or chunk size.
    pub fn new(capture_rate: u32, target_rate: u32, chunk_size: usize) -> Result<Self> {
        let ratio = target_rate as f64 / capture_rate.max(1) as f64;

        if capture_rate == target_rate {
            return Ok(Self {
                resampler: None,
                input_buf: Vec::new(),
                chunk_size,
                output_buf: Vec::new(),
                ratio,
            });
        }

        let resampler =
            FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Cubic, chunk_size, 1)
                .map_err(|e| EarshotError::AudioStream(format!("resampler init: {e}")))?;

        let max_out = resampler.output_frames_max();
        debug!(capture_rate, target_rate, chunk_size, max_out, "resampling enabled");

        Ok(Self {
            resampler: Some(resampler),
            input_buf: Vec::with_capacity(chunk_size * 2),
            chunk_size,
            output_buf: vec![vec![0f32; max_out]; 1],
            ratio,
        })
    }

    /// Feed samples and return whatever output full chunks produced (may be empty).
    ///
    /// # Errors
    /// `AudioStream` if rubato fails on a chunk. The converter's output no
    /// longer matches its input after that, so callers end the session.
    pub fn process(&mut self, samples: &[f32]) -> Result<Vec<f32>> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(samples.to_vec());
        };

        self.input_buf.extend_from_slice(samples);
        let mut result = Vec::new();

        while self.input_buf.len() >= self.chunk_size {
            let chunk = &self.input_buf[..self.chunk_size];
            let (_consumed, produced) = resampler
                .process_into_buffer(&[chunk], &mut self.output_buf, None)
                .map_err(|e| EarshotError::AudioStream(format!("resampler: {e}")))?;
            result.extend_from_slice(&self.output_buf[0][..produced]);
            self.input_buf.drain(..self.chunk_size);
        }

        Ok(result)
    }

    /// Drain held-back input at end of session.
    ///
    /// The remainder is zero-padded to one chunk and only the output that
    /// corresponds to real input is returned.
    pub fn flush(&mut self) -> Result<Vec<f32>> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(Vec::new());
        };
        if self.input_buf.is_empty() {
            return Ok(Vec::new());
        }

        let pending = self.input_buf.len();
        let keep = (pending as f64 * self.ratio).round() as usize;
        self.input_buf.resize(self.chunk_size, 0.0);

        let processed =
            resampler.process_into_buffer(&[&self.input_buf[..]], &mut self.output_buf, None);
        self.input_buf.clear();
        let (_consumed, produced) =
            processed.map_err(|e| EarshotError::AudioStream(format!("resampler flush: {e}")))?;
        Ok(self.output_buf[0][..produced.min(keep)].to_vec())
    }

    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }

    /// Input samples held back waiting for a full chunk.
    pub fn pending_input(&self) -> usize {
        self.input_buf.len()
    }
}
