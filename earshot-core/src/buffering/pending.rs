//! The in-progress (unsealed) segment buffer.
//!
//! Owned exclusively by the capture worker and never exposed to readers.

/// Convert one normalised f32 sample to 16-bit PCM, clamping out-of-range input.
#[inline]
pub fn f32_to_pcm16(s: f32) -> i16 {
    (s * 32768.0).round().clamp(-32768.0, 32767.0) as i16
}

/// Interleaved 16-bit samples awaiting sealing.
#[derive(Debug, Clone)]
pub struct PendingSegment {
    samples: Vec<i16>,
    channels: usize,
}

impl PendingSegment {
    pub fn new(channels: u16, capacity_frames: usize) -> Self {
        let channels = channels.max(1) as usize;
        Self {
            samples: Vec::with_capacity(capacity_frames * channels),
            channels,
        }
    }

    /// Append normalised f32 samples, converting to PCM.
    pub fn extend_from_f32(&mut self, samples: &[f32]) {
        self.samples.extend(samples.iter().copied().map(f32_to_pcm16));
    }

    /// Whole frames currently buffered.
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    /// The first `frames` frames, ready to publish.
    pub fn head(&self, frames: usize) -> &[i16] {
        &self.samples[..frames.min(self.frames()) * self.channels]
    }

    /// Drop the first `frames` frames after they were sealed, keeping the surplus.
    pub fn consume(&mut self, frames: usize) {
        let n = frames.min(self.frames()) * self.channels;
        self.samples.drain(..n);
    }
}
