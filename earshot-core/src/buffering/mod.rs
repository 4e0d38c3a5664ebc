//! Sample hand-off between the input callback and the capture worker.
//!
//! The ring is a `ringbuf::HeapRb<f32>` of mono samples at the device rate;
//! the worker's unsealed segment lives in [`pending`].

pub mod pending;

use ringbuf::{traits::Split, HeapRb};

pub use ringbuf::traits::{Consumer, Observer, Producer};

/// Written by the input callback.
pub type AudioProducer = ringbuf::HeapProd<f32>;

/// Drained by the capture worker.
pub type AudioConsumer = ringbuf::HeapCons<f32>;

/// 2^22 samples, about 87 s at 48 kHz; covers a publish stalled on fsync.
pub const RING_CAPACITY: usize = 1 << 22;

pub fn create_audio_ring() -> (AudioProducer, AudioConsumer) {
    HeapRb::<f32>::new(RING_CAPACITY).split()
}
