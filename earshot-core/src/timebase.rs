//! Exact time ↔ frame conversion.
//!
//! Wall-clock instants are `DateTime<Utc>`; every conversion to or from a
//! frame position goes through integer nanoseconds held in `i128`, so a
//! conversion never accumulates floating-point error no matter how many
//! segments a range spans.
//!
//! Rounding is to the nearest frame (or nanosecond), ties away from zero.

use chrono::{DateTime, TimeDelta, Utc};

const NANOS_PER_SEC: i128 = 1_000_000_000;

/// Integer division rounding to nearest, ties away from zero. `d` must be positive.
pub fn round_div(n: i128, d: i128) -> i128 {
    debug_assert!(d > 0);
    let q = n / d;
    let r = n % d;
    if 2 * r.abs() >= d {
        q + n.signum()
    } else {
        q
    }
}

/// Nanoseconds since the Unix epoch.
pub fn epoch_nanos(t: DateTime<Utc>) -> i128 {
    t.timestamp() as i128 * NANOS_PER_SEC + t.timestamp_subsec_nanos() as i128
}

/// Signed number of frames between two instants at `rate` Hz.
pub fn frames_between(from: DateTime<Utc>, to: DateTime<Utc>, rate: u32) -> i64 {
    let delta = epoch_nanos(to) - epoch_nanos(from);
    round_div(delta * rate as i128, NANOS_PER_SEC) as i64
}

/// Duration of `frames` frames at `rate` Hz, rounded to the nearest nanosecond.
pub fn frames_to_duration(frames: u64, rate: u32) -> TimeDelta {
    let nanos = round_div(frames as i128 * NANOS_PER_SEC, rate as i128);
    TimeDelta::nanoseconds(nanos as i64)
}

/// The instant `frames` frames after `t`.
pub fn add_frames(t: DateTime<Utc>, frames: u64, rate: u32) -> DateTime<Utc> {
    t + frames_to_duration(frames, rate)
}

/// Frame count for a wall-clock length, e.g. the configured segment length.
pub fn frames_in(duration: std::time::Duration, rate: u32) -> u64 {
    round_div(duration.as_nanos() as i128 * rate as i128, NANOS_PER_SEC).max(0) as u64
}
