use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::segment::SegmentId;

/// All errors produced by earshot-core.
#[derive(Debug, Error)]
pub enum EarshotError {
    #[error("audio input unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("capture session is already running")]
    AlreadyRunning,

    #[error("no capture session is running")]
    NotRunning,

    #[error("segment {segment} unreadable: {reason}")]
    StorageRead { segment: SegmentId, reason: String },

    #[error("storage write failed: {0}")]
    Storage(String),

    #[error("invalid window: end {end} is not after start {start}")]
    InvalidWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("range {start} .. {end} too large: {limit}")]
    RangeTooLarge {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: String,
    },

    #[error("range contains a gap from {start} to {end}")]
    GapRejected {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("reconstruction of {start} .. {end} was cancelled")]
    Cancelled {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EarshotError {
    pub(crate) fn storage_read(segment: &SegmentId, reason: impl ToString) -> Self {
        Self::StorageRead {
            segment: segment.clone(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EarshotError>;
