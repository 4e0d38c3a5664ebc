//! Capture events forwarded to the serving layer.
//!
//! All types serialise with camelCase field names and a `type` tag so a
//! listener can relay them as JSON without further mapping.

use serde::{Deserialize, Serialize};

use crate::segment::Segment;

/// Identifier of one continuous capture session, unique per writer.
pub type SessionId = u64;

/// Broadcast on the writer's event channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum SessionEvent {
    /// The input device is open and samples are flowing.
    #[serde(rename_all = "camelCase")]
    Started {
        session: SessionId,
        sample_rate: u32,
        capture_sample_rate: u32,
    },
    /// A segment was sealed and is now visible to readers.
    #[serde(rename_all = "camelCase")]
    SegmentSealed { session: SessionId, segment: Segment },
    /// The session is over; no further segments will be sealed.
    #[serde(rename_all = "camelCase")]
    Ended {
        session: SessionId,
        reason: SessionEndReason,
        segments: usize,
    },
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum SessionEndReason {
    /// `stop_session` was called.
    Stopped,
    /// A device read or persistence failure ended the session early.
    Faulted { reason: String },
}

impl SessionEndReason {
    pub fn is_fault(&self) -> bool {
        matches!(self, SessionEndReason::Faulted { .. })
    }
}

/// Current state of the capture writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureStatus {
    /// No session has been started yet.
    Idle,
    /// A session is sealing segments.
    Capturing,
    /// The last session was stopped cleanly.
    Stopped,
    /// The last session ended on a fault; restart is an external decision.
    Faulted,
}
