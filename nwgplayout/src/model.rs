use chrono::{DateTime, Utc};
use nwgnrcs::{QueueId, SegmentId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PlayoutError>;

#[derive(Error, Debug)]
pub enum PlayoutError {
    /// The control plane could not be reached.
    #[error("Control plane unreachable: {0}")]
    Unreachable(String),

    /// The control plane rejected the device credentials.
    #[error("Control plane rejected credentials: {0}")]
    Unauthorized(String),

    #[error("Control plane error: {0}")]
    Other(String),
}

/// Device status as understood by the control plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusCode {
    Good,
    WarningMinor,
    WarningMajor,
    Bad,
}

impl StatusCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCode::Good => "GOOD",
            StatusCode::WarningMinor => "WARNING_MINOR",
            StatusCode::WarningMajor => "WARNING_MAJOR",
            StatusCode::Bad => "BAD",
        }
    }
}

/// What the control plane remembers about an ingested segment.
///
/// Enough for the watcher to rebuild its diff baseline after a restart:
/// if the cached locator matches the current one, no event is re-emitted,
/// and the cached rank is preserved.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CachedSegment {
    pub external_id: SegmentId,
    pub name: String,
    pub modified: DateTime<Utc>,
    pub locator: String,
    pub rank: f64,
}

/// One watched NRCS queue, with an optional human-friendly alias.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedQueue {
    pub queue: QueueId,
    pub alias: Option<String>,
}

impl WatchedQueue {
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: QueueId(queue.into()),
            alias: None,
        }
    }
}

/// The peripheral-device settings document.
///
/// Pushed by the control plane; a change makes the supervisor rebuild the
/// watcher wholesale.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeviceSettings {
    pub queues: Vec<WatchedQueue>,
    pub poll_interval_ms: u64,
    pub gateway_version: String,
    pub debug: bool,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            queues: Vec::new(),
            poll_interval_ms: 2000,
            gateway_version: "v1".to_string(),
            debug: false,
        }
    }
}
