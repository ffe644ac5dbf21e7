//! Per-poll derived values handed to the differ and emitted on the bus.

use chrono::{DateTime, Utc};
use nwgnrcs::{PlaylistId, RundownId, SegmentId, StoryPayload, UnrankedSegment};
use nwgplayout::{DeviceSettings, WatchedQueue};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A segment as the control plane sees it: ordered, ranked, payload attached.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RundownSegment {
    pub external_id: SegmentId,
    pub name: String,
    pub modified: DateTime<Utc>,
    pub locator: String,
    pub rank: f64,
    pub float: bool,
    pub payload: StoryPayload,
}

impl RundownSegment {
    /// Builds the control-plane view of a cached story. The rank is filled
    /// in by the rank assigner after diffing.
    pub fn from_story(story: &UnrankedSegment) -> Self {
        Self {
            external_id: story.external_id.clone(),
            name: story.name.clone(),
            modified: story.modified,
            locator: story.locator.clone(),
            rank: 0.0,
            float: story.payload.float(),
            payload: story.payload.clone(),
        }
    }
}

/// One logical rundown of a playlist, rebuilt every poll.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rundown {
    pub external_id: RundownId,
    pub name: String,
    pub gateway_version: String,
    pub back_time: Option<String>,
    pub segments: Vec<RundownSegment>,
}

/// Assignment of one rundown's segments, before stories are attached.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedRundown {
    pub rundown_id: RundownId,
    pub segments: Vec<SegmentId>,
    pub back_time: Option<String>,
}

/// Partition of a playlist into rundowns, in playlist order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedPlaylist {
    pub playlist_id: PlaylistId,
    pub rundowns: Vec<ResolvedRundown>,
}

impl ResolvedPlaylist {
    pub fn rundown_ids(&self) -> impl Iterator<Item = &RundownId> {
        self.rundowns.iter().map(|r| &r.rundown_id)
    }
}

/// Effective watcher configuration.
///
/// Queue list, poll interval, version and debug flag come from the device
/// settings document; the rank tuning knobs come from the local config file.
#[derive(Clone, Debug)]
pub struct WatcherSettings {
    pub queues: Vec<WatchedQueue>,
    pub poll_interval: Duration,
    pub gateway_version: String,
    pub debug: bool,
    pub rank_fraction_floor: f64,
    pub rank_rebase_cooldown: Duration,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            queues: Vec::new(),
            poll_interval: Duration::from_millis(2000),
            gateway_version: "v1".to_string(),
            debug: false,
            rank_fraction_floor: 1e-6,
            rank_rebase_cooldown: Duration::from_secs(30),
        }
    }
}

impl WatcherSettings {
    /// Applies a pushed settings document, keeping the local tuning knobs.
    pub fn with_device(&self, device: &DeviceSettings) -> Self {
        Self {
            queues: device.queues.clone(),
            poll_interval: Duration::from_millis(device.poll_interval_ms),
            gateway_version: device.gateway_version.clone(),
            debug: device.debug,
            rank_fraction_floor: self.rank_fraction_floor,
            rank_rebase_cooldown: self.rank_rebase_cooldown,
        }
    }
}
