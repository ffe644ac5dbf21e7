use crate::model::{CachedSegment, DeviceSettings, Result, StatusCode};
use async_trait::async_trait;
use nwgnrcs::{RundownId, SegmentId};
use std::collections::HashMap;
use tokio::sync::broadcast;

/// Everything the watcher needs from the playout control plane.
#[async_trait]
pub trait PlayoutClient: Send + Sync {
    /// Report the device status after a poll cycle.
    async fn set_status(&self, code: StatusCode, messages: Vec<String>) -> Result<()>;

    /// Fetch the control plane's cache entries for the given segments.
    ///
    /// Segments the control plane has never ingested are omitted from the
    /// returned map.
    async fn segments_cache(
        &self,
        rundown: &RundownId,
        segments: &[SegmentId],
    ) -> Result<HashMap<SegmentId, CachedSegment>>;

    /// Current device settings document.
    async fn settings(&self) -> Result<DeviceSettings>;

    /// Subscribe to settings changes.
    ///
    /// Every push from the control plane delivers the full new document.
    fn subscribe_settings(&self) -> broadcast::Receiver<DeviceSettings>;
}
