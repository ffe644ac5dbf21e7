//! In-memory control plane used by the test suite.

use crate::client::PlayoutClient;
use crate::model::{CachedSegment, DeviceSettings, PlayoutError, Result, StatusCode};
use async_trait::async_trait;
use nwgnrcs::{RundownId, SegmentId};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

struct Inner {
    statuses: Vec<(StatusCode, Vec<String>)>,
    cache: HashMap<RundownId, HashMap<SegmentId, CachedSegment>>,
    cache_requests: Vec<(RundownId, Vec<SegmentId>)>,
    settings: DeviceSettings,
    fail_status: bool,
}

/// Scripted [`PlayoutClient`]: records every status report and cache
/// request, serves a seeded segment cache and lets tests push settings.
pub struct MemoryPlayoutClient {
    inner: Mutex<Inner>,
    settings_tx: broadcast::Sender<DeviceSettings>,
}

impl MemoryPlayoutClient {
    pub fn new(settings: DeviceSettings) -> Self {
        let (settings_tx, _) = broadcast::channel(16);
        Self {
            inner: Mutex::new(Inner {
                statuses: Vec::new(),
                cache: HashMap::new(),
                cache_requests: Vec::new(),
                settings,
                fail_status: false,
            }),
            settings_tx,
        }
    }

    /// Seed the cache with segments the control plane already ingested.
    pub fn seed_cache(&self, rundown: &RundownId, segments: Vec<CachedSegment>) {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner.cache.entry(rundown.clone()).or_default();
        for segment in segments {
            entry.insert(segment.external_id.clone(), segment);
        }
    }

    /// Push a new settings document to subscribers.
    pub fn push_settings(&self, settings: DeviceSettings) {
        self.inner.lock().unwrap().settings = settings.clone();
        let _ = self.settings_tx.send(settings);
    }

    /// Make `set_status` fail, to exercise the fatal-at-init path.
    pub fn set_fail_status(&self, fail: bool) {
        self.inner.lock().unwrap().fail_status = fail;
    }

    /// All statuses reported so far, oldest first.
    pub fn statuses(&self) -> Vec<(StatusCode, Vec<String>)> {
        self.inner.lock().unwrap().statuses.clone()
    }

    pub fn last_status(&self) -> Option<StatusCode> {
        self.inner.lock().unwrap().statuses.last().map(|(code, _)| *code)
    }

    /// Every `segments_cache` call received, in order.
    pub fn cache_requests(&self) -> Vec<(RundownId, Vec<SegmentId>)> {
        self.inner.lock().unwrap().cache_requests.clone()
    }
}

#[async_trait]
impl PlayoutClient for MemoryPlayoutClient {
    async fn set_status(&self, code: StatusCode, messages: Vec<String>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_status {
            return Err(PlayoutError::Unreachable("scripted failure".to_string()));
        }
        inner.statuses.push((code, messages));
        Ok(())
    }

    async fn segments_cache(
        &self,
        rundown: &RundownId,
        segments: &[SegmentId],
    ) -> Result<HashMap<SegmentId, CachedSegment>> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .cache_requests
            .push((rundown.clone(), segments.to_vec()));

        let Some(entry) = inner.cache.get(rundown) else {
            return Ok(HashMap::new());
        };
        Ok(segments
            .iter()
            .filter_map(|id| entry.get(id).map(|seg| (id.clone(), seg.clone())))
            .collect())
    }

    async fn settings(&self) -> Result<DeviceSettings> {
        Ok(self.inner.lock().unwrap().settings.clone())
    }

    fn subscribe_settings(&self) -> broadcast::Receiver<DeviceSettings> {
        self.settings_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn cached(id: &str, locator: &str, rank: f64) -> CachedSegment {
        CachedSegment {
            external_id: SegmentId(id.to_string()),
            name: id.to_string(),
            modified: Utc::now(),
            locator: locator.to_string(),
            rank,
        }
    }

    #[tokio::test]
    async fn test_status_recording() {
        let client = MemoryPlayoutClient::new(DeviceSettings::default());
        client.set_status(StatusCode::Good, vec![]).await.unwrap();
        client
            .set_status(StatusCode::WarningMajor, vec!["poll failed".to_string()])
            .await
            .unwrap();

        assert_eq!(client.last_status(), Some(StatusCode::WarningMajor));
        assert_eq!(client.statuses().len(), 2);
    }

    #[tokio::test]
    async fn test_cache_serves_only_known_segments() {
        let client = MemoryPlayoutClient::new(DeviceSettings::default());
        let rundown = RundownId("Q_1".to_string());
        client.seed_cache(&rundown, vec![cached("a", "loc-a1", 1.0)]);

        let result = client
            .segments_cache(
                &rundown,
                &[SegmentId("a".to_string()), SegmentId("b".to_string())],
            )
            .await
            .unwrap();

        assert_eq!(result.len(), 1);
        assert!(result.contains_key(&SegmentId("a".to_string())));
        assert_eq!(client.cache_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_settings_push_reaches_subscribers() {
        let client = MemoryPlayoutClient::new(DeviceSettings::default());
        let mut rx = client.subscribe_settings();

        let mut settings = DeviceSettings::default();
        settings.debug = true;
        client.push_settings(settings.clone());

        assert_eq!(rx.recv().await.unwrap(), settings);
        assert_eq!(client.settings().await.unwrap(), settings);
    }
}
