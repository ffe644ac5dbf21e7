//! Client NRCS scriptable en mémoire.
//!
//! Utilisé par la suite de tests du watcher : chaque test décrit l'état des
//! files, fait tourner un cycle de poll, puis modifie l'état et recommence.

use crate::client::NrcsClient;
use crate::error::{NrcsError, Result};
use crate::model::{
    PlaylistId, QueueId, ReducedRundown, ReducedSegment, RundownId, SegmentId, StoryPayload,
    UnrankedSegment,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Une story scriptée : l'entrée de listing plus son corps.
#[derive(Clone, Debug)]
pub struct ScriptedStory {
    pub external_id: SegmentId,
    pub name: String,
    pub modified: DateTime<Utc>,
    pub locator: String,
    pub payload: StoryPayload,
}

impl ScriptedStory {
    pub fn new(id: impl Into<String>, name: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            external_id: SegmentId(id.into()),
            name: name.into(),
            modified: Utc::now(),
            locator: locator.into(),
            payload: StoryPayload::default(),
        }
    }

    pub fn with_payload(mut self, payload: StoryPayload) -> Self {
        self.payload = payload;
        self
    }

    fn listing_entry(&self) -> ReducedSegment {
        ReducedSegment {
            external_id: self.external_id.clone(),
            name: self.name.clone(),
            modified: self.modified,
            locator: self.locator.clone(),
        }
    }
}

#[derive(Clone, Debug)]
struct ScriptedQueue {
    name: String,
    gateway_version: String,
    stories: Vec<ScriptedStory>,
}

#[derive(Default)]
struct Inner {
    queues: HashMap<QueueId, ScriptedQueue>,
    fail_downloads: bool,
}

/// Implémentation en mémoire de [`NrcsClient`].
#[derive(Default)]
pub struct MemoryNrcsClient {
    inner: RwLock<Inner>,
    queue_length: AtomicUsize,
}

impl MemoryNrcsClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remplace entièrement le contenu d'une file.
    pub async fn set_queue(
        &self,
        queue: &QueueId,
        gateway_version: impl Into<String>,
        stories: Vec<ScriptedStory>,
    ) {
        let mut inner = self.inner.write().await;
        inner.queues.insert(
            queue.clone(),
            ScriptedQueue {
                name: queue.0.clone(),
                gateway_version: gateway_version.into(),
                stories,
            },
        );
    }

    /// Fait échouer tous les téléchargements jusqu'à nouvel ordre.
    pub async fn set_fail_downloads(&self, fail: bool) {
        self.inner.write().await.fail_downloads = fail;
    }

    /// Simule un backlog côté client.
    pub fn set_queue_length(&self, pending: usize) {
        self.queue_length.store(pending, Ordering::Relaxed);
    }
}

#[async_trait]
impl NrcsClient for MemoryNrcsClient {
    async fn download_rundown(&self, queue: &QueueId) -> Result<ReducedRundown> {
        let inner = self.inner.read().await;
        if inner.fail_downloads {
            return Err(NrcsError::ConnectionFailed("scripted failure".to_string()));
        }
        let scripted = inner
            .queues
            .get(queue)
            .ok_or_else(|| NrcsError::QueueNotFound(queue.0.clone()))?;

        Ok(ReducedRundown {
            external_id: queue.clone(),
            name: scripted.name.clone(),
            gateway_version: scripted.gateway_version.clone(),
            segments: scripted.stories.iter().map(ScriptedStory::listing_entry).collect(),
        })
    }

    async fn fetch_stories_by_id(
        &self,
        queue: &QueueId,
        ids: &[SegmentId],
    ) -> Result<HashMap<SegmentId, UnrankedSegment>> {
        let inner = self.inner.read().await;
        if inner.fail_downloads {
            return Err(NrcsError::ConnectionFailed("scripted failure".to_string()));
        }
        let scripted = inner
            .queues
            .get(queue)
            .ok_or_else(|| NrcsError::QueueNotFound(queue.0.clone()))?;

        // Affectation provisoire : le watcher réaffecte le rundown lors de
        // la résolution de la playlist.
        let default_rundown = RundownId::derived(&PlaylistId::from_queue(queue), 1);

        let mut stories = HashMap::new();
        for story in &scripted.stories {
            if ids.contains(&story.external_id) {
                stories.insert(
                    story.external_id.clone(),
                    UnrankedSegment {
                        external_id: story.external_id.clone(),
                        rundown_id: default_rundown.clone(),
                        name: story.name.clone(),
                        modified: story.modified,
                        locator: story.locator.clone(),
                        payload: story.payload.clone(),
                    },
                );
            }
        }
        Ok(stories)
    }

    fn queue_length(&self) -> usize {
        self.queue_length.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_queue_roundtrip() {
        let client = MemoryNrcsClient::new();
        let queue = QueueId("QUEUE".to_string());

        client
            .set_queue(
                &queue,
                "v1",
                vec![
                    ScriptedStory::new("a", "Story A", "loc-a1"),
                    ScriptedStory::new("b", "Story B", "loc-b1"),
                ],
            )
            .await;

        let listing = client.download_rundown(&queue).await.unwrap();
        assert_eq!(listing.gateway_version, "v1");
        assert_eq!(listing.segments.len(), 2);

        let stories = client
            .fetch_stories_by_id(&queue, &[SegmentId("b".to_string())])
            .await
            .unwrap();
        assert_eq!(stories.len(), 1);
        assert_eq!(stories[&SegmentId("b".to_string())].name, "Story B");
    }

    #[tokio::test]
    async fn test_unknown_queue_fails() {
        let client = MemoryNrcsClient::new();
        let err = client
            .download_rundown(&QueueId("MISSING".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, NrcsError::QueueNotFound(_)));
    }
}
