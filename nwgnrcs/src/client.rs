//! Trait consommé par le watcher pour parler au NRCS.

use crate::error::Result;
use crate::model::{QueueId, ReducedRundown, SegmentId, UnrankedSegment};
use async_trait::async_trait;
use std::collections::HashMap;

/// Accès en lecture au NRCS.
///
/// L'implémentation concrète est censée réutiliser un pool de connexions
/// borné ; plusieurs téléchargements peuvent être en vol simultanément à
/// l'intérieur d'un même cycle de poll.
#[async_trait]
pub trait NrcsClient: Send + Sync {
    /// Télécharge le listing d'une file (entêtes de stories + locators).
    async fn download_rundown(&self, queue: &QueueId) -> Result<ReducedRundown>;

    /// Télécharge les corps des stories demandées.
    ///
    /// Les stories absentes de la file au moment du téléchargement sont
    /// simplement omises de la map retournée.
    async fn fetch_stories_by_id(
        &self,
        queue: &QueueId,
        ids: &[SegmentId],
    ) -> Result<HashMap<SegmentId, UnrankedSegment>>;

    /// Nombre de requêtes encore en attente côté client.
    ///
    /// Une valeur non nulle après un cycle complet signale un backlog ;
    /// le watcher se contente de le logger.
    fn queue_length(&self) -> usize;
}
