//! Gestion des erreurs côté NRCS.

use thiserror::Error;

/// Type Result personnalisé pour nwgnrcs
pub type Result<T> = std::result::Result<T, NrcsError>;

/// Erreurs remontées par un client NRCS.
///
/// Le watcher ne retente jamais à ce niveau : un échec fait sauter la file
/// pour ce cycle, les caches restant intacts.
#[derive(Error, Debug)]
pub enum NrcsError {
    /// La connexion au NRCS a échoué ou a été perdue
    #[error("NRCS connection failed: {0}")]
    ConnectionFailed(String),

    /// La file demandée n'existe pas sur le NRCS
    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    /// Une story listée n'a pas pu être téléchargée
    #[error("Story not found in queue {queue}: {story}")]
    StoryNotFound { queue: String, story: String },

    /// Corps de story illisible
    #[error("Story parsing error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Erreur générique
    #[error("NRCS error: {0}")]
    Other(String),
}
