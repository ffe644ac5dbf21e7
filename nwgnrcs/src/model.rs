//! Identifiants et types de données côté NRCS.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Nom d'une file NRCS (l'unité de polling).
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueueId(pub String);

/// Identifiant d'une playlist : tout le contenu d'une file avant découpage.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlaylistId(pub String);

/// Identifiant d'un rundown, dérivé de la playlist : `<playlist>_<ordinal>`.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RundownId(pub String);

/// Identifiant stable d'un segment (story).
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SegmentId(pub String);

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for PlaylistId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for RundownId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl PlaylistId {
    /// Une playlist porte le nom de sa file.
    pub fn from_queue(queue: &QueueId) -> Self {
        Self(queue.0.clone())
    }
}

impl RundownId {
    /// Dérive l'identifiant du `ordinal`-ième rundown d'une playlist
    /// (le premier ordinal est 1).
    pub fn derived(playlist: &PlaylistId, ordinal: usize) -> Self {
        Self(format!("{}_{}", playlist.0, ordinal))
    }
}

/// Corps opaque d'une story.
///
/// Le gateway ne lit que trois choses dedans : le flag `meta.float`, le
/// champ `fields.backTime` et les cues (pour la détection de frontière de
/// rundown). Tout le reste est transmis tel quel au plan de contrôle.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StoryPayload(pub serde_json::Value);

impl StoryPayload {
    /// Story flottée (exclue du minutage par la rédaction).
    pub fn float(&self) -> bool {
        self.0
            .pointer("/meta/float")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }

    /// Heure de fin absolue portée par la story, si présente.
    pub fn back_time(&self) -> Option<String> {
        self.0
            .pointer("/fields/backTime")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
    }

    /// Cherche `marker` parmi les cues de la story (insensible à la casse).
    pub fn has_cue(&self, marker: &str) -> bool {
        let Some(cues) = self.0.pointer("/cues").and_then(serde_json::Value::as_array) else {
            return false;
        };
        cues.iter()
            .filter_map(serde_json::Value::as_array)
            .flatten()
            .filter_map(serde_json::Value::as_str)
            .any(|line| line.trim().eq_ignore_ascii_case(marker))
    }
}

/// Une story complète telle que récupérée depuis le NRCS, avant rang.
///
/// `rundown_id` est le rundown auquel le watcher l'a affectée au dernier
/// cycle (réaffectée à chaque résolution de playlist).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnrankedSegment {
    pub external_id: SegmentId,
    pub rundown_id: RundownId,
    pub name: String,
    pub modified: DateTime<Utc>,
    /// Jeton de version opaque, avancé par le NRCS à chaque édition du corps.
    pub locator: String,
    pub payload: StoryPayload,
}

/// Entrée du listing d'une file : le strict nécessaire pour décider quoi
/// re-télécharger.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReducedSegment {
    pub external_id: SegmentId,
    pub name: String,
    pub modified: DateTime<Utc>,
    pub locator: String,
}

/// Listing complet d'une file, dans l'ordre du NRCS.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReducedRundown {
    pub external_id: QueueId,
    pub name: String,
    /// Seuls les rundowns portant la version configurée sont traités.
    pub gateway_version: String,
    pub segments: Vec<ReducedSegment>,
}
