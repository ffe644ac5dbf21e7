//! # nwgnrcs - Côté NRCS du gateway
//!
//! Cette crate fournit les types fondamentaux côté newsroom (identifiants,
//! listings de files, stories) ainsi que le trait [`NrcsClient`] que le
//! watcher consomme. Le client réseau concret (FTP) vit hors de ce dépôt ;
//! [`MemoryNrcsClient`] fournit une implémentation scriptable en mémoire
//! utilisée par la suite de tests.
//!
//! Les stories sont des blobs opaques ([`StoryPayload`]) : le gateway
//! n'introspecte que `meta.float`, `fields.backTime` et les cues servant de
//! frontière de rundown.

mod client;
mod error;
mod memory;
mod model;

pub use client::NrcsClient;
pub use error::{NrcsError, Result};
pub use memory::{MemoryNrcsClient, ScriptedStory};
pub use model::{
    PlaylistId, QueueId, ReducedRundown, ReducedSegment, RundownId, SegmentId, StoryPayload,
    UnrankedSegment,
};
