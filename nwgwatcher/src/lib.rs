//! # nwgwatcher - Rundown watcher core
//!
//! Polls the configured NRCS queues, partitions each into logical
//! rundowns, assigns stable segment ranks, diffs against the previous
//! snapshot and streams a minimal, ordered list of changes to the playout
//! control plane.
//!
//! Layering, leaves first: [`resolver`] splits a queue on editorial
//! markers, [`rank`] keeps ordering stable across polls, [`diff`]
//! classifies what changed, [`watcher`] owns the caches and drives the
//! single-flight poll cycle, [`supervisor`] rebuilds the watcher when the
//! device settings change.

mod diff;
mod error;
mod events;
mod model;
mod rank;
mod resolver;
mod supervisor;
mod watcher;

pub mod config_ext;

pub use config_ext::WatcherConfigExt;
pub use diff::{diff_playlist, PlaylistDiff, RundownChangeKind, SegmentChange, SegmentChangeKind};
pub use error::{Result, WatcherError};
pub use events::{WatcherEvent, WatcherEventBus};
pub use model::{
    ResolvedPlaylist, ResolvedRundown, Rundown, RundownSegment, WatcherSettings,
};
pub use rank::{AssignedRanks, RankAssigner};
pub use resolver::{resolve_playlist, ContinuityBoundary, RundownBoundary};
pub use supervisor::GatewaySupervisor;
pub use watcher::RundownWatcher;
