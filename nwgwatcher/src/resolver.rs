//! Partitioning of a playlist into logical rundowns.
//!
//! The NRCS exposes one flat queue per playlist; editorial marks the start
//! of a new rundown inside story content. What exactly counts as a marker
//! is newsroom-specific, so the test is a hook ([`RundownBoundary`]) with a
//! continuity-cue default.

use crate::model::{ResolvedPlaylist, ResolvedRundown};
use nwgnrcs::{PlaylistId, RundownId, StoryPayload, UnrankedSegment};

/// Decides whether a story opens a new rundown.
pub trait RundownBoundary: Send + Sync {
    fn starts_new_rundown(&self, payload: &StoryPayload) -> bool;
}

/// Default boundary: a `CONTINUITY` cue or an explicit `fields.continuity`
/// flag in the story body.
#[derive(Clone, Copy, Debug, Default)]
pub struct ContinuityBoundary;

impl RundownBoundary for ContinuityBoundary {
    fn starts_new_rundown(&self, payload: &StoryPayload) -> bool {
        if payload.has_cue("CONTINUITY") {
            return true;
        }
        payload
            .0
            .pointer("/fields/continuity")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }
}

/// Walks the stories in queue order and splits them into rundowns.
///
/// The first rundown is `<playlist>_1`, the next `_2`, and so on. A story
/// carrying a boundary marker belongs to the rundown it opens. An empty
/// queue still yields one empty `<playlist>_1` rundown. The back time of
/// the story that opens a rundown becomes that rundown's back time.
pub fn resolve_playlist(
    playlist_id: &PlaylistId,
    stories: &[UnrankedSegment],
    boundary: &dyn RundownBoundary,
) -> ResolvedPlaylist {
    let mut rundowns: Vec<ResolvedRundown> = Vec::new();
    let mut ordinal = 1;
    let mut current = ResolvedRundown {
        rundown_id: RundownId::derived(playlist_id, ordinal),
        segments: Vec::new(),
        back_time: None,
    };

    for story in stories {
        let opens_rundown = boundary.starts_new_rundown(&story.payload);

        if opens_rundown && !current.segments.is_empty() {
            rundowns.push(current);
            ordinal += 1;
            current = ResolvedRundown {
                rundown_id: RundownId::derived(playlist_id, ordinal),
                segments: Vec::new(),
                back_time: None,
            };
        }

        if current.segments.is_empty() {
            current.back_time = story.payload.back_time();
        }
        current.segments.push(story.external_id.clone());
    }

    rundowns.push(current);

    ResolvedPlaylist {
        playlist_id: playlist_id.clone(),
        rundowns,
    }
}
