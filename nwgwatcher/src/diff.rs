//! Snapshot differ: previous rundowns vs freshly resolved ones.
//!
//! Classification works on identities, locators and relative order, never
//! on payload contents. "Position among peers" is decided with a
//! longest-increasing-subsequence over the previous positions of the
//! segments common to both versions: everything on that subsequence kept
//! its place, everything off it moved.

use crate::model::Rundown;
use nwgnrcs::{RundownId, SegmentId};
use std::collections::{HashMap, HashSet};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RundownChangeKind {
    Created,
    Updated,
    Deleted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SegmentChangeKind {
    Created,
    /// Same position, different locator: the story body was edited.
    Changed,
    /// Same locator, different position among its peers.
    Moved,
    Deleted,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SegmentChange {
    pub rundown_id: RundownId,
    pub segment_id: SegmentId,
    pub kind: SegmentChangeKind,
}

/// Result of diffing one playlist.
#[derive(Clone, Debug, Default)]
pub struct PlaylistDiff {
    pub rundown_changes: Vec<(RundownId, RundownChangeKind)>,
    pub segment_changes: Vec<SegmentChange>,
    /// Per surviving rundown: the segments whose position among peers did
    /// not change. The rank assigner keeps their ranks untouched.
    stable: HashMap<RundownId, HashSet<SegmentId>>,
}

impl PlaylistDiff {
    pub fn is_empty(&self) -> bool {
        self.rundown_changes.is_empty() && self.segment_changes.is_empty()
    }

    pub fn rundown_change(&self, rundown_id: &RundownId) -> Option<RundownChangeKind> {
        self.rundown_changes
            .iter()
            .find(|(id, _)| id == rundown_id)
            .map(|(_, kind)| *kind)
    }

    pub fn stable_segments(&self, rundown_id: &RundownId) -> Option<&HashSet<SegmentId>> {
        self.stable.get(rundown_id)
    }

    pub fn segments_with(
        &self,
        kind: SegmentChangeKind,
    ) -> impl Iterator<Item = &SegmentChange> {
        self.segment_changes.iter().filter(move |c| c.kind == kind)
    }

    pub fn rundown_has_moves(&self, rundown_id: &RundownId) -> bool {
        self.segment_changes
            .iter()
            .any(|c| c.kind == SegmentChangeKind::Moved && &c.rundown_id == rundown_id)
    }
}

/// Compares the previous snapshot of one playlist with the new one.
pub fn diff_playlist(old: &[Rundown], new: &[Rundown]) -> PlaylistDiff {
    let old_by_id: HashMap<&RundownId, &Rundown> =
        old.iter().map(|r| (&r.external_id, r)).collect();
    let new_ids: HashSet<&RundownId> = new.iter().map(|r| &r.external_id).collect();

    let mut diff = PlaylistDiff::default();

    for old_rundown in old {
        if !new_ids.contains(&old_rundown.external_id) {
            diff.rundown_changes
                .push((old_rundown.external_id.clone(), RundownChangeKind::Deleted));
        }
    }

    for new_rundown in new {
        match old_by_id.get(&new_rundown.external_id) {
            None => {
                diff.rundown_changes
                    .push((new_rundown.external_id.clone(), RundownChangeKind::Created));
            }
            Some(old_rundown) => {
                if old_rundown.name != new_rundown.name
                    || old_rundown.back_time != new_rundown.back_time
                {
                    diff.rundown_changes
                        .push((new_rundown.external_id.clone(), RundownChangeKind::Updated));
                }
                diff_segments(old_rundown, new_rundown, &mut diff);
            }
        }
    }

    diff
}

fn diff_segments(old: &Rundown, new: &Rundown, diff: &mut PlaylistDiff) {
    let rundown_id = &new.external_id;

    let old_pos: HashMap<&SegmentId, usize> = old
        .segments
        .iter()
        .enumerate()
        .map(|(i, s)| (&s.external_id, i))
        .collect();
    let old_locator: HashMap<&SegmentId, &str> = old
        .segments
        .iter()
        .map(|s| (&s.external_id, s.locator.as_str()))
        .collect();
    let new_ids: HashSet<&SegmentId> = new.segments.iter().map(|s| &s.external_id).collect();

    // Deletions first, in previous order. A segment that reappears in a
    // different rundown is still a delete here; its create there is a
    // separate event.
    for old_segment in &old.segments {
        if !new_ids.contains(&old_segment.external_id) {
            diff.segment_changes.push(SegmentChange {
                rundown_id: rundown_id.clone(),
                segment_id: old_segment.external_id.clone(),
                kind: SegmentChangeKind::Deleted,
            });
        }
    }

    // Common segments in new order, with their previous positions.
    let common: Vec<(&SegmentId, usize)> = new
        .segments
        .iter()
        .filter_map(|s| old_pos.get(&s.external_id).map(|&p| (&s.external_id, p)))
        .collect();
    let positions: Vec<usize> = common.iter().map(|(_, p)| *p).collect();
    let kept: HashSet<usize> = longest_increasing(&positions).into_iter().collect();

    let stable: HashSet<SegmentId> = common
        .iter()
        .enumerate()
        .filter(|(i, _)| kept.contains(i))
        .map(|(_, (id, _))| (*id).clone())
        .collect();

    for new_segment in &new.segments {
        let id = &new_segment.external_id;
        match old_locator.get(id) {
            None => diff.segment_changes.push(SegmentChange {
                rundown_id: rundown_id.clone(),
                segment_id: id.clone(),
                kind: SegmentChangeKind::Created,
            }),
            Some(locator) if *locator != new_segment.locator => {
                diff.segment_changes.push(SegmentChange {
                    rundown_id: rundown_id.clone(),
                    segment_id: id.clone(),
                    kind: SegmentChangeKind::Changed,
                })
            }
            Some(_) if !stable.contains(id) => diff.segment_changes.push(SegmentChange {
                rundown_id: rundown_id.clone(),
                segment_id: id.clone(),
                kind: SegmentChangeKind::Moved,
            }),
            Some(_) => {}
        }
    }

    diff.stable.insert(rundown_id.clone(), stable);
}

/// Indices of one longest strictly-increasing subsequence of `seq`.
fn longest_increasing(seq: &[usize]) -> Vec<usize> {
    if seq.is_empty() {
        return Vec::new();
    }

    // tails[k] = index of the smallest possible tail of an increasing
    // subsequence of length k + 1.
    let mut tails: Vec<usize> = Vec::new();
    let mut parent: Vec<Option<usize>> = vec![None; seq.len()];

    for i in 0..seq.len() {
        let pos = tails.partition_point(|&t| seq[t] < seq[i]);
        if pos > 0 {
            parent[i] = Some(tails[pos - 1]);
        }
        if pos == tails.len() {
            tails.push(i);
        } else {
            tails[pos] = i;
        }
    }

    let mut result = Vec::with_capacity(tails.len());
    let mut current = tails.last().copied();
    while let Some(i) = current {
        result.push(i);
        current = parent[i];
    }
    result.reverse();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RundownSegment;
    use chrono::Utc;
    use nwgnrcs::StoryPayload;

    fn segment(id: &str, locator: &str) -> RundownSegment {
        RundownSegment {
            external_id: SegmentId(id.to_string()),
            name: id.to_string(),
            modified: Utc::now(),
            locator: locator.to_string(),
            rank: 0.0,
            float: false,
            payload: StoryPayload::default(),
        }
    }

    fn rundown(id: &str, segments: Vec<RundownSegment>) -> Rundown {
        Rundown {
            external_id: RundownId(id.to_string()),
            name: "Q".to_string(),
            gateway_version: "v1".to_string(),
            back_time: None,
            segments,
        }
    }

    fn kinds_for(diff: &PlaylistDiff, id: &str) -> Vec<SegmentChangeKind> {
        diff.segment_changes
            .iter()
            .filter(|c| c.segment_id.0 == id)
            .map(|c| c.kind)
            .collect()
    }

    #[test]
    fn test_identical_snapshots_produce_no_changes() {
        let old = vec![rundown("Q_1", vec![segment("a", "1"), segment("b", "1")])];
        let diff = diff_playlist(&old, &old.clone());
        assert!(diff.is_empty());
        assert_eq!(diff.stable_segments(&RundownId("Q_1".to_string())).unwrap().len(), 2);
    }

    #[test]
    fn test_rundown_created_and_deleted() {
        let old = vec![rundown("Q_1", vec![]), rundown("Q_2", vec![])];
        let new = vec![rundown("Q_1", vec![]), rundown("Q_3", vec![])];
        let diff = diff_playlist(&old, &new);

        assert_eq!(
            diff.rundown_change(&RundownId("Q_2".to_string())),
            Some(RundownChangeKind::Deleted)
        );
        assert_eq!(
            diff.rundown_change(&RundownId("Q_3".to_string())),
            Some(RundownChangeKind::Created)
        );
        assert_eq!(diff.rundown_change(&RundownId("Q_1".to_string())), None);
    }

    #[test]
    fn test_back_time_shift_is_a_rundown_update() {
        let old = vec![rundown("Q_1", vec![segment("a", "1")])];
        let mut updated = rundown("Q_1", vec![segment("a", "1")]);
        updated.back_time = Some("@18:00:00".to_string());
        let diff = diff_playlist(&old, &[updated]);

        assert_eq!(
            diff.rundown_change(&RundownId("Q_1".to_string())),
            Some(RundownChangeKind::Updated)
        );
        assert!(diff.segment_changes.is_empty());
    }

    #[test]
    fn test_insertion_does_not_move_neighbours() {
        let old = vec![rundown("Q_1", vec![segment("a", "1"), segment("b", "1")])];
        let new = vec![rundown(
            "Q_1",
            vec![segment("a", "1"), segment("d", "1"), segment("b", "1")],
        )];
        let diff = diff_playlist(&old, &new);

        assert_eq!(kinds_for(&diff, "d"), vec![SegmentChangeKind::Created]);
        assert_eq!(diff.segment_changes.len(), 1);
    }

    #[test]
    fn test_locator_change_beats_move() {
        let old = vec![rundown("Q_1", vec![segment("a", "1"), segment("b", "1")])];
        let new = vec![rundown("Q_1", vec![segment("b", "2"), segment("a", "1")])];
        let diff = diff_playlist(&old, &new);

        // b both moved and was edited: classified once, as Changed.
        assert_eq!(kinds_for(&diff, "b"), vec![SegmentChangeKind::Changed]);
        assert_eq!(kinds_for(&diff, "a"), Vec::<SegmentChangeKind>::new());
    }

    #[test]
    fn test_move_to_top() {
        let old = vec![rundown(
            "Q_1",
            vec![
                segment("a", "1"),
                segment("b", "1"),
                segment("c", "1"),
                segment("d", "1"),
            ],
        )];
        let new = vec![rundown(
            "Q_1",
            vec![
                segment("c", "1"),
                segment("a", "1"),
                segment("b", "1"),
                segment("d", "1"),
            ],
        )];
        let diff = diff_playlist(&old, &new);

        assert_eq!(kinds_for(&diff, "c"), vec![SegmentChangeKind::Moved]);
        assert!(diff.rundown_has_moves(&RundownId("Q_1".to_string())));
        // a, b, d kept their relative order.
        let stable = diff.stable_segments(&RundownId("Q_1".to_string())).unwrap();
        assert!(stable.contains(&SegmentId("a".to_string())));
        assert!(stable.contains(&SegmentId("b".to_string())));
        assert!(stable.contains(&SegmentId("d".to_string())));
    }

    #[test]
    fn test_cross_rundown_move_is_delete_plus_create() {
        let old = vec![
            rundown("Q_1", vec![segment("a", "1"), segment("b", "1")]),
            rundown("Q_2", vec![segment("x", "1")]),
        ];
        let new = vec![
            rundown("Q_1", vec![segment("a", "1")]),
            rundown("Q_2", vec![segment("x", "1"), segment("b", "1")]),
        ];
        let diff = diff_playlist(&old, &new);

        let b_changes: Vec<_> = diff
            .segment_changes
            .iter()
            .filter(|c| c.segment_id.0 == "b")
            .collect();
        assert_eq!(b_changes.len(), 2);
        assert!(b_changes.iter().any(|c| {
            c.kind == SegmentChangeKind::Deleted && c.rundown_id.0 == "Q_1"
        }));
        assert!(b_changes.iter().any(|c| {
            c.kind == SegmentChangeKind::Created && c.rundown_id.0 == "Q_2"
        }));
    }

    #[test]
    fn test_at_most_one_change_per_segment_per_rundown() {
        let old = vec![rundown(
            "Q_1",
            vec![segment("a", "1"), segment("b", "1"), segment("c", "1")],
        )];
        let new = vec![rundown(
            "Q_1",
            vec![segment("c", "2"), segment("b", "1"), segment("d", "1")],
        )];
        let diff = diff_playlist(&old, &new);

        let mut seen = HashSet::new();
        for change in &diff.segment_changes {
            assert!(
                seen.insert((change.rundown_id.clone(), change.segment_id.clone())),
                "duplicate change for {:?}",
                change
            );
        }
    }

    #[test]
    fn test_longest_increasing_basic() {
        assert_eq!(longest_increasing(&[]), Vec::<usize>::new());
        assert_eq!(longest_increasing(&[5]), vec![0]);
        // 3, 0, 2, 1 -> the subsequence 0, 2 or 0, 1.
        let lis = longest_increasing(&[3, 0, 2, 1]);
        assert_eq!(lis.len(), 2);
        assert!(lis[0] < lis[1]);
        assert!([3usize, 0, 2, 1][lis[0]] < [3usize, 0, 2, 1][lis[1]]);
        // Already sorted: everything kept.
        assert_eq!(longest_increasing(&[0, 1, 2, 3]), vec![0, 1, 2, 3]);
    }
}
