//! Rank assignment with cross-poll stability.
//!
//! Ranks are `f64` values: midpoint insertion between two previous ranks is
//! exact binary rational arithmetic, so assignment is reproducible and the
//! spacing floor is detectable. A segment that kept its position keeps its
//! previous rank bit for bit.

use nwgnrcs::SegmentId;
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use tokio::time::Instant;

/// Outcome for one rundown.
#[derive(Clone, Debug, Default)]
pub struct AssignedRanks {
    pub ranks: BTreeMap<SegmentId, f64>,
    /// True when the whole rundown was rebased to `1, 2, 3, …`.
    pub recalculated_as_integers: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct RankAssigner {
    fraction_floor: f64,
    rebase_cooldown: Duration,
}

impl RankAssigner {
    pub fn new(fraction_floor: f64, rebase_cooldown: Duration) -> Self {
        Self {
            fraction_floor,
            rebase_cooldown,
        }
    }

    /// Assigns a rank to every segment of one rundown.
    ///
    /// `order` is the resolved listing order, `stable` the set of segments
    /// whose position among peers did not change (from the differ),
    /// `previous` the ranks recorded after the last poll. Stable segments
    /// with a previous rank become anchors; everything else is interpolated
    /// strictly between the surrounding anchors. When the spacing an
    /// interpolation would need drops below the floor and the per-rundown
    /// cooldown has elapsed, the rundown is rebased to integers instead.
    pub fn assign(
        &self,
        order: &[SegmentId],
        stable: Option<&HashSet<SegmentId>>,
        previous: Option<&BTreeMap<SegmentId, f64>>,
        last_forced: Option<Instant>,
        now: Instant,
    ) -> AssignedRanks {
        if order.is_empty() {
            return AssignedRanks::default();
        }

        let Some(previous) = previous else {
            return integer_ranks(order, false);
        };

        // Anchors: stable segments with a previous rank, kept only while
        // strictly increasing. All ranks ever assigned are positive, so 0.0
        // is a safe lower bound for head insertions.
        let mut anchors: Vec<(usize, f64)> = Vec::new();
        let mut last_rank = 0.0_f64;
        for (index, id) in order.iter().enumerate() {
            let is_stable = stable.map(|s| s.contains(id)).unwrap_or(false);
            if let Some(&rank) = previous.get(id) {
                if is_stable && rank > last_rank {
                    anchors.push((index, rank));
                    last_rank = rank;
                }
            }
        }

        if self.spacing_exhausted(&anchors) {
            let cooldown_elapsed = last_forced
                .map(|at| now.duration_since(at) >= self.rebase_cooldown)
                .unwrap_or(true);
            if cooldown_elapsed {
                return integer_ranks(order, true);
            }
        }

        let mut ranks = BTreeMap::new();
        let mut cursor = 0usize;
        let mut lo = 0.0_f64;

        for &(anchor_index, anchor_rank) in &anchors {
            let gap = &order[cursor..anchor_index];
            let step = (anchor_rank - lo) / (gap.len() + 1) as f64;
            for (offset, id) in gap.iter().enumerate() {
                ranks.insert(id.clone(), lo + step * (offset + 1) as f64);
            }
            ranks.insert(order[anchor_index].clone(), anchor_rank);
            cursor = anchor_index + 1;
            lo = anchor_rank;
        }

        // Tail past the last anchor: whole steps, no upper bound to respect.
        for (offset, id) in order[cursor..].iter().enumerate() {
            ranks.insert(id.clone(), lo + (offset + 1) as f64);
        }

        AssignedRanks {
            ranks,
            recalculated_as_integers: false,
        }
    }

    /// Would any interpolation need a spacing below the floor?
    ///
    /// Only gaps that actually hold segments count; two close anchors with
    /// nothing between them never force a rebase.
    fn spacing_exhausted(&self, anchors: &[(usize, f64)]) -> bool {
        let mut cursor = 0usize;
        let mut lo = 0.0_f64;
        for &(anchor_index, anchor_rank) in anchors {
            let pending = anchor_index - cursor;
            if pending > 0 && (anchor_rank - lo) / ((pending + 1) as f64) < self.fraction_floor {
                return true;
            }
            cursor = anchor_index + 1;
            lo = anchor_rank;
        }
        false
    }
}

fn integer_ranks(order: &[SegmentId], recalculated: bool) -> AssignedRanks {
    AssignedRanks {
        ranks: order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), (i + 1) as f64))
            .collect(),
        recalculated_as_integers: recalculated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(id: &str) -> SegmentId {
        SegmentId(id.to_string())
    }

    fn order(ids: &[&str]) -> Vec<SegmentId> {
        ids.iter().map(|id| sid(id)).collect()
    }

    fn ranker() -> RankAssigner {
        RankAssigner::new(1e-6, Duration::from_secs(30))
    }

    fn all_stable(ids: &[&str]) -> HashSet<SegmentId> {
        ids.iter().map(|id| sid(id)).collect()
    }

    #[tokio::test]
    async fn test_fresh_rundown_gets_integer_ranks() {
        let assigned = ranker().assign(&order(&["a", "b", "c"]), None, None, None, Instant::now());

        assert_eq!(assigned.ranks[&sid("a")], 1.0);
        assert_eq!(assigned.ranks[&sid("b")], 2.0);
        assert_eq!(assigned.ranks[&sid("c")], 3.0);
        assert!(!assigned.recalculated_as_integers);
    }

    #[tokio::test]
    async fn test_unchanged_order_keeps_ranks_exactly() {
        let previous: BTreeMap<_, _> = [(sid("a"), 1.0), (sid("b"), 1.5), (sid("c"), 2.0)]
            .into_iter()
            .collect();
        let stable = all_stable(&["a", "b", "c"]);

        let assigned = ranker().assign(
            &order(&["a", "b", "c"]),
            Some(&stable),
            Some(&previous),
            None,
            Instant::now(),
        );

        assert_eq!(assigned.ranks, previous);
        assert!(!assigned.recalculated_as_integers);
    }

    #[tokio::test]
    async fn test_insertion_interpolates_midpoint() {
        let previous: BTreeMap<_, _> = [(sid("a"), 1.0), (sid("b"), 2.0), (sid("c"), 3.0)]
            .into_iter()
            .collect();
        let stable = all_stable(&["a", "b", "c"]);

        let assigned = ranker().assign(
            &order(&["a", "d", "b", "c"]),
            Some(&stable),
            Some(&previous),
            None,
            Instant::now(),
        );

        assert_eq!(assigned.ranks[&sid("a")], 1.0);
        assert_eq!(assigned.ranks[&sid("d")], 1.5);
        assert_eq!(assigned.ranks[&sid("b")], 2.0);
        assert_eq!(assigned.ranks[&sid("c")], 3.0);
    }

    #[tokio::test]
    async fn test_head_insertion_goes_below_first_anchor() {
        let previous: BTreeMap<_, _> = [(sid("a"), 1.0), (sid("b"), 2.0)].into_iter().collect();
        let stable = all_stable(&["a", "b"]);

        let assigned = ranker().assign(
            &order(&["x", "a", "b"]),
            Some(&stable),
            Some(&previous),
            None,
            Instant::now(),
        );

        assert_eq!(assigned.ranks[&sid("x")], 0.5);
        assert_eq!(assigned.ranks[&sid("a")], 1.0);
    }

    #[tokio::test]
    async fn test_tail_append_uses_whole_steps() {
        let previous: BTreeMap<_, _> = [(sid("a"), 1.0)].into_iter().collect();
        let stable = all_stable(&["a"]);

        let assigned = ranker().assign(
            &order(&["a", "y", "z"]),
            Some(&stable),
            Some(&previous),
            None,
            Instant::now(),
        );

        assert_eq!(assigned.ranks[&sid("y")], 2.0);
        assert_eq!(assigned.ranks[&sid("z")], 3.0);
    }

    #[tokio::test]
    async fn test_moved_segment_gets_new_rank_others_keep_theirs() {
        // Previous order a, d, b, c; c moved to the top.
        let previous: BTreeMap<_, _> = [
            (sid("a"), 1.0),
            (sid("d"), 1.5),
            (sid("b"), 2.0),
            (sid("c"), 3.0),
        ]
        .into_iter()
        .collect();
        // The differ decided a and b kept their place.
        let stable = all_stable(&["a", "b"]);

        let assigned = ranker().assign(
            &order(&["c", "a", "b", "d"]),
            Some(&stable),
            Some(&previous),
            None,
            Instant::now(),
        );

        assert_eq!(assigned.ranks[&sid("a")], 1.0);
        assert_eq!(assigned.ranks[&sid("b")], 2.0);
        assert_eq!(assigned.ranks[&sid("c")], 0.5);
        assert_eq!(assigned.ranks[&sid("d")], 3.0);

        // Strictly increasing in listing order.
        let listing = order(&["c", "a", "b", "d"]);
        let mut previous_rank = f64::NEG_INFINITY;
        for id in &listing {
            assert!(assigned.ranks[id] > previous_rank);
            previous_rank = assigned.ranks[id];
        }
    }

    #[tokio::test]
    async fn test_exhausted_spacing_triggers_integer_rebase() {
        let previous: BTreeMap<_, _> = [(sid("a"), 1.0), (sid("b"), 1.0 + 1e-7)]
            .into_iter()
            .collect();
        let stable = all_stable(&["a", "b"]);

        let assigned = ranker().assign(
            &order(&["a", "x", "b"]),
            Some(&stable),
            Some(&previous),
            None,
            Instant::now(),
        );

        assert!(assigned.recalculated_as_integers);
        assert_eq!(assigned.ranks[&sid("a")], 1.0);
        assert_eq!(assigned.ranks[&sid("x")], 2.0);
        assert_eq!(assigned.ranks[&sid("b")], 3.0);
    }

    #[tokio::test]
    async fn test_rebase_respects_cooldown() {
        let previous: BTreeMap<_, _> = [(sid("a"), 1.0), (sid("b"), 1.0 + 1e-7)]
            .into_iter()
            .collect();
        let stable = all_stable(&["a", "b"]);
        let now = Instant::now();

        // A forced rebase just happened: interpolate with tiny spacing
        // instead of rebasing again.
        let assigned = ranker().assign(
            &order(&["a", "x", "b"]),
            Some(&stable),
            Some(&previous),
            Some(now),
            now,
        );

        assert!(!assigned.recalculated_as_integers);
        assert_eq!(assigned.ranks[&sid("a")], 1.0);
        assert!(assigned.ranks[&sid("x")] > 1.0);
        assert!(assigned.ranks[&sid("x")] < assigned.ranks[&sid("b")]);
    }

    #[tokio::test]
    async fn test_empty_rundown_yields_no_ranks() {
        let assigned = ranker().assign(&[], None, None, None, Instant::now());
        assert!(assigned.ranks.is_empty());
    }
}
