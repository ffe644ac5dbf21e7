//! The rundown watcher: cache owner, poll driver, event emitter.
//!
//! One poll cycle runs under the processing lock from download to event
//! emission; `resync_rundown` takes the same lock, so external mutations
//! never interleave with a cycle. The timer is single-flight: the next
//! poll is scheduled `poll_interval` after the previous cycle completed.

use crate::diff::{diff_playlist, PlaylistDiff, RundownChangeKind, SegmentChangeKind};
use crate::error::Result;
use crate::events::{WatcherEvent, WatcherEventBus};
use crate::model::{ResolvedPlaylist, Rundown, RundownSegment, WatcherSettings};
use crate::rank::{AssignedRanks, RankAssigner};
use crate::resolver::{resolve_playlist, ContinuityBoundary, RundownBoundary};
use nwgnrcs::{
    NrcsClient, PlaylistId, QueueId, RundownId, SegmentId, UnrankedSegment,
};
use nwgplayout::{CachedSegment, PlayoutClient, StatusCode};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Process-local caches, all mutated under the processing lock only.
#[derive(Default)]
struct WatcherState {
    /// Full stories, replaced when their locator advances.
    inews_data: HashMap<SegmentId, UnrankedSegment>,
    /// Listing entries of the last poll.
    segments: HashMap<SegmentId, nwgnrcs::ReducedSegment>,
    /// Ordered segment ids per rundown.
    rundowns: HashMap<RundownId, Vec<SegmentId>>,
    /// Ordered rundown ids per playlist.
    playlists: HashMap<PlaylistId, Vec<RundownId>>,
    /// Prior snapshot handed to the differ.
    assigned_rundowns: HashMap<PlaylistId, Vec<Rundown>>,
    /// Prior partition, kept for observability.
    playlist_assignments: HashMap<PlaylistId, ResolvedPlaylist>,
    previous_ranks: HashMap<RundownId, BTreeMap<SegmentId, f64>>,
    last_forced_rank_recalculation: HashMap<RundownId, Instant>,
    /// Rundowns whose control-plane cache must be ignored on the next poll.
    skip_cache: HashSet<RundownId>,
}

struct WatcherInner {
    settings: WatcherSettings,
    nrcs: Arc<dyn NrcsClient>,
    playout: Arc<dyn PlayoutClient>,
    boundary: Arc<dyn RundownBoundary>,
    ranker: RankAssigner,
    bus: WatcherEventBus,
    /// The processing lock.
    state: Mutex<WatcherState>,
    stop_signal: Notify,
    shutdown: AtomicBool,
    running: AtomicBool,
    skipped_polls: AtomicU32,
}

/// Watches the configured NRCS queues and streams changes to subscribers.
pub struct RundownWatcher {
    inner: Arc<WatcherInner>,
}

impl RundownWatcher {
    pub fn new(
        settings: WatcherSettings,
        nrcs: Arc<dyn NrcsClient>,
        playout: Arc<dyn PlayoutClient>,
    ) -> Self {
        Self::with_boundary(settings, nrcs, playout, Arc::new(ContinuityBoundary))
    }

    /// Builds a watcher with a newsroom-specific boundary hook.
    pub fn with_boundary(
        settings: WatcherSettings,
        nrcs: Arc<dyn NrcsClient>,
        playout: Arc<dyn PlayoutClient>,
        boundary: Arc<dyn RundownBoundary>,
    ) -> Self {
        let ranker = RankAssigner::new(
            settings.rank_fraction_floor,
            settings.rank_rebase_cooldown,
        );
        Self {
            inner: Arc::new(WatcherInner {
                settings,
                nrcs,
                playout,
                boundary,
                ranker,
                bus: WatcherEventBus::new(),
                state: Mutex::new(WatcherState::default()),
                stop_signal: Notify::new(),
                shutdown: AtomicBool::new(false),
                running: AtomicBool::new(false),
                skipped_polls: AtomicU32::new(0),
            }),
        }
    }

    pub fn subscribe(&self) -> UnboundedReceiver<WatcherEvent> {
        self.inner.bus.subscribe()
    }

    /// Begins polling. Safe to call repeatedly; only one timer runs.
    pub fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.shutdown.store(false, Ordering::SeqCst);

        let inner = self.inner.clone();
        info!(queues = inner.settings.queues.len(), "Rundown watcher started");
        tokio::spawn(async move {
            loop {
                inner.poll_all().await;
                if inner.shutdown.load(Ordering::SeqCst) {
                    break;
                }
                tokio::select! {
                    biased;
                    _ = inner.stop_signal.notified() => {
                        if inner.shutdown.load(Ordering::SeqCst) {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(inner.settings.poll_interval) => {}
                }
            }
            inner.running.store(false, Ordering::SeqCst);
            debug!("Rundown watcher timer stopped");
        });
    }

    /// Cancels the timer. An in-flight cycle is never interrupted; await
    /// the processing lock (any public operation) to observe quiescence.
    pub fn stop(&self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        self.inner.stop_signal.notify_one();
    }

    pub fn dispose(&self) {
        self.stop();
    }

    /// Runs one poll cycle immediately, under the processing lock.
    ///
    /// The timer drives the exact same path; tests call this directly.
    pub async fn poll_now(&self) {
        self.inner.poll_all().await;
    }

    /// Drops every cached trace of one rundown and arms the skip-cache
    /// flag: the next poll refetches all its stories, ignores the
    /// control-plane cache and re-ingests the rundown from scratch.
    pub async fn resync_rundown(&self, rundown_id: &RundownId) {
        let mut state = self.inner.state.lock().await;

        state.skip_cache.insert(rundown_id.clone());
        if let Some(ids) = state.rundowns.remove(rundown_id) {
            for id in &ids {
                state.inews_data.remove(id);
                state.segments.remove(id);
            }
        }
        state.previous_ranks.remove(rundown_id);
        state.last_forced_rank_recalculation.remove(rundown_id);
        for rundowns in state.assigned_rundowns.values_mut() {
            rundowns.retain(|r| r.external_id != *rundown_id);
        }
        for rids in state.playlists.values_mut() {
            rids.retain(|rid| rid != rundown_id);
        }

        info!(rundown = %rundown_id, "Rundown resynced, caches invalidated");
    }
}

impl Drop for RundownWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

impl WatcherInner {
    /// One full poll cycle over every configured queue.
    async fn poll_all(&self) {
        let mut state = match self.state.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                // Should not happen under the single-flight timer.
                let skipped = self.skipped_polls.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(skipped, "Poll cycle skipped, previous cycle still running");
                let _ = self
                    .playout
                    .set_status(
                        StatusCode::WarningMinor,
                        vec![format!("{skipped} poll cycle(s) skipped")],
                    )
                    .await;
                return;
            }
        };
        self.skipped_polls.store(0, Ordering::Relaxed);

        let mut failures = Vec::new();
        for watched in &self.settings.queues {
            if let Err(err) = self.poll_queue(&mut state, &watched.queue).await {
                warn!(queue = %watched.queue, error = %err,
                    "Poll failed for queue, previous caches preserved");
                self.bus.broadcast(WatcherEvent::Warning(format!(
                    "poll of queue {} failed: {err}",
                    watched.queue
                )));
                failures.push(format!("{}: {err}", watched.queue));
            }
        }

        let pending = self.nrcs.queue_length();
        if pending > 0 {
            warn!(pending, "NRCS client still has requests queued after poll");
        }

        let (code, messages) = if failures.is_empty() {
            (StatusCode::Good, Vec::new())
        } else {
            (StatusCode::WarningMajor, failures)
        };
        if let Err(err) = self.playout.set_status(code, messages).await {
            warn!(error = %err, "Failed to report device status");
        }
    }

    async fn poll_queue(&self, state: &mut WatcherState, queue: &QueueId) -> Result<()> {
        let listing = self.nrcs.download_rundown(queue).await?;

        if listing.gateway_version != self.settings.gateway_version {
            debug!(queue = %queue, version = %listing.gateway_version,
                "Ignoring rundown tagged for another gateway");
            return Ok(());
        }

        let playlist_id = PlaylistId::from_queue(queue);

        // New or stale stories: not cached yet, or locator advanced.
        let stale: Vec<SegmentId> = listing
            .segments
            .iter()
            .filter(|entry| {
                state
                    .inews_data
                    .get(&entry.external_id)
                    .map(|cached| cached.locator != entry.locator)
                    .unwrap_or(true)
            })
            .map(|entry| entry.external_id.clone())
            .collect();

        if !stale.is_empty() {
            debug!(queue = %queue, count = stale.len(), "Fetching new or modified stories");
            let fetched = self.nrcs.fetch_stories_by_id(queue, &stale).await?;
            for (id, story) in fetched {
                state.inews_data.insert(id, story);
            }
        }

        // Ordered story list; entries still missing after the fetch are
        // dropped from this poll.
        let mut ordered = Vec::with_capacity(listing.segments.len());
        for entry in &listing.segments {
            match state.inews_data.get(&entry.external_id) {
                Some(story) => ordered.push(story.clone()),
                None => {
                    error!(queue = %queue, segment = %entry.external_id,
                        "Story missing from cache after fetch, dropped from this poll");
                    self.bus.broadcast(WatcherEvent::Error(format!(
                        "story {} missing from cache",
                        entry.external_id
                    )));
                }
            }
        }

        let resolved = resolve_playlist(&playlist_id, &ordered, self.boundary.as_ref());

        // Diff baseline: our prior snapshot, extended with control-plane
        // memory for rundowns we have not ingested ourselves yet.
        let mut baseline = state
            .assigned_rundowns
            .get(&playlist_id)
            .cloned()
            .unwrap_or_default();
        let known: HashSet<RundownId> = baseline.iter().map(|r| r.external_id.clone()).collect();
        let stale_set: HashSet<&SegmentId> = stale.iter().collect();

        for rundown in &resolved.rundowns {
            let rid = &rundown.rundown_id;
            if state.skip_cache.remove(rid) {
                debug!(rundown = %rid, "Control-plane cache skipped after resync");
                continue;
            }
            if known.contains(rid) {
                continue;
            }
            let wanted: Vec<SegmentId> = rundown
                .segments
                .iter()
                .filter(|id| stale_set.contains(id))
                .cloned()
                .collect();
            if wanted.is_empty() {
                continue;
            }
            match self.playout.segments_cache(rid, &wanted).await {
                Ok(cached) if !cached.is_empty() => {
                    debug!(rundown = %rid, count = cached.len(),
                        "Seeding diff baseline from control-plane cache");
                    baseline.push(rundown_from_cache(
                        rid,
                        &listing.name,
                        &listing.gateway_version,
                        cached,
                        &mut state.previous_ranks,
                    ));
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(rundown = %rid, error = %err,
                        "Control-plane cache fetch failed, proceeding without it");
                }
            }
        }

        // The control-plane view of this poll, ranks pending.
        let mut new_rundowns: Vec<Rundown> = resolved
            .rundowns
            .iter()
            .map(|rundown| Rundown {
                external_id: rundown.rundown_id.clone(),
                name: listing.name.clone(),
                gateway_version: listing.gateway_version.clone(),
                back_time: rundown.back_time.clone(),
                segments: rundown
                    .segments
                    .iter()
                    .filter_map(|id| state.inews_data.get(id).map(RundownSegment::from_story))
                    .collect(),
            })
            .collect();

        let diff = diff_playlist(&baseline, &new_rundowns);

        // Rank assignment, after the diff so position stability is known.
        let now = Instant::now();
        let mut rank_results: HashMap<RundownId, AssignedRanks> = HashMap::new();
        for rundown in &resolved.rundowns {
            let rid = &rundown.rundown_id;
            let assigned = self.ranker.assign(
                &rundown.segments,
                diff.stable_segments(rid),
                state.previous_ranks.get(rid),
                state.last_forced_rank_recalculation.get(rid).copied(),
                now,
            );
            if assigned.recalculated_as_integers {
                info!(rundown = %rid, "Rank spacing exhausted, rundown rebased to integer ranks");
                self.bus.broadcast(WatcherEvent::Info(format!(
                    "rundown {rid} rebased to integer ranks"
                )));
                state.last_forced_rank_recalculation.insert(rid.clone(), now);
            }
            rank_results.insert(rid.clone(), assigned);
        }

        for rundown in &mut new_rundowns {
            let assigned = &rank_results[&rundown.external_id];
            for segment in &mut rundown.segments {
                match assigned.ranks.get(&segment.external_id) {
                    Some(&rank) => segment.rank = rank,
                    None => {
                        // Assigner returned nothing for this segment: emit
                        // with the old rank if known, else rank 0, and say so.
                        let fallback = state
                            .previous_ranks
                            .get(&rundown.external_id)
                            .and_then(|ranks| ranks.get(&segment.external_id))
                            .copied()
                            .unwrap_or(0.0);
                        error!(rundown = %rundown.external_id, segment = %segment.external_id,
                            "No rank assigned, falling back to previous rank");
                        self.bus.broadcast(WatcherEvent::Error(format!(
                            "no rank assigned for segment {}",
                            segment.external_id
                        )));
                        segment.rank = fallback;
                    }
                }
            }
        }

        self.update_caches(state, &playlist_id, &listing, &resolved, &new_rundowns, &rank_results);

        for event in build_events(&diff, &new_rundowns, &rank_results) {
            self.bus.broadcast(event);
        }

        Ok(())
    }

    /// Replaces every cache entry touched by this poll. Runs under the
    /// processing lock, between diffing and event emission.
    fn update_caches(
        &self,
        state: &mut WatcherState,
        playlist_id: &PlaylistId,
        listing: &nwgnrcs::ReducedRundown,
        resolved: &ResolvedPlaylist,
        new_rundowns: &[Rundown],
        rank_results: &HashMap<RundownId, AssignedRanks>,
    ) {
        // Evict stories that left the playlist.
        let current_ids: HashSet<&SegmentId> =
            listing.segments.iter().map(|e| &e.external_id).collect();
        let previous_ids: Vec<SegmentId> = state
            .playlists
            .get(playlist_id)
            .into_iter()
            .flatten()
            .filter_map(|rid| state.rundowns.get(rid))
            .flatten()
            .cloned()
            .collect();
        for id in previous_ids {
            if !current_ids.contains(&id) {
                state.inews_data.remove(&id);
                state.segments.remove(&id);
            }
        }

        for entry in &listing.segments {
            state.segments.insert(entry.external_id.clone(), entry.clone());
        }

        // Stories follow their resolved rundown.
        for rundown in &resolved.rundowns {
            for id in &rundown.segments {
                if let Some(story) = state.inews_data.get_mut(id) {
                    story.rundown_id = rundown.rundown_id.clone();
                }
            }
        }

        let old_rids = state
            .playlists
            .insert(playlist_id.clone(), resolved.rundown_ids().cloned().collect())
            .unwrap_or_default();
        for rid in &old_rids {
            if !resolved.rundowns.iter().any(|r| &r.rundown_id == rid) {
                state.rundowns.remove(rid);
                state.previous_ranks.remove(rid);
                state.last_forced_rank_recalculation.remove(rid);
            }
        }
        for rundown in &resolved.rundowns {
            state
                .rundowns
                .insert(rundown.rundown_id.clone(), rundown.segments.clone());
            state.previous_ranks.insert(
                rundown.rundown_id.clone(),
                rank_results[&rundown.rundown_id].ranks.clone(),
            );
        }

        state
            .playlist_assignments
            .insert(playlist_id.clone(), resolved.clone());
        state
            .assigned_rundowns
            .insert(playlist_id.clone(), new_rundowns.to_vec());
    }
}

/// Synthesizes a diff baseline rundown from control-plane memory and seeds
/// the previous ranks from it, so a restart neither re-emits unchanged
/// content nor reshuffles ranks.
fn rundown_from_cache(
    rundown_id: &RundownId,
    name: &str,
    gateway_version: &str,
    cached: HashMap<SegmentId, CachedSegment>,
    previous_ranks: &mut HashMap<RundownId, BTreeMap<SegmentId, f64>>,
) -> Rundown {
    let mut segments: Vec<CachedSegment> = cached.into_values().collect();
    segments.sort_by(|a, b| {
        a.rank
            .partial_cmp(&b.rank)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    previous_ranks.insert(
        rundown_id.clone(),
        segments
            .iter()
            .map(|s| (s.external_id.clone(), s.rank))
            .collect(),
    );

    Rundown {
        external_id: rundown_id.clone(),
        name: name.to_string(),
        gateway_version: gateway_version.to_string(),
        back_time: None,
        segments: segments
            .into_iter()
            .map(|s| RundownSegment {
                external_id: s.external_id,
                name: s.name,
                modified: s.modified,
                locator: s.locator,
                rank: s.rank,
                float: false,
                payload: Default::default(),
            })
            .collect(),
    }
}

/// Orders this poll's changes for emission:
/// deletions, then rundown-level creates/updates carrying full segments,
/// then segment-level events not covered by those, then one coalesced rank
/// update per rundown that still needs it.
fn build_events(
    diff: &PlaylistDiff,
    new_rundowns: &[Rundown],
    rank_results: &HashMap<RundownId, AssignedRanks>,
) -> Vec<WatcherEvent> {
    let by_id: HashMap<&RundownId, &Rundown> =
        new_rundowns.iter().map(|r| (&r.external_id, r)).collect();
    let mut events = Vec::new();

    for (rundown_id, kind) in &diff.rundown_changes {
        if *kind == RundownChangeKind::Deleted {
            events.push(WatcherEvent::RundownDelete {
                rundown_id: rundown_id.clone(),
            });
        }
    }
    for change in diff.segments_with(SegmentChangeKind::Deleted) {
        events.push(WatcherEvent::SegmentDelete {
            rundown_id: change.rundown_id.clone(),
            segment_id: change.segment_id.clone(),
        });
    }

    // All creates strictly before all updates, whatever order the
    // rundowns appear in within the playlist.
    let mut covered: HashSet<&RundownId> = HashSet::new();
    for kind in [RundownChangeKind::Created, RundownChangeKind::Updated] {
        for (rundown_id, _) in diff.rundown_changes.iter().filter(|(_, k)| *k == kind) {
            let Some(rundown) = by_id.get(rundown_id) else {
                continue;
            };
            covered.insert(&rundown.external_id);
            let event = match kind {
                RundownChangeKind::Created => WatcherEvent::RundownCreate {
                    rundown_id: rundown_id.clone(),
                    rundown: (*rundown).clone(),
                },
                _ => WatcherEvent::RundownUpdate {
                    rundown_id: rundown_id.clone(),
                    rundown: (*rundown).clone(),
                },
            };
            events.push(event);
        }
    }

    for kind in [SegmentChangeKind::Changed, SegmentChangeKind::Created] {
        for change in diff.segments_with(kind) {
            if covered.contains(&change.rundown_id) {
                continue;
            }
            let Some(segment) = by_id
                .get(&change.rundown_id)
                .and_then(|r| r.segments.iter().find(|s| s.external_id == change.segment_id))
            else {
                continue;
            };
            let event = match kind {
                SegmentChangeKind::Changed => WatcherEvent::SegmentUpdate {
                    rundown_id: change.rundown_id.clone(),
                    segment_id: change.segment_id.clone(),
                    segment: segment.clone(),
                },
                _ => WatcherEvent::SegmentCreate {
                    rundown_id: change.rundown_id.clone(),
                    segment_id: change.segment_id.clone(),
                    segment: segment.clone(),
                },
            };
            events.push(event);
        }
    }

    for rundown in new_rundowns {
        let rundown_id = &rundown.external_id;
        if covered.contains(rundown_id) {
            continue;
        }
        let Some(assigned) = rank_results.get(rundown_id) else {
            continue;
        };
        if diff.rundown_has_moves(rundown_id) || assigned.recalculated_as_integers {
            events.push(WatcherEvent::SegmentRanksUpdate {
                rundown_id: rundown_id.clone(),
                ranks: assigned.ranks.clone(),
            });
        }
    }

    events
}
