// Snapshot cache and refresh coordinator.
//
// Owns every cache entry; consumers only ever see `Arc`-wrapped immutable
// snapshots. The two load-bearing invariants live here:
//
// 1. Deduplication: concurrent hydrations of one key share a single
//    in-flight fetch. The in-flight map is checked-and-inserted under the
//    same lock as the entry map, so two callers can never both observe "no
//    fetch running" and both launch one.
// 2. Monotonic overwrite guard: every fetch carries a per-key sequence
//    number and a completed fetch writes to cache only if its sequence is
//    newer than the last write, so a slow stale fetch can never clobber a
//    fresher result. Sequences are scoped by an entry generation, bumped on
//    `clear_caches`, so a straggler fetch from before a clear can neither
//    commit into a recreated entry nor evict its in-flight registration.
//
// Fetches run in spawned tasks: a caller that gives up does not cancel the
// fetch other observers may be awaiting; the result lands in cache (or is
// dropped if the cache was cleared underneath it).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, watch, Semaphore};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::derived;
use crate::model::{CacheKey, LeagueDescriptor, LeagueSnapshot, Platform};
use crate::reconcile::{ReconcileError, Reconciler};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// TTL and fan-out policy for the store.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// TTL while the cached snapshot has a game in progress.
    pub live_ttl: Duration,
    /// TTL when nothing tracked is live.
    pub idle_ttl: Duration,
    /// Cap on simultaneous league refreshes, to stay friendly with
    /// upstream rate limits.
    pub max_concurrent_refreshes: usize,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            live_ttl: Duration::from_secs(90),
            idle_ttl: Duration::from_secs(300),
            max_concurrent_refreshes: 3,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors and events
// ---------------------------------------------------------------------------

/// Hydration failure. `Clone` so one in-flight failure fans out to every
/// caller awaiting the shared fetch.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum HydrateError {
    /// The key was never registered via `warm_leagues`.
    #[error("league not warmed: {0}")]
    UnknownKey(String),

    /// Fetch or reconcile failed and no fallback was available.
    #[error("hydration failed for {key}: {message}")]
    Failed { key: String, message: String },
}

/// Emitted once per cache write affecting a league.
#[derive(Debug, Clone)]
pub struct SnapshotEvent {
    pub key: CacheKey,
}

/// Filtered subscription to one league's snapshot updates.
pub struct SnapshotObserver {
    league_id: String,
    rx: broadcast::Receiver<SnapshotEvent>,
}

impl SnapshotObserver {
    /// Next update for the observed league. `None` when the store is gone.
    /// Lagged observers skip missed events: every event is a hint to
    /// re-read `cached_snapshot`, not a data carrier.
    pub async fn recv(&mut self) -> Option<SnapshotEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.key.league_id == self.league_id => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Cache internals
// ---------------------------------------------------------------------------

/// Lifecycle of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Registered, no successful fetch yet.
    Pending,
    /// Last fetch succeeded within TTL.
    Fresh,
    /// Has data, but the last refresh attempt failed or TTL elapsed.
    Stale,
}

type FetchOutcome = Result<Arc<LeagueSnapshot>, HydrateError>;

struct CacheEntry {
    descriptor: LeagueDescriptor,
    snapshot: Option<Arc<LeagueSnapshot>>,
    fetched_at: Option<Instant>,
    state: EntryState,
    /// Generation the entry was created under. A completed fetch from an
    /// older generation never touches this entry.
    generation: u64,
    /// Sequence assigned to the next fetch launched for this key.
    next_seq: u64,
    /// Sequence of the newest fetch whose result was written.
    written_seq: u64,
}

struct InFlight {
    rx: watch::Receiver<Option<FetchOutcome>>,
    generation: u64,
    seq: u64,
}

#[derive(Default)]
struct StoreState {
    entries: HashMap<CacheKey, CacheEntry>,
    inflight: HashMap<CacheKey, InFlight>,
    /// Bumped by `clear_caches`; recreated entries start a fresh sequence
    /// space under the new generation.
    generation: u64,
}

// ---------------------------------------------------------------------------
// SnapshotStore
// ---------------------------------------------------------------------------

struct StoreInner {
    state: Mutex<StoreState>,
    reconcilers: HashMap<Platform, Arc<Reconciler>>,
    config: RefreshConfig,
    events: broadcast::Sender<SnapshotEvent>,
    refresh_limit: Arc<Semaphore>,
}

/// The snapshot cache and refresh coordinator. Cheap to clone; clones share
/// one cache.
#[derive(Clone)]
pub struct SnapshotStore {
    inner: Arc<StoreInner>,
}

impl SnapshotStore {
    pub fn new(reconcilers: Vec<Arc<Reconciler>>, config: RefreshConfig) -> Self {
        let reconcilers = reconcilers
            .into_iter()
            .map(|r| (r.client().platform(), r))
            .collect();
        let (events, _) = broadcast::channel(256);
        let refresh_limit = Arc::new(Semaphore::new(config.max_concurrent_refreshes.max(1)));
        Self {
            inner: Arc::new(StoreInner {
                state: Mutex::new(StoreState::default()),
                reconcilers,
                config,
                events,
                refresh_limit,
            }),
        }
    }

    // -- public contract ----------------------------------------------------

    /// Register cache entries for the given leagues at `week`, in `Pending`
    /// state. Returns immediately; no network. Entries from other weeks are
    /// proactively evicted to bound memory (week is part of the key, so
    /// they were already unreachable via new-week hydrates).
    pub fn warm_leagues(&self, leagues: &[LeagueDescriptor], week: u16) {
        let mut state = self.inner.state.lock().unwrap();
        let before = state.entries.len();
        state.entries.retain(|k, _| k.week == week);
        let evicted = before - state.entries.len();
        state.inflight.retain(|k, _| k.week == week);
        let generation = state.generation;

        for league in leagues {
            let key = CacheKey::for_league(league, week);
            state.entries.entry(key).or_insert_with(|| CacheEntry {
                descriptor: league.clone(),
                snapshot: None,
                fetched_at: None,
                state: EntryState::Pending,
                generation,
                next_seq: 0,
                written_seq: 0,
            });
        }
        info!(
            leagues = leagues.len(),
            week, evicted, "warmed league cache entries"
        );
    }

    /// Ensure the entry for `key` holds usable data, fetching if necessary.
    ///
    /// Within-TTL fresh entries return without suspending. When a fetch for
    /// the key is already in flight, the caller joins it; otherwise exactly
    /// one fetch is launched no matter how many callers arrive concurrently.
    pub async fn hydrate(&self, key: &CacheKey) -> Result<Arc<LeagueSnapshot>, HydrateError> {
        self.hydrate_inner(key, false).await
    }

    /// Non-blocking read-only peek. Staleness is a refresh-urgency hint,
    /// not a reason to hide data, so stale snapshots are returned too.
    pub fn cached_snapshot(&self, key: &CacheKey) -> Option<Arc<LeagueSnapshot>> {
        let state = self.inner.state.lock().unwrap();
        state.entries.get(key).and_then(|e| e.snapshot.clone())
    }

    /// Current lifecycle state of an entry, if registered.
    pub fn entry_state(&self, key: &CacheKey) -> Option<EntryState> {
        let state = self.inner.state.lock().unwrap();
        state.entries.get(key).map(|e| e.state)
    }

    /// Subscribe to snapshot-updated events for one league. Observers share
    /// the underlying fetches and never trigger duplicate network calls.
    pub fn observe(&self, league_id: &str) -> SnapshotObserver {
        SnapshotObserver {
            league_id: league_id.to_string(),
            rx: self.inner.events.subscribe(),
        }
    }

    /// Refresh one league's warmed entries, or all of them.
    ///
    /// Fan-out is bounded by the configured concurrency cap. Failures are
    /// captured per league and returned; one league's failure never aborts
    /// its siblings. `force` bypasses TTL freshness.
    pub async fn refresh(
        &self,
        league_id: Option<&str>,
        force: bool,
    ) -> Vec<(CacheKey, HydrateError)> {
        let keys: Vec<CacheKey> = {
            let state = self.inner.state.lock().unwrap();
            state
                .entries
                .keys()
                .filter(|k| league_id.map_or(true, |id| k.league_id == id))
                .cloned()
                .collect()
        };

        let tasks = keys.into_iter().map(|key| {
            let store = self.clone();
            let limit = Arc::clone(&self.inner.refresh_limit);
            async move {
                // Closed only on store teardown.
                let Ok(_permit) = limit.acquire().await else {
                    return None;
                };
                match store.hydrate_inner(&key, force).await {
                    Ok(_) => None,
                    Err(e) => Some((key, e)),
                }
            }
        });

        let failures: Vec<(CacheKey, HydrateError)> = futures_util::future::join_all(tasks)
            .await
            .into_iter()
            .flatten()
            .collect();
        for (key, error) in &failures {
            warn!(%key, %error, "league refresh failed");
        }
        failures
    }

    /// Drop every entry and all in-flight bookkeeping. Used on logout and
    /// explicit week changes. Fetches already running land nowhere.
    pub fn clear_caches(&self) {
        let mut state = self.inner.state.lock().unwrap();
        let dropped = state.entries.len();
        state.entries.clear();
        state.inflight.clear();
        state.generation += 1;
        info!(dropped, "cleared snapshot caches");
    }

    /// Periodically refresh all warmed leagues until the handle is stopped
    /// or dropped. Suspend-on-background is the caller's job: stop the
    /// handle when backgrounded, start a new one on foreground.
    pub fn start_auto_refresh(&self, interval: Duration) -> AutoRefreshHandle {
        let store = self.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // First tick fires immediately; skip it so callers control the
            // initial load explicitly.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                store.refresh(None, false).await;
            }
        });
        AutoRefreshHandle { task }
    }

    // -- internals ----------------------------------------------------------

    /// TTL for an entry, read from the derived-state layer: live snapshots
    /// refresh on the short interval.
    fn ttl_for(&self, snapshot: Option<&LeagueSnapshot>) -> Duration {
        match snapshot {
            Some(s) if derived::is_live(s) => self.inner.config.live_ttl,
            _ => self.inner.config.idle_ttl,
        }
    }

    async fn hydrate_inner(
        &self,
        key: &CacheKey,
        force: bool,
    ) -> Result<Arc<LeagueSnapshot>, HydrateError> {
        // Single critical section: freshness check, in-flight join, or
        // atomic launch registration.
        let mut rx = {
            let mut guard = self.inner.state.lock().unwrap();
            let state = &mut *guard;
            let Some(entry) = state.entries.get_mut(key) else {
                return Err(HydrateError::UnknownKey(key.to_string()));
            };

            if let (Some(snapshot), Some(fetched_at)) = (&entry.snapshot, entry.fetched_at) {
                let ttl = self.ttl_for(Some(snapshot));
                if fetched_at.elapsed() <= ttl {
                    if !force && entry.state == EntryState::Fresh {
                        return Ok(Arc::clone(snapshot));
                    }
                } else if entry.state == EntryState::Fresh {
                    entry.state = EntryState::Stale;
                }
            }

            if let Some(inflight) = state.inflight.get(key) {
                inflight.rx.clone()
            } else {
                let generation = entry.generation;
                let seq = entry.next_seq;
                entry.next_seq += 1;
                if entry.snapshot.is_none() {
                    entry.state = EntryState::Pending;
                }
                let descriptor = entry.descriptor.clone();
                let (tx, rx) = watch::channel(None);
                state.inflight.insert(
                    key.clone(),
                    InFlight {
                        rx: rx.clone(),
                        generation,
                        seq,
                    },
                );
                drop(guard);

                self.spawn_fetch(key.clone(), descriptor, generation, seq, tx);
                rx
            }
        };

        // Await the shared outcome. The fetch task always sends exactly one
        // value; a closed channel means the task panicked.
        let outcome = match rx.wait_for(|outcome| outcome.is_some()).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        };
        match outcome {
            Some(result) => result,
            None => Err(HydrateError::Failed {
                key: key.to_string(),
                message: "fetch task dropped without a result".to_string(),
            }),
        }
    }

    /// Launch the fetch task for `key` with sequence `seq`. Detached from
    /// the caller so abandoning a hydrate never cancels a fetch others may
    /// be awaiting.
    fn spawn_fetch(
        &self,
        key: CacheKey,
        descriptor: LeagueDescriptor,
        generation: u64,
        seq: u64,
        tx: watch::Sender<Option<FetchOutcome>>,
    ) {
        let store = self.clone();
        tokio::spawn(async move {
            debug!(%key, seq, "launching league fetch");
            let result = match store.inner.reconcilers.get(&key.platform) {
                Some(reconciler) => reconciler.reconcile(&descriptor, key.week).await,
                None => Err(ReconcileError::IdentityResolution {
                    league_id: key.league_id.clone(),
                }),
            };
            let outcome = store.apply_fetch_outcome(&key, generation, seq, result);
            let _ = tx.send(Some(outcome));
        });
    }

    /// Commit a completed fetch: cache write, staleness fallback, event
    /// emission. Split out so the overwrite guard is unit-testable.
    fn apply_fetch_outcome(
        &self,
        key: &CacheKey,
        generation: u64,
        seq: u64,
        result: Result<LeagueSnapshot, ReconcileError>,
    ) -> FetchOutcome {
        let mut state = self.inner.state.lock().unwrap();
        // Remove only our own registration; a straggler from a cleared
        // generation must not evict a newer fetch's in-flight record.
        let ours = state
            .inflight
            .get(key)
            .is_some_and(|f| f.generation == generation && f.seq == seq);
        if ours {
            state.inflight.remove(key);
        }

        // Cleared (or re-warmed to a new week) while we were fetching:
        // the result has nowhere to land. Same for an entry recreated under
        // a newer generation.
        let stale_generation = state
            .entries
            .get(key)
            .map_or(true, |e| e.generation != generation);
        if stale_generation {
            debug!(%key, generation, seq, "fetch outlived its entry, dropping result");
            return result.map(Arc::new).map_err(|e| HydrateError::Failed {
                key: key.to_string(),
                message: e.to_string(),
            });
        }
        let Some(entry) = state.entries.get_mut(key) else {
            return Err(HydrateError::UnknownKey(key.to_string()));
        };

        match result {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                if seq < entry.written_seq {
                    // A newer fetch already landed; keep its result.
                    debug!(
                        %key,
                        seq,
                        written_seq = entry.written_seq,
                        "discarding stale-sequence fetch result"
                    );
                    return Ok(entry.snapshot.clone().unwrap_or(snapshot));
                }
                entry.snapshot = Some(Arc::clone(&snapshot));
                entry.fetched_at = Some(Instant::now());
                entry.state = EntryState::Fresh;
                entry.written_seq = seq;
                drop(state);
                let _ = self.inner.events.send(SnapshotEvent { key: key.clone() });
                Ok(snapshot)
            }
            Err(error) => {
                if seq < entry.written_seq {
                    // A newer fetch already wrote; this failure is stale
                    // news and must not downgrade the entry.
                    debug!(
                        %key,
                        seq,
                        written_seq = entry.written_seq,
                        "ignoring stale-sequence fetch failure"
                    );
                    return match entry.snapshot.clone() {
                        Some(prev) => Ok(prev),
                        None => Err(HydrateError::Failed {
                            key: key.to_string(),
                            message: error.to_string(),
                        }),
                    };
                }

                // Playoff/bracket knockout: the league still exists but the
                // user has no matchup. Synthesize a historical card from the
                // last-known roster rather than erroring.
                if let ReconcileError::NoMatchups { .. } = &error {
                    if let Some(LeagueSnapshot::HeadToHead(prev)) =
                        entry.snapshot.as_deref().cloned()
                    {
                        let synthesized = Arc::new(derived::synthesize_eliminated_snapshot(
                            &entry.descriptor,
                            key.week,
                            prev.my_team,
                        ));
                        warn!(%key, "no matchup upstream; synthesized eliminated card");
                        entry.snapshot = Some(Arc::clone(&synthesized));
                        entry.fetched_at = Some(Instant::now());
                        entry.state = EntryState::Fresh;
                        entry.written_seq = entry.written_seq.max(seq);
                        drop(state);
                        let _ = self.inner.events.send(SnapshotEvent { key: key.clone() });
                        return Ok(synthesized);
                    }
                }

                // Degrade to last-known-good when any prior fetch succeeded.
                if let Some(prev) = entry.snapshot.clone() {
                    warn!(%key, %error, "refresh failed, serving stale snapshot");
                    entry.state = EntryState::Stale;
                    return Ok(prev);
                }

                Err(HydrateError::Failed {
                    key: key.to_string(),
                    message: error.to_string(),
                })
            }
        }
    }
}

/// Handle for a running auto-refresh loop. Aborts the loop on `stop` or
/// drop.
pub struct AutoRefreshHandle {
    task: tokio::task::JoinHandle<()>,
}

impl AutoRefreshHandle {
    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for AutoRefreshHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
