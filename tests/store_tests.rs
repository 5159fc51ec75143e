// Integration tests for the snapshot store: deduplication, TTL policy,
// failure isolation, observers, and bounded refresh fan-out, all exercised
// through the crate's public API with a scripted platform client.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use huddle::model::{CacheKey, GameStatus, LeagueDescriptor, Platform};
use huddle::platform::{
    LeagueSettings, MatchupRecord, MockLeague, MockPlatform, PlatformClient, RosterRecord,
    UserRecord,
};
use huddle::reconcile::Reconciler;
use huddle::stats::{
    GameInfo, StaticGameStatusProvider, StaticPlayerDirectory, StaticStatsProvider,
};
use huddle::store::{EntryState, HydrateError, RefreshConfig, SnapshotStore};

// ===========================================================================
// Test helpers
// ===========================================================================

/// The scripted user's Sleeper identity.
const ME: &str = "u_me";

fn descriptor(id: &str, name: &str) -> LeagueDescriptor {
    LeagueDescriptor {
        league_id: id.to_string(),
        name: name.to_string(),
        platform: Platform::Sleeper,
        season_year: 2026,
        total_teams: 2,
    }
}

fn roster(roster_id: u64, owner: &str, players: &[&str]) -> RosterRecord {
    RosterRecord {
        roster_id,
        owner_id: Some(owner.to_string()),
        owner_ids: vec![owner.to_string()],
        player_ids: players.iter().map(|p| p.to_string()).collect(),
        starter_ids: players.iter().map(|p| p.to_string()).collect(),
        team_name: None,
        owner_display_name: None,
        wins: 0,
        losses: 0,
    }
}

fn matchup(roster_id: u64, points: f64, players: &[(&str, f64)]) -> MatchupRecord {
    MatchupRecord {
        roster_id,
        matchup_id: Some(1),
        points,
        player_ids: players.iter().map(|(p, _)| p.to_string()).collect(),
        starter_ids: players.iter().map(|(p, _)| p.to_string()).collect(),
        player_points: players
            .iter()
            .map(|(p, pts)| (p.to_string(), *pts))
            .collect(),
    }
}

fn user(id: &str, name: &str) -> UserRecord {
    UserRecord {
        user_id: id.to_string(),
        display_name: name.to_string(),
        team_name: None,
        avatar_url: None,
    }
}

/// Minimal two-team head-to-head league where my team leads 100.0 to 90.0.
fn h2h_league(week: u16) -> MockLeague {
    let mut matchups = HashMap::new();
    matchups.insert(
        week,
        vec![
            matchup(1, 100.0, &[("p1", 100.0)]),
            matchup(2, 90.0, &[("p2", 90.0)]),
        ],
    );
    MockLeague {
        descriptor: None,
        rosters: vec![roster(1, ME, &["p1"]), roster(2, "u_opp", &["p2"])],
        matchups,
        users: vec![user(ME, "me"), user("u_opp", "opponent")],
        settings: LeagueSettings::default(),
    }
}

struct Fixture {
    mock: Arc<MockPlatform>,
    games: Arc<StaticGameStatusProvider>,
    store: SnapshotStore,
}

fn fixture(config: RefreshConfig) -> Fixture {
    let mock = Arc::new(MockPlatform::new(Platform::Sleeper));
    let client: Arc<dyn PlatformClient> = mock.clone();
    let games = Arc::new(StaticGameStatusProvider::new());
    let reconciler = Reconciler::new(
        client,
        Arc::new(StaticStatsProvider::new()),
        games.clone(),
        Arc::new(StaticPlayerDirectory::new()),
        ME.to_string(),
    );
    let store = SnapshotStore::new(vec![Arc::new(reconciler)], config);
    Fixture { mock, games, store }
}

// ===========================================================================
// Deduplication
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn concurrent_hydrates_share_one_fetch() {
    let f = fixture(RefreshConfig::default());
    f.mock.script_league("L1", h2h_league(5));
    f.mock.set_latency(Duration::from_millis(200));

    let league = descriptor("L1", "League One");
    f.store.warm_leagues(&[league.clone()], 5);
    let key = CacheKey::for_league(&league, 5);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = f.store.clone();
        let key = key.clone();
        handles.push(tokio::spawn(async move { store.hydrate(&key).await }));
    }

    let mut snapshots = Vec::new();
    for handle in handles {
        snapshots.push(handle.await.unwrap().unwrap());
    }

    // Exactly one network round-trip per endpoint, and all callers got the
    // same snapshot.
    assert_eq!(f.mock.matchup_fetches(), 1);
    assert_eq!(f.mock.settings_fetches(), 1);
    for s in &snapshots[1..] {
        assert_eq!(**s, *snapshots[0]);
    }
}

#[tokio::test(start_paused = true)]
async fn concurrent_hydrates_share_one_failure() {
    let f = fixture(RefreshConfig::default());
    f.mock.script_league("L1", h2h_league(5));
    f.mock.set_latency(Duration::from_millis(100));
    // The settings call fails; every concurrent caller sees that failure.
    f.mock.fail_next(1);

    let league = descriptor("L1", "League One");
    f.store.warm_leagues(&[league.clone()], 5);
    let key = CacheKey::for_league(&league, 5);

    let mut handles = Vec::new();
    for _ in 0..4 {
        let store = f.store.clone();
        let key = key.clone();
        handles.push(tokio::spawn(async move { store.hydrate(&key).await }));
    }

    let mut errors = 0;
    for handle in handles {
        if handle.await.unwrap().is_err() {
            errors += 1;
        }
    }
    assert_eq!(errors, 4);
    assert_eq!(f.mock.settings_fetches(), 1);
}

// ===========================================================================
// TTL policy
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn within_ttl_hydrate_hits_cache() {
    let f = fixture(RefreshConfig::default());
    f.mock.script_league("L1", h2h_league(5));

    let league = descriptor("L1", "League One");
    f.store.warm_leagues(&[league.clone()], 5);
    let key = CacheKey::for_league(&league, 5);

    f.store.hydrate(&key).await.unwrap();
    assert_eq!(f.mock.matchup_fetches(), 1);

    // Well within the idle TTL: served from cache.
    tokio::time::advance(Duration::from_secs(60)).await;
    f.store.hydrate(&key).await.unwrap();
    assert_eq!(f.mock.matchup_fetches(), 1);

    // Past the idle TTL: refetched.
    tokio::time::advance(Duration::from_secs(300)).await;
    f.store.hydrate(&key).await.unwrap();
    assert_eq!(f.mock.matchup_fetches(), 2);
}

#[tokio::test(start_paused = true)]
async fn live_snapshot_uses_short_ttl() {
    let f = fixture(RefreshConfig::default());
    f.mock.script_league("L1", h2h_league(5));
    // My starter's game is in progress, so the snapshot is live.
    f.games.insert(
        "",
        GameInfo {
            status: GameStatus::In,
            home_score: 14,
            away_score: 7,
        },
    );

    let league = descriptor("L1", "League One");
    f.store.warm_leagues(&[league.clone()], 5);
    let key = CacheKey::for_league(&league, 5);

    f.store.hydrate(&key).await.unwrap();
    assert_eq!(f.mock.matchup_fetches(), 1);

    // 91 seconds is stale for a live snapshot (90s TTL) even though it is
    // fresh by the idle policy.
    tokio::time::advance(Duration::from_secs(91)).await;
    f.store.hydrate(&key).await.unwrap();
    assert_eq!(f.mock.matchup_fetches(), 2);
}

// ===========================================================================
// Failure handling
// ===========================================================================

#[tokio::test]
async fn one_league_failure_never_aborts_siblings() {
    let f = fixture(RefreshConfig::default());
    f.mock.script_league("L1", h2h_league(5));
    // "L2" is never scripted: its fetches return empty data, so my team
    // cannot be identified and reconciliation fails.

    let good = descriptor("L1", "Good League");
    let bad = descriptor("L2", "Broken League");
    f.store.warm_leagues(&[good.clone(), bad.clone()], 5);

    let failures = f.store.refresh(None, true).await;
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0.league_id, "L2");

    let good_key = CacheKey::for_league(&good, 5);
    assert!(f.store.cached_snapshot(&good_key).is_some());
    assert_eq!(f.store.entry_state(&good_key), Some(EntryState::Fresh));
}

#[tokio::test]
async fn refresh_failure_serves_last_known_good_and_marks_stale() {
    let f = fixture(RefreshConfig::default());
    f.mock.script_league("L1", h2h_league(5));

    let league = descriptor("L1", "League One");
    f.store.warm_leagues(&[league.clone()], 5);
    let key = CacheKey::for_league(&league, 5);

    let first = f.store.hydrate(&key).await.unwrap();

    // Every subsequent fetch fails; forced refresh must degrade, not error.
    f.mock.fail_next(100);
    let failures = f.store.refresh(Some("L1"), true).await;
    assert!(failures.is_empty());

    assert_eq!(f.store.entry_state(&key), Some(EntryState::Stale));
    let served = f.store.cached_snapshot(&key).unwrap();
    assert_eq!(*served, *first);
}

#[tokio::test]
async fn hydrate_on_unwarmed_key_is_an_error() {
    let f = fixture(RefreshConfig::default());
    let league = descriptor("L1", "League One");
    let key = CacheKey::for_league(&league, 5);
    let err = f.store.hydrate(&key).await.unwrap_err();
    assert!(matches!(err, HydrateError::UnknownKey(_)));
}

// ===========================================================================
// Observers
// ===========================================================================

#[tokio::test]
async fn observers_get_one_event_per_cache_write_and_share_the_fetch() {
    let f = fixture(RefreshConfig::default());
    f.mock.script_league("L1", h2h_league(5));

    let league = descriptor("L1", "League One");
    f.store.warm_leagues(&[league.clone()], 5);
    let key = CacheKey::for_league(&league, 5);

    let mut observer_a = f.store.observe("L1");
    let mut observer_b = f.store.observe("L1");
    let mut other = f.store.observe("L2");

    f.store.hydrate(&key).await.unwrap();

    let event_a = observer_a.recv().await.unwrap();
    let event_b = observer_b.recv().await.unwrap();
    assert_eq!(event_a.key, key);
    assert_eq!(event_b.key, key);

    // Two observers, one underlying fetch.
    assert_eq!(f.mock.matchup_fetches(), 1);

    // The L2 observer saw nothing.
    let timed_out =
        tokio::time::timeout(Duration::from_millis(50), other.recv()).await;
    assert!(timed_out.is_err());
}

// ===========================================================================
// Bounded fan-out
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn refresh_fan_out_respects_concurrency_cap() {
    let config = RefreshConfig {
        max_concurrent_refreshes: 2,
        ..RefreshConfig::default()
    };
    let f = fixture(config);
    f.mock.set_latency(Duration::from_millis(100));

    let mut leagues = Vec::new();
    for i in 0..6 {
        let id = format!("L{i}");
        f.mock.script_league(&id, h2h_league(5));
        leagues.push(descriptor(&id, &format!("League {i}")));
    }
    f.store.warm_leagues(&leagues, 5);

    let failures = f.store.refresh(None, true).await;
    assert!(failures.is_empty());
    assert!(
        f.mock.max_in_flight() <= 2,
        "saw {} concurrent fetches, cap is 2",
        f.mock.max_in_flight()
    );
}

#[tokio::test(start_paused = true)]
async fn refresh_after_clear_wins_over_straggler_fetch() {
    let f = fixture(RefreshConfig::default());
    f.mock.script_league("L1", h2h_league(5));
    f.mock.set_latency(Duration::from_millis(200));

    let league = descriptor("L1", "League One");
    f.store.warm_leagues(&[league.clone()], 5);
    let key = CacheKey::for_league(&league, 5);

    // Start a hydrate and park its fetch mid-flight.
    let straggler = {
        let store = f.store.clone();
        let key = key.clone();
        tokio::spawn(async move { store.hydrate(&key).await })
    };
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }

    // Cache cleared and re-warmed for the same week while that fetch is
    // still running; upstream data changes underneath it.
    f.store.clear_caches();
    f.store.warm_leagues(&[league.clone()], 5);
    let mut updated = h2h_league(5);
    updated.matchups.insert(
        5,
        vec![
            matchup(1, 55.0, &[("p1", 55.0)]),
            matchup(2, 90.0, &[("p2", 90.0)]),
        ],
    );
    f.mock.script_league("L1", updated);
    f.mock.set_latency(Duration::ZERO);

    let failures = f.store.refresh(Some("L1"), true).await;
    assert!(failures.is_empty());

    // Let the parked fetch finally land; it must not displace the fresh
    // result committed after the clear.
    tokio::time::advance(Duration::from_millis(300)).await;
    let _ = straggler.await.unwrap();

    let cached = f.store.cached_snapshot(&key).unwrap();
    assert_eq!(cached.my_score(), Some(55.0));
    assert_eq!(f.store.entry_state(&key), Some(EntryState::Fresh));

    // And the next forced refresh still reaches the network.
    f.mock.script_league("L1", h2h_league(5));
    let failures = f.store.refresh(Some("L1"), true).await;
    assert!(failures.is_empty());
    let cached = f.store.cached_snapshot(&key).unwrap();
    assert_eq!(cached.my_score(), Some(100.0));
}

// ===========================================================================
// Week rollover
// ===========================================================================

#[tokio::test]
async fn week_change_evicts_and_unreaches_old_entries() {
    let f = fixture(RefreshConfig::default());
    let mut league_data = h2h_league(5);
    let week5_records = league_data.matchups[&5].clone();
    league_data.matchups.insert(6, week5_records);
    f.mock.script_league("L1", league_data);

    let league = descriptor("L1", "League One");
    f.store.warm_leagues(&[league.clone()], 5);
    let week5 = CacheKey::for_league(&league, 5);
    f.store.hydrate(&week5).await.unwrap();

    // Week rolls over: old-week entries are evicted outright and the key
    // space moves on without them.
    f.store.warm_leagues(&[league.clone()], 6);
    assert!(f.store.cached_snapshot(&week5).is_none());
    assert!(matches!(
        f.store.hydrate(&week5).await,
        Err(HydrateError::UnknownKey(_))
    ));

    let week6 = CacheKey::for_league(&league, 6);
    let snapshot = f.store.hydrate(&week6).await.unwrap();
    assert_eq!(snapshot.key().week, 6);

    // clear_caches drops the rest.
    f.store.clear_caches();
    assert!(f.store.cached_snapshot(&week6).is_none());
}
