// Integration tests for reconciliation: head-to-head matchup building,
// elimination-league ranking, identity failures, and malformed upstream
// data, all through the `Reconciler` public API with scripted platform
// data.

use std::collections::HashMap;
use std::sync::Arc;

use huddle::derived;
use huddle::model::{EliminationStatus, GameStatus, LeagueDescriptor, LeagueSnapshot, Platform};
use huddle::platform::{
    LeagueSettings, MatchupRecord, MockLeague, MockPlatform, PlatformClient, RosterRecord,
    UserRecord,
};
use huddle::reconcile::{ReconcileError, Reconciler};
use huddle::stats::{
    GameInfo, PlayerInfo, StaticGameStatusProvider, StaticPlayerDirectory, StaticStatsProvider,
};

// ===========================================================================
// Test helpers
// ===========================================================================

const ME: &str = "u_me";

struct Fixture {
    mock: Arc<MockPlatform>,
    games: Arc<StaticGameStatusProvider>,
    players: Arc<StaticPlayerDirectory>,
    reconciler: Reconciler,
}

fn fixture() -> Fixture {
    let mock = Arc::new(MockPlatform::new(Platform::Sleeper));
    let client: Arc<dyn PlatformClient> = mock.clone();
    let games = Arc::new(StaticGameStatusProvider::new());
    let players = Arc::new(StaticPlayerDirectory::new());
    let reconciler = Reconciler::new(
        client,
        Arc::new(StaticStatsProvider::new()),
        games.clone(),
        players.clone(),
        ME.to_string(),
    );
    Fixture {
        mock,
        games,
        players,
        reconciler,
    }
}

fn descriptor(id: &str, teams: usize) -> LeagueDescriptor {
    LeagueDescriptor {
        league_id: id.to_string(),
        name: format!("League {id}"),
        platform: Platform::Sleeper,
        season_year: 2026,
        total_teams: teams,
    }
}

fn roster(roster_id: u64, owner: Option<&str>, players: &[&str]) -> RosterRecord {
    RosterRecord {
        roster_id,
        owner_id: owner.map(str::to_string),
        owner_ids: owner.iter().map(|o| o.to_string()).collect(),
        player_ids: players.iter().map(|p| p.to_string()).collect(),
        starter_ids: players.iter().map(|p| p.to_string()).collect(),
        team_name: None,
        owner_display_name: None,
        wins: 0,
        losses: 0,
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

fn matchup(
    roster_id: u64,
    matchup_id: Option<u64>,
    points: f64,
    players: &[(&str, f64)],
) -> MatchupRecord {
    MatchupRecord {
        roster_id,
        matchup_id,
        points,
        player_ids: players.iter().map(|(p, _)| p.to_string()).collect(),
        starter_ids: players.iter().map(|(p, _)| p.to_string()).collect(),
        player_points: players
            .iter()
            .map(|(p, pts)| (p.to_string(), *pts))
            .collect(),
    }
}

// ===========================================================================
// Head-to-head
// ===========================================================================

/// A close matchup with a defensive starter still mid-game on the
/// opponent's side: 120.4 against 118.9 must read as live and winning.
#[tokio::test]
async fn live_close_matchup_reconciles_live_and_winning() {
    let f = fixture();
    f.players.insert(
        "qb1",
        PlayerInfo {
            name: "Patrick Mahomes".to_string(),
            position: "QB".to_string(),
            nfl_team: "KC".to_string(),
            injury_status: None,
        },
    );
    f.players.insert(
        "dst2",
        PlayerInfo {
            name: "Broncos D/ST".to_string(),
            position: "D/ST".to_string(),
            nfl_team: "DEN".to_string(),
            injury_status: None,
        },
    );
    f.games.insert(
        "DEN",
        GameInfo {
            status: GameStatus::In,
            home_score: 10,
            away_score: 13,
        },
    );
    f.games.insert(
        "KC",
        GameInfo {
            status: GameStatus::Post,
            home_score: 27,
            away_score: 20,
        },
    );

    let mut matchups = HashMap::new();
    matchups.insert(
        8,
        vec![
            matchup(1, Some(3), 120.4, &[("qb1", 120.4)]),
            matchup(2, Some(3), 118.9, &[("wr2", 112.9), ("dst2", 6.0)]),
        ],
    );
    f.mock.script_league(
        "h2h",
        MockLeague {
            descriptor: None,
            rosters: vec![
                roster(1, Some(ME), &["qb1"]),
                roster(2, Some("u_opp"), &["wr2", "dst2"]),
            ],
            matchups,
            users: vec![user(ME, "me"), user("u_opp", "riley")],
            settings: LeagueSettings::default(),
        },
    );

    let snapshot = f
        .reconciler
        .reconcile(&descriptor("h2h", 2), 8)
        .await
        .unwrap();

    let LeagueSnapshot::HeadToHead(m) = &snapshot else {
        panic!("expected head-to-head snapshot");
    };
    assert!((m.my_team.current_score - 120.4).abs() < 1e-9);
    let opp = m.opponent.as_ref().unwrap();
    assert!((opp.current_score - 118.9).abs() < 1e-9);
    assert_eq!(opp.owner_name, "riley");

    assert!(derived::is_live(&snapshot));
    assert!(derived::is_winning(&snapshot));
    assert!(!derived::is_eliminated(&snapshot));
}

/// The platform-native player ID is carried in the source platform's
/// cross-reference slot; the other platform's slot stays empty.
#[tokio::test]
async fn player_ids_fill_the_source_platform_slot() {
    let f = fixture();
    let mut matchups = HashMap::new();
    matchups.insert(
        1,
        vec![
            matchup(1, Some(1), 14.0, &[("qb1", 14.0)]),
            matchup(2, Some(1), 9.0, &[("wr2", 9.0)]),
        ],
    );
    f.mock.script_league(
        "h2h",
        MockLeague {
            descriptor: None,
            rosters: vec![roster(1, Some(ME), &["qb1"]), roster(2, Some("u2"), &["wr2"])],
            matchups,
            users: vec![user(ME, "me"), user("u2", "them")],
            settings: LeagueSettings::default(),
        },
    );

    let snapshot = f
        .reconciler
        .reconcile(&descriptor("h2h", 2), 1)
        .await
        .unwrap();
    let LeagueSnapshot::HeadToHead(m) = &snapshot else {
        panic!("expected head-to-head snapshot");
    };
    let qb = &m.my_team.roster[0];
    assert_eq!(qb.sleeper_id.as_deref(), Some("qb1"));
    assert!(qb.espn_id.is_none());
}

/// A starter with no inline points and no stat line contributes exactly
/// 0.0, never NaN and never an error.
#[tokio::test]
async fn missing_stats_contribute_zero() {
    let f = fixture();
    let mut matchups = HashMap::new();
    matchups.insert(
        1,
        vec![
            // "ghost" has no player_points entry and no stats anywhere.
            matchup(1, Some(1), 0.0, &[("qb1", 22.5)]),
            matchup(2, Some(1), 0.0, &[("wr2", 10.0)]),
        ],
    );
    let mut league = MockLeague {
        descriptor: None,
        rosters: vec![
            roster(1, Some(ME), &["qb1", "ghost"]),
            roster(2, Some("u_opp"), &["wr2"]),
        ],
        matchups,
        users: vec![user(ME, "me"), user("u_opp", "opp")],
        settings: LeagueSettings::default(),
    };
    // Put the ghost in the starting lineup via the matchup record.
    let record = &mut league.matchups.get_mut(&1).unwrap()[0];
    record.player_ids.push("ghost".to_string());
    record.starter_ids.push("ghost".to_string());
    f.mock.script_league("h2h", league);

    let snapshot = f
        .reconciler
        .reconcile(&descriptor("h2h", 2), 1)
        .await
        .unwrap();
    let LeagueSnapshot::HeadToHead(m) = &snapshot else {
        panic!("expected head-to-head snapshot");
    };

    let ghost = m
        .my_team
        .roster
        .iter()
        .find(|p| p.player_id == "ghost")
        .unwrap();
    assert!(ghost.is_starter);
    assert_eq!(ghost.current_score, 0.0);
    assert!(m.my_team.current_score.is_finite());
    assert!((m.my_team.current_score - 22.5).abs() < 1e-9);
}

/// My pairing group carries three entries (malformed upstream data): the
/// group is dropped, which surfaces as a no-matchup error rather than a
/// panic or a guessed pairing.
#[tokio::test]
async fn malformed_pairing_group_is_skipped() {
    let f = fixture();
    let mut matchups = HashMap::new();
    matchups.insert(
        4,
        vec![
            matchup(1, Some(9), 50.0, &[("a", 50.0)]),
            matchup(2, Some(9), 60.0, &[("b", 60.0)]),
            matchup(3, Some(9), 70.0, &[("c", 70.0)]),
        ],
    );
    f.mock.script_league(
        "weird",
        MockLeague {
            descriptor: None,
            rosters: vec![
                roster(1, Some(ME), &["a"]),
                roster(2, Some("u2"), &["b"]),
                roster(3, Some("u3"), &["c"]),
            ],
            matchups,
            users: vec![user(ME, "me")],
            settings: LeagueSettings::default(),
        },
    );

    let err = f
        .reconciler
        .reconcile(&descriptor("weird", 3), 4)
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::NoMatchups { .. }));
}

#[tokio::test]
async fn unidentifiable_team_is_an_identity_error() {
    let f = fixture();
    let mut matchups = HashMap::new();
    matchups.insert(1, vec![]);
    f.mock.script_league(
        "other",
        MockLeague {
            descriptor: None,
            rosters: vec![roster(1, Some("u_x"), &["a"]), roster(2, Some("u_y"), &["b"])],
            matchups,
            users: vec![],
            settings: LeagueSettings::default(),
        },
    );

    let err = f
        .reconciler
        .reconcile(&descriptor("other", 2), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::IdentityResolution { .. }));
}

#[tokio::test]
async fn settings_fetched_once_per_league_lifetime() {
    let f = fixture();
    let mut matchups = HashMap::new();
    matchups.insert(
        1,
        vec![
            matchup(1, Some(1), 10.0, &[("a", 10.0)]),
            matchup(2, Some(1), 5.0, &[("b", 5.0)]),
        ],
    );
    f.mock.script_league(
        "h2h",
        MockLeague {
            descriptor: None,
            rosters: vec![roster(1, Some(ME), &["a"]), roster(2, Some("u2"), &["b"])],
            matchups,
            users: vec![user(ME, "me"), user("u2", "them")],
            settings: LeagueSettings::default(),
        },
    );

    let league = descriptor("h2h", 2);
    f.reconciler.reconcile(&league, 1).await.unwrap();
    f.reconciler.reconcile(&league, 1).await.unwrap();
    f.reconciler.reconcile(&league, 1).await.unwrap();
    assert_eq!(f.mock.settings_fetches(), 1);
}

// ===========================================================================
// Elimination format
// ===========================================================================

/// Twelve-team guillotine league plus two husk rosters from prior
/// eliminations.
fn guillotine_league(week: u16, scores: &[f64]) -> MockLeague {
    let mut rosters = Vec::new();
    let mut users = Vec::new();
    let mut records = Vec::new();
    for (i, score) in scores.iter().enumerate() {
        let roster_id = (i + 1) as u64;
        let owner = format!("u{roster_id}");
        let player = format!("p{roster_id}");
        rosters.push(roster(roster_id, Some(&owner), &[&player]));
        users.push(user(&owner, &format!("owner {roster_id}")));
        records.push(matchup(
            roster_id,
            Some(roster_id / 2),
            *score,
            &[(player.as_str(), *score)],
        ));
    }
    // Husks: no owner, or no players. These vanished from the matchup feed.
    rosters.push(roster(90, None, &["z1"]));
    rosters.push(roster(91, Some("u_gone"), &[]));
    users.push(user("u_gone", "quit in week 2"));

    let mut matchups = HashMap::new();
    matchups.insert(week, records);
    MockLeague {
        descriptor: None,
        rosters,
        matchups,
        users,
        settings: LeagueSettings {
            is_elimination: true,
            scoring_weights: None,
        },
    }
}

#[tokio::test]
async fn twelve_team_guillotine_ranks_and_statuses() {
    let f = fixture();
    let scores = [
        94.2, 88.1, 76.5, 75.0, 71.3, 68.0, 64.4, 60.2, 55.8, 52.0, 47.6, 40.0,
    ];
    f.mock.script_league("guillotine", guillotine_league(7, &scores));

    let snapshot = f
        .reconciler
        .reconcile(&descriptor("guillotine", 14), 7)
        .await
        .unwrap();
    let LeagueSnapshot::Elimination(ranking) = &snapshot else {
        panic!("expected elimination ranking");
    };

    // Rank density: exactly 1..=12, no gaps or duplicates.
    let mut ranks: Vec<usize> = ranking.rankings.iter().map(|r| r.rank).collect();
    ranks.sort_unstable();
    assert_eq!(ranks, (1..=12).collect::<Vec<_>>());
    assert_eq!(ranking.elimination_zone_size, 1);

    let top = &ranking.rankings[0];
    assert_eq!(top.status, EliminationStatus::Champion);
    assert!((top.weekly_score - 94.2).abs() < 1e-9);

    // The lowest scorer is in the zone: critical, zero survival, and
    // needing 7.6 points to catch the next team up.
    let last = &ranking.rankings[11];
    assert_eq!(last.status, EliminationStatus::Critical);
    assert_eq!(last.survival_probability, 0.0);
    assert!((last.points_from_safety - (40.0 - 47.6)).abs() < 1e-9);
    assert!(last.points_from_safety < 0.0);

    // The second-lowest is the safety floor itself.
    let second_last = &ranking.rankings[10];
    assert_eq!(second_last.status, EliminationStatus::Danger);
    assert!(second_last.survival_probability > 0.0);
    assert_eq!(second_last.points_from_safety, 0.0);

    // One step further up there is a real buffer.
    let tenth = &ranking.rankings[9];
    assert!((tenth.points_from_safety - (52.0 - 47.6)).abs() < 1e-9);
    assert!(tenth.points_from_safety > 0.0);

    // Husk rosters land in history with the approximated week.
    assert_eq!(ranking.elimination_history.len(), 2);
    for gone in &ranking.elimination_history {
        assert_eq!(gone.eliminated_week, 6);
    }

    // My team (roster 1, u_me is not an owner here) is unidentified, which
    // is fine for a ranking; elimination snapshots are never "live".
    assert!(!derived::is_live(&snapshot));
}

#[tokio::test]
async fn my_ranking_drives_winning_state() {
    let f = fixture();
    let scores = [90.0, 80.0, 70.0, 20.0];
    let mut league = guillotine_league(3, &scores);
    // Make me the lowest-scoring active team.
    league.rosters[3].owner_id = Some(ME.to_string());
    f.mock.script_league("guillotine", league);

    let snapshot = f
        .reconciler
        .reconcile(&descriptor("guillotine", 6), 3)
        .await
        .unwrap();
    let LeagueSnapshot::Elimination(ranking) = &snapshot else {
        panic!("expected elimination ranking");
    };
    let mine = ranking.my_ranking().unwrap();
    assert_eq!(mine.rank, 4);
    assert_eq!(mine.status, EliminationStatus::Critical);

    // In the zone: not winning.
    assert!(!derived::is_winning(&snapshot));
    assert!(!derived::is_eliminated(&snapshot));
}

#[tokio::test]
async fn ties_break_by_roster_id_deterministically() {
    let f = fixture();
    let scores = [66.6, 66.6, 66.6, 50.0];
    f.mock.script_league("guillotine", guillotine_league(2, &scores));

    let league = descriptor("guillotine", 6);
    let first = f.reconciler.reconcile(&league, 2).await.unwrap();
    let second = f.reconciler.reconcile(&league, 2).await.unwrap();

    let LeagueSnapshot::Elimination(a) = &first else {
        panic!("expected ranking");
    };
    let LeagueSnapshot::Elimination(b) = &second else {
        panic!("expected ranking");
    };

    let ids_a: Vec<&str> = a.rankings.iter().map(|r| r.team.team_id.as_str()).collect();
    let ids_b: Vec<&str> = b.rankings.iter().map(|r| r.team.team_id.as_str()).collect();
    assert_eq!(ids_a, ids_b);
    // Equal scores order by roster ID ascending.
    assert_eq!(ids_a, vec!["1", "2", "3", "4"]);
}

#[tokio::test]
async fn config_override_forces_elimination_format() {
    let mock = Arc::new(MockPlatform::new(Platform::Sleeper));
    let client: Arc<dyn PlatformClient> = mock.clone();
    let mut overrides = HashMap::new();
    overrides.insert("h2h-looking".to_string(), true);
    let reconciler = Reconciler::new(
        client,
        Arc::new(StaticStatsProvider::new()),
        Arc::new(StaticGameStatusProvider::new()),
        Arc::new(StaticPlayerDirectory::new()),
        ME.to_string(),
    )
    .with_format_overrides(overrides);

    // Platform settings say head-to-head; the override wins.
    let mut league = guillotine_league(1, &[30.0, 20.0]);
    league.settings = LeagueSettings::default();
    mock.script_league("h2h-looking", league);

    let snapshot = reconciler
        .reconcile(&descriptor("h2h-looking", 4), 1)
        .await
        .unwrap();
    assert!(matches!(snapshot, LeagueSnapshot::Elimination(_)));
}
