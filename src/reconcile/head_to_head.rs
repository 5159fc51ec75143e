// Head-to-head matchup reconciliation.
//
// Groups raw weekly matchup records by pairing key, validates each pair,
// and builds the user's matchup snapshot with fully resolved teams and
// per-player scores. Partial upstream data is dropped, never guessed: a
// malformed pairing group or a matchup entry with no roster is logged and
// skipped without failing the league.

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use tracing::{debug, warn};

use crate::model::{
    CacheKey, GameStatus, MatchupSnapshot, MatchupStatus, Platform, PlayerSnapshot, TeamSnapshot,
};
use crate::platform::{MatchupRecord, RosterRecord, UserRecord};
use crate::reconcile::identity;
use crate::stats::{score_from_stats, GameStatusProvider, PlayerDirectory, StatsProvider};

// ---------------------------------------------------------------------------
// Pairing
// ---------------------------------------------------------------------------

/// Group matchup records into validated pairs.
///
/// Records without a pairing key, and groups whose size is not exactly 2
/// (malformed upstream data), are logged and dropped. Pairs come back in
/// ascending `matchup_id` order for determinism.
pub fn pair_matchups(records: &[MatchupRecord]) -> Vec<(MatchupRecord, MatchupRecord)> {
    let mut groups: BTreeMap<u64, Vec<&MatchupRecord>> = BTreeMap::new();
    for record in records {
        match record.matchup_id {
            Some(id) => groups.entry(id).or_default().push(record),
            None => {
                debug!(roster_id = record.roster_id, "matchup record without pairing key, skipping");
            }
        }
    }

    let mut pairs = Vec::new();
    for (matchup_id, group) in groups {
        if group.len() != 2 {
            warn!(
                matchup_id,
                entries = group.len(),
                "malformed matchup group (expected exactly 2 entries), skipping"
            );
            continue;
        }
        pairs.push((group[0].clone(), group[1].clone()));
    }
    pairs
}

// ---------------------------------------------------------------------------
// Team building
// ---------------------------------------------------------------------------

/// Resolve one side of a matchup into a `TeamSnapshot`.
///
/// Returns `None` when no roster matches the matchup entry; the caller
/// skips the matchup rather than failing the league.
#[allow(clippy::too_many_arguments)]
pub async fn build_team(
    entry: &MatchupRecord,
    rosters: &[RosterRecord],
    users_by_id: &HashMap<&str, &UserRecord>,
    key: &CacheKey,
    weights: &HashMap<String, f64>,
    stats: &dyn StatsProvider,
    games: &dyn GameStatusProvider,
    players: &dyn PlayerDirectory,
) -> Option<TeamSnapshot> {
    let roster = rosters.iter().find(|r| r.roster_id == entry.roster_id);
    let Some(roster) = roster else {
        warn!(
            roster_id = entry.roster_id,
            "matchup entry has no matching roster, skipping matchup"
        );
        return None;
    };

    // The matchup's own player lists are authoritative for the week; fall
    // back to the roster's lists when the platform leaves them empty.
    let player_ids = if entry.player_ids.is_empty() {
        &roster.player_ids
    } else {
        &entry.player_ids
    };
    let starter_ids = if entry.starter_ids.is_empty() {
        &roster.starter_ids
    } else {
        &entry.starter_ids
    };

    let mut snapshots = Vec::with_capacity(player_ids.len());
    for player_id in player_ids {
        let is_starter = starter_ids.contains(player_id);
        snapshots.push(
            build_player(
                entry, player_id, is_starter, key, weights, stats, games, players,
            )
            .await,
        );
    }

    let current_score = snapshots
        .iter()
        .filter(|p| p.is_starter)
        .map(|p| p.current_score)
        .sum();
    let projected_score = snapshots
        .iter()
        .filter(|p| p.is_starter)
        .map(|p| p.projected_score)
        .sum();

    Some(TeamSnapshot {
        team_id: roster.roster_id.to_string(),
        owner_name: identity::resolve_display_name(roster, users_by_id),
        avatar_url: identity::resolve_avatar(roster, users_by_id),
        record: Some(format!("{}-{}", roster.wins, roster.losses)),
        current_score,
        projected_score,
        roster: snapshots,
    })
}

/// Build one player snapshot, resolving score, metadata, and game status.
///
/// Score priority: the matchup record's inline per-player points, then the
/// stats provider scored against league weights, then 0.0. A missing stat
/// line is never an error.
#[allow(clippy::too_many_arguments)]
async fn build_player(
    entry: &MatchupRecord,
    player_id: &str,
    is_starter: bool,
    key: &CacheKey,
    weights: &HashMap<String, f64>,
    stats: &dyn StatsProvider,
    games: &dyn GameStatusProvider,
    players: &dyn PlayerDirectory,
) -> PlayerSnapshot {
    let info = players.lookup(player_id).unwrap_or_default();
    let name = if info.name.is_empty() {
        format!("Player {player_id}")
    } else {
        info.name
    };

    // The record's player ID is native to the league's platform.
    let (sleeper_id, espn_id) = match key.platform {
        Platform::Sleeper => (Some(player_id.to_string()), None),
        Platform::Espn => (None, Some(player_id.to_string())),
    };

    let stat_line = stats.player_stats(player_id, key.week, key.season_year).await;
    let current_score = match entry.player_points.get(player_id) {
        Some(points) => *points,
        None => stat_line
            .as_ref()
            .map(|line| score_from_stats(line, weights))
            .unwrap_or(0.0),
    };
    let projected_score = stat_line
        .as_ref()
        .and_then(|line| line.get("proj_pts").copied())
        .unwrap_or(0.0);

    let game_status = match games.status(&info.nfl_team).await {
        Some(game) => game.status,
        None => GameStatus::Pre,
    };

    PlayerSnapshot {
        player_id: player_id.to_string(),
        sleeper_id,
        espn_id,
        name,
        position: info.position.clone(),
        nfl_team: info.nfl_team,
        lineup_slot: if is_starter { info.position } else { "BN".to_string() },
        is_starter,
        current_score,
        projected_score,
        game_status,
        injury_status: info.injury_status,
    }
}

// ---------------------------------------------------------------------------
// Matchup assembly
// ---------------------------------------------------------------------------

/// Matchup lifecycle from the starters' game statuses on both sides.
pub fn matchup_status(my_team: &TeamSnapshot, opponent: &TeamSnapshot) -> MatchupStatus {
    let starters = my_team.starters().chain(opponent.starters());
    let mut any = false;
    let mut all_post = true;
    let mut any_in = false;
    for p in starters {
        any = true;
        match p.game_status {
            GameStatus::In => {
                any_in = true;
                all_post = false;
            }
            GameStatus::Pre => all_post = false,
            GameStatus::Post => {}
        }
    }
    if any_in {
        MatchupStatus::Live
    } else if any && all_post {
        MatchupStatus::Complete
    } else {
        MatchupStatus::Upcoming
    }
}

/// Build the user's matchup snapshot for the week.
///
/// Returns `None` when the user's pair is absent or either side's roster
/// is missing (the caller decides whether that is an error or a fallback).
#[allow(clippy::too_many_arguments)]
pub async fn build_my_matchup(
    key: &CacheKey,
    my_roster_id: u64,
    rosters: &[RosterRecord],
    matchups: &[MatchupRecord],
    users: &[UserRecord],
    weights: &HashMap<String, f64>,
    stats: &dyn StatsProvider,
    games: &dyn GameStatusProvider,
    players: &dyn PlayerDirectory,
) -> Option<MatchupSnapshot> {
    let users_by_id = identity::index_users(users);
    let pairs = pair_matchups(matchups);

    let (mine, theirs) = pairs.into_iter().find_map(|(a, b)| {
        if a.roster_id == my_roster_id {
            Some((a, b))
        } else if b.roster_id == my_roster_id {
            Some((b, a))
        } else {
            None
        }
    })?;
    let matchup_id = mine.matchup_id.unwrap_or(0);

    let my_team = build_team(
        &mine, rosters, &users_by_id, key, weights, stats, games, players,
    )
    .await?;
    let opponent = build_team(
        &theirs, rosters, &users_by_id, key, weights, stats, games, players,
    )
    .await?;

    let status = matchup_status(&my_team, &opponent);
    Some(MatchupSnapshot {
        key: key.clone(),
        matchup_id,
        my_team,
        opponent: Some(opponent),
        status,
        last_updated: Utc::now(),
    })
}
