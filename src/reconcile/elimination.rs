// Elimination ("guillotine") league ranking.
//
// Weekly matchup endpoints drop eliminated teams, so the full roster list
// is the source of truth: a roster with no owner, no players, or no
// starters for the week signals prior elimination. Active teams are ranked
// by weekly score and assigned a competitive status; the bottom of the
// ranking is this week's elimination zone.

use std::collections::HashMap;

use chrono::Utc;
use tracing::debug;

use crate::model::{
    CacheKey, EliminatedTeam, EliminationStatus, LeagueRanking, TeamRanking, TeamSnapshot,
};
use crate::platform::{MatchupRecord, RosterRecord, UserRecord};
use crate::reconcile::head_to_head::build_team;
use crate::reconcile::identity;
use crate::stats::{GameStatusProvider, PlayerDirectory, StatsProvider};

/// Active-team threshold above which two teams drop per week instead
/// of one.
const LARGE_LEAGUE_THRESHOLD: usize = 32;

/// Elimination-zone size for a league with `active_teams` still alive.
pub fn elimination_zone_size(active_teams: usize) -> usize {
    if active_teams >= LARGE_LEAGUE_THRESHOLD {
        2
    } else {
        1
    }
}

/// Competitive status for a rank among `total` active teams.
///
/// Checked in priority order: champion, elimination zone, bottom quarter,
/// bottom half, safe.
pub fn status_for_rank(rank: usize, total: usize, zone_size: usize) -> EliminationStatus {
    if rank == 1 {
        EliminationStatus::Champion
    } else if rank > total.saturating_sub(zone_size) {
        EliminationStatus::Critical
    } else if rank * 4 > total * 3 {
        EliminationStatus::Danger
    } else if rank * 2 > total {
        EliminationStatus::Warning
    } else {
        EliminationStatus::Safe
    }
}

/// A roster is active iff it has an owner, players, and starters for the
/// week. Everything else is treated as previously eliminated.
pub fn is_active(roster: &RosterRecord) -> bool {
    roster.owner_id.is_some() && !roster.player_ids.is_empty() && !roster.starter_ids.is_empty()
}

/// Build the full weekly ranking for an elimination league.
#[allow(clippy::too_many_arguments)]
pub async fn build_ranking(
    key: &CacheKey,
    rosters: &[RosterRecord],
    matchups: &[MatchupRecord],
    users: &[UserRecord],
    my_roster_id: Option<u64>,
    weights: &HashMap<String, f64>,
    stats: &dyn StatsProvider,
    games: &dyn GameStatusProvider,
    players: &dyn PlayerDirectory,
) -> LeagueRanking {
    let users_by_id = identity::index_users(users);
    let records_by_roster: HashMap<u64, &MatchupRecord> =
        matchups.iter().map(|m| (m.roster_id, m)).collect();

    let (active, eliminated): (Vec<&RosterRecord>, Vec<&RosterRecord>) =
        rosters.iter().partition(|r| is_active(r));
    debug!(
        league_id = %key.league_id,
        active = active.len(),
        eliminated = eliminated.len(),
        "partitioned elimination league rosters"
    );

    // Score every active team. Eliminated teams have no weekly entry; their
    // last known score is whatever the platform still reports (usually 0).
    let mut scored: Vec<(u64, f64, TeamSnapshot)> = Vec::with_capacity(active.len());
    for roster in &active {
        let record = records_by_roster.get(&roster.roster_id).copied();
        let entry = record.cloned().unwrap_or(MatchupRecord {
            roster_id: roster.roster_id,
            ..Default::default()
        });
        let Some(mut team) = build_team(
            &entry,
            rosters,
            &users_by_id,
            key,
            weights,
            stats,
            games,
            players,
        )
        .await
        else {
            continue;
        };

        // Platform-reported totals win over recomputed starter sums when
        // present; both are starters-only by construction.
        let weekly_score = match record {
            Some(r) if r.points != 0.0 => r.points,
            _ => team.current_score,
        };
        team.current_score = weekly_score;
        scored.push((roster.roster_id, weekly_score, team));
    }

    // Descending by score, roster ID ascending on ties: deterministic for
    // equal inputs.
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });

    let total = scored.len();
    let zone_size = elimination_zone_size(total);
    let scores: Vec<f64> = scored.iter().map(|(_, s, _)| *s).collect();
    // Lowest score still outside the zone, for safety-buffer math.
    let safety_floor = total
        .checked_sub(zone_size + 1)
        .and_then(|i| scores.get(i))
        .copied();

    let mut rankings = Vec::with_capacity(total);
    for (i, (_, weekly_score, team)) in scored.into_iter().enumerate() {
        let rank = i + 1;
        let status = status_for_rank(rank, total, zone_size);
        let in_zone = status == EliminationStatus::Critical;

        let points_from_safety = if in_zone {
            // Negative: points needed to catch the next-higher team.
            scores
                .get(i.wrapping_sub(1))
                .map(|above| weekly_score - above)
                .unwrap_or(0.0)
        } else {
            safety_floor
                .map(|floor| weekly_score - floor)
                .unwrap_or(0.0)
        };

        let survival_probability = if in_zone {
            0.0
        } else {
            (((total - rank) as f64) / total as f64).clamp(0.0, 1.0)
        };

        rankings.push(TeamRanking {
            team,
            rank,
            weekly_score,
            status,
            survival_probability,
            points_from_safety,
        });
    }

    let elimination_history = eliminated
        .iter()
        .map(|roster| EliminatedTeam {
            team_id: roster.roster_id.to_string(),
            name: identity::resolve_display_name(roster, &users_by_id),
            last_score: records_by_roster
                .get(&roster.roster_id)
                .map(|r| r.points)
                .unwrap_or(0.0),
            eliminated_week: key.week.saturating_sub(1),
        })
        .collect();

    LeagueRanking {
        key: key.clone(),
        rankings,
        elimination_zone_size: zone_size,
        elimination_history,
        my_team_id: my_roster_id.map(|id| id.to_string()),
        last_updated: Utc::now(),
    }
}
