// Derived competitive state: pure functions over hydrated snapshots.
//
// No network, no clock, no hidden state. The snapshot store reads
// `is_live` to pick its TTL; the dependency runs one way only (this module
// never touches the store).

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::model::{
    CacheKey, EliminationStatus, GameStatus, LeagueDescriptor, LeagueSnapshot, MatchupSnapshot,
    MatchupStatus, TeamSnapshot,
};

// ---------------------------------------------------------------------------
// Live / winning
// ---------------------------------------------------------------------------

/// True iff any starter on either side of a head-to-head matchup has a game
/// in progress. Elimination snapshots are never "live": there is no single
/// opponent to be live against.
pub fn is_live(snapshot: &LeagueSnapshot) -> bool {
    match snapshot {
        LeagueSnapshot::HeadToHead(m) => {
            let my_live = m.my_team.starters().any(|p| p.game_status == GameStatus::In);
            let opp_live = m
                .opponent
                .as_ref()
                .map(|o| o.starters().any(|p| p.game_status == GameStatus::In))
                .unwrap_or(false);
            my_live || opp_live
        }
        LeagueSnapshot::Elimination(_) => false,
    }
}

/// Head-to-head: my score strictly beats the opponent's. Elimination: my
/// team is ranked outside the elimination zone and not already eliminated.
pub fn is_winning(snapshot: &LeagueSnapshot) -> bool {
    match snapshot {
        LeagueSnapshot::HeadToHead(m) => match &m.opponent {
            Some(opp) => m.my_team.current_score > opp.current_score,
            // Synthesized historical card: nothing left to win.
            None => false,
        },
        LeagueSnapshot::Elimination(r) => {
            if r.my_team_eliminated() {
                return false;
            }
            match r.my_ranking() {
                Some(mine) => mine.status != EliminationStatus::Critical,
                None => false,
            }
        }
    }
}

/// True when the user's team is out of contention in this league.
pub fn is_eliminated(snapshot: &LeagueSnapshot) -> bool {
    match snapshot {
        // Opponent-less head-to-head snapshots only exist as synthesized
        // post-elimination cards.
        LeagueSnapshot::HeadToHead(m) => m.opponent.is_none(),
        LeagueSnapshot::Elimination(r) => r.my_team_eliminated(),
    }
}

// ---------------------------------------------------------------------------
// Sorting
// ---------------------------------------------------------------------------

/// Which active group leads the dashboard ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortPreference {
    WinningFirst,
    LosingFirst,
}

impl Default for SortPreference {
    fn default() -> Self {
        SortPreference::WinningFirst
    }
}

/// Order snapshots for dashboard display.
///
/// Partition: eliminated leagues always last (ordered by league name for
/// determinism), then winning and losing groups in the preferred order,
/// each sorted by my score descending with league name as tiebreak. Pure
/// and idempotent: equal inputs give equal output.
pub fn sort_snapshots(
    mut snapshots: Vec<LeagueSnapshot>,
    league_names: &HashMap<String, String>,
    preference: SortPreference,
) -> Vec<LeagueSnapshot> {
    let name_of = |s: &LeagueSnapshot| -> String {
        league_names
            .get(s.league_id())
            .cloned()
            .unwrap_or_else(|| s.league_id().to_string())
    };

    let mut eliminated = Vec::new();
    let mut winning = Vec::new();
    let mut losing = Vec::new();
    for snapshot in snapshots.drain(..) {
        if is_eliminated(&snapshot) {
            eliminated.push(snapshot);
        } else if is_winning(&snapshot) {
            winning.push(snapshot);
        } else {
            losing.push(snapshot);
        }
    }

    let by_score_desc = |a: &LeagueSnapshot, b: &LeagueSnapshot| {
        let sa = a.my_score().unwrap_or(0.0);
        let sb = b.my_score().unwrap_or(0.0);
        sb.partial_cmp(&sa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| name_of(a).cmp(&name_of(b)))
    };
    winning.sort_by(by_score_desc);
    losing.sort_by(by_score_desc);
    eliminated.sort_by(|a, b| name_of(a).cmp(&name_of(b)));

    let mut out = Vec::with_capacity(winning.len() + losing.len() + eliminated.len());
    match preference {
        SortPreference::WinningFirst => {
            out.extend(winning);
            out.extend(losing);
        }
        SortPreference::LosingFirst => {
            out.extend(losing);
            out.extend(winning);
        }
    }
    out.extend(eliminated);
    out
}

// ---------------------------------------------------------------------------
// Playoff-elimination fallback
// ---------------------------------------------------------------------------

/// Build a synthetic historical card for a league the user is knocked out
/// of: the last-known roster with no opponent, marked complete.
///
/// This is a documented approximation for display continuity. Callers must
/// only invoke it after the live fetch path has failed or bracket loss is
/// independently confirmed; it never replaces a live snapshot.
pub fn synthesize_eliminated_snapshot(
    league: &LeagueDescriptor,
    week: u16,
    my_team: TeamSnapshot,
) -> LeagueSnapshot {
    LeagueSnapshot::HeadToHead(MatchupSnapshot {
        key: CacheKey::for_league(league, week),
        matchup_id: 0,
        my_team,
        opponent: None,
        status: MatchupStatus::Complete,
        last_updated: Utc::now(),
    })
}
