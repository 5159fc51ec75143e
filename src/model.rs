// Normalized data model: descriptors, cache keys, and snapshot types.
//
// Everything here is produced by the reconciler and owned by the snapshot
// store. Consumers receive these values by clone (behind `Arc` at the store
// boundary) and never mutate them in place.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

/// The fantasy platform a league lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Sleeper,
    Espn,
}

impl Platform {
    /// Human-readable label for logs and summaries.
    pub fn label(&self) -> &'static str {
        match self {
            Platform::Sleeper => "Sleeper",
            Platform::Espn => "ESPN",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// League discovery
// ---------------------------------------------------------------------------

/// A league discovered for the user. Immutable after discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeagueDescriptor {
    /// Platform-native league identifier.
    pub league_id: String,
    /// Display name of the league.
    pub name: String,
    /// Which platform the league lives on.
    pub platform: Platform,
    /// Season year (e.g. 2026).
    pub season_year: u16,
    /// Total number of teams at season start.
    pub total_teams: usize,
}

// ---------------------------------------------------------------------------
// Cache key
// ---------------------------------------------------------------------------

/// Uniquely addresses one hydration unit: one league's data for one week.
///
/// Week is part of the key, so a week rollover naturally makes every
/// previous-week entry unreachable through new-week lookups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub league_id: String,
    pub platform: Platform,
    pub season_year: u16,
    pub week: u16,
}

impl CacheKey {
    /// Build the key for a league descriptor at a given week.
    pub fn for_league(league: &LeagueDescriptor, week: u16) -> Self {
        CacheKey {
            league_id: league.league_id.clone(),
            platform: league.platform,
            season_year: league.season_year,
            week,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{} wk{}",
            self.platform, self.league_id, self.season_year, self.week
        )
    }
}

// ---------------------------------------------------------------------------
// Game status
// ---------------------------------------------------------------------------

/// Where a player's underlying NFL game stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    /// Game has not started.
    Pre,
    /// Game is in progress.
    In,
    /// Game is final.
    Post,
}

// ---------------------------------------------------------------------------
// Player snapshot
// ---------------------------------------------------------------------------

/// One player on a team's roster, with scores resolved for the week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    /// Canonical player identifier (the source platform's ID).
    pub player_id: String,
    /// Sleeper-side ID when known. At most one of sleeper/espn is
    /// authoritative per source platform.
    pub sleeper_id: Option<String>,
    /// ESPN-side ID when known.
    pub espn_id: Option<String>,
    /// Display name.
    pub name: String,
    /// Position string (e.g. "QB", "WR", "D/ST").
    pub position: String,
    /// NFL team abbreviation (e.g. "KC").
    pub nfl_team: String,
    /// Lineup slot label (e.g. "FLEX", "BN").
    pub lineup_slot: String,
    /// Whether the player is in the starting lineup. Only starters
    /// contribute to the team's score total.
    pub is_starter: bool,
    /// Fantasy points scored so far this week.
    pub current_score: f64,
    /// Projected fantasy points for the week.
    pub projected_score: f64,
    /// Status of the player's NFL game.
    pub game_status: GameStatus,
    /// Injury designation when present (e.g. "Q", "OUT").
    pub injury_status: Option<String>,
}

// ---------------------------------------------------------------------------
// Team snapshot
// ---------------------------------------------------------------------------

/// One fantasy team in a matchup or ranking. Owned exclusively by its parent
/// snapshot; never shared across leagues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamSnapshot {
    /// Platform-native team/roster identifier.
    pub team_id: String,
    /// Resolved owner display name (see `reconcile::identity`).
    pub owner_name: String,
    /// Avatar image URL when the platform provides one.
    pub avatar_url: Option<String>,
    /// Win-loss record string (e.g. "7-2") when known.
    pub record: Option<String>,
    /// Team score for the week (starters only).
    pub current_score: f64,
    /// Projected team score for the week (starters only).
    pub projected_score: f64,
    /// Full roster, starters and bench.
    pub roster: Vec<PlayerSnapshot>,
}

impl TeamSnapshot {
    /// Sum of starters' current scores. Bench players never count.
    pub fn starter_total(&self) -> f64 {
        self.roster
            .iter()
            .filter(|p| p.is_starter)
            .map(|p| p.current_score)
            .sum()
    }

    /// Iterator over starters only.
    pub fn starters(&self) -> impl Iterator<Item = &PlayerSnapshot> {
        self.roster.iter().filter(|p| p.is_starter)
    }
}

// ---------------------------------------------------------------------------
// Matchup snapshot (head-to-head)
// ---------------------------------------------------------------------------

/// Lifecycle of a head-to-head matchup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchupStatus {
    Upcoming,
    Live,
    Complete,
}

/// Point-in-time view of one head-to-head matchup: the user's team against
/// one opponent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchupSnapshot {
    /// The cache key this snapshot was hydrated under.
    pub key: CacheKey,
    /// Platform pairing key for the matchup.
    pub matchup_id: u64,
    /// The user's team.
    pub my_team: TeamSnapshot,
    /// The opponent. `None` only for synthesized historical cards
    /// (see `derived::synthesize_eliminated_snapshot`).
    pub opponent: Option<TeamSnapshot>,
    pub status: MatchupStatus,
    pub last_updated: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Elimination-format ranking
// ---------------------------------------------------------------------------

/// Competitive standing of a team in an elimination league.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EliminationStatus {
    /// Rank 1 this week.
    Champion,
    /// Top half, comfortably clear of the zone.
    Safe,
    /// Below the median.
    Warning,
    /// Bottom quarter.
    Danger,
    /// In the elimination zone this week.
    Critical,
    /// Already out of the league.
    Eliminated,
}

impl EliminationStatus {
    pub fn label(&self) -> &'static str {
        match self {
            EliminationStatus::Champion => "CHAMPION",
            EliminationStatus::Safe => "SAFE",
            EliminationStatus::Warning => "WARNING",
            EliminationStatus::Danger => "DANGER",
            EliminationStatus::Critical => "CRITICAL",
            EliminationStatus::Eliminated => "ELIMINATED",
        }
    }
}

/// One active team's position in the weekly elimination ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamRanking {
    pub team: TeamSnapshot,
    /// Dense rank, 1..=N among active teams.
    pub rank: usize,
    /// The team's score for the current week (starters only).
    pub weekly_score: f64,
    pub status: EliminationStatus,
    /// 0.0 for teams in the elimination zone, else (N - rank) / N.
    pub survival_probability: f64,
    /// In the zone: score minus the next-higher-ranked team's score
    /// (negative = points needed to escape). Outside the zone: buffer above
    /// the lowest still-safe score (positive).
    pub points_from_safety: f64,
}

/// A team that was already eliminated before the current week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EliminatedTeam {
    pub team_id: String,
    pub name: String,
    /// Last score observed for the team, usually 0.0 once the platform
    /// empties the roster.
    pub last_score: f64,
    /// Approximated as `current_week - 1`: the exact elimination week is not
    /// derivable from current-week data without persisted history.
    pub eliminated_week: u16,
}

/// Full weekly ranking of an elimination ("guillotine") league.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeagueRanking {
    pub key: CacheKey,
    /// Active teams ordered by rank. Ranks are a dense permutation of
    /// 1..=N; eliminated teams never appear here.
    pub rankings: Vec<TeamRanking>,
    /// How many teams drop this week (bottom 2 when N >= 32, else 1).
    pub elimination_zone_size: usize,
    /// Teams eliminated in prior weeks, tracked separately.
    pub elimination_history: Vec<EliminatedTeam>,
    /// The user's team ID in this league when identified.
    pub my_team_id: Option<String>,
    pub last_updated: DateTime<Utc>,
}

impl LeagueRanking {
    /// The user's ranking entry, when identified and still active.
    pub fn my_ranking(&self) -> Option<&TeamRanking> {
        let id = self.my_team_id.as_deref()?;
        self.rankings.iter().find(|r| r.team.team_id == id)
    }

    /// True when the user's team appears in the elimination history.
    pub fn my_team_eliminated(&self) -> bool {
        match self.my_team_id.as_deref() {
            Some(id) => self.elimination_history.iter().any(|e| e.team_id == id),
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// League snapshot
// ---------------------------------------------------------------------------

/// The hydrated view of one league for one week. Exactly one format holds
/// per league: head-to-head leagues carry a matchup, elimination leagues a
/// full ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LeagueSnapshot {
    HeadToHead(MatchupSnapshot),
    Elimination(LeagueRanking),
}

impl LeagueSnapshot {
    pub fn key(&self) -> &CacheKey {
        match self {
            LeagueSnapshot::HeadToHead(m) => &m.key,
            LeagueSnapshot::Elimination(r) => &r.key,
        }
    }

    pub fn league_id(&self) -> &str {
        &self.key().league_id
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        match self {
            LeagueSnapshot::HeadToHead(m) => m.last_updated,
            LeagueSnapshot::Elimination(r) => r.last_updated,
        }
    }

    /// The user's team score for the week, when derivable.
    pub fn my_score(&self) -> Option<f64> {
        match self {
            LeagueSnapshot::HeadToHead(m) => Some(m.my_team.current_score),
            LeagueSnapshot::Elimination(r) => r.my_ranking().map(|r| r.weekly_score),
        }
    }
}
