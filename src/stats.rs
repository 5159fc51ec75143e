// External stat, game-status, and player-metadata capabilities.
//
// The reconciler consumes these as opaque lookups. Missing data is always a
// soft miss: a player with no stats contributes 0.0, a team with no game
// info is treated as pregame. Static in-memory implementations back tests
// and offline demo runs.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::model::GameStatus;

// ---------------------------------------------------------------------------
// Capability traits
// ---------------------------------------------------------------------------

/// Per-player weekly stat lines, keyed by (player, week, year).
#[async_trait]
pub trait StatsProvider: Send + Sync {
    /// Stat name -> value for the player's week, or `None` when the
    /// provider has nothing for that key.
    async fn player_stats(
        &self,
        player_id: &str,
        week: u16,
        year: u16,
    ) -> Option<HashMap<String, f64>>;
}

/// Live scoreboard state for an NFL team's current game.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GameInfo {
    pub status: GameStatus,
    pub home_score: u32,
    pub away_score: u32,
}

#[async_trait]
pub trait GameStatusProvider: Send + Sync {
    /// Game info for the team's current game, or `None` when unknown
    /// (treated as pregame by the reconciler).
    async fn status(&self, nfl_team: &str) -> Option<GameInfo>;
}

/// Static metadata for a player.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerInfo {
    pub name: String,
    pub position: String,
    pub nfl_team: String,
    pub injury_status: Option<String>,
}

/// Player ID -> metadata lookup. Synchronous: implementations hold
/// pre-fetched directories in memory.
pub trait PlayerDirectory: Send + Sync {
    fn lookup(&self, player_id: &str) -> Option<PlayerInfo>;
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Fallback PPR-style scoring weights, used only when a league's own
/// scoring settings are unavailable. A documented placeholder, not a
/// verified rule set for every league.
pub fn default_scoring_weights() -> HashMap<String, f64> {
    let mut w = HashMap::new();
    w.insert("pass_yd".to_string(), 0.04);
    w.insert("pass_td".to_string(), 4.0);
    w.insert("pass_int".to_string(), -1.0);
    w.insert("rush_yd".to_string(), 0.1);
    w.insert("rush_td".to_string(), 6.0);
    w.insert("rec".to_string(), 1.0);
    w.insert("rec_yd".to_string(), 0.1);
    w.insert("rec_td".to_string(), 6.0);
    w.insert("fum_lost".to_string(), -2.0);
    w
}

/// Score a stat line against league weights: dot product over shared keys.
/// Stats without a weight (and weights without a stat) contribute nothing,
/// so the result is always finite.
pub fn score_from_stats(stats: &HashMap<String, f64>, weights: &HashMap<String, f64>) -> f64 {
    stats
        .iter()
        .filter_map(|(name, value)| weights.get(name).map(|w| w * value))
        .filter(|v| v.is_finite())
        .sum()
}

// ---------------------------------------------------------------------------
// Static implementations
// ---------------------------------------------------------------------------

/// Fixture-backed stats provider.
#[derive(Default)]
pub struct StaticStatsProvider {
    stats: Mutex<HashMap<(String, u16, u16), HashMap<String, f64>>>,
}

impl StaticStatsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, player_id: &str, week: u16, year: u16, stats: HashMap<String, f64>) {
        self.stats
            .lock()
            .unwrap()
            .insert((player_id.to_string(), week, year), stats);
    }
}

#[async_trait]
impl StatsProvider for StaticStatsProvider {
    async fn player_stats(
        &self,
        player_id: &str,
        week: u16,
        year: u16,
    ) -> Option<HashMap<String, f64>> {
        self.stats
            .lock()
            .unwrap()
            .get(&(player_id.to_string(), week, year))
            .cloned()
    }
}

/// Fixture-backed game status provider.
#[derive(Default)]
pub struct StaticGameStatusProvider {
    games: Mutex<HashMap<String, GameInfo>>,
}

impl StaticGameStatusProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, nfl_team: &str, info: GameInfo) {
        self.games.lock().unwrap().insert(nfl_team.to_string(), info);
    }
}

#[async_trait]
impl GameStatusProvider for StaticGameStatusProvider {
    async fn status(&self, nfl_team: &str) -> Option<GameInfo> {
        self.games.lock().unwrap().get(nfl_team).copied()
    }
}

/// Fixture-backed player directory.
#[derive(Default)]
pub struct StaticPlayerDirectory {
    players: Mutex<HashMap<String, PlayerInfo>>,
}

impl StaticPlayerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, player_id: &str, info: PlayerInfo) {
        self.players
            .lock()
            .unwrap()
            .insert(player_id.to_string(), info);
    }
}

impl PlayerDirectory for StaticPlayerDirectory {
    fn lookup(&self, player_id: &str) -> Option<PlayerInfo> {
        self.players.lock().unwrap().get(player_id).cloned()
    }
}
