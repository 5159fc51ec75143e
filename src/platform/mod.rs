// Platform fetch adapters: schema translation from Sleeper/ESPN REST
// responses into platform-neutral records.
//
// Adapters do translation only. Retries, fallbacks, and caching belong to
// the snapshot store; the reconciler never branches on platform because the
// per-platform owner-identification quirk is isolated behind
// `identify_my_team`.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{LeagueDescriptor, Platform};

pub mod espn;
pub mod mock;
pub mod sleeper;

pub use espn::EspnClient;
pub use mock::{MockLeague, MockPlatform};
pub use sleeper::SleeperClient;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Failure of a single platform fetch. Recoverable: the store decides
/// whether to fall back, serve stale data, or surface the error.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("request timed out")]
    Timeout,

    #[error("HTTP status {status}")]
    Http { status: u16 },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for NetworkError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            NetworkError::Timeout
        } else if let Some(status) = e.status() {
            NetworkError::Http {
                status: status.as_u16(),
            }
        } else if e.is_decode() {
            NetworkError::Decode(e.to_string())
        } else {
            NetworkError::Transport(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Platform-neutral records
// ---------------------------------------------------------------------------

/// One team's roster as reported by the platform for the current week.
///
/// An empty `player_ids` and/or missing `owner_id` is the reliable signal of
/// prior elimination in guillotine leagues: eliminated teams vanish from the
/// weekly matchup endpoints but still appear in the roster list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RosterRecord {
    pub roster_id: u64,
    pub owner_id: Option<String>,
    /// All owner identity tokens for the team. Sleeper leaves this empty
    /// (single `owner_id`); ESPN lists every SWID on the team.
    pub owner_ids: Vec<String>,
    pub player_ids: Vec<String>,
    pub starter_ids: Vec<String>,
    /// Team name from roster metadata, when set.
    pub team_name: Option<String>,
    /// Owner display name from roster metadata, when set.
    pub owner_display_name: Option<String>,
    pub wins: u32,
    pub losses: u32,
}

/// One side of a weekly matchup as reported by the platform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchupRecord {
    pub roster_id: u64,
    /// Pairing key: two records share a `matchup_id` iff they play each
    /// other this week. Absent for bye/unpaired entries.
    pub matchup_id: Option<u64>,
    /// Team total points as reported by the platform.
    pub points: f64,
    pub player_ids: Vec<String>,
    pub starter_ids: Vec<String>,
    /// Per-player points when the platform reports them inline.
    pub player_points: HashMap<String, f64>,
}

/// A league member.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: String,
    pub display_name: String,
    /// User-set team name, when present.
    pub team_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// League configuration relevant to reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeagueSettings {
    /// True for elimination ("guillotine") formats.
    pub is_elimination: bool,
    /// League scoring weights (stat name -> points per unit). `None` means
    /// the reconciler falls back to the documented default table.
    pub scoring_weights: Option<HashMap<String, f64>>,
}

// ---------------------------------------------------------------------------
// PlatformClient trait
// ---------------------------------------------------------------------------

/// Abstract fetch capability for one platform.
///
/// Implementations perform exactly one network round-trip per call and no
/// retries; retry and fallback policy lives in the snapshot store.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Which platform this client talks to.
    fn platform(&self) -> Platform;

    /// Discover the user's leagues for a season.
    async fn fetch_leagues(
        &self,
        user_identity: &str,
        season: u16,
    ) -> Result<Vec<LeagueDescriptor>, NetworkError>;

    /// Fetch all rosters in a league.
    async fn fetch_rosters(&self, league_id: &str) -> Result<Vec<RosterRecord>, NetworkError>;

    /// Fetch the week's matchup records for a league.
    async fn fetch_matchups(
        &self,
        league_id: &str,
        week: u16,
    ) -> Result<Vec<MatchupRecord>, NetworkError>;

    /// Fetch league members.
    async fn fetch_users(&self, league_id: &str) -> Result<Vec<UserRecord>, NetworkError>;

    /// Fetch league settings (format, scoring). Called at most once per
    /// league by the reconciler, which caches the verdict.
    async fn fetch_settings(&self, league_id: &str) -> Result<LeagueSettings, NetworkError>;

    /// Find the roster belonging to `my_identity`.
    ///
    /// Sleeper matches by `owner_id` string equality; ESPN by membership of
    /// the SWID token in the team's owners array. Each platform's quirk is
    /// isolated here so the reconciler never branches on platform.
    fn identify_my_team(&self, rosters: &[RosterRecord], my_identity: &str) -> Option<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_error_display() {
        assert_eq!(NetworkError::Timeout.to_string(), "request timed out");
        assert_eq!(
            NetworkError::Http { status: 429 }.to_string(),
            "HTTP status 429"
        );
        assert_eq!(
            NetworkError::Decode("bad json".to_string()).to_string(),
            "failed to decode response: bad json"
        );
    }
}
