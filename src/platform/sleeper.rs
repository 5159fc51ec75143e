// Sleeper REST adapter.
//
// Sleeper's v1 API is unauthenticated and returns firm JSON shapes, so the
// wire structs here are plain serde derives. Owner identification is a
// straight `owner_id` string match against roster records.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::model::{LeagueDescriptor, Platform};
use crate::platform::{
    LeagueSettings, MatchupRecord, NetworkError, PlatformClient, RosterRecord, UserRecord,
};

const SLEEPER_BASE_URL: &str = "https://api.sleeper.app/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Wire structs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SleeperLeague {
    league_id: String,
    name: String,
    #[serde(default)]
    total_rosters: usize,
    #[serde(default)]
    settings: HashMap<String, serde_json::Value>,
    #[serde(default)]
    scoring_settings: HashMap<String, f64>,
}

#[derive(Debug, Deserialize)]
struct SleeperRoster {
    roster_id: u64,
    owner_id: Option<String>,
    #[serde(default)]
    players: Option<Vec<String>>,
    #[serde(default)]
    starters: Option<Vec<String>>,
    #[serde(default)]
    metadata: Option<HashMap<String, String>>,
    #[serde(default)]
    settings: Option<SleeperRosterSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct SleeperRosterSettings {
    #[serde(default)]
    wins: u32,
    #[serde(default)]
    losses: u32,
}

#[derive(Debug, Deserialize)]
struct SleeperMatchup {
    roster_id: u64,
    matchup_id: Option<u64>,
    #[serde(default)]
    points: f64,
    #[serde(default)]
    players: Option<Vec<String>>,
    #[serde(default)]
    starters: Option<Vec<String>>,
    #[serde(default)]
    players_points: Option<HashMap<String, f64>>,
}

#[derive(Debug, Deserialize)]
struct SleeperUser {
    user_id: String,
    display_name: String,
    #[serde(default)]
    avatar: Option<String>,
    #[serde(default)]
    metadata: Option<HashMap<String, String>>,
}

// ---------------------------------------------------------------------------
// SleeperClient
// ---------------------------------------------------------------------------

/// Read-only client for the Sleeper v1 API.
pub struct SleeperClient {
    http: reqwest::Client,
    base_url: String,
}

impl SleeperClient {
    pub fn new() -> Self {
        Self::with_base_url(SLEEPER_BASE_URL.to_string())
    }

    /// Override the base URL (test servers).
    pub fn with_base_url(base_url: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent("huddle/0.1")
            .build()
            .unwrap_or_default();
        Self { http, base_url }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<T, NetworkError> {
        let url = format!("{}/{}", self.base_url, path);
        let resp = self.http.get(&url).send().await?;
        let resp = resp.error_for_status()?;
        let value = resp.json::<T>().await?;
        Ok(value)
    }
}

impl Default for SleeperClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformClient for SleeperClient {
    fn platform(&self) -> Platform {
        Platform::Sleeper
    }

    async fn fetch_leagues(
        &self,
        user_identity: &str,
        season: u16,
    ) -> Result<Vec<LeagueDescriptor>, NetworkError> {
        let leagues: Vec<SleeperLeague> = self
            .get_json(&format!("user/{user_identity}/leagues/nfl/{season}"))
            .await?;
        Ok(leagues
            .into_iter()
            .map(|l| LeagueDescriptor {
                league_id: l.league_id,
                name: l.name,
                platform: Platform::Sleeper,
                season_year: season,
                total_teams: l.total_rosters,
            })
            .collect())
    }

    async fn fetch_rosters(&self, league_id: &str) -> Result<Vec<RosterRecord>, NetworkError> {
        let rosters: Vec<SleeperRoster> =
            self.get_json(&format!("league/{league_id}/rosters")).await?;
        Ok(rosters
            .into_iter()
            .map(|r| {
                let metadata = r.metadata.unwrap_or_default();
                let settings = r.settings.unwrap_or_default();
                RosterRecord {
                    roster_id: r.roster_id,
                    owner_ids: r.owner_id.iter().cloned().collect(),
                    owner_id: r.owner_id,
                    player_ids: r.players.unwrap_or_default(),
                    starter_ids: r.starters.unwrap_or_default(),
                    team_name: metadata.get("team_name").cloned(),
                    owner_display_name: None,
                    wins: settings.wins,
                    losses: settings.losses,
                }
            })
            .collect())
    }

    async fn fetch_matchups(
        &self,
        league_id: &str,
        week: u16,
    ) -> Result<Vec<MatchupRecord>, NetworkError> {
        let matchups: Vec<SleeperMatchup> = self
            .get_json(&format!("league/{league_id}/matchups/{week}"))
            .await?;
        Ok(matchups
            .into_iter()
            .map(|m| MatchupRecord {
                roster_id: m.roster_id,
                matchup_id: m.matchup_id,
                points: m.points,
                player_ids: m.players.unwrap_or_default(),
                starter_ids: m.starters.unwrap_or_default(),
                player_points: m.players_points.unwrap_or_default(),
            })
            .collect())
    }

    async fn fetch_users(&self, league_id: &str) -> Result<Vec<UserRecord>, NetworkError> {
        let users: Vec<SleeperUser> =
            self.get_json(&format!("league/{league_id}/users")).await?;
        Ok(users
            .into_iter()
            .map(|u| {
                let team_name = u
                    .metadata
                    .as_ref()
                    .and_then(|m| m.get("team_name").cloned());
                let avatar_url = u
                    .avatar
                    .map(|a| format!("https://sleepercdn.com/avatars/thumbs/{a}"));
                UserRecord {
                    user_id: u.user_id,
                    display_name: u.display_name,
                    team_name,
                    avatar_url,
                }
            })
            .collect())
    }

    async fn fetch_settings(&self, league_id: &str) -> Result<LeagueSettings, NetworkError> {
        let league: SleeperLeague = self.get_json(&format!("league/{league_id}")).await?;
        // Guillotine leagues on Sleeper run with no playoff bracket; a
        // playoff_week_start of 0 is the signal the community settles on.
        let is_elimination = league
            .settings
            .get("playoff_week_start")
            .and_then(|v| v.as_u64())
            .map(|w| w == 0)
            .unwrap_or(false);
        let scoring_weights = if league.scoring_settings.is_empty() {
            None
        } else {
            Some(league.scoring_settings)
        };
        Ok(LeagueSettings {
            is_elimination,
            scoring_weights,
        })
    }

    fn identify_my_team(&self, rosters: &[RosterRecord], my_identity: &str) -> Option<u64> {
        rosters
            .iter()
            .find(|r| r.owner_id.as_deref() == Some(my_identity))
            .map(|r| r.roster_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster(id: u64, owner: Option<&str>) -> RosterRecord {
        RosterRecord {
            roster_id: id,
            owner_id: owner.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn identify_my_team_matches_owner_id() {
        let client = SleeperClient::new();
        let rosters = vec![roster(1, Some("u_a")), roster(2, Some("u_b")), roster(3, None)];
        assert_eq!(client.identify_my_team(&rosters, "u_b"), Some(2));
        assert_eq!(client.identify_my_team(&rosters, "u_missing"), None);
    }

    #[test]
    fn matchup_wire_shape_decodes() {
        let raw = r#"[{"roster_id": 4, "matchup_id": 2, "points": 101.3,
            "players": ["1234", "5678"], "starters": ["1234"],
            "players_points": {"1234": 21.4, "5678": 3.0}}]"#;
        let parsed: Vec<SleeperMatchup> = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed[0].roster_id, 4);
        assert_eq!(parsed[0].matchup_id, Some(2));
        assert_eq!(parsed[0].players_points.as_ref().unwrap()["1234"], 21.4);
    }
}
