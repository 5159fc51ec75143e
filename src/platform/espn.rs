// ESPN Fantasy Football v3 adapter.
//
// ESPN serves one league blob with composable `view` query params and loose
// JSON shapes, so translation walks `serde_json::Value` instead of deriving
// wire structs. Private leagues need the `SWID` and `espn_s2` cookies; the
// same SWID doubles as the identity token for `identify_my_team` (ESPN teams
// carry an owners array, not a single owner field).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::model::{LeagueDescriptor, Platform};
use crate::platform::{
    LeagueSettings, MatchupRecord, NetworkError, PlatformClient, RosterRecord, UserRecord,
};

const ESPN_BASE_URL: &str = "https://lm-api-reads.fantasy.espn.com/apis/v3/games/ffl";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Lineup slot IDs that do not count as starting (bench and IR).
const NON_STARTER_SLOTS: &[u64] = &[20, 21];

// ---------------------------------------------------------------------------
// EspnClient
// ---------------------------------------------------------------------------

/// Read-only client for ESPN's fantasy football v3 API.
pub struct EspnClient {
    http: reqwest::Client,
    base_url: String,
    season: u16,
    /// `SWID={...}; espn_s2=...` cookie string for private leagues.
    cookie: Option<String>,
}

impl EspnClient {
    pub fn new(season: u16, swid: Option<String>, espn_s2: Option<String>) -> Self {
        Self::with_base_url(ESPN_BASE_URL.to_string(), season, swid, espn_s2)
    }

    /// Override the base URL (test servers).
    pub fn with_base_url(
        base_url: String,
        season: u16,
        swid: Option<String>,
        espn_s2: Option<String>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent("huddle/0.1")
            .build()
            .unwrap_or_default();
        let cookie = match (swid, espn_s2) {
            (Some(swid), Some(s2)) => Some(format!("SWID={swid}; espn_s2={s2}")),
            (Some(swid), None) => Some(format!("SWID={swid}")),
            _ => None,
        };
        Self {
            http,
            base_url,
            season,
            cookie,
        }
    }

    async fn get_league_views(
        &self,
        league_id: &str,
        views: &[&str],
        week: Option<u16>,
    ) -> Result<Value, NetworkError> {
        let url = format!(
            "{}/seasons/{}/segments/0/leagues/{}",
            self.base_url, self.season, league_id
        );
        let mut req = self.http.get(&url);
        for view in views {
            req = req.query(&[("view", *view)]);
        }
        if let Some(w) = week {
            req = req.query(&[("scoringPeriodId", w.to_string())]);
        }
        if let Some(cookie) = &self.cookie {
            req = req.header(reqwest::header::COOKIE, cookie);
        }
        let resp = req.send().await?.error_for_status()?;
        let value = resp.json::<Value>().await?;
        Ok(value)
    }
}

// ---------------------------------------------------------------------------
// JSON walking helpers
// ---------------------------------------------------------------------------

fn str_of(v: &Value, key: &str) -> Option<String> {
    v.get(key).and_then(Value::as_str).map(str::to_string)
}

fn u64_of(v: &Value, key: &str) -> Option<u64> {
    v.get(key).and_then(Value::as_u64)
}

fn f64_of(v: &Value, key: &str) -> f64 {
    v.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

/// Team display name: modern blobs use `name`, older ones `location` +
/// `nickname`.
fn team_name(team: &Value) -> Option<String> {
    if let Some(name) = str_of(team, "name") {
        return Some(name);
    }
    match (str_of(team, "location"), str_of(team, "nickname")) {
        (Some(loc), Some(nick)) => Some(format!("{loc} {nick}")),
        (Some(one), None) | (None, Some(one)) => Some(one),
        (None, None) => None,
    }
}

fn roster_entries(team: &Value) -> Vec<&Value> {
    team.get("roster")
        .and_then(|r| r.get("entries"))
        .and_then(Value::as_array)
        .map(|a| a.iter().collect())
        .unwrap_or_default()
}

fn translate_team_roster(team: &Value) -> RosterRecord {
    let roster_id = u64_of(team, "id").unwrap_or(0);
    let owner_ids: Vec<String> = team
        .get("owners")
        .and_then(Value::as_array)
        .map(|a| {
            a.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let mut player_ids = Vec::new();
    let mut starter_ids = Vec::new();
    for entry in roster_entries(team) {
        let Some(pid) = u64_of(entry, "playerId") else {
            continue;
        };
        let pid = pid.to_string();
        let slot = u64_of(entry, "lineupSlotId").unwrap_or(20);
        if !NON_STARTER_SLOTS.contains(&slot) {
            starter_ids.push(pid.clone());
        }
        player_ids.push(pid);
    }

    let record = team.get("record").and_then(|r| r.get("overall"));
    let wins = record.and_then(|r| u64_of(r, "wins")).unwrap_or(0) as u32;
    let losses = record.and_then(|r| u64_of(r, "losses")).unwrap_or(0) as u32;

    RosterRecord {
        roster_id,
        owner_id: owner_ids.first().cloned(),
        owner_ids,
        player_ids,
        starter_ids,
        team_name: team_name(team),
        owner_display_name: None,
        wins,
        losses,
    }
}

/// Per-player applied totals for the week, from a team's roster entries.
fn applied_points(team: &Value) -> HashMap<String, f64> {
    let mut points = HashMap::new();
    for entry in roster_entries(team) {
        let Some(pid) = u64_of(entry, "playerId") else {
            continue;
        };
        let total = entry
            .get("playerPoolEntry")
            .map(|ppe| f64_of(ppe, "appliedStatTotal"))
            .unwrap_or(0.0);
        points.insert(pid.to_string(), total);
    }
    points
}

/// Normalize a SWID for comparison: ESPN sometimes braces it, sometimes not.
fn normalize_swid(swid: &str) -> String {
    swid.trim_matches(|c| c == '{' || c == '}').to_ascii_uppercase()
}

// ---------------------------------------------------------------------------
// PlatformClient impl
// ---------------------------------------------------------------------------

#[async_trait]
impl PlatformClient for EspnClient {
    fn platform(&self) -> Platform {
        Platform::Espn
    }

    async fn fetch_leagues(
        &self,
        user_identity: &str,
        season: u16,
    ) -> Result<Vec<LeagueDescriptor>, NetworkError> {
        // ESPN has no "leagues for user" endpoint on the read host; the fan
        // API needs the SWID cookie and returns preference entries keyed by
        // league ID.
        let url = format!(
            "https://fan.api.espn.com/apis/v2/fans/{}?displayEvents=false",
            normalize_swid(user_identity)
        );
        let mut req = self.http.get(&url);
        if let Some(cookie) = &self.cookie {
            req = req.header(reqwest::header::COOKIE, cookie);
        }
        let blob: Value = req.send().await?.error_for_status()?.json().await?;

        let mut out = Vec::new();
        let prefs = blob
            .get("preferences")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for pref in &prefs {
            let entry = pref.get("metaData").and_then(|m| m.get("entry"));
            let Some(entry) = entry else { continue };
            let Some(groups) = entry.get("groups").and_then(Value::as_array) else {
                continue;
            };
            for group in groups {
                let Some(league_id) = u64_of(group, "groupId") else {
                    continue;
                };
                out.push(LeagueDescriptor {
                    league_id: league_id.to_string(),
                    name: str_of(group, "groupName")
                        .or_else(|| str_of(entry, "entryMetadata"))
                        .unwrap_or_else(|| format!("ESPN League {league_id}")),
                    platform: Platform::Espn,
                    season_year: season,
                    total_teams: u64_of(group, "groupSize").unwrap_or(0) as usize,
                });
            }
        }
        Ok(out)
    }

    async fn fetch_rosters(&self, league_id: &str) -> Result<Vec<RosterRecord>, NetworkError> {
        let blob = self
            .get_league_views(league_id, &["mTeam", "mRoster"], None)
            .await?;
        let teams = blob
            .get("teams")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(teams.iter().map(translate_team_roster).collect())
    }

    async fn fetch_matchups(
        &self,
        league_id: &str,
        week: u16,
    ) -> Result<Vec<MatchupRecord>, NetworkError> {
        let blob = self
            .get_league_views(league_id, &["mMatchup", "mRoster"], Some(week))
            .await?;
        let teams = blob
            .get("teams")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        // Index roster composition and per-player points by team ID; the
        // schedule entries only carry team IDs and totals.
        let mut by_team: HashMap<u64, (RosterRecord, HashMap<String, f64>)> = HashMap::new();
        for team in &teams {
            let roster = translate_team_roster(team);
            let points = applied_points(team);
            by_team.insert(roster.roster_id, (roster, points));
        }

        let schedule = blob
            .get("schedule")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut out = Vec::new();
        for game in &schedule {
            if u64_of(game, "matchupPeriodId") != Some(week as u64) {
                continue;
            }
            let matchup_id = u64_of(game, "id");
            for side in ["home", "away"] {
                let Some(side) = game.get(side) else { continue };
                let Some(team_id) = u64_of(side, "teamId") else {
                    continue;
                };
                let (player_ids, starter_ids, player_points) = match by_team.get(&team_id) {
                    Some((roster, points)) => (
                        roster.player_ids.clone(),
                        roster.starter_ids.clone(),
                        points.clone(),
                    ),
                    None => (Vec::new(), Vec::new(), HashMap::new()),
                };
                out.push(MatchupRecord {
                    roster_id: team_id,
                    matchup_id,
                    points: f64_of(side, "totalPoints"),
                    player_ids,
                    starter_ids,
                    player_points,
                });
            }
        }
        Ok(out)
    }

    async fn fetch_users(&self, league_id: &str) -> Result<Vec<UserRecord>, NetworkError> {
        let blob = self.get_league_views(league_id, &["mTeam"], None).await?;
        let members = blob
            .get("members")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(members
            .iter()
            .filter_map(|m| {
                let user_id = str_of(m, "id")?;
                let display_name = str_of(m, "displayName").unwrap_or_else(|| {
                    match (str_of(m, "firstName"), str_of(m, "lastName")) {
                        (Some(f), Some(l)) => format!("{f} {l}"),
                        _ => user_id.clone(),
                    }
                });
                Some(UserRecord {
                    user_id,
                    display_name,
                    team_name: None,
                    avatar_url: None,
                })
            })
            .collect())
    }

    async fn fetch_settings(&self, league_id: &str) -> Result<LeagueSettings, NetworkError> {
        let blob = self
            .get_league_views(league_id, &["mSettings"], None)
            .await?;
        let settings = blob.get("settings").cloned().unwrap_or(Value::Null);

        // ESPN has no first-class guillotine flag; a zero-team playoff
        // bracket is the closest signal.
        let is_elimination = settings
            .get("scheduleSettings")
            .and_then(|s| u64_of(s, "playoffTeamCount"))
            .map(|n| n == 0)
            .unwrap_or(false);

        // scoringItems: statId -> points. Stat IDs stay ESPN-native here;
        // the stats provider for ESPN leagues keys its maps the same way.
        let scoring_weights = settings
            .get("scoringSettings")
            .and_then(|s| s.get("scoringItems"))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        let stat_id = u64_of(item, "statId")?;
                        let pts = item.get("points").and_then(Value::as_f64)?;
                        Some((stat_id.to_string(), pts))
                    })
                    .collect::<HashMap<String, f64>>()
            })
            .filter(|m: &HashMap<String, f64>| !m.is_empty());

        Ok(LeagueSettings {
            is_elimination,
            scoring_weights,
        })
    }

    fn identify_my_team(&self, rosters: &[RosterRecord], my_identity: &str) -> Option<u64> {
        let target = normalize_swid(my_identity);
        rosters
            .iter()
            .find(|r| r.owner_ids.iter().any(|o| normalize_swid(o) == target))
            .map(|r| r.roster_id)
    }
}
