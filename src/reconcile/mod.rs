// Team/matchup reconciler: raw platform records in, normalized snapshots
// out.
//
// One `Reconciler` serves one platform client plus the stat/game/player
// capabilities. League format (head-to-head vs elimination) is decided from
// league settings, fetched at most once per league and cached for the
// reconciler's lifetime; a config-level override wins when present.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use thiserror::Error;
use tracing::{debug, info};

use crate::model::{CacheKey, LeagueDescriptor, LeagueSnapshot};
use crate::platform::{NetworkError, PlatformClient};
use crate::stats::{default_scoring_weights, GameStatusProvider, PlayerDirectory, StatsProvider};

pub mod elimination;
pub mod head_to_head;
pub mod identity;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// The user's team could not be identified in the league. Surfaced as
    /// "league hidden / needs setup", never a crash.
    #[error("could not identify my team in league {league_id}")]
    IdentityResolution { league_id: String },

    /// No usable matchup for the user this week (bye, playoffs knockout,
    /// or malformed upstream data).
    #[error("no matchup for my team in league {league_id} week {week}")]
    NoMatchups { league_id: String, week: u16 },
}

// ---------------------------------------------------------------------------
// League format verdict
// ---------------------------------------------------------------------------

/// Cached per-league verdict: format plus scoring weights.
#[derive(Debug, Clone)]
struct LeagueVerdict {
    is_elimination: bool,
    weights: HashMap<String, f64>,
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Reconciles one platform's raw league data into normalized snapshots.
pub struct Reconciler {
    client: Arc<dyn PlatformClient>,
    stats: Arc<dyn StatsProvider>,
    games: Arc<dyn GameStatusProvider>,
    players: Arc<dyn PlayerDirectory>,
    /// The user's identity token on this platform (Sleeper user ID or ESPN
    /// SWID).
    my_identity: String,
    /// Config-level format overrides by league ID; beats platform settings.
    format_overrides: HashMap<String, bool>,
    /// League settings verdicts, fetched once per league lifetime.
    verdicts: Mutex<HashMap<String, LeagueVerdict>>,
}

impl Reconciler {
    pub fn new(
        client: Arc<dyn PlatformClient>,
        stats: Arc<dyn StatsProvider>,
        games: Arc<dyn GameStatusProvider>,
        players: Arc<dyn PlayerDirectory>,
        my_identity: String,
    ) -> Self {
        Self {
            client,
            stats,
            games,
            players,
            my_identity,
            format_overrides: HashMap::new(),
            verdicts: Mutex::new(HashMap::new()),
        }
    }

    /// Force a league's format instead of trusting platform settings.
    pub fn with_format_overrides(mut self, overrides: HashMap<String, bool>) -> Self {
        self.format_overrides = overrides;
        self
    }

    pub fn client(&self) -> &Arc<dyn PlatformClient> {
        &self.client
    }

    /// The league's format and scoring weights, fetching settings at most
    /// once per league.
    async fn verdict(&self, league_id: &str) -> Result<LeagueVerdict, NetworkError> {
        if let Some(v) = self.verdicts.lock().unwrap().get(league_id) {
            return Ok(v.clone());
        }

        let settings = self.client.fetch_settings(league_id).await?;
        let is_elimination = self
            .format_overrides
            .get(league_id)
            .copied()
            .unwrap_or(settings.is_elimination);
        let verdict = LeagueVerdict {
            is_elimination,
            weights: settings
                .scoring_weights
                .unwrap_or_else(default_scoring_weights),
        };
        debug!(league_id, is_elimination, "cached league format verdict");
        self.verdicts
            .lock()
            .unwrap()
            .insert(league_id.to_string(), verdict.clone());
        Ok(verdict)
    }

    /// Fetch and reconcile one league's data for the week.
    pub async fn reconcile(
        &self,
        league: &LeagueDescriptor,
        week: u16,
    ) -> Result<LeagueSnapshot, ReconcileError> {
        let key = CacheKey::for_league(league, week);
        let verdict = self.verdict(&league.league_id).await?;

        let rosters = self.client.fetch_rosters(&league.league_id).await?;
        let matchups = self
            .client
            .fetch_matchups(&league.league_id, week)
            .await?;
        let users = self.client.fetch_users(&league.league_id).await?;

        let my_roster = self.client.identify_my_team(&rosters, &self.my_identity);

        if verdict.is_elimination {
            let ranking = elimination::build_ranking(
                &key,
                &rosters,
                &matchups,
                &users,
                my_roster,
                &verdict.weights,
                self.stats.as_ref(),
                self.games.as_ref(),
                self.players.as_ref(),
            )
            .await;
            info!(
                league_id = %league.league_id,
                week,
                active = ranking.rankings.len(),
                eliminated = ranking.elimination_history.len(),
                "reconciled elimination league"
            );
            return Ok(LeagueSnapshot::Elimination(ranking));
        }

        let my_roster = my_roster.ok_or_else(|| ReconcileError::IdentityResolution {
            league_id: league.league_id.clone(),
        })?;

        let snapshot = head_to_head::build_my_matchup(
            &key,
            my_roster,
            &rosters,
            &matchups,
            &users,
            &verdict.weights,
            self.stats.as_ref(),
            self.games.as_ref(),
            self.players.as_ref(),
        )
        .await
        .ok_or_else(|| ReconcileError::NoMatchups {
            league_id: league.league_id.clone(),
            week,
        })?;

        info!(
            league_id = %league.league_id,
            week,
            my_score = snapshot.my_team.current_score,
            "reconciled head-to-head matchup"
        );
        Ok(LeagueSnapshot::HeadToHead(snapshot))
    }
}
