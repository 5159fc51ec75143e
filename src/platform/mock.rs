// Scripted in-memory platform client.
//
// Used by integration tests and offline demos: per-league scripted
// responses, injectable failures, artificial latency so concurrent callers
// actually overlap, and atomic fetch counters for asserting deduplication
// and bounded fan-out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::model::{LeagueDescriptor, Platform};
use crate::platform::{
    LeagueSettings, MatchupRecord, NetworkError, PlatformClient, RosterRecord, UserRecord,
};

/// Scripted data for one league.
#[derive(Debug, Clone, Default)]
pub struct MockLeague {
    pub descriptor: Option<LeagueDescriptor>,
    pub rosters: Vec<RosterRecord>,
    /// Matchup records keyed by week.
    pub matchups: HashMap<u16, Vec<MatchupRecord>>,
    pub users: Vec<UserRecord>,
    pub settings: LeagueSettings,
}

#[derive(Debug, Default)]
struct Counters {
    rosters: AtomicUsize,
    matchups: AtomicUsize,
    users: AtomicUsize,
    settings: AtomicUsize,
}

/// In-memory `PlatformClient` with scripted responses.
pub struct MockPlatform {
    platform: Platform,
    leagues: Mutex<HashMap<String, MockLeague>>,
    counters: Counters,
    /// Number of upcoming fetch calls that fail before succeeding again.
    fail_next: AtomicUsize,
    /// Injected latency per fetch call.
    latency: Mutex<Duration>,
    /// Currently executing fetch calls, and the high-water mark, for
    /// asserting bounded concurrency.
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockPlatform {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            leagues: Mutex::new(HashMap::new()),
            counters: Counters::default(),
            fail_next: AtomicUsize::new(0),
            latency: Mutex::new(Duration::ZERO),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Install or replace the script for a league.
    pub fn script_league(&self, league_id: &str, league: MockLeague) {
        self.leagues
            .lock()
            .unwrap()
            .insert(league_id.to_string(), league);
    }

    /// Make the next `n` fetch calls fail with a transport error.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Delay every fetch call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    /// Total fetch calls across all endpoints.
    pub fn total_fetches(&self) -> usize {
        self.counters.rosters.load(Ordering::SeqCst)
            + self.counters.matchups.load(Ordering::SeqCst)
            + self.counters.users.load(Ordering::SeqCst)
            + self.counters.settings.load(Ordering::SeqCst)
    }

    pub fn matchup_fetches(&self) -> usize {
        self.counters.matchups.load(Ordering::SeqCst)
    }

    pub fn settings_fetches(&self) -> usize {
        self.counters.settings.load(Ordering::SeqCst)
    }

    /// High-water mark of simultaneously executing fetch calls.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Common prologue for every fetch: count, apply latency, maybe fail.
    async fn enter(&self, counter: &AtomicUsize) -> Result<(), NetworkError> {
        counter.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let remaining = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if remaining {
            return Err(NetworkError::Transport("injected failure".to_string()));
        }
        Ok(())
    }

    fn league(&self, league_id: &str) -> MockLeague {
        self.leagues
            .lock()
            .unwrap()
            .get(league_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl PlatformClient for MockPlatform {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn fetch_leagues(
        &self,
        _user_identity: &str,
        _season: u16,
    ) -> Result<Vec<LeagueDescriptor>, NetworkError> {
        Ok(self
            .leagues
            .lock()
            .unwrap()
            .values()
            .filter_map(|l| l.descriptor.clone())
            .collect())
    }

    async fn fetch_rosters(&self, league_id: &str) -> Result<Vec<RosterRecord>, NetworkError> {
        self.enter(&self.counters.rosters).await?;
        Ok(self.league(league_id).rosters)
    }

    async fn fetch_matchups(
        &self,
        league_id: &str,
        week: u16,
    ) -> Result<Vec<MatchupRecord>, NetworkError> {
        self.enter(&self.counters.matchups).await?;
        Ok(self
            .league(league_id)
            .matchups
            .get(&week)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_users(&self, league_id: &str) -> Result<Vec<UserRecord>, NetworkError> {
        self.enter(&self.counters.users).await?;
        Ok(self.league(league_id).users)
    }

    async fn fetch_settings(&self, league_id: &str) -> Result<LeagueSettings, NetworkError> {
        self.enter(&self.counters.settings).await?;
        Ok(self.league(league_id).settings)
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

    #[tokio::test]
    async fn fail_next_fails_then_recovers() {
        let mock = MockPlatform::new(Platform::Sleeper);
        mock.fail_next(1);
        assert!(mock.fetch_rosters("1").await.is_err());
        assert!(mock.fetch_rosters("1").await.is_ok());
        assert_eq!(mock.total_fetches(), 2);
    }
}
