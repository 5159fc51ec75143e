// Configuration loading and parsing (huddle.toml).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::derived::SortPreference;
use crate::model::{LeagueDescriptor, Platform};
use crate::store::RefreshConfig;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },
}

// ---------------------------------------------------------------------------
// File structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire huddle.toml file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub identity: IdentitySection,
    #[serde(default)]
    pub refresh: RefreshSection,
    #[serde(default, rename = "league")]
    pub leagues: Vec<LeagueEntry>,
}

/// Platform identity tokens for the user.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentitySection {
    /// Sleeper numeric user ID.
    #[serde(default)]
    pub sleeper_user_id: Option<String>,
    /// ESPN SWID token (braces optional).
    #[serde(default)]
    pub espn_swid: Option<String>,
    /// ESPN espn_s2 cookie for private leagues.
    #[serde(default)]
    pub espn_s2: Option<String>,
    /// Season year.
    pub season: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RefreshSection {
    pub live_ttl_secs: u64,
    pub idle_ttl_secs: u64,
    pub max_concurrent_refreshes: usize,
    pub sort_preference: SortPreference,
}

impl Default for RefreshSection {
    fn default() -> Self {
        Self {
            live_ttl_secs: 90,
            idle_ttl_secs: 300,
            max_concurrent_refreshes: 3,
            sort_preference: SortPreference::WinningFirst,
        }
    }
}

/// One tracked league from a `[[league]]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct LeagueEntry {
    pub id: String,
    pub name: String,
    pub platform: Platform,
    pub total_teams: usize,
    /// Optional format override: force elimination handling instead of
    /// trusting platform settings.
    #[serde(default)]
    pub elimination: Option<bool>,
}

// ---------------------------------------------------------------------------
// Loading and validation
// ---------------------------------------------------------------------------

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    Config::from_str(&raw)
}

impl Config {
    /// Parse and validate from TOML text (tests, inline configs).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.identity.season < 2000 || self.identity.season > 2100 {
            return Err(ConfigError::ValidationError {
                field: "identity.season".to_string(),
                message: format!("implausible season year {}", self.identity.season),
            });
        }
        if self.leagues.is_empty() {
            return Err(ConfigError::ValidationError {
                field: "league".to_string(),
                message: "at least one [[league]] entry is required".to_string(),
            });
        }
        if self.refresh.live_ttl_secs == 0 || self.refresh.idle_ttl_secs == 0 {
            return Err(ConfigError::ValidationError {
                field: "refresh".to_string(),
                message: "TTLs must be greater than zero".to_string(),
            });
        }
        if self.refresh.max_concurrent_refreshes == 0 {
            return Err(ConfigError::ValidationError {
                field: "refresh.max_concurrent_refreshes".to_string(),
                message: "concurrency cap must be at least 1".to_string(),
            });
        }
        for league in &self.leagues {
            let (identity, token) = match league.platform {
                Platform::Sleeper => (&self.identity.sleeper_user_id, "sleeper_user_id"),
                Platform::Espn => (&self.identity.espn_swid, "espn_swid"),
            };
            if identity.is_none() {
                return Err(ConfigError::ValidationError {
                    field: format!("league.{}", league.id),
                    message: format!(
                        "league is on {} but identity.{token} is not set",
                        league.platform
                    ),
                });
            }
        }
        Ok(())
    }

    /// Descriptors for every configured league.
    pub fn descriptors(&self) -> Vec<LeagueDescriptor> {
        self.leagues
            .iter()
            .map(|l| LeagueDescriptor {
                league_id: l.id.clone(),
                name: l.name.clone(),
                platform: l.platform,
                season_year: self.identity.season,
                total_teams: l.total_teams,
            })
            .collect()
    }

    /// Format overrides for one platform's reconciler.
    pub fn format_overrides(&self, platform: Platform) -> HashMap<String, bool> {
        self.leagues
            .iter()
            .filter(|l| l.platform == platform)
            .filter_map(|l| l.elimination.map(|e| (l.id.clone(), e)))
            .collect()
    }

    /// Store-level refresh policy assembled from the `[refresh]` section.
    pub fn refresh_config(&self) -> RefreshConfig {
        RefreshConfig {
            live_ttl: Duration::from_secs(self.refresh.live_ttl_secs),
            idle_ttl: Duration::from_secs(self.refresh.idle_ttl_secs),
            max_concurrent_refreshes: self.refresh.max_concurrent_refreshes,
        }
    }
}
