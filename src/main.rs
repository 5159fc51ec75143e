// Mission-control entry point.
//
// Startup sequence:
// 1. Initialize tracing
// 2. Load config (huddle.toml, path overridable via first argument)
// 3. Build platform clients + reconcilers for the configured platforms
// 4. Build the snapshot store and warm all leagues for the requested week
// 5. Force one full refresh and print a sorted dashboard summary

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use huddle::config::{self, Config};
use huddle::derived;
use huddle::model::Platform;
use huddle::platform::{EspnClient, PlatformClient, SleeperClient};
use huddle::reconcile::Reconciler;
use huddle::stats::{StaticGameStatusProvider, StaticPlayerDirectory, StaticStatsProvider};
use huddle::store::SnapshotStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("huddle starting up");

    // 2. Load config
    let mut args = std::env::args().skip(1);
    let config_path = PathBuf::from(args.next().unwrap_or_else(|| "huddle.toml".to_string()));
    let week: u16 = args
        .next()
        .map(|w| w.parse().context("week argument must be a number"))
        .transpose()?
        .unwrap_or(1);

    let config = config::load_config(&config_path).context("failed to load configuration")?;
    info!(
        "Config loaded: {} leagues, season {}, week {}",
        config.leagues.len(),
        config.identity.season,
        week
    );

    // 3. Build reconcilers for the platforms the config actually uses.
    //
    // The binary runs with platform-supplied per-player points; stat and
    // game-status providers stay empty fixtures here because their real
    // backends are external collaborators.
    let stats = Arc::new(StaticStatsProvider::new());
    let games = Arc::new(StaticGameStatusProvider::new());
    let players = Arc::new(StaticPlayerDirectory::new());

    let mut reconcilers = Vec::new();
    for platform in [Platform::Sleeper, Platform::Espn] {
        if !config.leagues.iter().any(|l| l.platform == platform) {
            continue;
        }
        let (client, identity): (Arc<dyn PlatformClient>, String) = match platform {
            Platform::Sleeper => {
                let id = config
                    .identity
                    .sleeper_user_id
                    .clone()
                    .context("sleeper_user_id required for Sleeper leagues")?;
                (Arc::new(SleeperClient::new()), id)
            }
            Platform::Espn => {
                let swid = config
                    .identity
                    .espn_swid
                    .clone()
                    .context("espn_swid required for ESPN leagues")?;
                let client = EspnClient::new(
                    config.identity.season,
                    Some(swid.clone()),
                    config.identity.espn_s2.clone(),
                );
                (Arc::new(client), swid)
            }
        };
        let reconciler = Reconciler::new(
            client,
            stats.clone(),
            games.clone(),
            players.clone(),
            identity,
        )
        .with_format_overrides(config.format_overrides(platform));
        reconcilers.push(Arc::new(reconciler));
    }

    // 4. Build the store and warm every configured league.
    let store = SnapshotStore::new(reconcilers, config.refresh_config());
    let descriptors = config.descriptors();
    store.warm_leagues(&descriptors, week);

    // 5. One forced refresh, then a sorted summary.
    let failures = store.refresh(None, true).await;
    for (key, error) in &failures {
        warn!("could not refresh {key}: {error}");
    }

    print_summary(&store, &config, week);
    info!("huddle run complete");
    Ok(())
}

/// Print one line per league, in dashboard order.
fn print_summary(store: &SnapshotStore, config: &Config, week: u16) {
    let names = config
        .leagues
        .iter()
        .map(|l| (l.id.clone(), l.name.clone()))
        .collect();

    let snapshots: Vec<_> = config
        .descriptors()
        .iter()
        .filter_map(|d| {
            store
                .cached_snapshot(&huddle::model::CacheKey::for_league(d, week))
                .map(|s| (*s).clone())
        })
        .collect();

    let sorted = derived::sort_snapshots(snapshots, &names, config.refresh.sort_preference);
    for snapshot in &sorted {
        let name = names
            .get(snapshot.league_id())
            .cloned()
            .unwrap_or_else(|| snapshot.league_id().to_string());
        let live = if derived::is_live(snapshot) { " LIVE" } else { "" };
        let state = if derived::is_eliminated(snapshot) {
            "eliminated"
        } else if derived::is_winning(snapshot) {
            "winning"
        } else {
            "losing"
        };
        match snapshot.my_score() {
            Some(score) => println!("{name}: {state}{live} ({score:.1} pts)"),
            None => println!("{name}: {state}{live}"),
        }
    }
}

/// Initialize tracing to stderr so the summary on stdout stays clean.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("huddle=info,warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
