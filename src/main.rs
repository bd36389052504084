//! Gridmatch Engine
//!
//! Starts the session services, admits players (or recovers the last
//! match from its snapshot), runs the match and exits once it is over.
//!
//! Usage: `gridmatch-engine [config.json]`, with `GRIDMATCH_*` overrides.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use gridmatch::{
    core::{random_secret, MatchCipher},
    create_fresh_match,
    network::TokenMap,
    AccountService, EngineConfig, LocalBus, Match, MatchSnapshot, MessageBus, PlayerDirectory,
    TokenService, VERSION,
};

/// Pause between the end of the match and process exit, so the final
/// notifications reach the bus.
const FINISH_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("failed to set tracing subscriber")?;

    info!("Gridmatch Engine v{}", VERSION);

    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::from_file(&path)
            .with_context(|| format!("failed to load config from {path}"))?
            .with_env()?,
        None => EngineConfig::from_env()?,
    };
    config.validate()?;

    let directory = Arc::new(
        PlayerDirectory::open(&config.players_folder).context("failed to open the player directory")?,
    );

    let tokens = Arc::new(
        TokenService::bind(config.token_server_config(), directory.clone())
            .await
            .context("failed to start the token service")?,
    );
    {
        let tokens = tokens.clone();
        tokio::spawn(async move {
            if let Err(e) = tokens.run().await {
                error!("Token service stopped: {}", e);
            }
        });
    }

    let accounts = match config.account_server_config() {
        Some(server_config) => {
            let accounts = Arc::new(
                AccountService::bind(server_config, directory.clone())
                    .await
                    .context("failed to start the account service")?,
            );
            let service = accounts.clone();
            tokio::spawn(async move {
                if let Err(e) = service.run().await {
                    error!("Account service stopped: {}", e);
                }
            });
            Some(accounts)
        }
        None => None,
    };

    let bus: Arc<dyn MessageBus> = Arc::new(LocalBus::new());

    let game = match recover(&config, &directory, bus.clone()) {
        Some(game) => game,
        None => new_match(&config, &directory, &tokens, bus.clone()).await?,
    };

    let _consumer = game.start().context("failed to start the match")?;
    game.finished().await;

    info!("Match over, exiting in {:?}", FINISH_GRACE);
    tokio::time::sleep(FINISH_GRACE).await;
    tokens.shutdown();
    if let Some(accounts) = accounts {
        accounts.shutdown();
    }
    Ok(())
}

/// Rebuild the previous match from its snapshot, if there is a usable one.
fn recover(config: &EngineConfig, directory: &PlayerDirectory, bus: Arc<dyn MessageBus>) -> Option<Arc<Match>> {
    if !config.snapshot_path.exists() {
        return None;
    }
    let restored = MatchSnapshot::load(&config.snapshot_path)
        .and_then(|snapshot| Match::restore(&snapshot, directory, bus, config.match_settings()));
    match restored {
        Ok(game) => {
            info!("Recovered match from {}", config.snapshot_path.display());
            Some(game)
        }
        Err(e) => {
            warn!("Could not recover match, starting a new one: {}", e);
            None
        }
    }
}

/// Admit players through the token service and seed a fresh grid.
async fn new_match(
    config: &EngineConfig,
    directory: &PlayerDirectory,
    tokens: &TokenService,
    bus: Arc<dyn MessageBus>,
) -> Result<Arc<Match>> {
    let secret = config.secret.clone().unwrap_or_else(random_secret);
    let cipher = MatchCipher::from_secret(secret.clone())?;
    info!("Match cipher {}", cipher.fingerprint());

    let requester = |issued: &TokenMap| info!("Admission closed with {} players", issued.len());
    let handle = tokens
        .request_tokens(config.max_players, secret, Arc::new(requester))
        .context("the token service is already serving a request")?;

    info!("Waiting for {} players, press enter to start early", config.max_players);
    {
        let handle = handle.clone();
        std::thread::Builder::new()
            .name("early-start".into())
            .spawn(move || {
                let mut line = String::new();
                // EOF means no operator is attached.
                if matches!(std::io::stdin().read_line(&mut line), Ok(n) if n > 0) {
                    handle.finish_early();
                }
            })
            .context("failed to spawn the stdin reader")?;
    }

    let issued = handle.wait().await;
    let game = create_fresh_match(
        &issued,
        directory,
        config.cities.clone(),
        cipher,
        bus,
        config.match_settings(),
        &mut rand::thread_rng(),
    )?;
    Ok(game)
}
