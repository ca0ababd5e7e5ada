//! Crash Game Server
//!
//! Binary entry point: wires the round engine to the WebSocket server.
//! Configuration comes from the environment; the in-memory balance
//! gateway stands in for a production wallet integration.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crash_game::game::balance::InMemoryBalance;
use crash_game::{EngineConfig, GameServer, RoundScheduler, ServerConfig, VERSION};

/// Demo grant for unseen accounts: 10 TON in nanotons.
const DEMO_TON_GRANT: u64 = 10_000_000_000;
/// Demo grant for unseen accounts: 1000 stars.
const DEMO_STARS_GRANT: u64 = 1_000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string())),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    let engine_config = EngineConfig::from_env();
    let server_config = ServerConfig::from_env();

    info!("Crash Game Server v{}", VERSION);
    info!(
        "Betting window: {}ms, tick interval: {}ms, cooldown: {}ms",
        engine_config.betting_duration_ms,
        engine_config.tick_interval_ms,
        engine_config.crash_cooldown_ms
    );
    if !server_config.auth.is_configured() {
        info!("No auth key configured: clients can spectate but not bet");
    }

    // Wallet seam. A production deployment replaces this with its real
    // balance service behind the same trait.
    let balance = Arc::new(InMemoryBalance::with_starting_balance(
        DEMO_TON_GRANT,
        DEMO_STARS_GRANT,
    ));

    let engine = Arc::new(
        RoundScheduler::new(engine_config, balance).context("failed to open the first round")?,
    );
    let server = Arc::new(GameServer::new(server_config, engine.clone()));

    // The driver owns every phase transition; the server only observes
    // and forwards requests.
    let driver = engine.clone();
    let driver_handle = tokio::spawn(async move { driver.run().await });

    let accept = server.clone();
    let server_handle = tokio::spawn(async move { accept.run().await });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutting down");

    server.shutdown();
    engine.shutdown();

    server_handle.await?.context("server task failed")?;
    driver_handle.await?.context("round driver failed")?;

    Ok(())
}
