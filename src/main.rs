//! GeoGuess Game Server
//!
//! Binary entry point: configuration from the environment, a seeded demo
//! catalog when the store starts empty, and the WebSocket server with its
//! maintenance loops.

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use geoguess::{
    content::{seed_demo_catalog, CatalogConfig, LocationCatalog},
    network::{AuthConfig, GameServer, ServerConfig},
    EngineConfig, GameStore, QuotaConfig, RoundEngine, ScoreParams,
    ROUND_DURATION_SECS, VERSION,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("GeoGuess Server v{}", VERSION);
    info!("Round window: {} seconds", ROUND_DURATION_SECS);

    let auth = AuthConfig::from_env();
    if !auth.is_configured() {
        warn!("no AUTH_SECRET or AUTH_PUBLIC_KEY_PEM set - clients cannot authenticate");
    }

    let store = Arc::new(GameStore::new());
    if store.location_count().await == 0 {
        seed_demo_catalog(&store).await;
        info!("seeded demo catalog with {} locations", store.location_count().await);
    }

    let seed = std::env::var("GEOGUESS_CATALOG_SEED")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0xC0FF_EE00);
    let catalog = Arc::new(LocationCatalog::new(store.clone(), CatalogConfig::default(), seed));

    let quota = QuotaConfig {
        daily_moves: std::env::var("GEOGUESS_DAILY_MOVES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(QuotaConfig::default().daily_moves),
    };
    info!("daily move allotment: {}", quota.daily_moves);

    let engine = Arc::new(RoundEngine::new(
        store.clone(),
        catalog,
        EngineConfig::default(),
        quota,
        ScoreParams::default(),
    ));

    let server = GameServer::new(ServerConfig::from_env(), auth, engine, store);
    server.run().await?;

    Ok(())
}
