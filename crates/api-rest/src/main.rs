//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the REST API server on its own.
//!
//! ## Intended use
//! Useful for development and debugging when you only want the JSON API. The workspace's main
//! `drivefs-run` binary runs REST and WebDAV concurrently.

use drivefs_core::config::{cache_config_from_raw, core_config_from_env_values, RawCacheSettings};
use drivefs_core::DriveCore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the DriveFS REST API server
///
/// # Environment Variables
/// - `DRIVEFS_REST_ADDR`: Server address (default: "0.0.0.0:3000")
/// - `DRIVEFS_DATA_DIR`, `DRIVEFS_DB_PATH`: storage locations
/// - `REDIS_*` and `DRIVEFS_*CACHE*`: cache settings
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the configuration is invalid or the store cannot be opened,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?)
                .add_directive("drivefs_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("DRIVEFS_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let config = core_config_from_env_values(
        std::env::var("DRIVEFS_DATA_DIR").ok(),
        std::env::var("DRIVEFS_DB_PATH").ok(),
    )?;
    let cache_config = cache_config_from_raw(RawCacheSettings::from_lookup(|k| {
        std::env::var(k).ok()
    }))?;
    let core = DriveCore::open(config, &cache_config).await?;

    tracing::info!("-- Starting DriveFS REST API on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, api_rest::router(core.clone()))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    core.close().await;
    Ok(())
}
