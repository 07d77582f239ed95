use drivefs_core::DriveCore;
use drivefs_core::config::{RawCacheSettings, cache_config_from_raw, core_config_from_env_values};
use std::future::Future;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the DriveFS server
///
/// Opens the core once and serves both surfaces from it concurrently:
/// - REST API on port 3000 (configurable via DRIVEFS_REST_ADDR)
/// - WebDAV under `/dav` on port 3001 (configurable via DRIVEFS_DAV_ADDR)
///
/// The REST API authenticates with bearer tokens, WebDAV with HTTP Basic and the user's
/// WebDAV password. Both are issued with the `drivefs` CLI.
///
/// # Environment Variables
/// - `DRIVEFS_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `DRIVEFS_DAV_ADDR`: WebDAV server address (default: "0.0.0.0:3001")
/// - `DRIVEFS_DATA_DIR`: Root of the storage tree (default: "drivefs_data")
/// - `DRIVEFS_DB_PATH`: SQLite database (default: `<data dir>/drivefs.db`)
/// - `REDIS_*` and `DRIVEFS_*CACHE*`: cache settings
///
/// # Returns
/// * `Ok(())` - After both servers have shut down on Ctrl-C
/// * `Err(anyhow::Error)` - If configuration, startup or either server fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("drivefs_run=info".parse()?)
                .add_directive("drivefs_core=info".parse()?)
                .add_directive("api_rest=info".parse()?)
                .add_directive("api_dav=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("DRIVEFS_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let dav_addr = std::env::var("DRIVEFS_DAV_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".into());

    let config = core_config_from_env_values(
        std::env::var("DRIVEFS_DATA_DIR").ok(),
        std::env::var("DRIVEFS_DB_PATH").ok(),
    )?;
    let cache_config = cache_config_from_raw(RawCacheSettings::from_lookup(|k| {
        std::env::var(k).ok()
    }))?;
    let core = DriveCore::open(config, &cache_config).await?;

    tracing::info!("++ Starting DriveFS REST on {}", rest_addr);
    tracing::info!("++ Starting DriveFS WebDAV on {}{}", dav_addr, api_dav::DAV_PREFIX);

    let rest_listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    let dav_listener = tokio::net::TcpListener::bind(&dav_addr).await?;

    let rest_server = axum::serve(rest_listener, api_rest::router(core.clone()))
        .with_graceful_shutdown(shutdown_signal());
    let dav_server = axum::serve(dav_listener, api_dav::router(core.clone()))
        .with_graceful_shutdown(shutdown_signal());

    // Run both
    let (rest_result, dav_result) = tokio::join!(rest_server.into_future(), dav_server.into_future());

    core.close().await;
    rest_result?;
    dav_result?;
    Ok(())
}

fn shutdown_signal() -> impl Future<Output = ()> {
    async {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("-- Shutting down");
    }
}
