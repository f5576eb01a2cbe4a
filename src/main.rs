use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use mosaic_flow::{api, config, connection::ConnectionProvider};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // Log to stdout, DEBUG unless RUST_LOG says otherwise
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_writer(std::io::stdout)
        .with_target(false)
        .init();

    info!("Mosaic flow explorer starting...");

    let cfg = config::load()?;
    info!("  Store: {}", cfg.database_url);
    info!("  Listen: {}:{}", cfg.bind_addr, cfg.port);
    info!("  Static dir: {}", cfg.static_dir);
    info!("  CORS origin: {}", cfg.webhost.as_deref().unwrap_or("*"));

    // No store at startup is fatal; later outages are handled per request
    let provider = match ConnectionProvider::connect(cfg.database_url.clone()).await {
        Ok(provider) => Arc::new(provider),
        Err(e) => {
            error!("Failed to connect to transaction store: {}", e);
            return Err(e.into());
        }
    };

    let api_handle = tokio::spawn({
        let cfg = cfg.clone();
        let provider = Arc::clone(&provider);
        async move { api::serve(cfg, provider).await }
    });

    tokio::select! {
        res = api_handle => match res {
            Ok(Ok(_)) => info!("API exited cleanly"),
            Ok(Err(e)) => error!("API error: {:?}", e),
            Err(e) => error!("API task panicked: {:?}", e),
        },
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received, stopping...");
        }
    }

    info!("Mosaic flow explorer stopped.");
    Ok(())
}
