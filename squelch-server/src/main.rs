use std::net::SocketAddr;

use anyhow::{Context, Result};
use tracing::info;

use squelch_server::{api, audio, logging, App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();
    let _log_guard = logging::init(&config)?;

    info!(port = config.http_port, "squelch server starting");

    std::fs::create_dir_all(&config.recordings_dir)
        .with_context(|| format!("create {}", config.recordings_dir.display()))?;
    std::fs::create_dir_all(&config.recordings_temp_dir)
        .with_context(|| format!("create {}", config.recordings_temp_dir.display()))?;

    if config.enable_file_log {
        logging::spawn_retention_sweep(config.log_dir.clone(), config.log_retention_days);
    }

    let app = App::build(config);

    app.floor.clone().spawn_sweeper();
    audio::spawn_ingress(app.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], app.config.http_port));
    let router = api::router(app);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!("listening on http://{addr}");

    axum::serve(listener, router).await.context("serve")?;
    Ok(())
}
