//! Binary TCP match server.

use anyhow::Result;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use parlor_server::config::Config;
use parlor_server::server;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_args_and_env();

    // SIGHUP begins a graceful shutdown: stop accepting, half-close
    // every client, wait for the sessions to drain.
    let shutdown = CancellationToken::new();
    match signal(SignalKind::hangup()) {
        Ok(mut hangup) => {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                hangup.recv().await;
                info!("SIGHUP received, starting graceful shutdown");
                shutdown.cancel();
            });
        }
        Err(e) => error!(error = %e, "could not install SIGHUP handler"),
    }

    server::run(config, shutdown).await
}
