//! TCP listener and top-level server wiring.
//!
//! `run` binds the configured address and hands off to `serve`, which:
//! - owns both registries,
//! - accepts connections, spawning a session per connection,
//! - on shutdown (token tripped by SIGHUP or a caller) stops accepting,
//!   half-closes every client, waits for the registry to drain, and
//!   finalizes the player registry.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::client_registry::ClientRegistry;
use crate::config::Config;
use crate::player_registry::PlayerRegistry;
use crate::session;

/// Bind the configured address and serve until `shutdown` is tripped.
pub async fn run(config: Config, shutdown: CancellationToken) -> anyhow::Result<()> {
    let addr = config.socket_addr_string();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(%addr, max_clients = config.max_clients, "server listening");
    serve(listener, config.max_clients, shutdown).await
}

/// Accept-and-dispatch loop over an already-bound listener. Split from
/// `run` so tests can bind an ephemeral port themselves.
pub async fn serve(
    listener: TcpListener,
    max_clients: usize,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let clients = Arc::new(ClientRegistry::new(max_clients));
    let players = Arc::new(PlayerRegistry::new());

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _peer)) => {
                    let clients = clients.clone();
                    let players = players.clone();
                    tokio::spawn(session::run_session(stream, clients, players));
                }
                Err(e) => warn!(error = %e, "accept failed"),
            },
        }
    }

    info!("shutdown requested, quiescing");
    clients.shutdown_all();
    clients.wait_for_empty().await;
    players.finalize();
    info!("all sessions drained, exiting");
    Ok(())
}
