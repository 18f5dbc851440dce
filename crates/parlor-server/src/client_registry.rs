//! Registry of currently connected clients.
//!
//! Admission is bounded by `max_clients`. The registry is the only
//! place usernames are checked for uniqueness, under the registry lock,
//! so two racing logins cannot both claim a name. A watch channel
//! mirrors the live-client count; `wait_for_empty` is a wait on that
//! channel reaching zero and is safe for any number of concurrent
//! callers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use parlor_core::Player;
use parlor_protocol::Packet;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::client::Client;
use crate::error::OpError;
use crate::player_registry::PlayerRegistry;

struct RegistryState {
    clients: Vec<Arc<Client>>,
    /// Set by `shutdown_all`; no admissions afterwards, so a connection
    /// that races the shutdown fan-out cannot be missed by it.
    closed: bool,
}

pub struct ClientRegistry {
    max_clients: usize,
    next_conn_id: AtomicU64,
    inner: Mutex<RegistryState>,
    count_tx: watch::Sender<usize>,
    count_rx: watch::Receiver<usize>,
}

impl ClientRegistry {
    pub fn new(max_clients: usize) -> Self {
        let (count_tx, count_rx) = watch::channel(0);
        ClientRegistry {
            max_clients,
            next_conn_id: AtomicU64::new(1),
            inner: Mutex::new(RegistryState {
                clients: Vec::new(),
                closed: false,
            }),
            count_tx,
            count_rx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Admit a new connection, handing its outbound queue to a fresh
    /// client. Fails with `Full` at capacity or once shutdown has
    /// begun, in which case the caller closes the connection
    /// immediately.
    pub fn register(&self, outbound: mpsc::UnboundedSender<Packet>) -> Result<Arc<Client>, OpError> {
        let mut state = self.lock();
        if state.closed || state.clients.len() >= self.max_clients {
            return Err(OpError::Full);
        }
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let client = Arc::new(Client::new(conn_id, outbound));
        state.clients.push(client.clone());
        self.count_tx.send_replace(state.clients.len());
        debug!(conn_id, total = state.clients.len(), "client registered");
        Ok(client)
    }

    /// Drop the registry's handle on a client. When the set becomes
    /// empty, `wait_for_empty` callers wake up.
    pub fn unregister(&self, client: &Arc<Client>) -> Result<(), OpError> {
        let mut state = self.lock();
        let pos = state
            .clients
            .iter()
            .position(|c| c.conn_id() == client.conn_id())
            .ok_or(OpError::NotFound)?;
        state.clients.remove(pos);
        self.count_tx.send_replace(state.clients.len());
        debug!(
            conn_id = client.conn_id(),
            total = state.clients.len(),
            "client unregistered"
        );
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.lock().clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Find the client logged in under exactly `name`.
    pub fn lookup(&self, name: &str) -> Option<Arc<Client>> {
        self.lock()
            .clients
            .iter()
            .find(|c| c.player().map_or(false, |p| p.name() == name))
            .cloned()
    }

    /// The set of currently logged-in players.
    pub fn snapshot_players(&self) -> Vec<Arc<Player>> {
        self.lock().clients.iter().filter_map(|c| c.player()).collect()
    }

    /// Log `client` in under `name`: refuse if any live client already
    /// holds the name, otherwise find-or-create the player and attach
    /// it. The whole check-then-claim runs under the registry lock.
    pub fn login(
        &self,
        client: &Arc<Client>,
        name: &str,
        players: &PlayerRegistry,
    ) -> Result<(), OpError> {
        let state = self.lock();
        if state
            .clients
            .iter()
            .any(|c| c.player().map_or(false, |p| p.name() == name))
        {
            return Err(OpError::Duplicate);
        }
        let player = players.register(name);
        client.login(player)
    }

    /// Trip every live client's shutdown token and stop admitting new
    /// connections. Sessions observe the token as EOF, drain their
    /// state, and unregister themselves; nothing is removed from the
    /// registry here.
    pub fn shutdown_all(&self) {
        let mut state = self.lock();
        state.closed = true;
        info!(clients = state.clients.len(), "closing all client connections");
        for client in state.clients.iter() {
            client.shutdown_token().cancel();
        }
    }

    /// Resolve once the number of registered clients reaches zero.
    pub async fn wait_for_empty(&self) {
        let mut rx = self.count_rx.clone();
        // Only fails if the sender is gone, and the registry owns it.
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}
