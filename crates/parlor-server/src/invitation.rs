//! Invitations: the pairwise state machine binding two clients.
//!
//! An [`Invitation`] is created by a source client as an offer to a
//! target client, with a role assigned to each side. Exactly one
//! `Invitation` is shared by both endpoints (each client's list holds a
//! handle under its own local ID). The state machine is:
//!
//! ```text
//! Open ──accept──────────▶ Accepted        (creates the game)
//! Open ──close(None)─────▶ Closed          (revoke / decline)
//! Accepted ──close(role)─▶ Closed          (resigns the game for `role`)
//! Accepted ──close(None)─▶ Closed          (only once the game is over)
//! ```
//!
//! Any other transition is refused. Transitions take only the
//! invitation's own lock; composing them with list manipulation on the
//! two clients is the client module's job.

use std::sync::{Arc, Mutex, MutexGuard};

use parlor_core::{Game, Role};

use crate::client::Client;
use crate::error::OpError;

/// Lifecycle phase of an invitation. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Open,
    Accepted,
    Closed,
}

struct State {
    phase: Phase,
    game: Option<Arc<Mutex<Game>>>,
}

pub struct Invitation {
    source: Arc<Client>,
    target: Arc<Client>,
    source_role: Role,
    target_role: Role,
    state: Mutex<State>,
}

impl Invitation {
    /// Create an open invitation. The two endpoints must be distinct
    /// clients and the two roles must differ.
    pub fn new(
        source: Arc<Client>,
        target: Arc<Client>,
        source_role: Role,
        target_role: Role,
    ) -> Result<Arc<Invitation>, OpError> {
        if source.conn_id() == target.conn_id() || source_role == target_role {
            return Err(OpError::BadState);
        }
        Ok(Arc::new(Invitation {
            source,
            target,
            source_role,
            target_role,
            state: Mutex::new(State {
                phase: Phase::Open,
                game: None,
            }),
        }))
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn source(&self) -> &Arc<Client> {
        &self.source
    }

    pub fn target(&self) -> &Arc<Client> {
        &self.target
    }

    pub fn source_role(&self) -> Role {
        self.source_role
    }

    pub fn target_role(&self) -> Role {
        self.target_role
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    /// The game attached by `accept`, if any.
    pub fn game(&self) -> Option<Arc<Mutex<Game>>> {
        self.lock().game.clone()
    }

    /// Is `client` the source endpoint?
    pub fn is_source(&self, client: &Client) -> bool {
        self.source.conn_id() == client.conn_id()
    }

    /// The role `client` plays in this invitation, if it is an endpoint.
    pub fn role_of(&self, client: &Client) -> Option<Role> {
        if self.source.conn_id() == client.conn_id() {
            Some(self.source_role)
        } else if self.target.conn_id() == client.conn_id() {
            Some(self.target_role)
        } else {
            None
        }
    }

    /// The opposite endpoint from `client`, if `client` is an endpoint.
    pub fn peer_of(&self, client: &Client) -> Option<&Arc<Client>> {
        if self.source.conn_id() == client.conn_id() {
            Some(&self.target)
        } else if self.target.conn_id() == client.conn_id() {
            Some(&self.source)
        } else {
            None
        }
    }

    /// Open → Accepted, creating the game. Returns the new game.
    pub fn accept(&self) -> Result<Arc<Mutex<Game>>, OpError> {
        let mut state = self.lock();
        if state.phase != Phase::Open {
            return Err(OpError::BadState);
        }
        let game = Arc::new(Mutex::new(Game::new()));
        state.phase = Phase::Accepted;
        state.game = Some(game.clone());
        Ok(game)
    }

    /// Close the invitation.
    ///
    /// With no game attached this is the revoke/decline transition. With
    /// a game in progress, `resigner` names the role that resigns as a
    /// side effect; `None` is only allowed once the game is already over.
    pub fn close(&self, resigner: Option<Role>) -> Result<(), OpError> {
        let mut state = self.lock();
        if state.phase == Phase::Closed {
            return Err(OpError::BadState);
        }
        if let Some(game) = &state.game {
            let mut game = game.lock().unwrap_or_else(|e| e.into_inner());
            if !game.is_over() {
                match resigner {
                    None => return Err(OpError::BadState),
                    // resign() cannot fail here: the game is not over.
                    Some(role) => game.resign(role).map_err(|_| OpError::BadState)?,
                }
            }
        }
        state.phase = Phase::Closed;
        Ok(())
    }
}
