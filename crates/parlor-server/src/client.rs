//! Per-connection client state and the operations the session loop
//! dispatches to.
//!
//! A [`Client`] is one connected socket endpoint: an optional logged-in
//! player, the list of invitations it is party to (each under a local
//! ID the client assigned), and the outbound packet queue. Outbound
//! packets go through an unbounded channel drained by the connection's
//! single writer task, so every frame is written whole and in
//! submission order no matter which handler produced it; a send to a
//! peer never blocks and never takes the peer's socket.
//!
//! Operations that touch both endpoints of an invitation (invite,
//! revoke, decline, accept, resign, move) hold both clients' state
//! locks at once. The locks are always acquired in ascending `conn_id`
//! order, so two clients operating on each other cannot deadlock.
//! While both locks are held the invitation's phase cannot change
//! underneath the operation, because every phase transition itself runs
//! under the same pair of locks.
//!
//! Lock hierarchy: client state → invitation → game → player rating.
//! Registry locks are never taken while a client lock is held.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use parlor_core::role::role_code;
use parlor_core::{Game, MatchOutcome, Player, Role};
use parlor_protocol::{Packet, PacketType};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::OpError;
use crate::invitation::{Invitation, Phase};

struct InviteEntry {
    id: u8,
    invitation: Arc<Invitation>,
}

/// Mutable client state, guarded by the client's lock.
struct ClientState {
    player: Option<Arc<Player>>,
    invitations: Vec<InviteEntry>,
    next_invite_id: u8,
}

impl ClientState {
    fn find_by_id(&self, id: u8) -> Option<Arc<Invitation>> {
        self.invitations
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.invitation.clone())
    }

    fn id_of(&self, inv: &Arc<Invitation>) -> Option<u8> {
        self.invitations
            .iter()
            .find(|e| Arc::ptr_eq(&e.invitation, inv))
            .map(|e| e.id)
    }

    /// Assign the next local ID and retain the invitation. IDs are
    /// monotonic for the lifetime of the connection, never reused.
    fn add(&mut self, inv: &Arc<Invitation>) -> u8 {
        let id = self.next_invite_id;
        self.next_invite_id = self.next_invite_id.wrapping_add(1);
        self.invitations.push(InviteEntry {
            id,
            invitation: inv.clone(),
        });
        id
    }

    /// Drop the entry for `inv`, returning the local ID it had.
    fn remove(&mut self, inv: &Arc<Invitation>) -> Option<u8> {
        let pos = self
            .invitations
            .iter()
            .position(|e| Arc::ptr_eq(&e.invitation, inv))?;
        Some(self.invitations.remove(pos).id)
    }
}

/// One connected client.
pub struct Client {
    conn_id: u64,
    /// `None` once the session has closed the queue; late sends from
    /// peers are dropped (and logged) instead of queued.
    outbound: Mutex<Option<mpsc::UnboundedSender<Packet>>>,
    shutdown: CancellationToken,
    state: Mutex<ClientState>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Client({})", self.conn_id)
    }
}

/// Acquire both clients' state locks in ascending `conn_id` order.
/// Returns the guards as `(for a, for b)` regardless of that order.
fn lock_pair<'a>(
    a: &'a Client,
    b: &'a Client,
) -> (MutexGuard<'a, ClientState>, MutexGuard<'a, ClientState>) {
    debug_assert_ne!(a.conn_id, b.conn_id);
    if a.conn_id < b.conn_id {
        let ga = a.lock_state();
        let gb = b.lock_state();
        (ga, gb)
    } else {
        let gb = b.lock_state();
        let ga = a.lock_state();
        (ga, gb)
    }
}

impl Client {
    /// Created by the client registry only; `conn_id` is unique for the
    /// process and reflects creation order (it is the lock-ordering key).
    pub(crate) fn new(conn_id: u64, outbound: mpsc::UnboundedSender<Packet>) -> Client {
        Client {
            conn_id,
            outbound: Mutex::new(Some(outbound)),
            shutdown: CancellationToken::new(),
            state: Mutex::new(ClientState {
                player: None,
                invitations: Vec::new(),
                next_invite_id: 0,
            }),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ClientState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn conn_id(&self) -> u64 {
        self.conn_id
    }

    /// Token tripped by the registry's shutdown fan-out; the session
    /// loop treats it like EOF on the connection.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Queue a packet for this client's writer task. Failures mean the
    /// connection is already gone; they are logged and do not fail the
    /// operation that produced the packet.
    pub fn send(&self, packet: Packet) {
        let kind = packet.packet_type;
        let delivered = {
            let outbound = self.outbound.lock().unwrap_or_else(|e| e.into_inner());
            match outbound.as_ref() {
                Some(tx) => tx.send(packet).is_ok(),
                None => false,
            }
        };
        if !delivered {
            warn!(
                conn_id = self.conn_id,
                packet = ?kind,
                "connection gone, dropping outbound packet"
            );
        }
    }

    /// Close the outbound queue. Nothing further can be queued; the
    /// writer task drains what is already there and exits.
    pub(crate) fn close_outbound(&self) {
        self.outbound.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    pub fn send_ack(&self, payload: Vec<u8>) {
        self.send(Packet::new(PacketType::Ack, 0, 0, payload));
    }

    pub fn send_nack(&self) {
        self.send(Packet::bare(PacketType::Nack));
    }

    /// The player this client is logged in as, if any.
    pub fn player(&self) -> Option<Arc<Player>> {
        self.lock_state().player.clone()
    }

    /// Number of invitations currently in this client's list.
    pub fn invitation_count(&self) -> usize {
        self.lock_state().invitations.len()
    }

    /// Mark this client as logged in. Fails if it already is; the
    /// name-uniqueness half of the check lives in the client registry,
    /// which performs it under the registry lock.
    pub fn login(&self, player: Arc<Player>) -> Result<(), OpError> {
        let mut state = self.lock_state();
        if state.player.is_some() {
            return Err(OpError::Duplicate);
        }
        state.player = Some(player);
        Ok(())
    }

    /// Log out, first clearing the invitation list: games in progress
    /// are resigned, open invitations we made are revoked, open
    /// invitations made to us are declined. Peer notifications are
    /// best-effort; a cleanup step losing a race with the peer's own
    /// operation is fine.
    pub fn logout(&self) -> Result<(), OpError> {
        let entries: Vec<(u8, Arc<Invitation>)> = {
            let state = self.lock_state();
            if state.player.is_none() {
                return Err(OpError::BadState);
            }
            state
                .invitations
                .iter()
                .map(|e| (e.id, e.invitation.clone()))
                .collect()
        };

        for (id, inv) in entries {
            let result = if inv.game().is_some() {
                self.resign_game(id)
            } else if inv.is_source(self) {
                self.revoke_invitation(id)
            } else {
                self.decline_invitation(id)
            };
            if let Err(e) = result {
                debug!(
                    conn_id = self.conn_id,
                    invite_id = id,
                    error = %e,
                    "invitation cleanup lost a race during logout"
                );
            }
        }

        self.lock_state().player = None;
        Ok(())
    }

    /// Retain `inv` in this client's list under a fresh local ID.
    pub fn add_invitation(&self, inv: &Arc<Invitation>) -> u8 {
        self.lock_state().add(inv)
    }

    /// Remove `inv` from this client's list, returning the local ID it
    /// was held under.
    pub fn remove_invitation(&self, inv: &Arc<Invitation>) -> Result<u8, OpError> {
        self.lock_state().remove(inv).ok_or(OpError::NotFound)
    }

    fn find_invitation(&self, id: u8) -> Result<Arc<Invitation>, OpError> {
        self.lock_state().find_by_id(id).ok_or(OpError::NotFound)
    }

    /// Offer `target` a match from `source`. The invitation lands in
    /// both lists and the target is told its own ID, its role, and who
    /// is asking. Returns the ID assigned on the source side.
    pub fn make_invitation(
        source: &Arc<Client>,
        target: &Arc<Client>,
        source_role: Role,
        target_role: Role,
    ) -> Result<u8, OpError> {
        let inv = Invitation::new(source.clone(), target.clone(), source_role, target_role)?;

        let (mut me, mut peer) = lock_pair(source, target);
        let source_name = me
            .player
            .as_ref()
            .ok_or(OpError::BadState)?
            .name()
            .to_string();
        if peer.player.is_none() {
            // Target logged out between lookup and here.
            return Err(OpError::NotFound);
        }
        let source_id = me.add(&inv);
        let target_id = peer.add(&inv);

        target.send(Packet::new(
            PacketType::Invited,
            target_id,
            target_role.code(),
            source_name.into_bytes(),
        ));
        Ok(source_id)
    }

    /// Withdraw an open invitation this client made. The target learns
    /// via `REVOKED` under its own ID.
    pub fn revoke_invitation(&self, id: u8) -> Result<(), OpError> {
        let inv = self.find_invitation(id)?;
        if !inv.is_source(self) {
            return Err(OpError::BadState);
        }
        let target = inv.target().clone();

        let (mut me, mut peer) = lock_pair(self, &target);
        me.id_of(&inv).ok_or(OpError::NotFound)?;
        let target_id = peer.id_of(&inv).ok_or(OpError::NotFound)?;
        if inv.phase() != Phase::Open {
            return Err(OpError::BadState);
        }
        inv.close(None)?;
        me.remove(&inv);
        peer.remove(&inv);

        target.send(Packet::new(PacketType::Revoked, target_id, 0, Vec::new()));
        Ok(())
    }

    /// Turn down an open invitation made to this client. The source
    /// learns via `DECLINED` under its own ID.
    pub fn decline_invitation(&self, id: u8) -> Result<(), OpError> {
        let inv = self.find_invitation(id)?;
        if inv.is_source(self) {
            return Err(OpError::BadState);
        }
        let source = inv.source().clone();

        let (mut me, mut peer) = lock_pair(self, &source);
        me.id_of(&inv).ok_or(OpError::NotFound)?;
        let source_id = peer.id_of(&inv).ok_or(OpError::NotFound)?;
        if inv.phase() != Phase::Open {
            return Err(OpError::BadState);
        }
        inv.close(None)?;
        me.remove(&inv);
        peer.remove(&inv);

        source.send(Packet::new(PacketType::Declined, source_id, 0, Vec::new()));
        Ok(())
    }

    /// Accept an open invitation made to this client, creating the game.
    ///
    /// Whichever participant plays first gets the initial board: in the
    /// source's `ACCEPTED` notification when the source moves first,
    /// otherwise returned here so the session loop can put it in the
    /// accepting client's own ACK.
    pub fn accept_invitation(&self, id: u8) -> Result<Option<String>, OpError> {
        let inv = self.find_invitation(id)?;
        if inv.is_source(self) {
            return Err(OpError::BadState);
        }
        let source = inv.source().clone();

        let (me, peer) = lock_pair(self, &source);
        me.id_of(&inv).ok_or(OpError::NotFound)?;
        let source_id = peer.id_of(&inv).ok_or(OpError::NotFound)?;

        let game = inv.accept()?;
        let board = game.lock().unwrap_or_else(|e| e.into_inner()).unparse_state();

        if inv.source_role() == Role::First {
            source.send(Packet::new(
                PacketType::Accepted,
                source_id,
                0,
                board.into_bytes(),
            ));
            Ok(None)
        } else {
            source.send(Packet::new(PacketType::Accepted, source_id, 0, Vec::new()));
            Ok(Some(board))
        }
    }

    /// Resign a game in progress from either side of the invitation.
    pub fn resign_game(&self, id: u8) -> Result<(), OpError> {
        let inv = self.find_invitation(id)?;
        let my_role = inv.role_of(self).ok_or(OpError::NotFound)?;
        let opponent = inv.peer_of(self).ok_or(OpError::NotFound)?.clone();

        let (mut me, mut peer) = lock_pair(self, &opponent);
        let my_id = me.id_of(&inv).ok_or(OpError::NotFound)?;
        let opp_id = peer.id_of(&inv).ok_or(OpError::NotFound)?;
        if inv.phase() != Phase::Accepted {
            return Err(OpError::BadState);
        }
        let game = inv.game().ok_or(OpError::BadState)?;
        let my_player = me.player.clone().ok_or(OpError::BadState)?;
        let opp_player = peer.player.clone().ok_or(OpError::BadState)?;

        inv.close(Some(my_role))?;
        me.remove(&inv);
        peer.remove(&inv);

        // The resigner loses.
        Player::post_result(&my_player, &opp_player, MatchOutcome::Player2Wins);

        opponent.send(Packet::new(PacketType::Resigned, opp_id, 0, Vec::new()));

        let winner = game.lock().unwrap_or_else(|e| e.into_inner()).winner();
        let code = role_code(winner);
        self.send(Packet::new(PacketType::Ended, my_id, code, Vec::new()));
        opponent.send(Packet::new(PacketType::Ended, opp_id, code, Vec::new()));
        Ok(())
    }

    /// Make a move in a game in progress. The opponent sees the new
    /// board; if the move finishes the game, ratings are posted, the
    /// invitation is closed and delisted, and both sides get `ENDED`.
    pub fn make_move(&self, id: u8, text: &str) -> Result<(), OpError> {
        let inv = self.find_invitation(id)?;
        let my_role = inv.role_of(self).ok_or(OpError::NotFound)?;
        let opponent = inv.peer_of(self).ok_or(OpError::NotFound)?.clone();

        let (mut me, mut peer) = lock_pair(self, &opponent);
        let my_id = me.id_of(&inv).ok_or(OpError::NotFound)?;
        let opp_id = peer.id_of(&inv).ok_or(OpError::NotFound)?;
        if inv.phase() != Phase::Accepted {
            return Err(OpError::BadState);
        }
        let game_handle = inv.game().ok_or(OpError::BadState)?;
        let my_player = me.player.clone().ok_or(OpError::BadState)?;
        let opp_player = peer.player.clone().ok_or(OpError::BadState)?;

        let mv = Game::parse_move(my_role, text)?;
        let (board, over, winner, next_piece) = {
            let mut game = game_handle.lock().unwrap_or_else(|e| e.into_inner());
            game.apply_move(mv)?;
            (
                game.unparse_state(),
                game.is_over(),
                game.winner(),
                game.turn().piece(),
            )
        };

        let mut payload = format!("\n{}", board);
        if !over {
            payload.push_str(&format!("\n{} to move\n", next_piece));
        }
        opponent.send(Packet::new(
            PacketType::Moved,
            opp_id,
            0,
            payload.into_bytes(),
        ));

        if over {
            let outcome = match winner {
                Some(role) if role == my_role => MatchOutcome::Player1Wins,
                Some(_) => MatchOutcome::Player2Wins,
                None => MatchOutcome::Draw,
            };
            Player::post_result(&my_player, &opp_player, outcome);

            // The game is over, so closing needs no resigner.
            inv.close(winner)?;
            me.remove(&inv);
            peer.remove(&inv);

            let code = role_code(winner);
            self.send(Packet::new(PacketType::Ended, my_id, code, Vec::new()));
            opponent.send(Packet::new(PacketType::Ended, opp_id, code, Vec::new()));
        }
        Ok(())
    }
}
