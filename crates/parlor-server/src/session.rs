//! Per-connection service: the reader/dispatcher loop and the writer
//! task.
//!
//! Each accepted connection gets two tasks. The writer owns the write
//! half of the socket and drains the client's outbound channel one
//! whole frame at a time. The reader (this module's `run_session`)
//! receives request packets and dispatches them to client operations,
//! answering each with ACK or NACK.
//!
//! Until a LOGIN succeeds only LOGIN is honored; afterwards LOGIN is
//! refused and everything else is allowed. The loop ends on EOF, on a
//! transport error, or when the registry's shutdown fan-out trips the
//! client's token; it then logs the client out (resigning or
//! withdrawing whatever is outstanding), unregisters, and lets the
//! writer flush any remaining notifications before closing the socket.

use std::sync::Arc;

use parlor_core::Role;
use parlor_protocol::{recv_packet, send_packet, Packet, PacketHeader, PacketType};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::client_registry::ClientRegistry;
use crate::player_registry::PlayerRegistry;

/// Serve one connection to completion.
pub async fn run_session(
    stream: TcpStream,
    clients: Arc<ClientRegistry>,
    players: Arc<PlayerRegistry>,
) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "<unknown>".to_string());
    let (mut reader, writer) = stream.into_split();

    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let client = match clients.register(out_tx) {
        Ok(client) => client,
        Err(e) => {
            info!(%peer, error = %e, "refusing connection");
            return;
        }
    };
    info!(conn_id = client.conn_id(), %peer, "client connected");

    let writer_task = tokio::spawn(write_loop(writer, out_rx, client.conn_id()));

    let mut logged_in = false;
    loop {
        let next = tokio::select! {
            res = recv_packet(&mut reader) => res,
            // Shutdown fan-out: behave exactly as if the peer closed.
            _ = client.shutdown_token().cancelled() => Ok(None),
        };
        match next {
            Ok(Some((header, payload))) => {
                dispatch(&client, &clients, &players, &mut logged_in, header, payload);
            }
            Ok(None) => {
                debug!(conn_id = client.conn_id(), "end of stream");
                break;
            }
            Err(e) => {
                warn!(conn_id = client.conn_id(), error = %e, "transport error");
                break;
            }
        }
    }

    if logged_in {
        if let Err(e) = client.logout() {
            debug!(conn_id = client.conn_id(), error = %e, "logout on disconnect failed");
        }
    }

    // Close the queue so the writer flushes everything logout produced
    // and half-closes the socket; only then leave the registry, so the
    // supervisor's empty-wait never cuts a flush short.
    client.close_outbound();
    let _ = writer_task.await;

    if let Err(e) = clients.unregister(&client) {
        warn!(conn_id = client.conn_id(), error = %e, "unregister failed");
    }
    info!(conn_id = client.conn_id(), %peer, "client disconnected");
}

/// Drain the outbound queue onto the socket, one frame per packet.
/// Exits when the channel closes (client fully released) or a write
/// fails, then half-closes the socket so the peer sees EOF.
async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut out_rx: mpsc::UnboundedReceiver<Packet>,
    conn_id: u64,
) {
    while let Some(packet) = out_rx.recv().await {
        if let Err(e) = send_packet(&mut writer, &packet).await {
            debug!(conn_id, error = %e, "write failed, discarding remaining outbound packets");
            break;
        }
    }
    let _ = writer.shutdown().await;
}

/// Route one request packet. Every request is answered with exactly one
/// ACK or NACK on this client's own queue; notifications to peers are
/// produced inside the client operations.
fn dispatch(
    client: &Arc<Client>,
    clients: &ClientRegistry,
    players: &PlayerRegistry,
    logged_in: &mut bool,
    header: PacketHeader,
    payload: Vec<u8>,
) {
    let Some(packet_type) = PacketType::from_u8(header.packet_type) else {
        debug!(
            conn_id = client.conn_id(),
            packet_type = header.packet_type,
            "unknown packet type"
        );
        client.send_nack();
        return;
    };

    if packet_type != PacketType::Login && !*logged_in {
        debug!(conn_id = client.conn_id(), ?packet_type, "login required");
        client.send_nack();
        return;
    }

    match packet_type {
        PacketType::Login => {
            if *logged_in {
                debug!(conn_id = client.conn_id(), "already logged in");
                client.send_nack();
                return;
            }
            let name = match String::from_utf8(payload) {
                Ok(name) if !name.is_empty() => name,
                _ => {
                    client.send_nack();
                    return;
                }
            };
            match clients.login(client, &name, players) {
                Ok(()) => {
                    info!(conn_id = client.conn_id(), name = %name, "logged in");
                    *logged_in = true;
                    client.send_ack(Vec::new());
                }
                Err(e) => {
                    debug!(conn_id = client.conn_id(), name = %name, error = %e, "login refused");
                    client.send_nack();
                }
            }
        }

        PacketType::Users => {
            let mut roster = String::new();
            for player in clients.snapshot_players() {
                roster.push_str(&format!("{}\t{}\n", player.name(), player.rating()));
            }
            client.send_ack(roster.into_bytes());
        }

        PacketType::Invite => {
            let name = match String::from_utf8(payload) {
                Ok(name) if !name.is_empty() => name,
                _ => {
                    client.send_nack();
                    return;
                }
            };
            let Some(target_role) = Role::from_code(header.role) else {
                client.send_nack();
                return;
            };
            let Some(target) = clients.lookup(&name) else {
                debug!(conn_id = client.conn_id(), name = %name, "no such user to invite");
                client.send_nack();
                return;
            };
            match Client::make_invitation(client, &target, target_role.opponent(), target_role) {
                Ok(id) => {
                    debug!(conn_id = client.conn_id(), name = %name, invite_id = id, "invitation sent");
                    client.send_ack(Vec::new());
                }
                Err(e) => {
                    debug!(conn_id = client.conn_id(), name = %name, error = %e, "invite failed");
                    client.send_nack();
                }
            }
        }

        PacketType::Revoke => match client.revoke_invitation(header.id) {
            Ok(()) => client.send_ack(Vec::new()),
            Err(e) => {
                debug!(conn_id = client.conn_id(), invite_id = header.id, error = %e, "revoke failed");
                client.send_nack();
            }
        },

        PacketType::Decline => match client.decline_invitation(header.id) {
            Ok(()) => client.send_ack(Vec::new()),
            Err(e) => {
                debug!(conn_id = client.conn_id(), invite_id = header.id, error = %e, "decline failed");
                client.send_nack();
            }
        },

        PacketType::Accept => match client.accept_invitation(header.id) {
            Ok(Some(board)) => client.send_ack(board.into_bytes()),
            Ok(None) => client.send_ack(Vec::new()),
            Err(e) => {
                debug!(conn_id = client.conn_id(), invite_id = header.id, error = %e, "accept failed");
                client.send_nack();
            }
        },

        PacketType::Move => {
            let text = match String::from_utf8(payload) {
                Ok(text) => text,
                Err(_) => {
                    client.send_nack();
                    return;
                }
            };
            match client.make_move(header.id, &text) {
                Ok(()) => client.send_ack(Vec::new()),
                Err(e) => {
                    debug!(conn_id = client.conn_id(), invite_id = header.id, error = %e, "move refused");
                    client.send_nack();
                }
            }
        }

        PacketType::Resign => match client.resign_game(header.id) {
            Ok(()) => client.send_ack(Vec::new()),
            Err(e) => {
                debug!(conn_id = client.conn_id(), invite_id = header.id, error = %e, "resign failed");
                client.send_nack();
            }
        },

        // Server-to-client types are never valid as requests.
        PacketType::Ack
        | PacketType::Nack
        | PacketType::Invited
        | PacketType::Revoked
        | PacketType::Accepted
        | PacketType::Declined
        | PacketType::Moved
        | PacketType::Resigned
        | PacketType::Ended => {
            debug!(conn_id = client.conn_id(), ?packet_type, "client sent a server-side packet type");
            client.send_nack();
        }
    }
}
