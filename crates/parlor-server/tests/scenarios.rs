//! End-to-end scenarios over real TCP: a server task on an ephemeral
//! port, driven by framed clients.

use std::net::SocketAddr;
use std::time::Duration;

use parlor_protocol::{recv_packet, send_packet, Packet, PacketHeader, PacketType};
use parlor_server::server;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const EMPTY_BOARD: &[u8] = b" | | \n-----\n | | \n-----\n | | ";

struct Server {
    addr: SocketAddr,
    shutdown: CancellationToken,
    handle: JoinHandle<anyhow::Result<()>>,
}

async fn start_server(max_clients: usize) -> Server {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(server::serve(listener, max_clients, shutdown.clone()));
    Server {
        addr,
        shutdown,
        handle,
    }
}

struct Conn {
    stream: TcpStream,
}

impl Conn {
    async fn open(addr: SocketAddr) -> Conn {
        Conn {
            stream: TcpStream::connect(addr).await.unwrap(),
        }
    }

    async fn send(&mut self, packet_type: PacketType, id: u8, role: u8, payload: &[u8]) {
        send_packet(
            &mut self.stream,
            &Packet::new(packet_type, id, role, payload.to_vec()),
        )
        .await
        .unwrap();
    }

    async fn recv(&mut self) -> (PacketHeader, Vec<u8>) {
        timeout(Duration::from_secs(5), recv_packet(&mut self.stream))
            .await
            .expect("timed out waiting for a packet")
            .expect("transport error")
            .expect("unexpected EOF")
    }

    /// Receive one packet and insist on its type.
    async fn expect(&mut self, packet_type: PacketType) -> (PacketHeader, Vec<u8>) {
        let (header, payload) = self.recv().await;
        assert_eq!(
            header.packet_type, packet_type as u8,
            "expected {:?}, got type {} (payload {:?})",
            packet_type,
            header.packet_type,
            String::from_utf8_lossy(&payload)
        );
        (header, payload)
    }

    /// Drain remaining packets until the server closes the stream.
    async fn read_to_eof(&mut self) {
        loop {
            let next = timeout(Duration::from_secs(5), recv_packet(&mut self.stream))
                .await
                .expect("timed out waiting for EOF");
            match next {
                Ok(Some(_)) => continue,
                Ok(None) => return,
                Err(_) => return,
            }
        }
    }

    async fn login(&mut self, name: &str) {
        self.send(PacketType::Login, 0, 0, name.as_bytes()).await;
        self.expect(PacketType::Ack).await;
    }
}

#[tokio::test]
async fn login_uniqueness() {
    let server = start_server(8).await;
    let mut c1 = Conn::open(server.addr).await;
    let mut c2 = Conn::open(server.addr).await;

    c1.send(PacketType::Login, 0, 0, b"alice").await;
    c1.expect(PacketType::Ack).await;

    c2.send(PacketType::Login, 0, 0, b"alice").await;
    c2.expect(PacketType::Nack).await;

    c2.send(PacketType::Login, 0, 0, b"bob").await;
    c2.expect(PacketType::Ack).await;

    // A second login on an already-logged-in connection is refused too.
    c1.send(PacketType::Login, 0, 0, b"carol").await;
    c1.expect(PacketType::Nack).await;
}

#[tokio::test]
async fn requests_before_login_are_refused() {
    let server = start_server(8).await;
    let mut conn = Conn::open(server.addr).await;

    conn.send(PacketType::Users, 0, 0, b"").await;
    conn.expect(PacketType::Nack).await;
    conn.send(PacketType::Move, 0, 0, b"5X").await;
    conn.expect(PacketType::Nack).await;

    // Login still works afterwards.
    conn.login("alice").await;
}

#[tokio::test]
async fn unknown_packet_types_get_a_nack() {
    let server = start_server(8).await;
    let mut conn = Conn::open(server.addr).await;
    conn.login("alice").await;

    let header = PacketHeader {
        packet_type: 99,
        id: 0,
        role: 0,
        size: 0,
        timestamp_sec: 0,
        timestamp_nsec: 0,
    };
    conn.stream.write_all(&header.encode()).await.unwrap();
    conn.expect(PacketType::Nack).await;

    // A server-to-client type used as a request is just as invalid.
    conn.send(PacketType::Ended, 0, 0, b"").await;
    conn.expect(PacketType::Nack).await;
}

#[tokio::test]
async fn invite_accept_move_win() {
    let server = start_server(8).await;
    let mut alice = Conn::open(server.addr).await;
    let mut bob = Conn::open(server.addr).await;
    alice.login("alice").await;
    bob.login("bob").await;

    // role = 1: bob will play first.
    alice.send(PacketType::Invite, 0, 1, b"bob").await;
    alice.expect(PacketType::Ack).await;
    let (invited, payload) = bob.expect(PacketType::Invited).await;
    assert_eq!(invited.id, 0);
    assert_eq!(invited.role, 1);
    assert_eq!(payload, b"alice");

    // Bob accepts and, playing first, receives the initial board in his ACK.
    bob.send(PacketType::Accept, 0, 0, b"").await;
    let (_, board) = bob.expect(PacketType::Ack).await;
    assert_eq!(board, EMPTY_BOARD);
    let (accepted, payload) = alice.expect(PacketType::Accepted).await;
    assert_eq!(accepted.id, 0);
    assert!(payload.is_empty());

    bob.send(PacketType::Move, 0, 0, b"5X").await;
    bob.expect(PacketType::Ack).await;
    let (moved, payload) = alice.expect(PacketType::Moved).await;
    assert_eq!(moved.id, 0);
    assert_eq!(payload, b"\n | | \n-----\n |X| \n-----\n | | \nO to move\n");

    alice.send(PacketType::Move, 0, 0, b"1O").await;
    alice.expect(PacketType::Ack).await;
    let (_, payload) = bob.expect(PacketType::Moved).await;
    assert_eq!(payload, b"\nO| | \n-----\n |X| \n-----\n | | \nX to move\n");

    bob.send(PacketType::Move, 0, 0, b"4X").await;
    bob.expect(PacketType::Ack).await;
    alice.expect(PacketType::Moved).await;

    alice.send(PacketType::Move, 0, 0, b"2O").await;
    alice.expect(PacketType::Ack).await;
    bob.expect(PacketType::Moved).await;

    // 4-5-6 wins the game for bob.
    bob.send(PacketType::Move, 0, 0, b"6X").await;
    let (ended_bob, _) = bob.expect(PacketType::Ended).await;
    assert_eq!(ended_bob.id, 0);
    assert_eq!(ended_bob.role, 1);
    bob.expect(PacketType::Ack).await;

    let (_, payload) = alice.expect(PacketType::Moved).await;
    assert_eq!(payload, b"\nO|O| \n-----\nX|X|X\n-----\n | | ");
    let (ended_alice, _) = alice.expect(PacketType::Ended).await;
    assert_eq!(ended_alice.id, 0);
    assert_eq!(ended_alice.role, 1);

    // Ratings moved 16 points each way.
    alice.send(PacketType::Users, 0, 0, b"").await;
    let (_, roster) = alice.expect(PacketType::Ack).await;
    assert_eq!(roster, b"alice\t1484\nbob\t1516\n");
}

#[tokio::test]
async fn revoke_round_trip() {
    let server = start_server(8).await;
    let mut alice = Conn::open(server.addr).await;
    let mut bob = Conn::open(server.addr).await;
    alice.login("alice").await;
    bob.login("bob").await;

    alice.send(PacketType::Invite, 0, 1, b"bob").await;
    alice.expect(PacketType::Ack).await;
    let (invited, _) = bob.expect(PacketType::Invited).await;

    alice.send(PacketType::Revoke, 0, 0, b"").await;
    alice.expect(PacketType::Ack).await;
    let (revoked, _) = bob.expect(PacketType::Revoked).await;
    assert_eq!(revoked.id, invited.id);

    // Already gone.
    alice.send(PacketType::Revoke, 0, 0, b"").await;
    alice.expect(PacketType::Nack).await;
}

#[tokio::test]
async fn decline_round_trip() {
    let server = start_server(8).await;
    let mut alice = Conn::open(server.addr).await;
    let mut bob = Conn::open(server.addr).await;
    alice.login("alice").await;
    bob.login("bob").await;

    alice.send(PacketType::Invite, 0, 2, b"bob").await;
    alice.expect(PacketType::Ack).await;
    let (invited, _) = bob.expect(PacketType::Invited).await;
    assert_eq!(invited.role, 2);

    bob.send(PacketType::Decline, invited.id, 0, b"").await;
    bob.expect(PacketType::Ack).await;
    let (declined, _) = alice.expect(PacketType::Declined).await;
    assert_eq!(declined.id, 0);

    // The invitation no longer exists to accept.
    bob.send(PacketType::Accept, invited.id, 0, b"").await;
    bob.expect(PacketType::Nack).await;
}

#[tokio::test]
async fn resign_mid_game() {
    let server = start_server(8).await;
    let mut alice = Conn::open(server.addr).await;
    let mut bob = Conn::open(server.addr).await;
    alice.login("alice").await;
    bob.login("bob").await;

    alice.send(PacketType::Invite, 0, 1, b"bob").await;
    alice.expect(PacketType::Ack).await;
    let (invited, _) = bob.expect(PacketType::Invited).await;
    bob.send(PacketType::Accept, invited.id, 0, b"").await;
    bob.expect(PacketType::Ack).await;
    alice.expect(PacketType::Accepted).await;

    bob.send(PacketType::Move, invited.id, 0, b"5X").await;
    bob.expect(PacketType::Ack).await;
    alice.expect(PacketType::Moved).await;

    alice.send(PacketType::Resign, 0, 0, b"").await;
    let (ended_alice, _) = alice.expect(PacketType::Ended).await;
    assert_eq!(ended_alice.role, 1);
    alice.expect(PacketType::Ack).await;

    let (resigned, _) = bob.expect(PacketType::Resigned).await;
    assert_eq!(resigned.id, invited.id);
    let (ended_bob, _) = bob.expect(PacketType::Ended).await;
    assert_eq!(ended_bob.role, 1);

    alice.send(PacketType::Users, 0, 0, b"").await;
    let (_, roster) = alice.expect(PacketType::Ack).await;
    assert_eq!(roster, b"alice\t1484\nbob\t1516\n");
}

#[tokio::test]
async fn registry_capacity_refuses_extra_connections() {
    let server = start_server(1).await;
    let mut only = Conn::open(server.addr).await;
    only.login("alice").await;

    let mut extra = Conn::open(server.addr).await;
    // The over-capacity connection is closed without any packet.
    extra.read_to_eof().await;

    // The admitted client still works.
    only.send(PacketType::Users, 0, 0, b"").await;
    only.expect(PacketType::Ack).await;
}

#[tokio::test]
async fn graceful_shutdown_drains_all_sessions() {
    let server = start_server(8).await;
    let mut alice = Conn::open(server.addr).await;
    let mut bob = Conn::open(server.addr).await;
    let mut carol = Conn::open(server.addr).await;
    alice.login("alice").await;
    bob.login("bob").await;
    carol.login("carol").await;

    // One game in progress between alice and bob.
    alice.send(PacketType::Invite, 0, 1, b"bob").await;
    alice.expect(PacketType::Ack).await;
    let (invited, _) = bob.expect(PacketType::Invited).await;
    bob.send(PacketType::Accept, invited.id, 0, b"").await;
    bob.expect(PacketType::Ack).await;
    alice.expect(PacketType::Accepted).await;

    server.shutdown.cancel();

    // Every session logs out (closing the game per the rules), drains,
    // and closes; the clients just see the stream end.
    alice.read_to_eof().await;
    bob.read_to_eof().await;
    carol.read_to_eof().await;

    // With the registry empty, the server task itself finishes.
    timeout(Duration::from_secs(5), server.handle)
        .await
        .expect("server did not quiesce")
        .unwrap()
        .unwrap();
}
