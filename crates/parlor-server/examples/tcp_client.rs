//! Interactive line-driven client for poking at the server.
//!
//! ```bash
//! # Run the server
//! cargo run -p parlor-server -- -p 4242
//!
//! # In another terminal
//! PARLOR_CLIENT_ADDR=127.0.0.1:4242 cargo run -p parlor-server --example tcp_client
//! ```
//!
//! Commands:
//!   login <name>
//!   users
//!   invite <name> <1|2>      (role offered to the target; 1 moves first)
//!   revoke <id>
//!   decline <id>
//!   accept <id>
//!   move <id> <text>         (e.g. "move 0 5X")
//!   resign <id>
//!   quit

use std::env;
use std::error::Error;
use std::io::{self, BufRead, Write};

use parlor_protocol::{recv_packet, send_packet, Packet, PacketType};
use tokio::net::TcpStream;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let addr = env::var("PARLOR_CLIENT_ADDR").unwrap_or_else(|_| "127.0.0.1:4242".to_string());

    println!("Connecting to {}...", addr);
    let stream = TcpStream::connect(&addr).await?;
    println!("Connected. Type 'quit' to leave.\n");

    let (mut reader, mut writer) = stream.into_split();

    // Print every server packet as it arrives.
    tokio::spawn(async move {
        loop {
            match recv_packet(&mut reader).await {
                Ok(Some((header, payload))) => {
                    let kind = PacketType::from_u8(header.packet_type)
                        .map(|t| format!("{:?}", t))
                        .unwrap_or_else(|| format!("type {}", header.packet_type));
                    if payload.is_empty() {
                        println!("<< {} id={} role={}", kind, header.id, header.role);
                    } else {
                        println!(
                            "<< {} id={} role={}\n{}",
                            kind,
                            header.id,
                            header.role,
                            String::from_utf8_lossy(&payload)
                        );
                    }
                }
                Ok(None) => {
                    println!("<< server closed the connection");
                    break;
                }
                Err(e) => {
                    eprintln!("<< read error: {}", e);
                    break;
                }
            }
        }
    });

    let stdin = io::stdin();
    print!(">> ");
    io::stdout().flush()?;
    for line in stdin.lock().lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.eq_ignore_ascii_case("quit") || trimmed.eq_ignore_ascii_case("exit") {
            break;
        }
        if !trimmed.is_empty() {
            match parse_command(trimmed) {
                Some(packet) => send_packet(&mut writer, &packet).await?,
                None => eprintln!("could not parse command; see the comment atop this file"),
            }
        }
        print!(">> ");
        io::stdout().flush()?;
    }
    Ok(())
}

fn parse_command(line: &str) -> Option<Packet> {
    let mut words = line.split_whitespace();
    let verb = words.next()?.to_ascii_lowercase();
    match verb.as_str() {
        "login" => Some(Packet::new(
            PacketType::Login,
            0,
            0,
            words.next()?.as_bytes().to_vec(),
        )),
        "users" => Some(Packet::bare(PacketType::Users)),
        "invite" => {
            let name = words.next()?;
            let role: u8 = words.next()?.parse().ok()?;
            Some(Packet::new(
                PacketType::Invite,
                0,
                role,
                name.as_bytes().to_vec(),
            ))
        }
        "revoke" => Some(Packet::new(
            PacketType::Revoke,
            words.next()?.parse().ok()?,
            0,
            Vec::new(),
        )),
        "decline" => Some(Packet::new(
            PacketType::Decline,
            words.next()?.parse().ok()?,
            0,
            Vec::new(),
        )),
        "accept" => Some(Packet::new(
            PacketType::Accept,
            words.next()?.parse().ok()?,
            0,
            Vec::new(),
        )),
        "move" => {
            let id = words.next()?.parse().ok()?;
            let text = words.next()?;
            Some(Packet::new(PacketType::Move, id, 0, text.as_bytes().to_vec()))
        }
        "resign" => Some(Packet::new(
            PacketType::Resign,
            words.next()?.parse().ok()?,
            0,
            Vec::new(),
        )),
        _ => None,
    }
}
