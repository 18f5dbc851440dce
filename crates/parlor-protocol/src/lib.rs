//! parlor-protocol
//!
//! Wire-level framing for the game server's binary TCP protocol.
//!
//! Every packet is a fixed 16-byte header, multi-byte fields in network
//! byte order, followed by an optional payload of exactly `size` bytes.
//!
//! - [`wire`]  : header layout, packet type codes, limits
//! - [`frame`] : async send/recv of whole packets over byte streams

pub mod frame;
pub mod wire;

pub use frame::{recv_packet, send_packet, Packet};
pub use wire::{PacketHeader, PacketType, ProtocolError, HEADER_LEN, MAX_PAYLOAD_LEN};
