//! Header layout, packet type codes, and protocol limits.
//!
//! Wire header (16 bytes, network byte order):
//!
//! ```text
//! [0]      type            (u8)
//! [1]      id              (u8)  invitation id, 0 when unused
//! [2]      role            (u8)  0 = none, 1 = first, 2 = second
//! [3]      reserved        (u8)  0 on send, ignored on receive
//! [4..6]   size            (u16 BE) payload length in bytes
//! [6..8]   padding         0 on send, ignored on receive
//! [8..12]  timestamp_sec   (u32 BE) filled by the sender at send time
//! [12..16] timestamp_nsec  (u32 BE)
//! ```
//!
//! The encode/decode here is pure byte work; the async send/recv loops
//! live in [`crate::frame`].

use std::fmt;
use std::io;

/// Size of the fixed packet header.
pub const HEADER_LEN: usize = 16;

/// Upper bound on a single packet's payload. A header announcing more
/// than this is treated as a transport error and kills the session.
pub const MAX_PAYLOAD_LEN: usize = 4096;

/// Packet type codes. `1..=8` flow client → server, `9..=17` server →
/// client; `0` is reserved and never valid on the wire.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PacketType {
    /// Log in under a username (payload = username).
    Login = 1,
    /// Ask for the roster of logged-in users.
    Users = 2,
    /// Invite a user to a match (payload = target username, role field
    /// selects the role offered to the target).
    Invite = 3,
    /// Withdraw an invitation this client made (id field).
    Revoke = 4,
    /// Accept an invitation made to this client (id field).
    Accept = 5,
    /// Decline an invitation made to this client (id field).
    Decline = 6,
    /// Make a move in a game (id field, payload = move text).
    Move = 7,
    /// Resign a game (id field).
    Resign = 8,

    /// Positive acknowledgment, optional payload.
    Ack = 9,
    /// Negative acknowledgment.
    Nack = 10,
    /// Notification: someone invited you (payload = inviter name).
    Invited = 11,
    /// Notification: an invitation to you was withdrawn.
    Revoked = 12,
    /// Notification: your invitation was accepted (payload = initial
    /// board iff you play first).
    Accepted = 13,
    /// Notification: your invitation was declined.
    Declined = 14,
    /// Notification: your opponent moved (payload = rendered board).
    Moved = 15,
    /// Notification: your opponent resigned.
    Resigned = 16,
    /// Notification: a game ended (role field = winner code, 0 = draw).
    Ended = 17,
}

impl PacketType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(PacketType::Login),
            2 => Some(PacketType::Users),
            3 => Some(PacketType::Invite),
            4 => Some(PacketType::Revoke),
            5 => Some(PacketType::Accept),
            6 => Some(PacketType::Decline),
            7 => Some(PacketType::Move),
            8 => Some(PacketType::Resign),
            9 => Some(PacketType::Ack),
            10 => Some(PacketType::Nack),
            11 => Some(PacketType::Invited),
            12 => Some(PacketType::Revoked),
            13 => Some(PacketType::Accepted),
            14 => Some(PacketType::Declined),
            15 => Some(PacketType::Moved),
            16 => Some(PacketType::Resigned),
            17 => Some(PacketType::Ended),
            _ => None,
        }
    }
}

/// Decoded packet header. The `packet_type` is kept as a raw byte so a
/// frame with an unknown type can still be read whole (and NACKed) by
/// the session instead of desynchronizing the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub packet_type: u8,
    pub id: u8,
    pub role: u8,
    pub size: u16,
    pub timestamp_sec: u32,
    pub timestamp_nsec: u32,
}

impl PacketHeader {
    /// Serialize into the 16-byte wire form.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0] = self.packet_type;
        buf[1] = self.id;
        buf[2] = self.role;
        // buf[3] reserved, left zero
        buf[4..6].copy_from_slice(&self.size.to_be_bytes());
        // buf[6..8] padding, left zero
        buf[8..12].copy_from_slice(&self.timestamp_sec.to_be_bytes());
        buf[12..16].copy_from_slice(&self.timestamp_nsec.to_be_bytes());
        buf
    }

    /// Deserialize from the 16-byte wire form. Byte-swapping happens
    /// here, on the buffer that was actually read; never before a read.
    pub fn decode(buf: &[u8; HEADER_LEN]) -> Self {
        PacketHeader {
            packet_type: buf[0],
            id: buf[1],
            role: buf[2],
            size: u16::from_be_bytes([buf[4], buf[5]]),
            timestamp_sec: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
            timestamp_nsec: u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]),
        }
    }
}

/// Errors surfaced by the framing layer. All of them terminate the
/// session that hit them.
#[derive(Debug)]
pub enum ProtocolError {
    /// Socket I/O failed.
    Io(io::Error),
    /// The peer closed the stream in the middle of a packet.
    Truncated,
    /// A header announced a payload larger than [`MAX_PAYLOAD_LEN`].
    PayloadTooLarge(usize),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::Io(e) => write!(f, "socket I/O error: {}", e),
            ProtocolError::Truncated => write!(f, "stream closed mid-packet"),
            ProtocolError::PayloadTooLarge(n) => {
                write!(f, "payload of {} bytes exceeds limit of {}", n, MAX_PAYLOAD_LEN)
            }
        }
    }
}

impl std::error::Error for ProtocolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProtocolError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ProtocolError {
    fn from(e: io::Error) -> Self {
        ProtocolError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips_all_fields() {
        let hdr = PacketHeader {
            packet_type: PacketType::Moved as u8,
            id: 7,
            role: 2,
            size: 0x0102,
            timestamp_sec: 0xDEAD_BEEF,
            timestamp_nsec: 0x0102_0304,
        };
        let buf = hdr.encode();
        assert_eq!(PacketHeader::decode(&buf), hdr);
    }

    #[test]
    fn multi_byte_fields_are_big_endian() {
        let hdr = PacketHeader {
            packet_type: 1,
            id: 0,
            role: 0,
            size: 0x0102,
            timestamp_sec: 0x0A0B_0C0D,
            timestamp_nsec: 0,
        };
        let buf = hdr.encode();
        assert_eq!(&buf[4..6], &[0x01, 0x02]);
        assert_eq!(&buf[8..12], &[0x0A, 0x0B, 0x0C, 0x0D]);
    }

    #[test]
    fn reserved_byte_is_ignored_on_decode() {
        let hdr = PacketHeader {
            packet_type: 1,
            id: 0,
            role: 0,
            size: 0,
            timestamp_sec: 0,
            timestamp_nsec: 0,
        };
        let mut buf = hdr.encode();
        buf[3] = 0xFF;
        assert_eq!(PacketHeader::decode(&buf), hdr);
    }

    #[test]
    fn every_type_code_survives_from_u8() {
        for code in 1..=17u8 {
            let ty = PacketType::from_u8(code).expect("valid code");
            assert_eq!(ty as u8, code);
        }
        assert_eq!(PacketType::from_u8(0), None);
        assert_eq!(PacketType::from_u8(18), None);
    }
}
