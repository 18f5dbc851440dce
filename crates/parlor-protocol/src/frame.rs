//! Async send/recv of whole packets over byte streams.
//!
//! Writers hand [`send_packet`] a [`Packet`]; the frame is assembled in
//! one buffer (header stamped with the current time, then the payload)
//! and written with a single `write_all`, so a frame is never interleaved
//! with another writer's bytes as long as each stream has one writer.
//!
//! Readers call [`recv_packet`], which distinguishes a clean half-close
//! (EOF before the first header byte → `Ok(None)`) from a stream that
//! dies mid-packet (→ [`ProtocolError::Truncated`]).

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::wire::{PacketHeader, PacketType, ProtocolError, HEADER_LEN, MAX_PAYLOAD_LEN};

/// An outbound packet: the header fields the sender controls plus the
/// payload. The size and timestamp fields are filled in at send time.
#[derive(Debug, Clone)]
pub struct Packet {
    pub packet_type: PacketType,
    pub id: u8,
    pub role: u8,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(packet_type: PacketType, id: u8, role: u8, payload: Vec<u8>) -> Self {
        Packet {
            packet_type,
            id,
            role,
            payload,
        }
    }

    /// A header-only packet (no payload, id/role zero).
    pub fn bare(packet_type: PacketType) -> Self {
        Packet::new(packet_type, 0, 0, Vec::new())
    }
}

fn now_timestamp() -> (u32, u32) {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => (d.as_secs() as u32, d.subsec_nanos()),
        Err(_) => (0, 0),
    }
}

/// Frame and write one packet.
pub async fn send_packet<W>(writer: &mut W, packet: &Packet) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    if packet.payload.len() > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::PayloadTooLarge(packet.payload.len()));
    }
    let (sec, nsec) = now_timestamp();
    let header = PacketHeader {
        packet_type: packet.packet_type as u8,
        id: packet.id,
        role: packet.role,
        size: packet.payload.len() as u16,
        timestamp_sec: sec,
        timestamp_nsec: nsec,
    };

    let mut frame = BytesMut::with_capacity(HEADER_LEN + packet.payload.len());
    frame.put_slice(&header.encode());
    frame.put_slice(&packet.payload);

    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one packet, blocking until a whole one is available.
///
/// Returns `Ok(None)` when the peer half-closes cleanly between packets.
/// Short reads are looped until the expected count is reached; EOF after
/// the first header byte, or anywhere inside the payload, is a
/// [`ProtocolError::Truncated`] transport error.
pub async fn recv_packet<R>(reader: &mut R) -> Result<Option<(PacketHeader, Vec<u8>)>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(ProtocolError::Truncated);
        }
        filled += n;
    }
    let header = PacketHeader::decode(&buf);

    let size = header.size as usize;
    if size > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::PayloadTooLarge(size));
    }
    let mut payload = vec![0u8; size];
    if size > 0 {
        reader.read_exact(&mut payload).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                ProtocolError::Truncated
            } else {
                ProtocolError::Io(e)
            }
        })?;
    }
    Ok(Some((header, payload)))
}
