//! Wire codec for the fixed 12-octet header plus payload.
//!
//! Layout (multi-byte fields little-endian):
//!
//! | offset | bytes | content |
//! |--------|-------|---------|
//! | 0      | 1     | checksum over octets 1..11 |
//! | 1      | 1     | low nibble version, high nibble message type |
//! | 2      | 2     | low 4 bits channel, high 12 bits payload length |
//! | 4      | 4     | id |
//! | 8      | 4     | timestamp (low 32 bits of the sender's µs clock) |

use crate::consts::{MAX_PAYLOAD_LENGTH, PACKET_HEADER_LENGTH, PROTOCOL_VERSION};
use bytes::Bytes;
use garnet_binary::{BinaryError, BinaryReader, BinaryWriter, Writable};
use thiserror::Error;

/// Message type nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketKind {
    Data = 0,
    Ack = 1,
    Reset = 2,
    AckReset = 3,
    Ping = 4,
    AckPing = 5,
}

impl PacketKind {
    pub fn from_u4(value: u8) -> Option<Self> {
        match value {
            0 => Some(PacketKind::Data),
            1 => Some(PacketKind::Ack),
            2 => Some(PacketKind::Reset),
            3 => Some(PacketKind::AckReset),
            4 => Some(PacketKind::Ping),
            5 => Some(PacketKind::AckPing),
            _ => None,
        }
    }

    /// DATA, PING and ACK_PING may carry payload; the rest are header-only.
    pub fn has_payload(self) -> bool {
        matches!(
            self,
            PacketKind::Data | PacketKind::Ping | PacketKind::AckPing
        )
    }
}

/// Parsed header fields. The checksum is not a field; it is computed over
/// the serialised octets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub kind: PacketKind,
    pub channel: u8,
    pub payload_length: u16,
    pub id: u32,
    pub timestamp: u32,
}

impl Writable for Header {
    fn write(&self, writer: &mut BinaryWriter) -> Result<(), BinaryError> {
        writer.write_u8(PROTOCOL_VERSION | (self.kind as u8) << 4)?;
        writer.write_u16_le((self.channel as u16 & 0x000f) | self.payload_length << 4)?;
        writer.write_u32_le(self.id)?;
        writer.write_u32_le(self.timestamp)
    }
}

/// Why an ingress buffer was rejected as not a protocol packet.
#[derive(Error, Debug)]
pub enum PacketError {
    #[error("{0} bytes is shorter than the {PACKET_HEADER_LENGTH} byte header")]
    TooShort(usize),
    #[error("packet of {packet} bytes does not match header payload length {payload}")]
    LengthMismatch { packet: usize, payload: u16 },
    #[error("header checksum mismatch")]
    Checksum,
    #[error("unsupported protocol version {0}")]
    Version(u8),
    #[error("unknown message type {0}")]
    Kind(u8),
    #[error("truncated header: {0}")]
    Truncated(#[from] BinaryError),
}

/// Sum modulo 256 of header octets 1..11. A framing tripwire against
/// corruption, not an authenticator.
pub fn checksum(packet: &[u8]) -> u8 {
    packet[1..PACKET_HEADER_LENGTH]
        .iter()
        .fold(0u8, |sum, byte| sum.wrapping_add(*byte))
}

fn build(header: Header, payload: &[u8]) -> Result<Bytes, BinaryError> {
    debug_assert!(payload.len() <= MAX_PAYLOAD_LENGTH);
    debug_assert_eq!(payload.len(), header.payload_length as usize);

    let mut writer = BinaryWriter::with_capacity(PACKET_HEADER_LENGTH + payload.len());
    writer.write_u8(0)?;
    header.write(&mut writer)?;
    writer.write_bytes(payload)?;

    let mut packet = writer.into_inner();
    packet[0] = checksum(&packet);
    Ok(packet.freeze())
}

/// Builds a DATA packet carrying `payload`.
pub fn build_data(
    id: u32,
    channel: u8,
    payload: &[u8],
    timestamp: u32,
) -> Result<Bytes, BinaryError> {
    build(
        Header {
            kind: PacketKind::Data,
            channel,
            payload_length: payload.len() as u16,
            id,
            timestamp,
        },
        payload,
    )
}

/// Builds a PING packet; the payload is opaque and echoed by the reply.
pub fn build_ping(
    id: u32,
    channel: u8,
    payload: &[u8],
    timestamp: u32,
) -> Result<Bytes, BinaryError> {
    build(
        Header {
            kind: PacketKind::Ping,
            channel,
            payload_length: payload.len() as u16,
            id,
            timestamp,
        },
        payload,
    )
}

/// Builds a header-only RESET packet.
pub fn build_reset(id: u32, channel: u8, timestamp: u32) -> Result<Bytes, BinaryError> {
    build(
        Header {
            kind: PacketKind::Reset,
            channel,
            payload_length: 0,
            id,
            timestamp,
        },
        &[],
    )
}

/// Builds the ACK for a DATA packet, echoing its id and timestamp.
pub fn build_ack(original: &PacketView) -> Result<Bytes, BinaryError> {
    build(
        Header {
            kind: PacketKind::Ack,
            channel: original.channel(),
            payload_length: 0,
            id: original.id(),
            timestamp: original.timestamp(),
        },
        &[],
    )
}

/// Builds the ACK for a RESET packet, echoing its id and timestamp.
pub fn build_ack_reset(original: &PacketView) -> Result<Bytes, BinaryError> {
    build(
        Header {
            kind: PacketKind::AckReset,
            channel: original.channel(),
            payload_length: 0,
            id: original.id(),
            timestamp: original.timestamp(),
        },
        &[],
    )
}

/// Builds the ACK for a PING packet, echoing id, timestamp and payload.
pub fn build_ack_ping(original: &PacketView) -> Result<Bytes, BinaryError> {
    build(
        Header {
            kind: PacketKind::AckPing,
            channel: original.channel(),
            payload_length: original.payload_length(),
            id: original.id(),
            timestamp: original.timestamp(),
        },
        &original.payload(),
    )
}

/// A validated packet: the on-wire bytes plus their parsed header.
///
/// `check` is the only constructor, so holding a `PacketView` proves the
/// buffer passed length, version, type and checksum validation. Cloning
/// shares the underlying buffer.
#[derive(Debug, Clone)]
pub struct PacketView {
    packet: Bytes,
    header: Header,
}

impl PacketView {
    /// Validates a received buffer. No payload copy is made; the view keeps
    /// a reference into `packet`.
    pub fn check(packet: Bytes) -> Result<Self, PacketError> {
        if packet.len() < PACKET_HEADER_LENGTH {
            return Err(PacketError::TooShort(packet.len()));
        }

        let mut reader = BinaryReader::new(packet.clone());
        let claimed = reader.read_u8()?;
        let version_kind = reader.read_u8()?;
        let channel_length = reader.read_u16_le()?;
        let id = reader.read_u32_le()?;
        let timestamp = reader.read_u32_le()?;

        let version = version_kind & 0x0f;
        if version != PROTOCOL_VERSION {
            return Err(PacketError::Version(version));
        }
        let kind =
            PacketKind::from_u4(version_kind >> 4).ok_or(PacketError::Kind(version_kind >> 4))?;
        let payload_length = channel_length >> 4;
        if packet.len() != PACKET_HEADER_LENGTH + payload_length as usize {
            return Err(PacketError::LengthMismatch {
                packet: packet.len(),
                payload: payload_length,
            });
        }
        if claimed != checksum(&packet) {
            return Err(PacketError::Checksum);
        }

        Ok(Self {
            packet,
            header: Header {
                kind,
                channel: (channel_length & 0x000f) as u8,
                payload_length,
                id,
                timestamp,
            },
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn kind(&self) -> PacketKind {
        self.header.kind
    }

    pub fn id(&self) -> u32 {
        self.header.id
    }

    pub fn channel(&self) -> u8 {
        self.header.channel
    }

    pub fn timestamp(&self) -> u32 {
        self.header.timestamp
    }

    pub fn payload_length(&self) -> u16 {
        self.header.payload_length
    }

    pub fn packet_length(&self) -> usize {
        self.packet.len()
    }

    /// The payload, sharing the packet buffer.
    pub fn payload(&self) -> Bytes {
        self.packet.slice(PACKET_HEADER_LENGTH..)
    }

    /// The full on-wire bytes.
    pub fn as_bytes(&self) -> &Bytes {
        &self.packet
    }

    /// One-line header rendering for trace logs.
    pub fn dump_header(&self) -> String {
        format!(
            "{:?} id={} ch={} len={} ts={} [{}]",
            self.header.kind,
            self.header.id,
            self.header.channel,
            self.header.payload_length,
            self.header.timestamp,
            hex::encode(&self.packet[..PACKET_HEADER_LENGTH])
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn data_packet_byte_layout() {
        let packet = build_data(0x0102_0304, 3, &[0xaa, 0xbb], 0x0a0b_0c0d).unwrap();

        // channel 3, payload length 2 -> u16 0x0023 LE
        let mut expected = vec![
            0x00, // checksum, patched below
            0x02, // version 2, type DATA
            0x23, 0x00, // channel | length << 4
            0x04, 0x03, 0x02, 0x01, // id LE
            0x0d, 0x0c, 0x0b, 0x0a, // timestamp LE
            0xaa, 0xbb,
        ];
        expected[0] = checksum(&expected);
        assert_eq!(&packet[..], &expected[..]);
    }

    #[test]
    fn build_check_identity() {
        let payload = b"payload bytes";
        let packet = build_data(77, 5, payload, 123_456).unwrap();
        let view = PacketView::check(packet.clone()).unwrap();

        assert_eq!(view.kind(), PacketKind::Data);
        assert_eq!(view.id(), 77);
        assert_eq!(view.channel(), 5);
        assert_eq!(view.timestamp(), 123_456);
        assert_eq!(view.payload_length() as usize, payload.len());
        assert_eq!(&view.payload()[..], payload);
        assert_eq!(view.as_bytes(), &packet);
    }

    #[test]
    fn every_header_bit_flip_is_rejected() {
        let packet = build_data(42, 1, b"x", 99).unwrap();
        assert!(PacketView::check(packet.clone()).is_ok());

        for bit in 0..PACKET_HEADER_LENGTH * 8 {
            let mut corrupt = BytesMut::from(&packet[..]);
            corrupt[bit / 8] ^= 1 << (bit % 8);
            assert!(
                PacketView::check(corrupt.freeze()).is_err(),
                "flip of header bit {bit} was accepted"
            );
        }
    }

    #[test]
    fn zero_length_payload_is_valid() {
        let packet = build_data(0, 0, &[], 0).unwrap();
        let view = PacketView::check(packet).unwrap();
        assert_eq!(view.payload_length(), 0);
        assert!(view.payload().is_empty());
    }

    #[test]
    fn maximum_payload_is_valid() {
        let payload = vec![0x55u8; MAX_PAYLOAD_LENGTH];
        let packet = build_data(1, 2, &payload, 3).unwrap();
        let view = PacketView::check(packet).unwrap();
        assert_eq!(view.payload_length() as usize, MAX_PAYLOAD_LENGTH);
    }

    #[test]
    fn length_overflow_is_rejected() {
        // A buffer one byte longer than the header claims.
        let mut oversized = BytesMut::from(&build_data(1, 2, b"ab", 3).unwrap()[..]);
        oversized.extend_from_slice(&[0x00]);
        let err = PacketView::check(oversized.freeze()).unwrap_err();
        assert!(matches!(err, PacketError::LengthMismatch { .. }));
    }

    #[test]
    fn short_buffer_is_rejected() {
        let err = PacketView::check(Bytes::from_static(&[1, 2, 3])).unwrap_err();
        assert!(matches!(err, PacketError::TooShort(3)));
    }

    #[test]
    fn wrong_version_is_rejected() {
        let mut packet = BytesMut::from(&build_data(1, 0, &[], 0).unwrap()[..]);
        packet[1] = (packet[1] & 0xf0) | 0x01; // version 1
        packet[0] = checksum(&packet);
        let err = PacketView::check(packet.freeze()).unwrap_err();
        assert!(matches!(err, PacketError::Version(1)));
    }

    #[test]
    fn unknown_message_type_is_rejected() {
        let mut packet = BytesMut::from(&build_data(1, 0, &[], 0).unwrap()[..]);
        packet[1] = (packet[1] & 0x0f) | 0x70; // type 7
        packet[0] = checksum(&packet);
        let err = PacketView::check(packet.freeze()).unwrap_err();
        assert!(matches!(err, PacketError::Kind(7)));
    }

    #[test]
    fn ack_echoes_id_and_timestamp() {
        let data = build_data(9, 4, b"hi", 0xdead_0000).unwrap();
        let view = PacketView::check(data).unwrap();
        let ack = PacketView::check(build_ack(&view).unwrap()).unwrap();

        assert_eq!(ack.kind(), PacketKind::Ack);
        assert_eq!(ack.id(), 9);
        assert_eq!(ack.channel(), 4);
        assert_eq!(ack.timestamp(), 0xdead_0000);
        assert_eq!(ack.payload_length(), 0);
    }

    #[test]
    fn ack_ping_copies_payload() {
        let ping = build_ping(11, 2, b"PING", 5).unwrap();
        let view = PacketView::check(ping).unwrap();
        let ack = PacketView::check(build_ack_ping(&view).unwrap()).unwrap();

        assert_eq!(ack.kind(), PacketKind::AckPing);
        assert_eq!(ack.id(), 11);
        assert_eq!(&ack.payload()[..], b"PING");
    }

    #[test]
    fn reset_is_header_only() {
        let reset = PacketView::check(build_reset(1000, 7, 42).unwrap()).unwrap();
        assert_eq!(reset.kind(), PacketKind::Reset);
        assert_eq!(reset.packet_length(), PACKET_HEADER_LENGTH);
    }
}
