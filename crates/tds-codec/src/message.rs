//! Message splitting and reassembly.
//!
//! A TDS message is one or more packets of the same type; the last one
//! carries `END_OF_MESSAGE`. [`split_message`] cuts an outbound payload into
//! packets and [`MessageAssembler`] joins inbound packets back together.

use bytes::{Bytes, BytesMut};
use tds_protocol::{PACKET_HEADER_SIZE, PacketHeader, PacketStatus, PacketType, ProtocolError};

use crate::packet_codec::Packet;

/// A complete TDS message reassembled from one or more packets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// The packet type of this message.
    pub packet_type: PacketType,
    /// The complete message payload (all packets combined).
    pub payload: Bytes,
}

impl Message {
    /// Get the message payload length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Check if the message is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Split a payload into packets no larger than `max_packet_size`.
///
/// Every packet but the last carries `max_packet_size - 8` payload bytes.
/// An empty payload still yields one header-only packet so the peer sees
/// an end of message. Lengths and sequence numbers are filled in by the
/// encoder.
#[must_use]
pub fn split_message(packet_type: PacketType, payload: Bytes, max_packet_size: usize) -> Vec<Packet> {
    let chunk_size = max_packet_size.saturating_sub(PACKET_HEADER_SIZE).max(1);
    let mut packets = Vec::with_capacity(payload.len().div_ceil(chunk_size).max(1));
    let mut remaining = payload;

    loop {
        let chunk = remaining.split_to(remaining.len().min(chunk_size));
        let status = if remaining.is_empty() {
            PacketStatus::END_OF_MESSAGE
        } else {
            PacketStatus::NORMAL
        };
        packets.push(Packet::new(PacketHeader::new(packet_type, status, 0), chunk));
        if remaining.is_empty() {
            return packets;
        }
    }
}

/// Reassembles multiple TDS packets into complete messages.
#[derive(Debug, Default)]
pub struct MessageAssembler {
    buffer: BytesMut,
    packet_type: Option<PacketType>,
    packet_count: usize,
}

impl MessageAssembler {
    /// Create a new message assembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a packet into the assembler.
    ///
    /// Returns `Some(Message)` if this packet completes a message and
    /// `None` if more packets are needed. A packet whose type differs from
    /// the first packet of the message is rejected.
    pub fn push(&mut self, packet: Packet) -> Result<Option<Message>, ProtocolError> {
        let packet_type = *self
            .packet_type
            .get_or_insert(packet.header.packet_type);
        if packet.header.packet_type != packet_type {
            return Err(ProtocolError::UnexpectedPacketType {
                expected: packet_type as u8,
                actual: packet.header.packet_type as u8,
            });
        }

        self.buffer.extend_from_slice(&packet.payload);
        self.packet_count += 1;

        tracing::trace!(
            packet_type = ?packet_type,
            packet_count = self.packet_count,
            buffer_len = self.buffer.len(),
            is_eom = packet.is_end_of_message(),
            "assembling message"
        );

        if !packet.is_end_of_message() {
            return Ok(None);
        }

        self.packet_type = None;
        self.packet_count = 0;
        Ok(Some(Message {
            packet_type,
            payload: self.buffer.split().freeze(),
        }))
    }

    /// Check if the assembler has partial data buffered.
    #[must_use]
    pub fn has_partial(&self) -> bool {
        self.packet_type.is_some()
    }

    /// Get the number of packets accumulated so far.
    #[must_use]
    pub fn packet_count(&self) -> usize {
        self.packet_count
    }

    /// Clear any partial message data.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.packet_type = None;
        self.packet_count = 0;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn make_packet(packet_type: PacketType, is_eom: bool, payload: &'static [u8]) -> Packet {
        let status = if is_eom {
            PacketStatus::END_OF_MESSAGE
        } else {
            PacketStatus::NORMAL
        };
        Packet::new(
            PacketHeader::new(packet_type, status, 0),
            Bytes::from_static(payload),
        )
    }

    #[test]
    fn test_single_packet_message() {
        let mut assembler = MessageAssembler::new();
        let message = assembler
            .push(make_packet(PacketType::TabularResult, true, b"hello"))
            .unwrap()
            .unwrap();
        assert_eq!(message.packet_type, PacketType::TabularResult);
        assert_eq!(&message.payload[..], b"hello");
        assert!(!assembler.has_partial());
    }

    #[test]
    fn test_multi_packet_message() {
        let mut assembler = MessageAssembler::new();

        assert!(assembler
            .push(make_packet(PacketType::TabularResult, false, b"hello "))
            .unwrap()
            .is_none());
        assert!(assembler.has_partial());
        assert!(assembler
            .push(make_packet(PacketType::TabularResult, false, b"world"))
            .unwrap()
            .is_none());
        assert_eq!(assembler.packet_count(), 2);

        let message = assembler
            .push(make_packet(PacketType::TabularResult, true, b"!"))
            .unwrap()
            .unwrap();
        assert_eq!(&message.payload[..], b"hello world!");
        assert!(!assembler.has_partial());
        assert_eq!(assembler.packet_count(), 0);
    }

    #[test]
    fn test_mixed_types_rejected() {
        let mut assembler = MessageAssembler::new();
        assembler
            .push(make_packet(PacketType::TabularResult, false, b"a"))
            .unwrap();
        assert!(matches!(
            assembler.push(make_packet(PacketType::SqlBatch, true, b"b")),
            Err(ProtocolError::UnexpectedPacketType {
                expected: 0x04,
                actual: 0x01
            })
        ));
    }

    #[test]
    fn test_clear() {
        let mut assembler = MessageAssembler::new();
        assembler
            .push(make_packet(PacketType::TabularResult, false, b"partial"))
            .unwrap();
        assembler.clear();
        assert!(!assembler.has_partial());
    }

    #[test]
    fn test_split_exact_multiple() {
        let packets = split_message(PacketType::SqlBatch, Bytes::from(vec![7u8; 1008]), 512);
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].payload.len(), 504);
        assert!(!packets[0].is_end_of_message());
        assert!(packets[1].is_end_of_message());
    }

    #[test]
    fn test_split_empty_payload() {
        let packets = split_message(PacketType::SqlBatch, Bytes::new(), 4096);
        assert_eq!(packets.len(), 1);
        assert!(packets[0].payload.is_empty());
        assert!(packets[0].is_end_of_message());
    }
}
