//! Message-level framing over a byte transport.

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tds_protocol::{
    DEFAULT_PACKET_SIZE, MAX_NEGOTIATED_PACKET_SIZE, MAX_PACKET_SIZE, MIN_PACKET_SIZE, PacketType,
};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};

use crate::error::CodecError;
use crate::framed::{PacketReader, PacketWriter};
use crate::message::{Message, MessageAssembler, split_message};
use crate::packet_codec::{Packet, TdsCodec};

/// Splits outbound messages into packets and reassembles inbound ones.
///
/// The transport is split into halves so each direction owns its codec.
/// Outbound packets are bounded by the negotiated packet size; inbound
/// packets are accepted up to [`MAX_PACKET_SIZE`] until a size is
/// negotiated.
///
/// ```rust,ignore
/// let mut framer = PacketFramer::new(stream);
/// framer.write_message(PacketType::SqlBatch, batch.encode()).await?;
/// while let Some((payload, eom)) = framer.read_payload().await? {
///     decoder.push(payload, eom);
///     // ...
/// }
/// ```
pub struct PacketFramer<T> {
    reader: PacketReader<ReadHalf<T>>,
    writer: PacketWriter<WriteHalf<T>>,
    assembler: MessageAssembler,
    mid_message: bool,
}

impl<T> PacketFramer<T>
where
    T: AsyncRead + AsyncWrite,
{
    /// Create a framer using the default 4096-byte packet size.
    pub fn new(transport: T) -> Self {
        let (read_half, write_half) = tokio::io::split(transport);
        Self {
            reader: PacketReader::new(read_half, TdsCodec::new()),
            writer: PacketWriter::new(
                write_half,
                TdsCodec::new().with_max_packet_size(DEFAULT_PACKET_SIZE),
            ),
            assembler: MessageAssembler::new(),
            mid_message: false,
        }
    }

    /// Create a framer with the given packet size for both directions.
    pub fn with_packet_size(transport: T, size: usize) -> Self {
        let mut framer = Self::new(transport);
        framer.set_max_packet_size(size);
        framer
    }

    /// Packet size used for outbound messages.
    #[must_use]
    pub fn max_packet_size(&self) -> usize {
        self.writer.codec().max_packet_size()
    }

    /// Packet size limit applied to inbound packets.
    #[must_use]
    pub fn max_read_packet_size(&self) -> usize {
        self.reader.codec().max_packet_size()
    }

    /// Apply a negotiated packet size.
    ///
    /// Outbound packets are clamped to `512..=32767`; inbound packets are
    /// accepted up to `size`, clamped to `512..=65535`.
    pub fn set_max_packet_size(&mut self, size: usize) {
        let write = size.clamp(MIN_PACKET_SIZE, MAX_NEGOTIATED_PACKET_SIZE);
        let read = size.clamp(MIN_PACKET_SIZE, MAX_PACKET_SIZE);
        self.writer.codec_mut().set_max_packet_size(write);
        self.reader.codec_mut().set_max_packet_size(read);
        tracing::debug!(requested = size, write, read, "packet size changed");
    }

    /// Send one message, splitting it into as many packets as needed.
    pub async fn write_message(
        &mut self,
        packet_type: PacketType,
        payload: Bytes,
    ) -> Result<(), CodecError> {
        let payload_len = payload.len();
        let packets = split_message(packet_type, payload, self.max_packet_size());
        let packet_count = packets.len();

        for packet in packets {
            self.writer.feed(packet).await?;
        }
        self.writer.flush().await?;

        tracing::trace!(
            packet_type = ?packet_type,
            payload_len,
            packet_count,
            "sent message"
        );
        Ok(())
    }

    /// Read the next packet.
    ///
    /// Returns `Ok(None)` when the peer closes cleanly between messages. A
    /// close after a packet without `END_OF_MESSAGE` fails with
    /// [`tds_protocol::ProtocolError::UnexpectedEof`].
    pub async fn read_packet(&mut self) -> Result<Option<Packet>, CodecError> {
        match self.reader.next().await {
            Some(Ok(packet)) => {
                self.mid_message = !packet.is_end_of_message();
                Ok(Some(packet))
            }
            Some(Err(e)) => Err(e),
            None if self.mid_message => Err(CodecError::closed_mid_message()),
            None => Ok(None),
        }
    }

    /// Read the next packet's payload and whether it ends the message.
    pub async fn read_payload(&mut self) -> Result<Option<(Bytes, bool)>, CodecError> {
        Ok(self.read_packet().await?.map(|packet| {
            let end_of_message = packet.is_end_of_message();
            (packet.payload, end_of_message)
        }))
    }

    /// Read the next complete message.
    ///
    /// Returns `Ok(None)` when the peer closes cleanly between messages.
    pub async fn read_message(&mut self) -> Result<Option<Message>, CodecError> {
        while let Some(packet) = self.read_packet().await? {
            if let Some(message) = self.assembler.push(packet)? {
                return Ok(Some(message));
            }
        }
        Ok(None)
    }

    /// Whether a message has been partly read.
    #[must_use]
    pub fn is_mid_message(&self) -> bool {
        self.mid_message
    }

    /// Flush and shut down the write half.
    pub async fn shutdown(&mut self) -> Result<(), CodecError> {
        self.writer.close().await
    }
}

impl<T> std::fmt::Debug for PacketFramer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketFramer")
            .field("reader", &self.reader)
            .field("writer", &self.writer)
            .field("mid_message", &self.mid_message)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tds_protocol::ProtocolError;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[tokio::test]
    async fn test_message_over_duplex() {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let mut client = PacketFramer::new(client);
        let mut server = PacketFramer::new(server);

        let payload = Bytes::from(vec![0x5Au8; 10_000]);
        client
            .write_message(PacketType::SqlBatch, payload.clone())
            .await
            .unwrap();

        let message = server.read_message().await.unwrap().unwrap();
        assert_eq!(message.packet_type, PacketType::SqlBatch);
        assert_eq!(message.payload, payload);
    }

    #[tokio::test]
    async fn test_packets_respect_negotiated_size() {
        let (client, mut server) = tokio::io::duplex(64 * 1024);
        let mut client = PacketFramer::with_packet_size(client, 512);

        client
            .write_message(PacketType::SqlBatch, Bytes::from(vec![1u8; 1000]))
            .await
            .unwrap();
        client.shutdown().await.unwrap();

        let mut raw = Vec::new();
        server.read_to_end(&mut raw).await.unwrap();
        // 504 + 496 payload bytes
        assert_eq!(raw.len(), 512 + 504);
        assert_eq!(&raw[..4], &[0x01, 0x00, 0x02, 0x00]);
        assert_eq!(&raw[512..516], &[0x01, 0x01, 0x01, 0xF8]);
        assert_eq!(raw[6], 1);
        assert_eq!(raw[512 + 6], 2);
    }

    #[tokio::test]
    async fn test_clean_close_between_messages() {
        let (client, server) = tokio::io::duplex(1024);
        drop(client);
        let mut server = PacketFramer::new(server);
        assert!(server.read_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_close_mid_message() {
        let (mut client, server) = tokio::io::duplex(1024);
        // one non-final packet, then close
        client
            .write_all(&[0x04, 0x00, 0x00, 0x0A, 0, 0, 1, 0, 0xFD, 0x00])
            .await
            .unwrap();
        drop(client);

        let mut server = PacketFramer::new(server);
        assert!(matches!(
            server.read_message().await,
            Err(CodecError::Protocol(ProtocolError::UnexpectedEof))
        ));
    }

    #[tokio::test]
    async fn test_close_mid_packet() {
        let (mut client, server) = tokio::io::duplex(1024);
        client
            .write_all(&[0x04, 0x01, 0x00, 0x20, 0, 0, 1, 0, 0xFD])
            .await
            .unwrap();
        drop(client);

        let mut server = PacketFramer::new(server);
        assert!(matches!(
            server.read_packet().await,
            Err(CodecError::Protocol(ProtocolError::UnexpectedEof))
        ));
    }

    #[test]
    fn test_packet_size_clamping() {
        let (client, _server) = tokio::io::duplex(1024);
        let mut framer = PacketFramer::new(client);
        assert_eq!(framer.max_packet_size(), DEFAULT_PACKET_SIZE);
        assert_eq!(framer.max_read_packet_size(), MAX_PACKET_SIZE);

        framer.set_max_packet_size(100);
        assert_eq!(framer.max_packet_size(), 512);
        assert_eq!(framer.max_read_packet_size(), 512);

        framer.set_max_packet_size(60_000);
        assert_eq!(framer.max_packet_size(), 32767);
        assert_eq!(framer.max_read_packet_size(), 60_000);
    }
}
