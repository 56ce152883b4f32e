//! # tds-codec
//!
//! Async framing of TDS messages over any ordered byte stream.
//!
//! A TDS message travels as one or more packets, each with an 8-byte
//! header; the last packet carries the `END_OF_MESSAGE` status bit. This
//! crate splits outbound messages into packets no larger than the
//! negotiated size and reassembles inbound packets, validating each header
//! on the way.
//!
//! The transport is anything implementing [`tokio::io::AsyncRead`] and
//! [`tokio::io::AsyncWrite`]: a TCP stream, a TLS stream, or an in-memory
//! duplex pipe in tests.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod framed;
pub mod framer;
pub mod message;
pub mod packet_codec;

pub use error::CodecError;
pub use framed::{PacketReader, PacketWriter};
pub use framer::PacketFramer;
pub use message::{Message, MessageAssembler, split_message};
pub use packet_codec::{Packet, TdsCodec};
