//! Codec error types.

use std::io;

use tds_protocol::ProtocolError;
use thiserror::Error;

/// Errors raised while framing packets.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The transport failed.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),

    /// The byte stream violated the packet format.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl CodecError {
    /// Returns true if the transport itself failed.
    #[must_use]
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_))
    }

    /// Connection closed in the middle of a packet or message.
    pub(crate) fn closed_mid_message() -> Self {
        Self::Protocol(ProtocolError::UnexpectedEof)
    }
}
