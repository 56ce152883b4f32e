//! Protocol-level error types.

use tds_types::TypeError;
use thiserror::Error;

/// Errors raised while framing, encoding or decoding TDS messages.
///
/// Every variant means the byte stream can no longer be trusted; none of
/// them is locally recoverable.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// The input ended in the middle of a structure.
    #[error("unexpected end of data")]
    UnexpectedEof,

    /// Fewer bytes are buffered than a packet header announces.
    #[error("incomplete packet: expected {expected} bytes, have {actual}")]
    IncompletePacket {
        /// Bytes expected.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },

    /// A packet header declares a length below the header size or above
    /// the negotiated maximum.
    #[error("malformed packet header: length {length} outside 8..={max}")]
    MalformedHeader {
        /// Declared packet length.
        length: usize,
        /// Current maximum packet size.
        max: usize,
    },

    /// Unknown packet type byte.
    #[error("invalid packet type: 0x{0:02X}")]
    InvalidPacketType(u8),

    /// Unknown packet status bits.
    #[error("invalid packet status: 0x{0:02X}")]
    InvalidPacketStatus(u8),

    /// A message arrived with a packet type other than the one expected.
    #[error("unexpected packet type: expected 0x{expected:02X}, got 0x{actual:02X}")]
    UnexpectedPacketType {
        /// Expected packet type byte.
        expected: u8,
        /// Received packet type byte.
        actual: u8,
    },

    /// A token tag this decoder does not implement.
    #[error("unsupported token type: 0x{0:02X}")]
    UnsupportedToken(u8),

    /// A token arrived in a decoder state where it is not allowed.
    #[error("out-of-order token 0x{token:02X} in state {state}")]
    OutOfOrderToken {
        /// Token tag.
        token: u8,
        /// Decoder state at the time.
        state: &'static str,
    },

    /// Column metadata names a data type this decoder does not implement.
    #[error("unsupported data type in column metadata: 0x{0:02X}")]
    UnsupportedDataType(u8),

    /// A row carries a different number of values than its metadata.
    #[error("row has {actual} values but metadata describes {expected} columns")]
    ColumnCountMismatch {
        /// Column count from metadata.
        expected: usize,
        /// Values present.
        actual: usize,
    },

    /// A field holds a value outside its defined domain.
    #[error("invalid value {value} for field {field}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// Offending value.
        value: u32,
    },

    /// Invalid text in a protocol string field.
    #[error("string encoding error: {0}")]
    StringEncoding(String),

    /// A column value inside a row could not be decoded.
    #[error("value decode error: {0}")]
    Type(#[source] TypeError),
}

impl ProtocolError {
    /// Returns true if more input could turn this failure into a success.
    #[must_use]
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::UnexpectedEof | Self::IncompletePacket { .. })
    }
}

impl From<TypeError> for ProtocolError {
    fn from(err: TypeError) -> Self {
        if err.is_incomplete() {
            Self::UnexpectedEof
        } else {
            Self::Type(err)
        }
    }
}
