//! Value codec error types.

use thiserror::Error;

/// Errors raised while encoding, decoding or converting a column value.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TypeError {
    /// The wire type code is not implemented by this codec.
    #[error("unsupported TDS data type 0x{0:02X}")]
    UnsupportedType(u8),

    /// Value is null when non-null was expected.
    #[error("unexpected null value")]
    UnexpectedNull,

    /// Type mismatch during conversion.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Expected type name.
        expected: &'static str,
        /// Actual type name.
        actual: String,
    },

    /// Value is out of range for target type.
    #[error("value out of range for {target_type}")]
    OutOfRange {
        /// Target type name.
        target_type: &'static str,
    },

    /// Invalid encoding in string data.
    #[error("invalid string encoding: {0}")]
    InvalidEncoding(String),

    /// A length or layout inside a value body is inconsistent with its type.
    #[error("invalid binary data: {0}")]
    InvalidBinary(String),

    /// Invalid date/time value.
    #[error("invalid date/time: {0}")]
    InvalidDateTime(String),

    /// Invalid decimal value.
    #[error("invalid decimal: {0}")]
    InvalidDecimal(String),

    /// Invalid UUID value.
    #[error("invalid UUID: {0}")]
    InvalidUuid(String),

    /// The buffer ended before the value did.
    #[error("buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall {
        /// Bytes needed.
        needed: usize,
        /// Bytes available.
        available: usize,
    },
}

impl TypeError {
    /// Returns true if the error only means the input was cut short.
    ///
    /// Streaming callers use this to tell "wait for more bytes" apart from
    /// a value that can never be decoded.
    #[must_use]
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::BufferTooSmall { .. })
    }
}
