//! # tds-protocol
//!
//! Implementation of the MS-TDS (Tabular Data Stream) protocol messages a
//! SQL client needs: packet headers, the Login7 handshake, SQL batches with
//! ALL_HEADERS, and the response token stream.
//!
//! ## Design Philosophy
//!
//! This crate is IO-agnostic. Encoders are pure functions of their inputs
//! and decoders work over in-memory buffers, so both can be tested against
//! captured byte vectors. `tds-codec` adds packet framing over async
//! transports; `tds-client` drives the session state machine.
//!
//! ## Example
//!
//! ```rust
//! use tds_protocol::{SqlBatch, TokenDecoder};
//!
//! let payload = SqlBatch::new("select 1").with_transaction(0).encode();
//! assert_eq!(&payload[..4], &[22, 0, 0, 0]);
//!
//! let decoder = TokenDecoder::new();
//! assert!(!decoder.is_done());
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod codec;
pub mod decoder;
pub mod error;
pub mod login7;
pub mod packet;
pub mod sql_batch;
pub mod token;
pub mod types;
pub mod version;

pub use decoder::{DecoderState, TokenDecoder};
pub use error::ProtocolError;
pub use login7::{Login7, OptionFlags1, OptionFlags2, OptionFlags3, TypeFlags};
pub use packet::{
    DEFAULT_PACKET_SIZE, MAX_NEGOTIATED_PACKET_SIZE, MAX_PACKET_SIZE, MIN_PACKET_SIZE,
    PACKET_HEADER_SIZE, PacketHeader, PacketStatus, PacketType,
};
pub use sql_batch::{AllHeaders, HeaderType, SqlBatch, StreamHeader};
pub use token::{
    ColMetaData, ColumnData, Done, DoneStatus, EnvChange, EnvChangeType, EnvChangeValue,
    LoginAck, Order, ServerMessage, Token, TokenParser, TokenRow, TokenType,
};
pub use types::{ColumnFlags, TypeId, TypeInfoLayout};
pub use version::TdsVersion;

pub use tds_types::{Collation, TypeInfo};
