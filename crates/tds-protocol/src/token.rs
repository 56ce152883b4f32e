//! TDS token stream definitions.
//!
//! Tokens are the units of a TDS response. Each begins with a one-byte tag
//! followed by a body whose layout depends on the tag: fixed-size for DONE,
//! length-prefixed for ERROR/INFO/ENVCHANGE/LOGINACK, and driven by the
//! preceding COLMETADATA for rows.
//!
//! Only the tags listed in [`TokenType`] are understood. Any other tag is a
//! hard failure, since the body length of an unknown token cannot be
//! inferred.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tds_protocol::token::{Token, TokenParser};
//!
//! let mut parser = TokenParser::new(payload);
//! while let Some(token) = parser.next_token(None)? {
//!     if let Token::Done(done) = token {
//!         println!("rows: {:?}", done.row_count);
//!     }
//! }
//! ```

use std::sync::Arc;

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tds_types::{Collation, SqlValue, TypeInfo, decode_value, encode_value};

use crate::codec::{read_b_varchar, read_us_varchar, write_b_varchar, write_us_varchar};
use crate::error::ProtocolError;
use crate::types::{ColumnFlags, TypeId, TypeInfoLayout};
use crate::version::TdsVersion;

/// Token type identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TokenType {
    /// Column metadata (COLMETADATA).
    ColMetaData = 0x81,
    /// Error message (ERROR).
    Error = 0xAA,
    /// Informational message (INFO).
    Info = 0xAB,
    /// Login acknowledgment (LOGINACK).
    LoginAck = 0xAD,
    /// Row data (ROW).
    Row = 0xD1,
    /// Null bitmap compressed row (NBCROW).
    NbcRow = 0xD2,
    /// Environment change (ENVCHANGE).
    EnvChange = 0xE3,
    /// Done (DONE).
    Done = 0xFD,
    /// Done procedure (DONEPROC).
    DoneProc = 0xFE,
    /// Done in procedure (DONEINPROC).
    DoneInProc = 0xFF,
    /// Return status (RETURNSTATUS).
    ReturnStatus = 0x79,
    /// Order (ORDER).
    Order = 0xA9,
}

impl TokenType {
    /// Create a token type from a raw byte.
    pub fn from_u8(value: u8) -> Result<Self, ProtocolError> {
        Ok(match value {
            0x81 => Self::ColMetaData,
            0xAA => Self::Error,
            0xAB => Self::Info,
            0xAD => Self::LoginAck,
            0xD1 => Self::Row,
            0xD2 => Self::NbcRow,
            0xE3 => Self::EnvChange,
            0xFD => Self::Done,
            0xFE => Self::DoneProc,
            0xFF => Self::DoneInProc,
            0x79 => Self::ReturnStatus,
            0xA9 => Self::Order,
            other => return Err(ProtocolError::UnsupportedToken(other)),
        })
    }

    /// Whether this token carries row values.
    #[must_use]
    pub const fn is_row(self) -> bool {
        matches!(self, Self::Row | Self::NbcRow)
    }
}

/// Parsed TDS token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Column metadata describing the following rows.
    ColMetaData(Arc<ColMetaData>),
    /// Row data.
    Row(TokenRow),
    /// Row data sent with a null bitmap.
    NbcRow(TokenRow),
    /// Completion of a SQL statement.
    Done(Done),
    /// Completion of a stored procedure.
    DoneProc(Done),
    /// Completion of a statement inside a stored procedure.
    DoneInProc(Done),
    /// Return status from a stored procedure.
    ReturnStatus(i32),
    /// Error message from the server.
    Error(ServerMessage),
    /// Informational message from the server.
    Info(ServerMessage),
    /// Login acknowledgment.
    LoginAck(LoginAck),
    /// Environment change notification.
    EnvChange(EnvChange),
    /// Column ordering information.
    Order(Order),
}

impl Token {
    /// The tag this token was decoded from.
    #[must_use]
    pub const fn token_type(&self) -> TokenType {
        match self {
            Self::ColMetaData(_) => TokenType::ColMetaData,
            Self::Row(_) => TokenType::Row,
            Self::NbcRow(_) => TokenType::NbcRow,
            Self::Done(_) => TokenType::Done,
            Self::DoneProc(_) => TokenType::DoneProc,
            Self::DoneInProc(_) => TokenType::DoneInProc,
            Self::ReturnStatus(_) => TokenType::ReturnStatus,
            Self::Error(_) => TokenType::Error,
            Self::Info(_) => TokenType::Info,
            Self::LoginAck(_) => TokenType::LoginAck,
            Self::EnvChange(_) => TokenType::EnvChange,
            Self::Order(_) => TokenType::Order,
        }
    }
}

fn need(src: &impl Buf, n: usize) -> Result<(), ProtocolError> {
    if src.remaining() < n {
        return Err(ProtocolError::UnexpectedEof);
    }
    Ok(())
}

/// Split off a body announced by a little-endian `u16` length.
fn us_length_body(src: &mut impl Buf) -> Result<Bytes, ProtocolError> {
    need(src, 2)?;
    let length = src.get_u16_le() as usize;
    need(src, length)?;
    Ok(src.copy_to_bytes(length))
}

/// Write `body` behind a `u16` length, as the inverse of [`us_length_body`].
fn put_us_length_body(dst: &mut impl BufMut, token_type: TokenType, body: &[u8]) {
    dst.put_u8(token_type as u8);
    dst.put_u16_le(body.len() as u16);
    dst.put_slice(body);
}

// =============================================================================
// COLMETADATA
// =============================================================================

/// Column metadata token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColMetaData {
    /// Column definitions in ordinal order.
    pub columns: Vec<ColumnData>,
}

/// One column description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnData {
    /// Column name, empty for unnamed expressions.
    pub name: String,
    /// Type identifier.
    pub type_id: TypeId,
    /// Length, precision, scale and collation as needed to decode values.
    pub type_info: TypeInfo,
    /// Column flags.
    pub flags: ColumnFlags,
    /// User type ID.
    pub user_type: u32,
    /// Multi-part table name, only sent for TEXT, NTEXT and IMAGE.
    pub table_name: Vec<String>,
}

impl ColumnData {
    /// Create a nullable column with no table name.
    pub fn new(name: impl Into<String>, type_info: TypeInfo) -> Result<Self, ProtocolError> {
        let type_id = TypeId::from_u8(type_info.type_id)
            .ok_or(ProtocolError::UnsupportedDataType(type_info.type_id))?;
        Ok(Self {
            name: name.into(),
            type_id,
            type_info,
            flags: ColumnFlags::NULLABLE,
            user_type: 0,
            table_name: Vec::new(),
        })
    }

    /// Whether the column accepts NULL.
    #[must_use]
    pub fn is_nullable(&self) -> bool {
        self.flags.is_nullable()
    }
}

impl ColMetaData {
    /// Column count meaning "no metadata".
    pub const NO_METADATA: u16 = 0xFFFF;

    /// Create metadata from columns.
    #[must_use]
    pub fn new(columns: Vec<ColumnData>) -> Self {
        Self { columns }
    }

    /// Decode a COLMETADATA token body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        need(src, 2)?;
        let column_count = src.get_u16_le();
        if column_count == Self::NO_METADATA {
            return Ok(Self::default());
        }

        let columns = (0..column_count)
            .map(|_| Self::decode_column(src))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { columns })
    }

    fn decode_column(src: &mut impl Buf) -> Result<ColumnData, ProtocolError> {
        need(src, 7)?;
        let user_type = src.get_u32_le();
        let flags = ColumnFlags::from_bits_retain(src.get_u16_le());
        let raw_type = src.get_u8();
        let type_id = TypeId::from_u8(raw_type).ok_or(ProtocolError::UnsupportedDataType(raw_type))?;

        let mut type_info = TypeInfo::new(raw_type);
        let mut table_name = Vec::new();

        match type_id.layout() {
            TypeInfoLayout::Fixed => {}
            TypeInfoLayout::ByteLen => {
                need(src, 1)?;
                type_info.length = Some(u32::from(src.get_u8()));
            }
            TypeInfoLayout::Decimal => {
                need(src, 3)?;
                type_info.length = Some(u32::from(src.get_u8()));
                type_info.precision = Some(src.get_u8());
                type_info.scale = Some(src.get_u8());
            }
            TypeInfoLayout::ByteLenCollation => {
                need(src, 1 + Collation::SIZE)?;
                type_info.length = Some(u32::from(src.get_u8()));
                type_info.collation = Some(decode_collation(src));
            }
            TypeInfoLayout::UShortLen => {
                need(src, 2)?;
                type_info.length = Some(u32::from(src.get_u16_le()));
            }
            TypeInfoLayout::UShortLenCollation => {
                need(src, 2 + Collation::SIZE)?;
                type_info.length = Some(u32::from(src.get_u16_le()));
                type_info.collation = Some(decode_collation(src));
            }
            TypeInfoLayout::LongLen => {
                need(src, 4)?;
                type_info.length = Some(src.get_u32_le());
                table_name = decode_table_name(src)?;
            }
            TypeInfoLayout::LongLenCollation => {
                need(src, 4 + Collation::SIZE)?;
                type_info.length = Some(src.get_u32_le());
                type_info.collation = Some(decode_collation(src));
                table_name = decode_table_name(src)?;
            }
            TypeInfoLayout::Scale => {
                need(src, 1)?;
                type_info.scale = Some(src.get_u8());
            }
            TypeInfoLayout::Xml => {
                need(src, 1)?;
                if src.get_u8() != 0 {
                    // database, owning schema, schema collection
                    read_b_varchar(src)?;
                    read_b_varchar(src)?;
                    read_us_varchar(src)?;
                }
            }
        }

        let name = read_b_varchar(src)?;

        Ok(ColumnData {
            name,
            type_id,
            type_info,
            flags,
            user_type,
            table_name,
        })
    }

    /// Encode this token, tag included.
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<(), ProtocolError> {
        let count = u16::try_from(self.columns.len())
            .ok()
            .filter(|&n| n != Self::NO_METADATA)
            .ok_or(ProtocolError::InvalidField {
                field: "column_count",
                value: self.columns.len() as u32,
            })?;

        dst.put_u8(TokenType::ColMetaData as u8);
        dst.put_u16_le(count);
        for column in &self.columns {
            dst.put_u32_le(column.user_type);
            dst.put_u16_le(column.flags.bits());
            encode_type_info(&column.type_info, column.type_id, dst);
            if matches!(
                column.type_id.layout(),
                TypeInfoLayout::LongLen | TypeInfoLayout::LongLenCollation
            ) {
                dst.put_u8(column.table_name.len() as u8);
                for part in &column.table_name {
                    write_us_varchar(dst, part);
                }
            }
            write_b_varchar(dst, &column.name);
        }
        Ok(())
    }

    /// Number of columns.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if there are no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

fn decode_collation(src: &mut impl Buf) -> Collation {
    let mut bytes = [0u8; Collation::SIZE];
    src.copy_to_slice(&mut bytes);
    Collation::from_bytes(bytes)
}

fn decode_table_name(src: &mut impl Buf) -> Result<Vec<String>, ProtocolError> {
    need(src, 1)?;
    let parts = src.get_u8();
    (0..parts).map(|_| read_us_varchar(src)).collect()
}

fn encode_type_info(type_info: &TypeInfo, type_id: TypeId, dst: &mut impl BufMut) {
    let length = type_info.length.unwrap_or(0);
    let collation = type_info.collation.unwrap_or_default().to_bytes();

    dst.put_u8(type_id as u8);
    match type_id.layout() {
        TypeInfoLayout::Fixed => {}
        TypeInfoLayout::ByteLen => dst.put_u8(length as u8),
        TypeInfoLayout::Decimal => {
            dst.put_u8(length as u8);
            dst.put_u8(type_info.precision.unwrap_or(18));
            dst.put_u8(type_info.scale.unwrap_or(0));
        }
        TypeInfoLayout::ByteLenCollation => {
            dst.put_u8(length as u8);
            dst.put_slice(&collation);
        }
        TypeInfoLayout::UShortLen => dst.put_u16_le(length as u16),
        TypeInfoLayout::UShortLenCollation => {
            dst.put_u16_le(length as u16);
            dst.put_slice(&collation);
        }
        TypeInfoLayout::LongLen => dst.put_u32_le(length),
        TypeInfoLayout::LongLenCollation => {
            dst.put_u32_le(length);
            dst.put_slice(&collation);
        }
        TypeInfoLayout::Scale => dst.put_u8(type_info.scale.unwrap_or(7)),
        TypeInfoLayout::Xml => dst.put_u8(0),
    }
}

// =============================================================================
// ROW / NBCROW
// =============================================================================

/// Decoded row values, one per column of the governing metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenRow {
    /// Column values in ordinal order.
    pub values: Vec<SqlValue>,
}

impl TokenRow {
    /// Decode a ROW token body.
    pub fn decode(src: &mut Bytes, metadata: &ColMetaData) -> Result<Self, ProtocolError> {
        let values = metadata
            .columns
            .iter()
            .map(|column| decode_value(src, &column.type_info).map_err(ProtocolError::from))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { values })
    }

    /// Decode an NBCROW token body: a null bitmap, then the non-NULL values.
    pub fn decode_nbc(src: &mut Bytes, metadata: &ColMetaData) -> Result<Self, ProtocolError> {
        let bitmap_len = metadata.column_count().div_ceil(8);
        need(src, bitmap_len)?;
        let bitmap = src.split_to(bitmap_len);

        let values = metadata
            .columns
            .iter()
            .enumerate()
            .map(|(i, column)| {
                if bitmap[i / 8] & (1 << (i % 8)) != 0 {
                    Ok(SqlValue::Null)
                } else {
                    decode_value(src, &column.type_info).map_err(ProtocolError::from)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { values })
    }

    /// Encode as a ROW token, tag included.
    pub fn encode(&self, metadata: &ColMetaData, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        if self.values.len() != metadata.column_count() {
            return Err(ProtocolError::ColumnCountMismatch {
                expected: metadata.column_count(),
                actual: self.values.len(),
            });
        }
        dst.put_u8(TokenType::Row as u8);
        for (value, column) in self.values.iter().zip(&metadata.columns) {
            encode_value(value, &column.type_info, dst)?;
        }
        Ok(())
    }

    /// Number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the row has no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// =============================================================================
// DONE / DONEPROC / DONEINPROC
// =============================================================================

bitflags! {
    /// DONE status flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct DoneStatus: u16 {
        /// More results follow.
        const MORE = 0x0001;
        /// The statement raised an error.
        const ERROR = 0x0002;
        /// A transaction is in progress.
        const IN_XACT = 0x0004;
        /// The row count is valid.
        const COUNT = 0x0010;
        /// Attention acknowledgment.
        const ATTN = 0x0020;
        /// Server error terminated the statement.
        const SRVERROR = 0x0100;
    }
}

/// Body shared by DONE, DONEPROC and DONEINPROC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Done {
    /// Status flags.
    pub status: DoneStatus,
    /// Current command.
    pub cur_cmd: u16,
    /// Affected row count, present only when [`DoneStatus::COUNT`] is set.
    pub row_count: Option<u64>,
}

impl Done {
    /// Body size in bytes (excluding the tag).
    pub const SIZE: usize = 12;

    /// A final DONE with an optional row count.
    #[must_use]
    pub fn final_with_count(row_count: Option<u64>) -> Self {
        let status = if row_count.is_some() {
            DoneStatus::COUNT
        } else {
            DoneStatus::empty()
        };
        Self {
            status,
            cur_cmd: 0,
            row_count,
        }
    }

    /// Set the "more results follow" bit.
    #[must_use]
    pub fn with_more(mut self) -> Self {
        self.status |= DoneStatus::MORE;
        self
    }

    /// Decode a DONE-family token body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        need(src, Self::SIZE)?;
        let status = DoneStatus::from_bits_retain(src.get_u16_le());
        let cur_cmd = src.get_u16_le();
        let raw_count = src.get_u64_le();
        Ok(Self {
            status,
            cur_cmd,
            row_count: status.contains(DoneStatus::COUNT).then_some(raw_count),
        })
    }

    /// Encode under the given DONE-family tag.
    pub fn encode(&self, token_type: TokenType, dst: &mut impl BufMut) {
        let mut status = self.status;
        status.set(DoneStatus::COUNT, self.row_count.is_some());
        dst.put_u8(token_type as u8);
        dst.put_u16_le(status.bits());
        dst.put_u16_le(self.cur_cmd);
        dst.put_u64_le(self.row_count.unwrap_or(0));
    }

    /// Check if more results follow.
    #[must_use]
    pub const fn has_more(&self) -> bool {
        self.status.contains(DoneStatus::MORE)
    }

    /// Check if the statement reported an error.
    #[must_use]
    pub const fn has_error(&self) -> bool {
        self.status.contains(DoneStatus::ERROR)
    }
}

// =============================================================================
// ERROR / INFO
// =============================================================================

/// Server error or informational message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerMessage {
    /// Message number.
    pub number: i32,
    /// State.
    pub state: u8,
    /// Severity class.
    pub class: u8,
    /// Message text.
    pub message: String,
    /// Server name.
    pub server: String,
    /// Procedure name.
    pub procedure: String,
    /// Line number.
    pub line: i32,
}

impl ServerMessage {
    /// Create a message with empty server and procedure names.
    #[must_use]
    pub fn new(number: i32, class: u8, message: impl Into<String>) -> Self {
        Self {
            number,
            state: 1,
            class,
            message: message.into(),
            server: String::new(),
            procedure: String::new(),
            line: 1,
        }
    }

    /// Decode an ERROR or INFO token body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let mut body = us_length_body(src)?;
        need(&body, 6)?;
        let number = body.get_i32_le();
        let state = body.get_u8();
        let class = body.get_u8();
        let message = read_us_varchar(&mut body)?;
        let server = read_b_varchar(&mut body)?;
        let procedure = read_b_varchar(&mut body)?;
        need(&body, 4)?;
        let line = body.get_i32_le();

        Ok(Self {
            number,
            state,
            class,
            message,
            server,
            procedure,
            line,
        })
    }

    /// Encode under the ERROR or INFO tag.
    pub fn encode(&self, token_type: TokenType, dst: &mut impl BufMut) {
        let mut body = BytesMut::new();
        body.put_i32_le(self.number);
        body.put_u8(self.state);
        body.put_u8(self.class);
        write_us_varchar(&mut body, &self.message);
        write_b_varchar(&mut body, &self.server);
        write_b_varchar(&mut body, &self.procedure);
        body.put_i32_le(self.line);
        put_us_length_body(dst, token_type, &body);
    }

    /// Severity 20 and above terminates the connection server-side.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        self.class >= 20
    }
}

impl std::fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Msg {}, Level {}, State {}: {}",
            self.number, self.class, self.state, self.message
        )
    }
}

// =============================================================================
// LOGINACK
// =============================================================================

/// Login acknowledgment token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginAck {
    /// Interface type (1 = T-SQL).
    pub interface: u8,
    /// TDS version the server accepted.
    pub tds_version: TdsVersion,
    /// Server program name.
    pub prog_name: String,
    /// Server program version: major, minor, build high, build low.
    pub prog_version: [u8; 4],
}

impl LoginAck {
    /// Decode a LOGINACK token body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let mut body = us_length_body(src)?;
        need(&body, 5)?;
        let interface = body.get_u8();
        // big-endian here, unlike Login7
        let tds_version = TdsVersion::new(body.get_u32());
        let prog_name = read_b_varchar(&mut body)?;
        need(&body, 4)?;
        let mut prog_version = [0u8; 4];
        body.copy_to_slice(&mut prog_version);

        Ok(Self {
            interface,
            tds_version,
            prog_name,
            prog_version,
        })
    }

    /// Encode this token, tag included.
    pub fn encode(&self, dst: &mut impl BufMut) {
        let mut body = BytesMut::new();
        body.put_u8(self.interface);
        body.put_u32(self.tds_version.raw());
        write_b_varchar(&mut body, &self.prog_name);
        body.put_slice(&self.prog_version);
        put_us_length_body(dst, TokenType::LoginAck, &body);
    }

    /// Program version as `major.minor.build`.
    #[must_use]
    pub fn version_string(&self) -> String {
        let [major, minor, hi, lo] = self.prog_version;
        format!("{major}.{minor}.{}", u16::from_be_bytes([hi, lo]))
    }
}

// =============================================================================
// ENVCHANGE
// =============================================================================

/// Environment change type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvChangeType {
    /// Database changed.
    Database,
    /// Language changed.
    Language,
    /// Character set changed.
    CharacterSet,
    /// Packet size changed.
    PacketSize,
    /// SQL collation changed.
    SqlCollation,
    /// Transaction began.
    BeginTransaction,
    /// Transaction committed.
    CommitTransaction,
    /// Transaction rolled back.
    RollbackTransaction,
    /// Enlisted in a DTC transaction.
    EnlistDtcTransaction,
    /// Defected from a DTC transaction.
    DefectTransaction,
    /// Transaction ended.
    TransactionEnded,
    /// Any other sub-type, kept as an opaque body.
    Other(u8),
}

impl EnvChangeType {
    /// Create from the raw sub-type byte.
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Database,
            2 => Self::Language,
            3 => Self::CharacterSet,
            4 => Self::PacketSize,
            7 => Self::SqlCollation,
            8 => Self::BeginTransaction,
            9 => Self::CommitTransaction,
            10 => Self::RollbackTransaction,
            11 => Self::EnlistDtcTransaction,
            12 => Self::DefectTransaction,
            17 => Self::TransactionEnded,
            other => Self::Other(other),
        }
    }

    /// Raw sub-type byte.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Database => 1,
            Self::Language => 2,
            Self::CharacterSet => 3,
            Self::PacketSize => 4,
            Self::SqlCollation => 7,
            Self::BeginTransaction => 8,
            Self::CommitTransaction => 9,
            Self::RollbackTransaction => 10,
            Self::EnlistDtcTransaction => 11,
            Self::DefectTransaction => 12,
            Self::TransactionEnded => 17,
            Self::Other(other) => other,
        }
    }
}

/// Environment change value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvChangeValue {
    /// `B_VARCHAR` value.
    String(String),
    /// `B_VARBYTE` value.
    Binary(Bytes),
}

/// Environment change token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvChange {
    /// A sub-type carrying a new and old value.
    Change {
        /// Sub-type.
        kind: EnvChangeType,
        /// New value.
        new_value: EnvChangeValue,
        /// Old value.
        old_value: EnvChangeValue,
    },
    /// A sub-type this decoder does not interpret.
    Opaque {
        /// Raw sub-type byte.
        kind: u8,
        /// Body after the sub-type byte.
        data: Bytes,
    },
}

impl EnvChange {
    /// Decode an ENVCHANGE token body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let mut body = us_length_body(src)?;
        need(&body, 1)?;
        let kind = EnvChangeType::from_u8(body.get_u8());

        let (new_value, old_value) = match kind {
            EnvChangeType::Database
            | EnvChangeType::Language
            | EnvChangeType::CharacterSet
            | EnvChangeType::PacketSize => (
                EnvChangeValue::String(read_b_varchar(&mut body)?),
                EnvChangeValue::String(read_b_varchar(&mut body)?),
            ),
            EnvChangeType::SqlCollation
            | EnvChangeType::BeginTransaction
            | EnvChangeType::CommitTransaction
            | EnvChangeType::RollbackTransaction
            | EnvChangeType::EnlistDtcTransaction
            | EnvChangeType::DefectTransaction
            | EnvChangeType::TransactionEnded => (
                EnvChangeValue::Binary(read_b_varbyte(&mut body)?),
                EnvChangeValue::Binary(read_b_varbyte(&mut body)?),
            ),
            EnvChangeType::Other(raw) => {
                return Ok(Self::Opaque { kind: raw, data: body });
            }
        };

        Ok(Self::Change {
            kind,
            new_value,
            old_value,
        })
    }

    /// Encode this token, tag included.
    pub fn encode(&self, dst: &mut impl BufMut) {
        let mut body = BytesMut::new();
        match self {
            Self::Change {
                kind,
                new_value,
                old_value,
            } => {
                body.put_u8(kind.as_u8());
                for value in [new_value, old_value] {
                    match value {
                        EnvChangeValue::String(s) => write_b_varchar(&mut body, s),
                        EnvChangeValue::Binary(b) => {
                            body.put_u8(b.len() as u8);
                            body.put_slice(b);
                        }
                    }
                }
            }
            Self::Opaque { kind, data } => {
                body.put_u8(*kind);
                body.put_slice(data);
            }
        }
        put_us_length_body(dst, TokenType::EnvChange, &body);
    }

    /// A string change such as Database or PacketSize.
    #[must_use]
    pub fn string(kind: EnvChangeType, new_value: impl Into<String>, old_value: impl Into<String>) -> Self {
        Self::Change {
            kind,
            new_value: EnvChangeValue::String(new_value.into()),
            old_value: EnvChangeValue::String(old_value.into()),
        }
    }

    /// A binary change such as BeginTransaction.
    #[must_use]
    pub fn binary(kind: EnvChangeType, new_value: Bytes, old_value: Bytes) -> Self {
        Self::Change {
            kind,
            new_value: EnvChangeValue::Binary(new_value),
            old_value: EnvChangeValue::Binary(old_value),
        }
    }

    /// The sub-type.
    #[must_use]
    pub fn kind(&self) -> EnvChangeType {
        match self {
            Self::Change { kind, .. } => *kind,
            Self::Opaque { kind, .. } => EnvChangeType::Other(*kind),
        }
    }

    fn new_string(&self, want: EnvChangeType) -> Option<&str> {
        match self {
            Self::Change {
                kind,
                new_value: EnvChangeValue::String(s),
                ..
            } if *kind == want => Some(s),
            _ => None,
        }
    }

    fn new_binary(&self) -> Option<&Bytes> {
        match self {
            Self::Change {
                new_value: EnvChangeValue::Binary(b),
                ..
            } => Some(b),
            _ => None,
        }
    }

    /// New database name, for a Database change.
    #[must_use]
    pub fn new_database(&self) -> Option<&str> {
        self.new_string(EnvChangeType::Database)
    }

    /// New packet size, for a PacketSize change.
    ///
    /// The size travels as decimal text.
    pub fn packet_size(&self) -> Result<Option<u32>, ProtocolError> {
        self.new_string(EnvChangeType::PacketSize)
            .map(|s| {
                s.trim()
                    .parse()
                    .map_err(|_| ProtocolError::StringEncoding(format!("invalid packet size {s:?}")))
            })
            .transpose()
    }

    /// New collation, for a SqlCollation change with a five-byte value.
    #[must_use]
    pub fn collation(&self) -> Option<Collation> {
        if self.kind() != EnvChangeType::SqlCollation {
            return None;
        }
        let bytes: [u8; Collation::SIZE] = self.new_binary()?.as_ref().try_into().ok()?;
        Some(Collation::from_bytes(bytes))
    }

    /// New transaction descriptor, for a BeginTransaction change.
    #[must_use]
    pub fn transaction_descriptor(&self) -> Option<u64> {
        if self.kind() != EnvChangeType::BeginTransaction {
            return None;
        }
        let bytes: [u8; 8] = self.new_binary()?.as_ref().try_into().ok()?;
        Some(u64::from_le_bytes(bytes))
    }

    /// Whether this change ends the current transaction.
    #[must_use]
    pub fn ends_transaction(&self) -> bool {
        matches!(
            self.kind(),
            EnvChangeType::CommitTransaction
                | EnvChangeType::RollbackTransaction
                | EnvChangeType::DefectTransaction
                | EnvChangeType::TransactionEnded
        )
    }
}

fn read_b_varbyte(src: &mut impl Buf) -> Result<Bytes, ProtocolError> {
    need(src, 1)?;
    let len = src.get_u8() as usize;
    need(src, len)?;
    Ok(src.copy_to_bytes(len))
}

// =============================================================================
// ORDER
// =============================================================================

/// Column ordering information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    /// Ordinals of the ORDER BY columns.
    pub columns: Vec<u16>,
}

impl Order {
    /// Decode an ORDER token body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let mut body = us_length_body(src)?;
        let mut columns = Vec::with_capacity(body.len() / 2);
        while body.remaining() >= 2 {
            columns.push(body.get_u16_le());
        }
        Ok(Self { columns })
    }
}

// =============================================================================
// Token Parsing
// =============================================================================

/// Incremental token parser over a growing buffer.
///
/// The parser decodes one token at a time from the buffered bytes and only
/// consumes input when a token decodes completely. A short buffer yields
/// [`ProtocolError::UnexpectedEof`] with the buffer left untouched, so the
/// caller can append the next packet's payload and retry.
///
/// Appended payloads are queued and joined only when a parse is attempted.
/// After a short parse, [`Self::is_ready`] stays false until the buffered
/// input has doubled, so a token spanning many packets is re-parsed a
/// logarithmic number of times.
#[derive(Debug, Default)]
pub struct TokenParser {
    data: Bytes,
    pending: Vec<Bytes>,
    pending_len: usize,
    retry_at: usize,
}

impl TokenParser {
    /// Create a new token parser over `data`.
    #[must_use]
    pub fn new(data: Bytes) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }

    /// Append more input after whatever is still unparsed.
    pub fn extend(&mut self, more: Bytes) {
        if more.is_empty() {
            return;
        }
        if self.data.is_empty() && self.pending.is_empty() {
            self.data = more;
        } else {
            self.pending_len += more.len();
            self.pending.push(more);
        }
    }

    /// Get the number of unparsed bytes.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() + self.pending_len
    }

    /// Check if there are unparsed bytes.
    #[must_use]
    pub fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }

    /// Whether enough input has arrived since the last short parse to be
    /// worth another attempt.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.remaining() >= self.retry_at
    }

    /// Peek at the next tag without consuming it.
    #[must_use]
    pub fn peek_tag(&self) -> Option<u8> {
        self.data
            .first()
            .or_else(|| self.pending.first().and_then(|chunk| chunk.first()))
            .copied()
    }

    fn gather(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let mut joined = BytesMut::with_capacity(self.remaining());
        joined.extend_from_slice(&self.data);
        for chunk in self.pending.drain(..) {
            joined.extend_from_slice(&chunk);
        }
        self.pending_len = 0;
        self.data = joined.freeze();
    }

    /// Parse the next token.
    ///
    /// `metadata` is the column metadata in scope; ROW and NBCROW tokens
    /// without it are out of order. Returns `Ok(None)` when the buffer is
    /// empty.
    pub fn next_token(
        &mut self,
        metadata: Option<&ColMetaData>,
    ) -> Result<Option<Token>, ProtocolError> {
        let Some(tag) = self.peek_tag() else {
            return Ok(None);
        };
        let token_type = TokenType::from_u8(tag)?;
        self.gather();

        match self.parse(token_type, tag, metadata) {
            Err(e) if e.is_incomplete() => {
                self.retry_at = self.data.len() * 2;
                Err(e)
            }
            result => {
                self.retry_at = 0;
                result.map(Some)
            }
        }
    }

    fn parse(
        &mut self,
        token_type: TokenType,
        tag: u8,
        metadata: Option<&ColMetaData>,
    ) -> Result<Token, ProtocolError> {
        let mut buf = self.data.slice(1..);

        let token = match token_type {
            TokenType::ColMetaData => Token::ColMetaData(Arc::new(ColMetaData::decode(&mut buf)?)),
            TokenType::Row | TokenType::NbcRow => {
                let meta = metadata.ok_or(ProtocolError::OutOfOrderToken {
                    token: tag,
                    state: "AwaitingToken",
                })?;
                if token_type == TokenType::Row {
                    Token::Row(TokenRow::decode(&mut buf, meta)?)
                } else {
                    Token::NbcRow(TokenRow::decode_nbc(&mut buf, meta)?)
                }
            }
            TokenType::Done => Token::Done(Done::decode(&mut buf)?),
            TokenType::DoneProc => Token::DoneProc(Done::decode(&mut buf)?),
            TokenType::DoneInProc => Token::DoneInProc(Done::decode(&mut buf)?),
            TokenType::ReturnStatus => {
                need(&buf, 4)?;
                Token::ReturnStatus(buf.get_i32_le())
            }
            TokenType::Error => Token::Error(ServerMessage::decode(&mut buf)?),
            TokenType::Info => Token::Info(ServerMessage::decode(&mut buf)?),
            TokenType::LoginAck => Token::LoginAck(LoginAck::decode(&mut buf)?),
            TokenType::EnvChange => Token::EnvChange(EnvChange::decode(&mut buf)?),
            TokenType::Order => Token::Order(Order::decode(&mut buf)?),
        };

        tracing::trace!(
            token = ?token_type,
            consumed = self.data.len() - buf.len(),
            "decoded token"
        );
        self.data = buf;
        Ok(token)
    }
}

// =============================================================================
// Tests
// =============================================================================
