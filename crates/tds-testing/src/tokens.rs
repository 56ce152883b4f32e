//! Response token stream builder.
//!
//! ```rust,ignore
//! let payload = ResponseBuilder::new()
//!     .columns(vec![ColumnData::new("", TypeInfo::intn(4))?])
//!     .row(vec![SqlValue::Int(1)])
//!     .done(Some(1))
//!     .build()?;
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use tds_protocol::{
    ColMetaData, ColumnData, Done, DoneStatus, EnvChange, EnvChangeType, LoginAck, ProtocolError,
    ServerMessage, TokenRow, TokenType,
};
use tds_types::SqlValue;

/// Builds the payload of a tabular result message token by token.
///
/// Rows are encoded against the most recent [`ResponseBuilder::columns`]
/// call; the builder does not reset it at DONE boundaries, so it can also
/// produce streams a server would never send.
#[derive(Debug, Default)]
pub struct ResponseBuilder {
    buf: BytesMut,
    columns: Option<ColMetaData>,
    error: Option<ProtocolError>,
}

impl ResponseBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, result: Result<(), ProtocolError>) {
        if let Err(e) = result {
            self.error.get_or_insert(e);
        }
    }

    /// Append COLMETADATA.
    #[must_use]
    pub fn columns(mut self, columns: Vec<ColumnData>) -> Self {
        let meta = ColMetaData::new(columns);
        let result = meta.encode(&mut self.buf);
        self.record(result);
        self.columns = Some(meta);
        self
    }

    /// Append a ROW against the current columns.
    #[must_use]
    pub fn row(mut self, values: Vec<SqlValue>) -> Self {
        let result = match &self.columns {
            Some(meta) => TokenRow { values }.encode(meta, &mut self.buf),
            None => Err(ProtocolError::OutOfOrderToken {
                token: TokenType::Row as u8,
                state: "AwaitingToken",
            }),
        };
        self.record(result);
        self
    }

    /// Append a final DONE.
    #[must_use]
    pub fn done(mut self, row_count: Option<u64>) -> Self {
        Done::final_with_count(row_count).encode(TokenType::Done, &mut self.buf);
        self
    }

    /// Append a DONE with the "more results" bit.
    #[must_use]
    pub fn done_more(mut self, row_count: Option<u64>) -> Self {
        Done::final_with_count(row_count)
            .with_more()
            .encode(TokenType::Done, &mut self.buf);
        self
    }

    /// Append a final DONE flagged as failed.
    #[must_use]
    pub fn done_error(mut self) -> Self {
        let mut done = Done::final_with_count(None);
        done.status |= DoneStatus::ERROR;
        done.encode(TokenType::Done, &mut self.buf);
        self
    }

    /// Append a DONEINPROC, as sent after each statement inside a procedure.
    #[must_use]
    pub fn done_in_proc(mut self, row_count: Option<u64>) -> Self {
        Done::final_with_count(row_count)
            .with_more()
            .encode(TokenType::DoneInProc, &mut self.buf);
        self
    }

    /// Append an ERROR.
    #[must_use]
    pub fn error(mut self, number: i32, class: u8, message: &str) -> Self {
        ServerMessage::new(number, class, message).encode(TokenType::Error, &mut self.buf);
        self
    }

    /// Append an INFO.
    #[must_use]
    pub fn info(mut self, number: i32, message: &str) -> Self {
        ServerMessage::new(number, 0, message).encode(TokenType::Info, &mut self.buf);
        self
    }

    /// Append an ENVCHANGE.
    #[must_use]
    pub fn env_change(mut self, change: &EnvChange) -> Self {
        change.encode(&mut self.buf);
        self
    }

    /// Append a PacketSize ENVCHANGE.
    #[must_use]
    pub fn packet_size(self, new_size: u32, old_size: u32) -> Self {
        self.env_change(&EnvChange::string(
            EnvChangeType::PacketSize,
            new_size.to_string(),
            old_size.to_string(),
        ))
    }

    /// Append a Database ENVCHANGE.
    #[must_use]
    pub fn database(self, new_db: &str, old_db: &str) -> Self {
        self.env_change(&EnvChange::string(EnvChangeType::Database, new_db, old_db))
    }

    /// Append a BeginTransaction ENVCHANGE carrying `descriptor`.
    #[must_use]
    pub fn begin_transaction(self, descriptor: u64) -> Self {
        self.env_change(&EnvChange::binary(
            EnvChangeType::BeginTransaction,
            Bytes::copy_from_slice(&descriptor.to_le_bytes()),
            Bytes::new(),
        ))
    }

    /// Append a CommitTransaction ENVCHANGE for `descriptor`.
    #[must_use]
    pub fn commit_transaction(self, descriptor: u64) -> Self {
        self.env_change(&EnvChange::binary(
            EnvChangeType::CommitTransaction,
            Bytes::new(),
            Bytes::copy_from_slice(&descriptor.to_le_bytes()),
        ))
    }

    /// Append a LOGINACK.
    #[must_use]
    pub fn login_ack(mut self, ack: &LoginAck) -> Self {
        ack.encode(&mut self.buf);
        self
    }

    /// Append a RETURNSTATUS.
    #[must_use]
    pub fn return_status(mut self, status: i32) -> Self {
        self.buf.put_u8(TokenType::ReturnStatus as u8);
        self.buf.put_i32_le(status);
        self
    }

    /// Append bytes verbatim.
    #[must_use]
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.buf.put_slice(bytes);
        self
    }

    /// Finish, returning the first encoding error if any step failed.
    pub fn build(self) -> Result<Bytes, ProtocolError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.buf.freeze()),
        }
    }
}
