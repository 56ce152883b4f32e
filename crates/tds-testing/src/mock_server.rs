//! Scripted in-memory TDS server.
//!
//! The server speaks the login and SQL batch exchanges over a
//! [`tokio::io::duplex`] pipe. Each call to [`MockTdsServer::connect`]
//! spawns one server task and hands back the client end.
//!
//! ```rust,ignore
//! let server = MockTdsServer::builder()
//!     .with_credentials("sa", "secret")
//!     .with_response("select 1", MockResponse::scalar_int(1))
//!     .build();
//!
//! let stream = server.connect();
//! // drive a client over `stream`...
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tds_codec::{
    CodecError, Message, MessageAssembler, Packet, PacketReader, PacketWriter, TdsCodec,
    split_message,
};
use tds_protocol::{
    ColumnData, DEFAULT_PACKET_SIZE, Login7, LoginAck, PACKET_HEADER_SIZE, PacketHeader,
    PacketStatus, PacketType, ProtocolError, SqlBatch, TdsVersion, TypeInfo,
};
use tds_types::SqlValue;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::Mutex;

use crate::tokens::ResponseBuilder;

/// Buffer size of each direction of the in-memory pipe.
const DUPLEX_CAPACITY: usize = 64 * 1024;

/// Error number SQL Server reports for a failed login.
pub const LOGIN_FAILED: i32 = 18456;

/// Error type for mock server operations.
#[derive(Debug, Error)]
pub enum MockServerError {
    /// Framing error on the server side.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The client sent something the server could not parse.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The client sent a message the server did not expect.
    #[error("unexpected message: {0}")]
    Unexpected(String),
}

/// Result type for mock server operations.
pub type Result<T> = std::result::Result<T, MockServerError>;

/// Mock response configuration.
#[derive(Clone)]
pub enum MockResponse {
    /// A single result set followed by a final DONE with its row count.
    Rows {
        /// Column definitions.
        columns: Vec<MockColumn>,
        /// Row data.
        rows: Vec<Vec<SqlValue>>,
    },

    /// An ERROR token and a failed final DONE.
    Error {
        /// Error number.
        number: i32,
        /// Error message.
        message: String,
        /// Severity class.
        severity: u8,
    },

    /// Rows affected count (for INSERT/UPDATE/DELETE).
    RowsAffected(u64),

    /// Pre-encoded tokens, sent as one message.
    Raw(Bytes),

    /// Pre-encoded tokens sent in a packet without END_OF_MESSAGE, after
    /// which the server closes the connection.
    Truncated(Bytes),

    /// Close the connection without replying.
    Hangup,

    /// Compute the response from the SQL text.
    Custom(Arc<dyn Fn(&str) -> MockResponse + Send + Sync>),
}

impl fmt::Debug for MockResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rows { columns, rows } => f
                .debug_struct("Rows")
                .field("columns", columns)
                .field("rows", rows)
                .finish(),
            Self::Error {
                number,
                message,
                severity,
            } => f
                .debug_struct("Error")
                .field("number", number)
                .field("message", message)
                .field("severity", severity)
                .finish(),
            Self::RowsAffected(n) => f.debug_tuple("RowsAffected").field(n).finish(),
            Self::Raw(data) => f.debug_tuple("Raw").field(&data.len()).finish(),
            Self::Truncated(data) => f.debug_tuple("Truncated").field(&data.len()).finish(),
            Self::Hangup => f.write_str("Hangup"),
            Self::Custom(_) => f.debug_tuple("Custom").field(&"<fn>").finish(),
        }
    }
}

impl MockResponse {
    /// A single unnamed INT column with one row.
    pub fn scalar_int(value: i32) -> Self {
        Self::rows(vec![MockColumn::int("")], vec![vec![SqlValue::Int(value)]])
    }

    /// A single unnamed NVARCHAR column with one row.
    pub fn scalar_string(value: impl Into<String>) -> Self {
        Self::rows(
            vec![MockColumn::nvarchar("", 4000)],
            vec![vec![SqlValue::String(value.into())]],
        )
    }

    /// An empty result: a DONE without a row count.
    pub fn empty() -> Self {
        Self::Raw(Bytes::from_static(&[
            0xFD, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ]))
    }

    /// Rows affected response.
    pub fn affected(count: u64) -> Self {
        Self::RowsAffected(count)
    }

    /// Error response with severity 16.
    pub fn error(number: i32, message: impl Into<String>) -> Self {
        Self::Error {
            number,
            message: message.into(),
            severity: 16,
        }
    }

    /// Multi-row response.
    pub fn rows(columns: Vec<MockColumn>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self::Rows { columns, rows }
    }

    /// Response built with a [`ResponseBuilder`].
    pub fn tokens(builder: ResponseBuilder) -> Result<Self> {
        Ok(Self::Raw(builder.build()?))
    }

    /// Response computed from the SQL text.
    pub fn custom(handler: impl Fn(&str) -> MockResponse + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(handler))
    }

    fn render(&self, sql: &str) -> Result<Rendered> {
        let payload = match self {
            Self::Rows { columns, rows } => {
                let columns = columns
                    .iter()
                    .map(MockColumn::to_column_data)
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows.iter()
                    .fold(ResponseBuilder::new().columns(columns), |builder, row| {
                        builder.row(row.clone())
                    })
                    .done(Some(rows.len() as u64))
                    .build()?
            }
            Self::Error {
                number,
                message,
                severity,
            } => ResponseBuilder::new()
                .error(*number, *severity, message)
                .done_error()
                .build()?,
            Self::RowsAffected(count) => ResponseBuilder::new().done(Some(*count)).build()?,
            Self::Raw(data) => data.clone(),
            Self::Truncated(data) => return Ok(Rendered::Truncated(data.clone())),
            Self::Hangup => return Ok(Rendered::Hangup),
            Self::Custom(handler) => return handler(sql).render(sql),
        };
        Ok(Rendered::Complete(payload))
    }
}

enum Rendered {
    Complete(Bytes),
    Truncated(Bytes),
    Hangup,
}

/// Mock column definition.
#[derive(Debug, Clone)]
pub struct MockColumn {
    /// Column name.
    pub name: String,
    /// Column type.
    pub type_info: TypeInfo,
}

impl MockColumn {
    /// Create a new column definition.
    pub fn new(name: impl Into<String>, type_info: TypeInfo) -> Self {
        Self {
            name: name.into(),
            type_info,
        }
    }

    /// An INT column.
    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, TypeInfo::intn(4))
    }

    /// A BIGINT column.
    pub fn bigint(name: impl Into<String>) -> Self {
        Self::new(name, TypeInfo::intn(8))
    }

    /// An NVARCHAR column of `max_chars` characters.
    pub fn nvarchar(name: impl Into<String>, max_chars: u32) -> Self {
        Self::new(name, TypeInfo::nvarchar(max_chars * 2))
    }

    fn to_column_data(&self) -> std::result::Result<ColumnData, ProtocolError> {
        ColumnData::new(self.name.clone(), self.type_info.clone())
    }
}

/// A SQL batch as received by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedBatch {
    /// Batch text.
    pub sql: String,
    /// Transaction descriptor from the ALL_HEADERS block, if one was sent.
    pub transaction_descriptor: Option<u64>,
}

/// What the server has received across all connections.
#[derive(Debug, Default)]
struct Journal {
    logins: Vec<Login7>,
    batches: Vec<RecordedBatch>,
}

/// Configuration for the mock TDS server.
struct MockServerConfig {
    responses: HashMap<String, MockResponse>,
    default_response: MockResponse,
    credentials: Option<(String, String)>,
    server_name: String,
    tds_version: TdsVersion,
    database: String,
    packet_size: Option<u32>,
    response_chunk: Option<usize>,
}

impl MockServerConfig {
    fn find_response(&self, sql: &str) -> &MockResponse {
        self.responses
            .get(&normalize(sql))
            .unwrap_or(&self.default_response)
    }
}

fn normalize(sql: &str) -> String {
    sql.trim().to_lowercase()
}

/// Builder for [`MockTdsServer`].
pub struct MockServerBuilder {
    config: MockServerConfig,
}

impl MockServerBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: MockServerConfig {
                responses: HashMap::new(),
                default_response: MockResponse::empty(),
                credentials: None,
                server_name: "Microsoft SQL Server".to_string(),
                tds_version: TdsVersion::V7_4,
                database: "master".to_string(),
                packet_size: None,
                response_chunk: None,
            },
        }
    }

    /// Add a response for a specific SQL text, matched case-insensitively.
    pub fn with_response(mut self, sql: &str, response: MockResponse) -> Self {
        self.config.responses.insert(normalize(sql), response);
        self
    }

    /// Set the response for unmatched batches.
    pub fn with_default_response(mut self, response: MockResponse) -> Self {
        self.config.default_response = response;
        self
    }

    /// Accept only this username and password. Any login is accepted
    /// otherwise.
    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.config.credentials = Some((username.to_string(), password.to_string()));
        self
    }

    /// Set the program name reported in LOGINACK.
    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.config.server_name = name.into();
        self
    }

    /// Set the TDS version reported in LOGINACK.
    pub fn with_tds_version(mut self, version: TdsVersion) -> Self {
        self.config.tds_version = version;
        self
    }

    /// Set the database reported at login.
    pub fn with_database(mut self, db: impl Into<String>) -> Self {
        self.config.database = db.into();
        self
    }

    /// Grant this packet size instead of the one the client asks for.
    pub fn with_packet_size(mut self, size: u32) -> Self {
        self.config.packet_size = Some(size);
        self
    }

    /// Send responses in packets carrying at most `bytes` of payload, so
    /// tokens straddle packet boundaries.
    pub fn with_response_chunk(mut self, bytes: usize) -> Self {
        self.config.response_chunk = Some(bytes.max(1));
        self
    }

    /// Build the server.
    pub fn build(self) -> MockTdsServer {
        MockTdsServer {
            config: Arc::new(self.config),
            journal: Arc::new(Mutex::new(Journal::default())),
        }
    }
}

impl Default for MockServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A scripted TDS server for tests.
#[derive(Clone)]
pub struct MockTdsServer {
    config: Arc<MockServerConfig>,
    journal: Arc<Mutex<Journal>>,
}

impl MockTdsServer {
    /// Create a new builder for the mock server.
    pub fn builder() -> MockServerBuilder {
        MockServerBuilder::new()
    }

    /// Open a connection, returning the client end of the pipe.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self) -> DuplexStream {
        let (client, server) = tokio::io::duplex(DUPLEX_CAPACITY);
        self.serve(server);
        client
    }

    /// Serve one connection over any transport on a spawned task.
    pub fn serve<T>(&self, stream: T)
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let config = Arc::clone(&self.config);
        let journal = Arc::clone(&self.journal);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, config, journal).await {
                tracing::debug!(error = %e, "mock connection ended with error");
            }
        });
    }

    /// Login messages received so far.
    pub async fn logins(&self) -> Vec<Login7> {
        self.journal.lock().await.logins.clone()
    }

    /// SQL batches received so far.
    pub async fn batches(&self) -> Vec<RecordedBatch> {
        self.journal.lock().await.batches.clone()
    }
}

impl fmt::Debug for MockTdsServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockTdsServer")
            .field("server_name", &self.config.server_name)
            .field("responses", &self.config.responses.len())
            .finish_non_exhaustive()
    }
}

/// Server end of one connection.
struct ServerConnection<T> {
    reader: PacketReader<ReadHalf<T>>,
    writer: PacketWriter<WriteHalf<T>>,
    assembler: MessageAssembler,
    packet_size: usize,
}

impl<T> ServerConnection<T>
where
    T: AsyncRead + AsyncWrite,
{
    fn new(stream: T, packet_size: usize) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            reader: PacketReader::new(read_half, TdsCodec::new()),
            writer: PacketWriter::new(write_half, TdsCodec::new()),
            assembler: MessageAssembler::new(),
            packet_size,
        }
    }

    async fn read_message(&mut self) -> Result<Option<Message>> {
        while let Some(packet) = self.reader.next().await {
            if let Some(message) = self.assembler.push(packet?)? {
                return Ok(Some(message));
            }
        }
        if self.assembler.has_partial() {
            return Err(ProtocolError::UnexpectedEof.into());
        }
        Ok(None)
    }

    async fn send(&mut self, payload: Bytes) -> Result<()> {
        for packet in split_message(PacketType::TabularResult, payload, self.packet_size) {
            self.writer.feed(packet).await?;
        }
        self.writer.flush().await?;
        Ok(())
    }

    async fn send_truncated(&mut self, payload: Bytes) -> Result<()> {
        let header = PacketHeader::new(PacketType::TabularResult, PacketStatus::NORMAL, 0);
        self.writer.send(Packet::new(header, payload)).await?;
        self.writer.close().await?;
        Ok(())
    }
}

async fn handle_connection<T>(
    stream: T,
    config: Arc<MockServerConfig>,
    journal: Arc<Mutex<Journal>>,
) -> Result<()>
where
    T: AsyncRead + AsyncWrite,
{
    let chunked = config.response_chunk.map(|bytes| bytes + PACKET_HEADER_SIZE);
    let mut conn = ServerConnection::new(stream, chunked.unwrap_or(DEFAULT_PACKET_SIZE));

    let Some(message) = conn.read_message().await? else {
        return Ok(());
    };
    if message.packet_type != PacketType::Login7 {
        return Err(MockServerError::Unexpected(format!(
            "expected Login7, got {:?}",
            message.packet_type
        )));
    }
    let login = Login7::decode(&message.payload)?;
    journal.lock().await.logins.push(login.clone());

    if let Some((username, password)) = &config.credentials {
        if login.username != *username || login.password != *password {
            tracing::debug!(username = %login.username, "mock login rejected");
            let response = ResponseBuilder::new()
                .error(
                    LOGIN_FAILED,
                    14,
                    &format!("Login failed for user '{}'.", login.username),
                )
                .done_error()
                .build()?;
            conn.send(response).await?;
            conn.writer.close().await?;
            return Ok(());
        }
    }

    let granted = config.packet_size.unwrap_or(login.packet_size);
    let ack = LoginAck {
        interface: 1,
        tds_version: config.tds_version,
        prog_name: config.server_name.clone(),
        prog_version: [16, 0, 0x10, 0x27],
    };
    let database = if login.database.is_empty() {
        config.database.clone()
    } else {
        login.database.clone()
    };
    let response = ResponseBuilder::new()
        .database(&database, "master")
        .info(5701, &format!("Changed database context to '{database}'."))
        .login_ack(&ack)
        .packet_size(granted, DEFAULT_PACKET_SIZE as u32)
        .done(None)
        .build()?;
    conn.send(response).await?;
    if chunked.is_none() {
        conn.packet_size = granted as usize;
    }

    while let Some(message) = conn.read_message().await? {
        if message.packet_type != PacketType::SqlBatch {
            tracing::debug!(packet_type = ?message.packet_type, "mock server ignoring message");
            continue;
        }

        let batch = SqlBatch::decode(&message.payload)?;
        journal.lock().await.batches.push(RecordedBatch {
            sql: batch.sql().to_string(),
            transaction_descriptor: batch.headers().transaction_descriptor(),
        });

        match config.find_response(batch.sql()).render(batch.sql())? {
            Rendered::Complete(payload) => conn.send(payload).await?,
            Rendered::Truncated(payload) => return conn.send_truncated(payload).await,
            Rendered::Hangup => {
                conn.writer.close().await?;
                return Ok(());
            }
        }
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_response_error() {
        match MockResponse::error(50000, "Test error") {
            MockResponse::Error {
                number,
                message,
                severity,
            } => {
                assert_eq!(number, 50000);
                assert_eq!(message, "Test error");
                assert_eq!(severity, 16);
            }
            other => panic!("expected error response, got {other:?}"),
        }
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let server = MockTdsServer::builder()
            .with_response("SELECT 1", MockResponse::scalar_int(1))
            .build();
        assert!(matches!(
            server.config.find_response("  select 1 "),
            MockResponse::Rows { .. }
        ));
        assert!(matches!(
            server.config.find_response("select 2"),
            MockResponse::Raw(_)
        ));
    }

    #[test]
    fn test_custom_response_sees_sql() {
        let response = MockResponse::custom(|sql| MockResponse::affected(sql.len() as u64));
        let Rendered::Complete(payload) = response.render("update t").unwrap() else {
            panic!("expected complete response");
        };
        // DONE with COUNT and a row count of 8
        assert_eq!(&payload[..3], &[0xFD, 0x10, 0x00]);
        assert_eq!(payload[5], 8);
    }

    #[test]
    fn test_mock_column_nvarchar() {
        let col = MockColumn::nvarchar("name", 50);
        assert_eq!(col.type_info.length, Some(100));
    }
}
