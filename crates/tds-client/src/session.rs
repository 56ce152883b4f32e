//! The session state machine.

use std::io;
use std::sync::Arc;

use bytes::Bytes;
use tds_codec::PacketFramer;
use tds_protocol::{
    Collation, DEFAULT_PACKET_SIZE, EnvChange, EnvChangeType, LoginAck, PacketType, ServerMessage,
    SqlBatch, TdsVersion, Token, TokenDecoder,
};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::{ClientConfig, Credentials};
use crate::error::{Error, Result};
use crate::row::{ColumnSet, Row};
use crate::state::SessionPhase;
use crate::stream::{QueryResult, ResultSet, ResultStream};

/// One logged-in conversation with a server over a byte transport.
///
/// The session owns the transport and is driven sequentially. Reading a
/// response borrows the session mutably through [`ResultStream`], so a
/// second batch cannot be sent while one is being read.
///
/// ```rust,ignore
/// let stream = TcpStream::connect("db:1433").await?;
/// let creds = Credentials::sql_server("sa", "secret");
/// let mut session = Session::connect(stream, ClientConfig::new(), &creds).await?;
///
/// let mut results = session.execute("SELECT name FROM sys.databases").await?;
/// while let Some(row) = results.next_row().await? {
///     let name: String = row.get(0)?;
/// }
/// results.finish().await?.into_result()?;
/// ```
pub struct Session<T> {
    framer: PacketFramer<T>,
    config: ClientConfig,
    phase: SessionPhase,
    packet_size: u32,
    transaction_descriptor: u64,
    database: Option<String>,
    collation: Option<Collation>,
    login_ack: Option<LoginAck>,
    pub(crate) last_columns: Option<Arc<ColumnSet>>,
    pub(crate) last_row: Option<Row>,
    last_errors: Vec<ServerMessage>,
    last_infos: Vec<ServerMessage>,
    // a request was sent and its final packet has not been read
    awaiting_response: bool,
    // decoder of a result stream dropped before its response ended
    pub(crate) abandoned: Option<TokenDecoder>,
}

impl<T> Session<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap a transport. Nothing is sent until [`Self::login`].
    pub fn new(transport: T, config: ClientConfig) -> Self {
        Self {
            framer: PacketFramer::new(transport),
            config,
            phase: SessionPhase::Disconnected,
            packet_size: DEFAULT_PACKET_SIZE as u32,
            transaction_descriptor: 0,
            database: None,
            collation: None,
            login_ack: None,
            last_columns: None,
            last_row: None,
            last_errors: Vec::new(),
            last_infos: Vec::new(),
            awaiting_response: false,
            abandoned: None,
        }
    }

    /// Wrap a transport and log in.
    pub async fn connect(
        transport: T,
        config: ClientConfig,
        credentials: &Credentials,
    ) -> Result<Self> {
        let mut session = Self::new(transport, config);
        session.login(credentials).await?;
        Ok(session)
    }

    /// Send the login message and read the server's answer.
    ///
    /// Succeeds only if the response carries a LOGINACK. Otherwise the
    /// session is closed and [`Error::Auth`] carries the server's errors.
    pub async fn login(&mut self, credentials: &Credentials) -> Result<()> {
        self.ensure_phase(SessionPhase::Disconnected, "log in")?;
        let login = self.config.login_message(credentials)?;
        let payload = login.encode()?;

        tracing::debug!(
            tds_version = %login.tds_version,
            packet_size = login.packet_size,
            database = %login.database,
            "sending login"
        );
        self.phase = SessionPhase::LoggingIn;
        self.send(PacketType::Login7, payload).await?;

        let mut decoder = TokenDecoder::new();
        while let Some(token) = self.next_token(&mut decoder).await? {
            match token {
                Token::LoginAck(ack) => self.login_ack = Some(ack),
                Token::EnvChange(change) => self.apply_env_change(&change)?,
                Token::Error(msg) => {
                    tracing::debug!(number = msg.number, class = msg.class, "login error");
                }
                other => tracing::trace!(token = ?other.token_type(), "login response token"),
            }
        }
        let (errors, infos) = decoder.take_messages();
        self.last_infos = infos;

        let Some(ack) = &self.login_ack else {
            self.phase = SessionPhase::Closed;
            let message = errors.first().map_or_else(
                || "server did not acknowledge the login".to_string(),
                |e| e.message.clone(),
            );
            tracing::warn!(%message, "login rejected");
            self.last_errors.clone_from(&errors);
            return Err(Error::Auth { message, errors });
        };

        tracing::info!(
            server = %ack.prog_name,
            server_version = %ack.version_string(),
            tds_version = %ack.tds_version,
            database = self.database.as_deref().unwrap_or(""),
            packet_size = self.packet_size,
            "login acknowledged"
        );
        self.last_errors = errors;
        self.phase = SessionPhase::Ready;
        Ok(())
    }

    /// Send a SQL batch and return a stream over its results.
    ///
    /// From TDS 7.2 on the batch carries the transaction descriptor header,
    /// with descriptor 0 in auto-commit mode.
    pub async fn execute(&mut self, sql: &str) -> Result<ResultStream<'_, T>> {
        self.ensure_phase(SessionPhase::Ready, "execute")?;

        let mut batch = SqlBatch::new(sql);
        if self.tds_version().requires_all_headers() {
            batch = batch.with_transaction(self.transaction_descriptor);
        }
        tracing::debug!(
            sql_len = sql.len(),
            transaction = self.transaction_descriptor,
            "executing batch"
        );

        self.phase = SessionPhase::Executing;
        self.abandoned = None;
        self.last_columns = None;
        self.last_row = None;
        self.send(PacketType::SqlBatch, batch.encode()).await?;
        Ok(ResultStream::new(self))
    }

    /// Run a batch and collect every result set.
    ///
    /// Server errors do not fail the call; they are in the outcome, next to
    /// whatever rows arrived.
    pub async fn query(&mut self, sql: &str) -> Result<QueryResult> {
        let mut stream = self.execute(sql).await?;
        let mut result_sets = Vec::new();
        loop {
            let mut rows = Vec::new();
            while let Some(row) = stream.next_row().await? {
                rows.push(row);
            }
            if let Some(columns) = stream.columns() {
                if result_sets.len() < stream.result_set_count() {
                    result_sets.push(ResultSet {
                        columns: Arc::clone(columns),
                        rows,
                    });
                }
            }
            if !stream.next_result_set().await? {
                break;
            }
        }
        let outcome = stream.finish().await?;
        Ok(QueryResult {
            result_sets,
            outcome,
        })
    }

    /// Run a batch for its side effects and return the affected row counts.
    ///
    /// Fails with [`Error::Query`] if the server reported errors.
    pub async fn execute_batch(&mut self, sql: &str) -> Result<Vec<u64>> {
        let outcome = self.execute(sql).await?.finish().await?.into_result()?;
        Ok(outcome.row_counts)
    }

    /// Finish reading a response whose stream was dropped early.
    ///
    /// Remaining rows are discarded. Environment changes are still applied,
    /// so transaction and packet size state stay in step with the server.
    pub async fn drain(&mut self) -> Result<()> {
        match self.phase {
            SessionPhase::Ready => return Ok(()),
            SessionPhase::Executing => {}
            phase => {
                return Err(Error::InvalidState {
                    operation: "drain",
                    phase,
                });
            }
        }

        let mut decoder = self.abandoned.take().unwrap_or_default();
        let mut discarded = 0usize;
        while let Some(token) = self.next_token(&mut decoder).await? {
            match token {
                Token::EnvChange(change) => self.apply_env_change(&change)?,
                Token::Row(_) | Token::NbcRow(_) => discarded += 1,
                _ => {}
            }
        }
        let (errors, infos) = decoder.take_messages();
        self.finish_response(&errors, &infos);
        tracing::debug!(discarded, "drained abandoned response");
        Ok(())
    }

    /// Shut the transport down. The session cannot be used afterwards.
    pub async fn close(&mut self) -> Result<()> {
        if self.phase == SessionPhase::Closed {
            return Ok(());
        }
        self.phase = SessionPhase::Closed;
        tracing::debug!("closing session");
        self.framer.shutdown().await?;
        Ok(())
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Configuration the session was created with.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Packet size currently in effect.
    #[must_use]
    pub fn packet_size(&self) -> u32 {
        self.packet_size
    }

    /// TDS version acknowledged by the server, or the requested one before
    /// login.
    #[must_use]
    pub fn tds_version(&self) -> TdsVersion {
        self.login_ack
            .as_ref()
            .map_or(self.config.tds_version, |ack| ack.tds_version)
    }

    /// Active transaction descriptor, 0 in auto-commit mode.
    #[must_use]
    pub fn transaction_descriptor(&self) -> u64 {
        self.transaction_descriptor
    }

    /// Check if the server reported an open transaction.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.transaction_descriptor != 0
    }

    /// Current database, as last reported by the server.
    #[must_use]
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    /// Default collation, as last reported by the server.
    #[must_use]
    pub fn collation(&self) -> Option<Collation> {
        self.collation
    }

    /// The server's login acknowledgement.
    #[must_use]
    pub fn login_ack(&self) -> Option<&LoginAck> {
        self.login_ack.as_ref()
    }

    /// Columns of the most recent result set.
    #[must_use]
    pub fn last_columns(&self) -> Option<&Arc<ColumnSet>> {
        self.last_columns.as_ref()
    }

    /// Most recently delivered row.
    #[must_use]
    pub fn last_row(&self) -> Option<&Row> {
        self.last_row.as_ref()
    }

    /// Error tokens from the last completed response.
    #[must_use]
    pub fn last_errors(&self) -> &[ServerMessage] {
        &self.last_errors
    }

    /// Info tokens from the last completed response.
    #[must_use]
    pub fn last_infos(&self) -> &[ServerMessage] {
        &self.last_infos
    }

    fn ensure_phase(&self, expected: SessionPhase, operation: &'static str) -> Result<()> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(Error::InvalidState {
                operation,
                phase: self.phase,
            })
        }
    }

    /// Record a failure, closing the session if it is fatal.
    pub(crate) fn fail(&mut self, err: Error) -> Error {
        if err.is_fatal() && self.phase != SessionPhase::Closed {
            tracing::debug!(phase = %self.phase, error = %err, "session closed by error");
            self.phase = SessionPhase::Closed;
        }
        err
    }

    async fn send(&mut self, packet_type: PacketType, payload: Bytes) -> Result<()> {
        self.awaiting_response = true;
        if let Err(e) = self.framer.write_message(packet_type, payload).await {
            return Err(self.fail(e.into()));
        }
        Ok(())
    }

    async fn read_payload(&mut self) -> Result<(Bytes, bool)> {
        match self.framer.read_payload().await {
            Ok(Some((payload, end_of_message))) => {
                if end_of_message {
                    self.awaiting_response = false;
                }
                Ok((payload, end_of_message))
            }
            Ok(None) => Err(self.fail(Error::Transport(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "server closed the connection",
            )))),
            Err(e) => Err(self.fail(e.into())),
        }
    }

    /// Decode the next response token, reading packets as needed.
    ///
    /// Returns `Ok(None)` once the terminal DONE and the end of the message
    /// have both been seen.
    pub(crate) async fn next_token(&mut self, decoder: &mut TokenDecoder) -> Result<Option<Token>> {
        loop {
            match decoder.next_token() {
                Ok(Some(token)) => return Ok(Some(token)),
                Ok(None) if decoder.is_done() && !self.awaiting_response => return Ok(None),
                Ok(None) => {
                    let (payload, end_of_message) = self.read_payload().await?;
                    decoder.push(payload, end_of_message);
                }
                Err(e) => return Err(self.fail(e.into())),
            }
        }
    }

    pub(crate) fn apply_env_change(&mut self, change: &EnvChange) -> Result<()> {
        match change.kind() {
            EnvChangeType::PacketSize => match change.packet_size() {
                Ok(Some(size)) => {
                    tracing::debug!(size, "server changed packet size");
                    self.framer.set_max_packet_size(size as usize);
                    self.packet_size = self.framer.max_packet_size() as u32;
                }
                Ok(None) => {}
                Err(e) => return Err(self.fail(e.into())),
            },
            EnvChangeType::Database => {
                if let Some(database) = change.new_database() {
                    tracing::debug!(database, "server changed database");
                    self.database = Some(database.to_string());
                }
            }
            EnvChangeType::SqlCollation => {
                self.collation = change.collation();
                tracing::debug!(collation = ?self.collation, "server changed collation");
            }
            EnvChangeType::BeginTransaction => {
                self.transaction_descriptor = change.transaction_descriptor().unwrap_or(0);
                tracing::debug!(
                    descriptor = self.transaction_descriptor,
                    "transaction started"
                );
            }
            _ if change.ends_transaction() => {
                tracing::debug!(kind = ?change.kind(), "transaction ended");
                self.transaction_descriptor = 0;
            }
            kind => tracing::debug!(?kind, "environment change"),
        }
        Ok(())
    }

    /// Record the messages of a completed response and return to `Ready`.
    pub(crate) fn finish_response(&mut self, errors: &[ServerMessage], infos: &[ServerMessage]) {
        self.last_errors = errors.to_vec();
        self.last_infos = infos.to_vec();
        if self.phase == SessionPhase::Executing {
            self.phase = SessionPhase::Ready;
        }
    }
}

impl<T> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("phase", &self.phase)
            .field("packet_size", &self.packet_size)
            .field("transaction_descriptor", &self.transaction_descriptor)
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}
