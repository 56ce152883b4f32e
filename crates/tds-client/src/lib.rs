//! # tds-client
//!
//! Async session over the TDS protocol: log in, send SQL batches, and read
//! their results as a lazy, forward-only stream of rows.
//!
//! The session runs over any `AsyncRead + AsyncWrite` transport. It does no
//! connection setup of its own, so TLS, pre-login negotiation and pooling
//! belong to the caller.
//!
//! ## Lifecycle
//!
//! ```text
//! Disconnected -> LoggingIn -> Ready -> Executing -> Ready -> ... -> Closed
//! ```
//!
//! Transport, protocol, type and authentication failures close the session.
//! Server errors inside a batch response do not: they are reported in the
//! [`QueryOutcome`] next to whatever rows were delivered.
//!
//! ## Example
//!
//! ```rust,ignore
//! use tds_client::{ClientConfig, Credentials, Session};
//!
//! let stream = tokio::net::TcpStream::connect("localhost:1433").await?;
//! let creds = Credentials::sql_server("sa", "Password123");
//! let mut session = Session::connect(stream, ClientConfig::new(), &creds).await?;
//!
//! let mut results = session.execute("SELECT 1 AS one").await?;
//! while let Some(row) = results.next_row().await? {
//!     let one: i32 = row.get(0)?;
//! }
//! results.finish().await?.into_result()?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod row;
pub mod session;
pub mod state;
pub mod stream;

pub use config::{ClientConfig, Credentials};
pub use error::{Error, Result};
pub use row::{Column, ColumnSet, Row};
pub use session::Session;
pub use state::SessionPhase;
pub use stream::{QueryOutcome, QueryResult, ResultSet, ResultStream};

pub use tds_protocol::{Collation, LoginAck, ServerMessage, TdsVersion};
pub use tds_types::{FromSql, SqlValue, TypeError};
