//! Client error types.

use std::io;

use tds_codec::CodecError;
use tds_protocol::{ProtocolError, ServerMessage};
use tds_types::TypeError;
use thiserror::Error;

use crate::state::SessionPhase;

/// Errors that can occur during session operations.
///
/// `Transport`, `Protocol`, `Type` and `Auth` leave the session unusable.
/// `Query` carries server error tokens from a response that otherwise
/// completed; the session stays ready for the next batch.
#[derive(Debug, Error)]
pub enum Error {
    /// The transport failed or closed.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// The server's byte stream violated the protocol.
    #[error("protocol error: {0}")]
    Protocol(#[source] ProtocolError),

    /// The server did not acknowledge the login.
    #[error("authentication failed: {message}")]
    Auth {
        /// First server error message, or a description of what was missing.
        message: String,
        /// Error tokens returned with the login response.
        errors: Vec<ServerMessage>,
    },

    /// A value could not be decoded or converted.
    #[error("type error: {0}")]
    Type(#[from] TypeError),

    /// The batch completed with server errors.
    #[error("query failed: {}", first_message(errors))]
    Query {
        /// Error tokens in arrival order.
        errors: Vec<ServerMessage>,
    },

    /// The operation is not allowed in the session's current phase.
    #[error("cannot {operation} while the session is {phase}")]
    InvalidState {
        /// Operation that was attempted.
        operation: &'static str,
        /// Phase the session was in.
        phase: SessionPhase,
    },

    /// Invalid client configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

fn first_message(errors: &[ServerMessage]) -> String {
    match errors {
        [] => "no error details".to_string(),
        [only] => only.to_string(),
        [first, rest @ ..] => format!("{first} (and {} more)", rest.len()),
    }
}

impl From<ProtocolError> for Error {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Type(e) => Self::Type(e),
            other => Self::Protocol(other),
        }
    }
}

impl From<CodecError> for Error {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Io(e) => Self::Transport(e),
            CodecError::Protocol(e) => e.into(),
        }
    }
}

impl Error {
    /// Check if this error leaves the session closed.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Protocol(_) | Self::Type(_) | Self::Auth { .. }
        )
    }

    /// Check if retrying on a fresh connection might succeed.
    ///
    /// Only transport failures qualify. Nothing in this crate retries.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    /// Server error tokens carried by this error, if any.
    #[must_use]
    pub fn server_errors(&self) -> &[ServerMessage] {
        match self {
            Self::Auth { errors, .. } | Self::Query { errors } => errors,
            _ => &[],
        }
    }

    /// Check if this error carries a server error with the given number.
    #[must_use]
    pub fn is_server_error(&self, number: i32) -> bool {
        self.server_errors().iter().any(|e| e.number == number)
    }

    /// Highest severity among the carried server errors.
    #[must_use]
    pub fn class(&self) -> Option<u8> {
        self.server_errors().iter().map(|e| e.class).max()
    }
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_errors_map_to_taxonomy() {
        let io = CodecError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "gone"));
        assert!(matches!(Error::from(io), Error::Transport(_)));

        let proto = CodecError::Protocol(ProtocolError::UnexpectedEof);
        assert!(matches!(
            Error::from(proto),
            Error::Protocol(ProtocolError::UnexpectedEof)
        ));
    }

    #[test]
    fn test_value_decode_failures_are_type_errors() {
        let err = Error::from(ProtocolError::Type(TypeError::InvalidDecimal("scale".into())));
        assert!(matches!(err, Error::Type(TypeError::InvalidDecimal(_))));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(Error::Protocol(ProtocolError::UnexpectedEof).is_fatal());
        assert!(Error::Type(TypeError::UnexpectedNull).is_fatal());
        assert!(!Error::Query { errors: vec![] }.is_fatal());
        assert!(!Error::Config("bad".into()).is_fatal());
        assert!(
            !Error::InvalidState {
                operation: "execute",
                phase: SessionPhase::Closed,
            }
            .is_fatal()
        );
    }

    #[test]
    fn test_transient_only_for_transport() {
        let reset = Error::Transport(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert!(reset.is_transient());
        let denied = Error::Transport(io::Error::new(io::ErrorKind::PermissionDenied, "no"));
        assert!(!denied.is_transient());
        assert!(!Error::Protocol(ProtocolError::UnexpectedEof).is_transient());
    }

    #[test]
    fn test_query_error_display_and_lookup() {
        let err = Error::Query {
            errors: vec![
                ServerMessage::new(8134, 16, "Divide by zero error encountered."),
                ServerMessage::new(50000, 11, "custom"),
            ],
        };
        assert!(err.is_server_error(8134));
        assert!(!err.is_server_error(208));
        assert_eq!(err.class(), Some(16));
        let text = err.to_string();
        assert!(text.contains("Divide by zero"));
        assert!(text.contains("1 more"));
    }

    #[test]
    fn test_invalid_state_display() {
        let err = Error::InvalidState {
            operation: "execute",
            phase: SessionPhase::Executing,
        };
        assert_eq!(
            err.to_string(),
            "cannot execute while the session is executing"
        );
    }
}
