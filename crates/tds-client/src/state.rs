//! Session lifecycle phases.
//!
//! ```text
//! Disconnected -> LoggingIn -> Ready -> Executing -> Ready -> ... -> Closed
//! ```
//!
//! Any fatal error moves the session straight to `Closed`.

use std::fmt;

/// Where a [`crate::Session`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionPhase {
    /// Transport attached, no login sent.
    #[default]
    Disconnected,
    /// Login sent, response not yet complete.
    LoggingIn,
    /// Idle and able to execute a batch.
    Ready,
    /// A batch response is being read.
    Executing,
    /// Unusable. Reached by `close()` or a fatal error.
    Closed,
}

impl SessionPhase {
    /// Phase name used in log fields and error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::LoggingIn => "logging in",
            Self::Ready => "ready",
            Self::Executing => "executing",
            Self::Closed => "closed",
        }
    }

    /// Check if the session can still be used at all.
    #[must_use]
    pub const fn is_usable(self) -> bool {
        !matches!(self, Self::Closed)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_predicates() {
        assert_eq!(SessionPhase::default(), SessionPhase::Disconnected);
        assert!(SessionPhase::Ready.is_usable());
        assert!(SessionPhase::Executing.is_usable());
        assert!(!SessionPhase::Closed.is_usable());
        assert_eq!(SessionPhase::LoggingIn.to_string(), "logging in");
    }
}
