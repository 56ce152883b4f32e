//! Lazily read batch results.

use std::sync::Arc;

use tds_protocol::{ServerMessage, Token, TokenDecoder};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{Error, Result};
use crate::row::{ColumnSet, Row};
use crate::session::Session;

/// Forward-only reader over one batch response.
///
/// Packets are read only when the decoder runs out of bytes. A response
/// holds one or more result sets, separated by DONE tokens that announce
/// more results:
///
/// ```rust,ignore
/// let mut results = session.execute("SELECT 1; SELECT 2").await?;
/// loop {
///     while let Some(row) = results.next_row().await? {
///         println!("{:?}", row.value(0));
///     }
///     if !results.next_result_set().await? {
///         break;
///     }
/// }
/// let outcome = results.finish().await?;
/// ```
///
/// Dropping the stream before the response is complete leaves the session
/// in [`crate::SessionPhase::Executing`] until [`Session::drain`] reads the
/// rest.
pub struct ResultStream<'a, T> {
    session: &'a mut Session<T>,
    decoder: TokenDecoder,
    columns: Option<Arc<ColumnSet>>,
    set_open: bool,
    at_boundary: bool,
    finished: bool,
    outcome: QueryOutcome,
}

enum Step {
    Columns,
    Row(Row),
    SetEnd,
    End,
}

impl<'a, T> ResultStream<'a, T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub(crate) fn new(session: &'a mut Session<T>) -> Self {
        Self {
            session,
            decoder: TokenDecoder::new(),
            columns: None,
            set_open: false,
            at_boundary: false,
            finished: false,
            outcome: QueryOutcome::default(),
        }
    }

    /// Next row of the current result set.
    ///
    /// Returns `None` at the end of the set; call
    /// [`Self::next_result_set`] to move on.
    pub async fn next_row(&mut self) -> Result<Option<Row>> {
        if self.at_boundary || self.finished {
            return Ok(None);
        }
        loop {
            match self.step().await? {
                Step::Columns => {}
                Step::Row(row) => return Ok(Some(row)),
                Step::SetEnd => {
                    self.at_boundary = true;
                    return Ok(None);
                }
                Step::End => return Ok(None),
            }
        }
    }

    /// Skip to the next result set.
    ///
    /// Unread rows of the current set are discarded. Returns `false` once
    /// the response is complete.
    pub async fn next_result_set(&mut self) -> Result<bool> {
        if !self.at_boundary {
            while self.next_row().await?.is_some() {}
        }
        if self.finished {
            return Ok(false);
        }
        self.at_boundary = false;
        loop {
            match self.step().await? {
                Step::Columns => return Ok(true),
                Step::Row(_) | Step::SetEnd => {}
                Step::End => return Ok(false),
            }
        }
    }

    /// Columns of the current, or most recently ended, result set.
    #[must_use]
    pub fn columns(&self) -> Option<&Arc<ColumnSet>> {
        self.columns.as_ref()
    }

    /// Number of result sets started so far.
    #[must_use]
    pub fn result_set_count(&self) -> usize {
        self.outcome.result_sets
    }

    /// Check if the terminal DONE has been read.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Read the rest of the response and return its outcome.
    ///
    /// The session is ready again afterwards, even when the outcome carries
    /// server errors.
    pub async fn finish(mut self) -> Result<QueryOutcome> {
        while !matches!(self.step().await?, Step::End) {}
        Ok(std::mem::take(&mut self.outcome))
    }

    async fn step(&mut self) -> Result<Step> {
        if self.finished {
            return Ok(Step::End);
        }
        if !self.session.phase().is_usable() {
            return Err(Error::InvalidState {
                operation: "read results",
                phase: self.session.phase(),
            });
        }

        loop {
            let Some(token) = self.session.next_token(&mut self.decoder).await? else {
                self.complete();
                return Ok(Step::End);
            };

            match token {
                Token::ColMetaData(meta) => {
                    let columns = Arc::new(ColumnSet::from_metadata(&meta));
                    self.session.last_columns = Some(Arc::clone(&columns));
                    self.columns = Some(columns);
                    self.set_open = true;
                    self.outcome.result_sets += 1;
                    return Ok(Step::Columns);
                }
                Token::Row(row) | Token::NbcRow(row) => {
                    let columns = self.columns.clone().unwrap_or_default();
                    let row = Row::new(columns, row.values);
                    self.session.last_row = Some(row.clone());
                    return Ok(Step::Row(row));
                }
                Token::Done(done) | Token::DoneProc(done) | Token::DoneInProc(done) => {
                    if let Some(count) = done.row_count {
                        self.outcome.row_counts.push(count);
                    }
                    if std::mem::take(&mut self.set_open) {
                        return Ok(Step::SetEnd);
                    }
                }
                Token::ReturnStatus(status) => self.outcome.return_status = Some(status),
                Token::EnvChange(change) => self.session.apply_env_change(&change)?,
                Token::Error(msg) => {
                    tracing::debug!(
                        number = msg.number,
                        class = msg.class,
                        message = %msg.message,
                        "server error"
                    );
                }
                Token::Info(msg) => {
                    tracing::trace!(number = msg.number, message = %msg.message, "server info");
                }
                Token::Order(_) | Token::LoginAck(_) => {}
            }
        }
    }

    fn complete(&mut self) {
        self.finished = true;
        let (errors, infos) = self.decoder.take_messages();
        self.session.finish_response(&errors, &infos);
        self.outcome.errors = errors;
        self.outcome.infos = infos;
        tracing::debug!(
            result_sets = self.outcome.result_sets,
            rows_affected = self.outcome.rows_affected(),
            errors = self.outcome.errors.len(),
            "batch complete"
        );
    }
}

impl<T> Drop for ResultStream<'_, T> {
    fn drop(&mut self) {
        if !self.finished {
            self.session.abandoned = Some(std::mem::take(&mut self.decoder));
        }
    }
}

impl<T> std::fmt::Debug for ResultStream<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultStream")
            .field("decoder", &self.decoder.state())
            .field("at_boundary", &self.at_boundary)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

/// Everything about a completed response except its rows.
#[derive(Debug, Clone, Default)]
pub struct QueryOutcome {
    /// Row counts from DONE tokens that carried one, in order.
    pub row_counts: Vec<u64>,
    /// Number of result sets in the response.
    pub result_sets: usize,
    /// Value of the last RETURNSTATUS token.
    pub return_status: Option<i32>,
    /// Informational messages.
    pub infos: Vec<ServerMessage>,
    /// Server errors.
    pub errors: Vec<ServerMessage>,
}

impl QueryOutcome {
    /// Total rows affected across all statements.
    #[must_use]
    pub fn rows_affected(&self) -> u64 {
        self.row_counts.iter().sum()
    }

    /// Check if the server reported any errors.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Turn reported server errors into [`Error::Query`].
    pub fn into_result(self) -> Result<Self> {
        if self.errors.is_empty() {
            Ok(self)
        } else {
            Err(Error::Query {
                errors: self.errors,
            })
        }
    }
}

/// Rows of one result set.
#[derive(Debug, Clone)]
pub struct ResultSet {
    /// Column descriptions.
    pub columns: Arc<ColumnSet>,
    /// Rows in arrival order.
    pub rows: Vec<Row>,
}

/// A fully read response.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    /// Result sets in arrival order.
    pub result_sets: Vec<ResultSet>,
    /// Counts and messages.
    pub outcome: QueryOutcome,
}

impl QueryResult {
    /// Rows of the first result set.
    #[must_use]
    pub fn rows(&self) -> &[Row] {
        self.result_sets
            .first()
            .map(|set| set.rows.as_slice())
            .unwrap_or_default()
    }

    /// Fail with [`Error::Query`] if the server reported errors.
    pub fn into_result(self) -> Result<Self> {
        if self.outcome.has_errors() {
            return Err(Error::Query {
                errors: self.outcome.errors,
            });
        }
        Ok(self)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_into_result() {
        let ok = QueryOutcome {
            row_counts: vec![2, 3],
            ..QueryOutcome::default()
        };
        assert_eq!(ok.rows_affected(), 5);
        assert!(ok.into_result().is_ok());

        let failed = QueryOutcome {
            errors: vec![ServerMessage::new(547, 16, "constraint")],
            ..QueryOutcome::default()
        };
        assert!(failed.has_errors());
        let err = failed.into_result().unwrap_err();
        assert!(err.is_server_error(547));
    }

    #[test]
    fn test_empty_result_has_no_rows() {
        assert!(QueryResult::default().rows().is_empty());
    }
}
