//! Response-level token decoding.
//!
//! [`TokenDecoder`] drives a [`TokenParser`] across one response message,
//! enforcing token order and tracking which column metadata governs the
//! rows that follow. The caller feeds it packet payloads as they arrive:
//!
//! ```rust,ignore
//! let mut decoder = TokenDecoder::new();
//! loop {
//!     match decoder.next_token()? {
//!         Some(token) => handle(token),
//!         None if decoder.is_done() => break,
//!         None => {
//!             let (payload, eom) = framer.read_payload().await?;
//!             decoder.push(payload, eom);
//!         }
//!     }
//! }
//! ```

use std::sync::Arc;

use bytes::Bytes;

use crate::error::ProtocolError;
use crate::token::{ColMetaData, Done, ServerMessage, Token, TokenParser, TokenType};

/// Decoder state within one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// No metadata in scope; rows are not allowed.
    AwaitingToken,
    /// Metadata seen; rows decode against it.
    ColumnsSeen,
    /// The terminal DONE was decoded. Nothing may follow.
    Done,
}

impl DecoderState {
    /// State name used in error reports.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::AwaitingToken => "AwaitingToken",
            Self::ColumnsSeen => "ColumnsSeen",
            Self::Done => "Done",
        }
    }
}

/// Streaming decoder for one response.
#[derive(Debug)]
pub struct TokenDecoder {
    parser: TokenParser,
    state: DecoderState,
    columns: Option<Arc<ColMetaData>>,
    end_of_message: bool,
    errors: Vec<ServerMessage>,
    infos: Vec<ServerMessage>,
}

impl Default for TokenDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenDecoder {
    /// Create a decoder with no input.
    #[must_use]
    pub fn new() -> Self {
        Self {
            parser: TokenParser::default(),
            state: DecoderState::AwaitingToken,
            columns: None,
            end_of_message: false,
            errors: Vec::new(),
            infos: Vec::new(),
        }
    }

    /// Decode a complete response message in one go.
    #[must_use]
    pub fn from_message(payload: Bytes) -> Self {
        let mut decoder = Self::new();
        decoder.push(payload, true);
        decoder
    }

    /// Append one packet payload. `end_of_message` marks the last one.
    pub fn push(&mut self, payload: Bytes, end_of_message: bool) {
        self.parser.extend(payload);
        self.end_of_message |= end_of_message;
    }

    /// Decode the next token.
    ///
    /// Returns `Ok(None)` when more input is needed, or when the terminal
    /// DONE has been decoded; [`Self::is_done`] tells the two apart.
    pub fn next_token(&mut self) -> Result<Option<Token>, ProtocolError> {
        let Some(tag) = self.parser.peek_tag() else {
            if self.end_of_message && self.state != DecoderState::Done {
                return Err(ProtocolError::UnexpectedEof);
            }
            return Ok(None);
        };

        if self.state == DecoderState::Done {
            return Err(self.out_of_order(tag));
        }
        if TokenType::from_u8(tag).is_ok_and(TokenType::is_row)
            && self.state != DecoderState::ColumnsSeen
        {
            return Err(self.out_of_order(tag));
        }

        if !self.end_of_message && !self.parser.is_ready() {
            return Ok(None);
        }
        let token = match self.parser.next_token(self.columns.as_deref()) {
            Ok(Some(token)) => token,
            Ok(None) => return Ok(None),
            Err(e) if e.is_incomplete() && !self.end_of_message => return Ok(None),
            Err(e) => return Err(e),
        };

        match &token {
            Token::ColMetaData(meta) => {
                self.columns = Some(Arc::clone(meta));
                self.transition(DecoderState::ColumnsSeen);
            }
            // a procedure response may end on DONEPROC; DONEINPROC never ends one
            Token::Done(done) | Token::DoneProc(done) => self.finish_statement(done, true),
            Token::DoneInProc(done) => self.finish_statement(done, false),
            Token::Error(msg) => self.errors.push(msg.clone()),
            Token::Info(msg) => self.infos.push(msg.clone()),
            _ => {}
        }

        Ok(Some(token))
    }

    fn finish_statement(&mut self, done: &Done, terminal_allowed: bool) {
        self.columns = None;
        if terminal_allowed && !done.has_more() {
            self.transition(DecoderState::Done);
        } else {
            self.transition(DecoderState::AwaitingToken);
        }
    }

    fn transition(&mut self, next: DecoderState) {
        if self.state != next {
            tracing::debug!(from = self.state.name(), to = next.name(), "token decoder state");
            self.state = next;
        }
    }

    fn out_of_order(&self, tag: u8) -> ProtocolError {
        ProtocolError::OutOfOrderToken {
            token: tag,
            state: self.state.name(),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Whether the terminal DONE has been decoded.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.state == DecoderState::Done
    }

    /// Whether the last packet of the message has been pushed.
    #[must_use]
    pub fn saw_end_of_message(&self) -> bool {
        self.end_of_message
    }

    /// Metadata governing the current rows, if any.
    #[must_use]
    pub fn columns(&self) -> Option<&Arc<ColMetaData>> {
        self.columns.as_ref()
    }

    /// ERROR tokens seen so far.
    #[must_use]
    pub fn errors(&self) -> &[ServerMessage] {
        &self.errors
    }

    /// INFO tokens seen so far.
    #[must_use]
    pub fn infos(&self) -> &[ServerMessage] {
        &self.infos
    }

    /// Take the accumulated errors and infos, leaving them empty.
    pub fn take_messages(&mut self) -> (Vec<ServerMessage>, Vec<ServerMessage>) {
        (
            std::mem::take(&mut self.errors),
            std::mem::take(&mut self.infos),
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use bytes::BytesMut;
    use tds_types::{SqlValue, TypeInfo};

    use super::*;
    use crate::token::{ColumnData, TokenParser, TokenRow};

    fn metadata() -> ColMetaData {
        ColMetaData::new(vec![ColumnData::new("n", TypeInfo::intn(4)).unwrap()])
    }

    fn row(meta: &ColMetaData, n: i32, dst: &mut BytesMut) {
        TokenRow {
            values: vec![SqlValue::Int(n)],
        }
        .encode(meta, dst)
        .unwrap();
    }

    fn drain(decoder: &mut TokenDecoder) -> Result<Vec<Token>, ProtocolError> {
        let mut tokens = Vec::new();
        while let Some(token) = decoder.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    #[test]
    fn test_done_chaining_scopes_rows() {
        let meta = metadata();
        let mut buf = BytesMut::new();
        meta.encode(&mut buf).unwrap();
        row(&meta, 1, &mut buf);
        Done::final_with_count(Some(1)).with_more().encode(TokenType::Done, &mut buf);
        meta.encode(&mut buf).unwrap();
        row(&meta, 2, &mut buf);
        Done::final_with_count(Some(1)).encode(TokenType::Done, &mut buf);

        let mut decoder = TokenDecoder::from_message(buf.freeze());
        let tokens = drain(&mut decoder).unwrap();
        assert!(decoder.is_done());

        let rows: Vec<_> = tokens
            .iter()
            .filter_map(|t| match t {
                Token::Row(r) => Some(r.values[0].clone()),
                _ => None,
            })
            .collect();
        assert_eq!(rows, vec![SqlValue::Int(1), SqlValue::Int(2)]);
        assert_eq!(tokens.len(), 6);
    }

    #[test]
    fn test_row_after_done_more_is_out_of_order() {
        let meta = metadata();
        let mut buf = BytesMut::new();
        meta.encode(&mut buf).unwrap();
        row(&meta, 1, &mut buf);
        Done::final_with_count(Some(1)).with_more().encode(TokenType::Done, &mut buf);
        row(&meta, 2, &mut buf);

        let mut decoder = TokenDecoder::from_message(buf.freeze());
        let err = drain(&mut decoder).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::OutOfOrderToken {
                token: 0xD1,
                state: "AwaitingToken"
            }
        ));
    }

    #[test]
    fn test_token_after_final_done_is_out_of_order() {
        let mut buf = BytesMut::new();
        Done::final_with_count(None).encode(TokenType::Done, &mut buf);
        Done::final_with_count(None).encode(TokenType::Done, &mut buf);

        let mut decoder = TokenDecoder::from_message(buf.freeze());
        assert!(decoder.next_token().unwrap().is_some());
        assert!(matches!(
            decoder.next_token(),
            Err(ProtocolError::OutOfOrderToken { state: "Done", .. })
        ));
    }

    #[test]
    fn test_errors_accumulate_without_stopping() {
        let meta = metadata();
        let mut buf = BytesMut::new();
        meta.encode(&mut buf).unwrap();
        row(&meta, 1, &mut buf);
        ServerMessage::new(8134, 16, "Divide by zero error encountered.")
            .encode(TokenType::Error, &mut buf);
        ServerMessage::new(5701, 0, "Changed database context.").encode(TokenType::Info, &mut buf);
        Done::final_with_count(None).encode(TokenType::Done, &mut buf);

        let mut decoder = TokenDecoder::from_message(buf.freeze());
        drain(&mut decoder).unwrap();
        assert!(decoder.is_done());
        assert_eq!(decoder.errors().len(), 1);
        assert_eq!(decoder.errors()[0].number, 8134);
        assert_eq!(decoder.infos().len(), 1);
    }

    #[test]
    fn test_split_token_waits_for_more_input() {
        let meta = metadata();
        let mut buf = BytesMut::new();
        meta.encode(&mut buf).unwrap();
        row(&meta, 42, &mut buf);
        Done::final_with_count(Some(1)).encode(TokenType::Done, &mut buf);
        let all = buf.freeze();

        // split in the middle of the row
        let cut = all.len() - 13 - 3;
        let mut decoder = TokenDecoder::new();
        decoder.push(all.slice(..cut), false);

        assert!(matches!(decoder.next_token().unwrap(), Some(Token::ColMetaData(_))));
        assert!(decoder.next_token().unwrap().is_none());
        assert!(!decoder.is_done());

        decoder.push(all.slice(cut..), true);
        let Some(Token::Row(r)) = decoder.next_token().unwrap() else {
            panic!("expected row");
        };
        assert_eq!(r.values, vec![SqlValue::Int(42)]);
        assert!(matches!(decoder.next_token().unwrap(), Some(Token::Done(_))));
        assert!(decoder.next_token().unwrap().is_none());
        assert!(decoder.is_done());
    }

    #[test]
    fn test_done_in_proc_never_ends_the_response() {
        let mut buf = BytesMut::new();
        Done::final_with_count(Some(3)).encode(TokenType::DoneInProc, &mut buf);
        Done::final_with_count(None).encode(TokenType::DoneProc, &mut buf);

        let mut decoder = TokenDecoder::from_message(buf.freeze());
        assert!(matches!(decoder.next_token().unwrap(), Some(Token::DoneInProc(_))));
        assert!(!decoder.is_done());
        assert!(matches!(decoder.next_token().unwrap(), Some(Token::DoneProc(_))));
        assert!(decoder.is_done());
    }

    #[test]
    fn test_large_value_across_many_packets() {
        let meta = ColMetaData::new(vec![
            ColumnData::new("b", TypeInfo::new(0xA5).with_length(0xFFFF)).unwrap(),
        ]);
        let blob = Bytes::from(vec![0x3C_u8; 300_000]);
        let mut buf = BytesMut::new();
        meta.encode(&mut buf).unwrap();
        TokenRow {
            values: vec![SqlValue::Binary(blob.clone())],
        }
        .encode(&meta, &mut buf)
        .unwrap();
        Done::final_with_count(Some(1)).encode(TokenType::Done, &mut buf);
        let all = buf.freeze();

        let mut decoder = TokenDecoder::new();
        let mut tokens = Vec::new();
        let chunks: Vec<_> = all.chunks(4088).map(Bytes::copy_from_slice).collect();
        let last = chunks.len() - 1;
        for (i, chunk) in chunks.into_iter().enumerate() {
            decoder.push(chunk, i == last);
            while let Some(token) = decoder.next_token().unwrap() {
                tokens.push(token);
            }
        }

        assert!(decoder.is_done());
        assert_eq!(tokens.len(), 3);
        let Token::Row(row) = &tokens[1] else {
            panic!("expected row");
        };
        assert_eq!(row.values, vec![SqlValue::Binary(blob)]);
    }

    #[test]
    fn test_short_parse_waits_for_input_to_double() {
        let mut parser = TokenParser::new(Bytes::from_static(&[0xFD, 0x00, 0x00]));
        assert!(parser.is_ready());
        assert!(parser.next_token(None).unwrap_err().is_incomplete());
        assert!(!parser.is_ready());

        parser.extend(Bytes::from_static(&[0x00, 0x00]));
        assert!(!parser.is_ready());
        parser.extend(Bytes::from_static(&[0x00]));
        assert!(parser.is_ready());
    }

    #[test]
    fn test_truncated_message_is_fatal() {
        let mut decoder = TokenDecoder::new();
        decoder.push(Bytes::from_static(&[0xFD, 0x00]), true);
        assert!(matches!(decoder.next_token(), Err(ProtocolError::UnexpectedEof)));

        let mut empty = TokenDecoder::from_message(Bytes::new());
        assert!(matches!(empty.next_token(), Err(ProtocolError::UnexpectedEof)));
    }
}
