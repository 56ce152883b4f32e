//! SQL batch request encoding.
//!
//! A SQL batch payload (packet type 0x01) is an optional ALL_HEADERS block
//! followed by the command text as UTF-16LE, with no terminator.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::{read_utf16_string, utf16_byte_len, write_utf16_string};
use crate::error::ProtocolError;

/// ALL_HEADERS header type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum HeaderType {
    /// Query notification subscription.
    QueryNotifications = 0x0001,
    /// Transaction descriptor and outstanding request count.
    TransactionDescriptor = 0x0002,
    /// Client trace activity ID.
    TraceActivity = 0x0003,
}

impl HeaderType {
    /// Create a header type from its wire value.
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0001 => Some(Self::QueryNotifications),
            0x0002 => Some(Self::TransactionDescriptor),
            0x0003 => Some(Self::TraceActivity),
            _ => None,
        }
    }
}

/// One ALL_HEADERS entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHeader {
    /// Header type.
    pub header_type: HeaderType,
    /// Header body, without the length and type fields.
    pub data: Bytes,
}

impl StreamHeader {
    /// Transaction descriptor header.
    ///
    /// `descriptor` is the value from the BeginTransaction EnvChange, or 0
    /// in auto-commit mode.
    #[must_use]
    pub fn transaction_descriptor(descriptor: u64, outstanding_requests: u32) -> Self {
        let mut data = BytesMut::with_capacity(12);
        data.put_u64_le(descriptor);
        data.put_u32_le(outstanding_requests);
        Self {
            header_type: HeaderType::TransactionDescriptor,
            data: data.freeze(),
        }
    }

    /// Descriptor and outstanding request count of a transaction
    /// descriptor entry.
    #[must_use]
    pub fn as_transaction_descriptor(&self) -> Option<(u64, u32)> {
        if self.header_type != HeaderType::TransactionDescriptor || self.data.len() != 12 {
            return None;
        }
        let mut data = self.data.clone();
        Some((data.get_u64_le(), data.get_u32_le()))
    }

    /// Encoded entry length: own length field, type field and body.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        4 + 2 + self.data.len()
    }

    fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u32_le(self.encoded_len() as u32);
        dst.put_u16_le(self.header_type as u16);
        dst.put_slice(&self.data);
    }
}

/// The ALL_HEADERS block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllHeaders {
    headers: Vec<StreamHeader>,
}

impl AllHeaders {
    /// Create an empty header block.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry.
    #[must_use]
    pub fn with(mut self, header: StreamHeader) -> Self {
        self.headers.push(header);
        self
    }

    /// Returns true if there are no entries; nothing is written then.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// The entries in order.
    #[must_use]
    pub fn headers(&self) -> &[StreamHeader] {
        &self.headers
    }

    /// Descriptor of the first transaction descriptor entry.
    #[must_use]
    pub fn transaction_descriptor(&self) -> Option<u64> {
        self.headers
            .iter()
            .find_map(StreamHeader::as_transaction_descriptor)
            .map(|(descriptor, _)| descriptor)
    }

    /// Recognize a header block at the start of a batch payload.
    ///
    /// The block carries no marker. It is taken to be present when the
    /// leading total length fits the payload and the entries tile it
    /// exactly. Returns the block and the number of bytes it spans.
    #[must_use]
    pub fn decode_prefix(src: &[u8]) -> Option<(Self, usize)> {
        let read_u32 = |at: usize| -> Option<usize> {
            let raw: [u8; 4] = src.get(at..at + 4)?.try_into().ok()?;
            Some(u32::from_le_bytes(raw) as usize)
        };

        let total = read_u32(0)?;
        if total < 4 || total > src.len() {
            return None;
        }

        let mut headers = Vec::new();
        let mut pos = 4;
        while pos < total {
            let len = read_u32(pos)?;
            if len < 6 || pos + len > total {
                return None;
            }
            let header_type = HeaderType::from_u16(u16::from_le_bytes([src[pos + 4], src[pos + 5]]))?;
            headers.push(StreamHeader {
                header_type,
                data: Bytes::copy_from_slice(&src[pos + 6..pos + len]),
            });
            pos += len;
        }
        Some((Self { headers }, total))
    }

    /// Total block length: the 4-byte total field plus every entry.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        4 + self.headers.iter().map(StreamHeader::encoded_len).sum::<usize>()
    }

    /// Write the block, or nothing when there are no entries.
    pub fn encode(&self, dst: &mut impl BufMut) {
        if self.is_empty() {
            return;
        }
        dst.put_u32_le(self.encoded_len() as u32);
        for header in &self.headers {
            header.encode(dst);
        }
    }
}

/// SQL batch request builder.
#[derive(Debug, Clone)]
pub struct SqlBatch {
    sql: String,
    headers: AllHeaders,
}

impl SqlBatch {
    /// Create a new SQL batch without headers.
    #[must_use]
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            headers: AllHeaders::new(),
        }
    }

    /// Replace the header block.
    #[must_use]
    pub fn with_headers(mut self, headers: AllHeaders) -> Self {
        self.headers = headers;
        self
    }

    /// Attach a transaction descriptor header with one outstanding request.
    #[must_use]
    pub fn with_transaction(mut self, descriptor: u64) -> Self {
        self.headers = self
            .headers
            .with(StreamHeader::transaction_descriptor(descriptor, 1));
        self
    }

    /// Get the SQL text.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Get the header block.
    #[must_use]
    pub fn headers(&self) -> &AllHeaders {
        &self.headers
    }

    /// Encode the SQL batch payload.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let header_len = if self.headers.is_empty() {
            0
        } else {
            self.headers.encoded_len()
        };
        let mut buf = BytesMut::with_capacity(header_len + utf16_byte_len(&self.sql));
        self.headers.encode(&mut buf);
        write_utf16_string(&mut buf, &self.sql);
        buf.freeze()
    }

    /// Decode a batch payload as a server would read it.
    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let (headers, offset) = AllHeaders::decode_prefix(payload).unwrap_or_default();
        let mut text = &payload[offset..];
        if text.len() % 2 != 0 {
            return Err(ProtocolError::StringEncoding(
                "odd-length UTF-16 batch text".into(),
            ));
        }
        let units = text.len() / 2;
        let sql = read_utf16_string(&mut text, units)?;
        Ok(Self { sql, headers })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_without_headers_is_bare_text() {
        let payload = SqlBatch::new("SELECT 1").encode();
        assert_eq!(payload.len(), 16);
        assert_eq!(&payload[..4], &[b'S', 0, b'E', 0]);
    }

    #[test]
    fn test_transaction_descriptor_layout() {
        let payload = SqlBatch::new("SELECT 1")
            .with_transaction(0x0102_0304_0506_0708)
            .encode();

        // 4 (total) + 18 (entry) + 16 (text)
        assert_eq!(payload.len(), 38);
        assert_eq!(&payload[0..4], &[22, 0, 0, 0]);
        assert_eq!(&payload[4..8], &[18, 0, 0, 0]);
        assert_eq!(&payload[8..10], &[0x02, 0x00]);
        assert_eq!(&payload[10..18], &[8, 7, 6, 5, 4, 3, 2, 1]);
        assert_eq!(&payload[18..22], &[1, 0, 0, 0]);
        assert_eq!(payload[22], b'S');
    }

    #[test]
    fn test_lengths_sum_over_entries() {
        let headers = AllHeaders::new()
            .with(StreamHeader::transaction_descriptor(0, 1))
            .with(StreamHeader {
                header_type: HeaderType::TraceActivity,
                data: Bytes::from_static(&[0xAA; 20]),
            });
        assert_eq!(headers.encoded_len(), 4 + 18 + 26);

        let mut buf = BytesMut::new();
        headers.encode(&mut buf);
        assert_eq!(buf.len(), headers.encoded_len());
        // second entry starts after the first
        assert_eq!(&buf[22..28], &[26, 0, 0, 0, 0x03, 0x00]);
    }

    #[test]
    fn test_decode_with_and_without_headers() {
        let plain = SqlBatch::decode(&SqlBatch::new("select 1").encode()).unwrap();
        assert_eq!(plain.sql(), "select 1");
        assert!(plain.headers().is_empty());

        let wrapped = SqlBatch::decode(&SqlBatch::new("select 1").with_transaction(77).encode())
            .unwrap();
        assert_eq!(wrapped.sql(), "select 1");
        assert_eq!(wrapped.headers().transaction_descriptor(), Some(77));
    }

    #[test]
    fn test_decode_rejects_odd_text() {
        assert!(matches!(
            SqlBatch::decode(&[b'a', 0, b'b']),
            Err(ProtocolError::StringEncoding(_))
        ));
    }

    #[test]
    fn test_empty_block_writes_nothing() {
        let mut buf = BytesMut::new();
        AllHeaders::new().encode(&mut buf);
        assert!(buf.is_empty());
    }
}
