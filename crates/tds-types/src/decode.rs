//! TDS binary decoding for column values.
//!
//! Each decoder consumes exactly one value from the front of the buffer.
//! A buffer that ends early yields [`TypeError::BufferTooSmall`] and the
//! caller is expected to discard the partially advanced buffer.

use bytes::{Buf, Bytes};

use crate::error::TypeError;
use crate::value::SqlValue;

/// PLP total length announcing a NULL value.
pub const PLP_NULL: u64 = 0xFFFF_FFFF_FFFF_FFFF;
/// PLP total length announcing a value of unknown length.
pub const PLP_UNKNOWN_LEN: u64 = 0xFFFF_FFFF_FFFF_FFFE;
/// Declared max length of `(MAX)` column types, which switches them to PLP.
pub const MAX_LENGTH_PLP: u32 = 0xFFFF;

/// Days from 0001-01-01 (day 1 of the common era) to 1900-01-01.
#[cfg(feature = "chrono")]
pub(crate) const DAYS_TO_1900: i32 = 693_595;

/// Column type description needed to decode a value.
///
/// Built by the token parser from `COLMETADATA` and reused for every row
/// of the result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo {
    /// The TDS type code.
    pub type_id: u8,
    /// Declared maximum length for length-prefixed types.
    pub length: Option<u32>,
    /// Scale for decimal and time types.
    pub scale: Option<u8>,
    /// Precision for decimal types.
    pub precision: Option<u8>,
    /// Collation for character types.
    pub collation: Option<Collation>,
}

/// SQL Server collation as carried in column metadata and `ENVCHANGE`.
///
/// On the wire this is five bytes: a little-endian `u32` holding the LCID
/// in its low 20 bits plus comparison flags and version, followed by the
/// sort id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Collation {
    /// LCID plus flag bits, as sent by the server.
    pub lcid: u32,
    /// Sort ID (non-zero for legacy SQL collations).
    pub sort_id: u8,
}

/// UTF-8 collation flag bit (bit 27).
const UTF8_COLLATION_FLAG: u32 = 0x0800_0000;

impl Collation {
    /// Size of a collation on the wire.
    pub const SIZE: usize = 5;

    /// Parse the five-byte wire form.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 5]) -> Self {
        Self {
            lcid: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            sort_id: bytes[4],
        }
    }

    /// Serialize to the five-byte wire form.
    #[must_use]
    pub fn to_bytes(self) -> [u8; 5] {
        let l = self.lcid.to_le_bytes();
        [l[0], l[1], l[2], l[3], self.sort_id]
    }

    /// Windows language identifier (low 16 bits of the LCID).
    #[must_use]
    pub fn language_id(&self) -> u16 {
        (self.lcid & 0xFFFF) as u16
    }

    /// Check if this collation stores `VARCHAR` data as UTF-8.
    #[must_use]
    pub fn is_utf8(&self) -> bool {
        self.lcid & UTF8_COLLATION_FLAG != 0
    }

    /// Windows code page used for single-byte character data.
    ///
    /// Unknown languages fall back to 1252.
    #[must_use]
    pub fn code_page(&self) -> u16 {
        if self.is_utf8() {
            return 65001;
        }
        match self.language_id() {
            0x0411 => 932,                   // Japanese
            0x0804 | 0x1004 => 936,          // Chinese Simplified
            0x0404 | 0x0C04 | 0x1404 => 950, // Chinese Traditional
            0x0412 => 949,                   // Korean
            0x041E => 874,                   // Thai
            0x042A => 1258,                  // Vietnamese
            0x0405 | 0x0415 | 0x040E | 0x041A | 0x081A | 0x141A | 0x101A | 0x041B | 0x0424
            | 0x0418 | 0x041C => 1250,
            0x0419 | 0x0422 | 0x0423 | 0x0402 | 0x042F | 0x0C1A | 0x201A | 0x0440 | 0x0843
            | 0x0444 | 0x0450 | 0x0485 => 1251,
            0x0408 => 1253,          // Greek
            0x041F | 0x042C => 1254, // Turkish, Azerbaijani
            0x040D => 1255,          // Hebrew
            0x0401 | 0x0801 | 0x0C01 | 0x1001 | 0x1401 | 0x1801 | 0x1C01 | 0x2001 | 0x2401
            | 0x2801 | 0x2C01 | 0x3001 | 0x3401 | 0x3801 | 0x3C01 | 0x4001 | 0x0429 | 0x0420
            | 0x048C | 0x0463 => 1256,
            0x0425..=0x0427 => 1257, // Baltic
            _ => 1252,
        }
    }

    /// Character encoding for single-byte character data.
    #[cfg(feature = "encoding")]
    #[must_use]
    pub fn encoding(&self) -> &'static encoding_rs::Encoding {
        match self.code_page() {
            65001 => encoding_rs::UTF_8,
            874 => encoding_rs::WINDOWS_874,
            932 => encoding_rs::SHIFT_JIS,
            936 => encoding_rs::GBK,
            949 => encoding_rs::EUC_KR,
            950 => encoding_rs::BIG5,
            1250 => encoding_rs::WINDOWS_1250,
            1251 => encoding_rs::WINDOWS_1251,
            1253 => encoding_rs::WINDOWS_1253,
            1254 => encoding_rs::WINDOWS_1254,
            1255 => encoding_rs::WINDOWS_1255,
            1256 => encoding_rs::WINDOWS_1256,
            1257 => encoding_rs::WINDOWS_1257,
            1258 => encoding_rs::WINDOWS_1258,
            _ => encoding_rs::WINDOWS_1252,
        }
    }
}

impl TypeInfo {
    /// Type info carrying only a type code, for fixed-length types.
    #[must_use]
    pub fn new(type_id: u8) -> Self {
        Self {
            type_id,
            length: None,
            scale: None,
            precision: None,
            collation: None,
        }
    }

    /// `INTN` of the given byte width (1, 2, 4 or 8).
    #[must_use]
    pub fn intn(width: u8) -> Self {
        Self::new(0x26).with_length(u32::from(width))
    }

    /// `NVARCHAR(n)` where `n` is the declared length in bytes.
    ///
    /// A length of [`MAX_LENGTH_PLP`] describes `NVARCHAR(MAX)`.
    #[must_use]
    pub fn nvarchar(byte_len: u32) -> Self {
        Self::new(0xE7).with_length(byte_len)
    }

    /// `DECIMAL(precision, scale)`.
    #[must_use]
    pub fn decimal(precision: u8, scale: u8) -> Self {
        Self {
            type_id: 0x6A,
            length: Some(u32::from(decimal_storage_len(precision))),
            scale: Some(scale),
            precision: Some(precision),
            collation: None,
        }
    }

    /// Date/time type with fractional-second scale.
    #[must_use]
    pub fn datetime_with_scale(type_id: u8, scale: u8) -> Self {
        Self::new(type_id).with_scale(scale)
    }

    /// Set the declared length.
    #[must_use]
    pub fn with_length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    /// Set the scale.
    #[must_use]
    pub fn with_scale(mut self, scale: u8) -> Self {
        self.scale = Some(scale);
        self
    }

    /// Set the collation.
    #[must_use]
    pub fn with_collation(mut self, collation: Collation) -> Self {
        self.collation = Some(collation);
        self
    }

    /// Whether values of this column are PLP (chunked) encoded.
    #[must_use]
    pub fn is_plp(&self) -> bool {
        match self.type_id {
            0xF1 => true,
            0xA7 | 0xA5 | 0xE7 => self.length == Some(MAX_LENGTH_PLP),
            _ => false,
        }
    }
}

/// Decode one column value based on its type information.
///
/// NULL sentinels are reported as [`SqlValue::Null`]; a zero length is a
/// legitimate empty value for character and binary types.
pub fn decode_value(buf: &mut Bytes, type_info: &TypeInfo) -> Result<SqlValue, TypeError> {
    match type_info.type_id {
        // Fixed-length types
        0x1F => Ok(SqlValue::Null),                          // NULLTYPE
        0x32 => Ok(SqlValue::Bool(take::<1>(buf)?[0] != 0)), // BITTYPE
        0x30 => Ok(SqlValue::TinyInt(take::<1>(buf)?[0])),   // INT1TYPE
        0x34 => Ok(SqlValue::SmallInt(i16::from_le_bytes(take(buf)?))),
        0x38 => Ok(SqlValue::Int(i32::from_le_bytes(take(buf)?))),
        0x7F => Ok(SqlValue::BigInt(i64::from_le_bytes(take(buf)?))),
        0x3B => Ok(SqlValue::Float(f32::from_le_bytes(take(buf)?))),
        0x3E => Ok(SqlValue::Double(f64::from_le_bytes(take(buf)?))),
        #[cfg(feature = "decimal")]
        0x3C => decode_money(buf, 8), // MONEYTYPE
        #[cfg(feature = "decimal")]
        0x7A => decode_money(buf, 4), // MONEY4TYPE
        #[cfg(feature = "chrono")]
        0x3D => decode_datetime(buf, 8), // DATETIMETYPE
        #[cfg(feature = "chrono")]
        0x3A => decode_datetime(buf, 4), // DATETIM4TYPE

        // Byte-length nullable types
        0x26 => decode_intn(buf),
        0x68 => match byte_len_body(buf)? {
            None => Ok(SqlValue::Null),
            Some(b) if b.len() == 1 => Ok(SqlValue::Bool(b[0] != 0)),
            Some(b) => Err(invalid_len("BITN", b.len())),
        },
        0x6D => match byte_len_body(buf)? {
            None => Ok(SqlValue::Null),
            Some(mut b) if b.len() == 4 => Ok(SqlValue::Float(b.get_f32_le())),
            Some(mut b) if b.len() == 8 => Ok(SqlValue::Double(b.get_f64_le())),
            Some(b) => Err(invalid_len("FLTN", b.len())),
        },
        #[cfg(feature = "decimal")]
        0x6E => match byte_len_body(buf)? {
            None => Ok(SqlValue::Null),
            Some(mut b) => {
                let width = b.len();
                decode_money(&mut b, width)
            }
        },
        #[cfg(feature = "chrono")]
        0x6F => match byte_len_body(buf)? {
            None => Ok(SqlValue::Null),
            Some(mut b) => {
                let width = b.len();
                decode_datetime(&mut b, width)
            }
        },
        #[cfg(feature = "uuid")]
        0x24 => decode_guid(buf),
        #[cfg(feature = "decimal")]
        0x37 | 0x3F | 0x6A | 0x6C => decode_decimal(buf, type_info),

        // Legacy byte-length character and binary types: 0xFF is NULL
        0x2F | 0x27 => match legacy_body(buf)? {
            None => Ok(SqlValue::Null),
            Some(b) => decode_single_byte(&b, type_info).map(SqlValue::String),
        },
        0x2D | 0x25 => Ok(legacy_body(buf)?.map_or(SqlValue::Null, SqlValue::Binary)),

        // u16-length character and binary types: 0xFFFF is NULL, or PLP for MAX
        0xAF | 0xA7 => match var_body(buf, type_info)? {
            None => Ok(SqlValue::Null),
            Some(b) => decode_single_byte(&b, type_info).map(SqlValue::String),
        },
        0xEF | 0xE7 => match var_body(buf, type_info)? {
            None => Ok(SqlValue::Null),
            Some(b) => decode_utf16_string(&b).map(SqlValue::String),
        },
        0xAD | 0xA5 => Ok(var_body(buf, type_info)?.map_or(SqlValue::Null, SqlValue::Binary)),

        // Text pointer types
        0x23 => match text_body(buf)? {
            None => Ok(SqlValue::Null),
            Some(b) => decode_single_byte(&b, type_info).map(SqlValue::String),
        },
        0x63 => match text_body(buf)? {
            None => Ok(SqlValue::Null),
            Some(b) => decode_utf16_string(&b).map(SqlValue::String),
        },
        0x22 => Ok(text_body(buf)?.map_or(SqlValue::Null, SqlValue::Binary)),

        // Date/time types (SQL Server 2008+)
        #[cfg(feature = "chrono")]
        0x28 | 0x29 | 0x2A | 0x2B => decode_scaled_temporal(buf, type_info),

        0xF1 => match plp_body(buf)? {
            None => Ok(SqlValue::Null),
            Some(b) => decode_utf16_string(&b).map(SqlValue::Xml),
        },

        other => Err(TypeError::UnsupportedType(other)),
    }
}

/// Ensure `n` bytes are available.
pub(crate) fn need(buf: &Bytes, n: usize) -> Result<(), TypeError> {
    if buf.remaining() < n {
        return Err(TypeError::BufferTooSmall {
            needed: n,
            available: buf.remaining(),
        });
    }
    Ok(())
}

fn take<const N: usize>(buf: &mut Bytes) -> Result<[u8; N], TypeError> {
    need(buf, N)?;
    let mut out = [0u8; N];
    buf.copy_to_slice(&mut out);
    Ok(out)
}

fn take_bytes(buf: &mut Bytes, n: usize) -> Result<Bytes, TypeError> {
    need(buf, n)?;
    Ok(buf.split_to(n))
}

fn invalid_len(type_name: &str, len: usize) -> TypeError {
    TypeError::InvalidBinary(format!("invalid {type_name} length: {len}"))
}

/// `BYTELEN` body where zero means NULL.
fn byte_len_body(buf: &mut Bytes) -> Result<Option<Bytes>, TypeError> {
    let [len] = take::<1>(buf)?;
    if len == 0 {
        return Ok(None);
    }
    take_bytes(buf, usize::from(len)).map(Some)
}

/// `BYTELEN` body where 0xFF means NULL and zero is an empty value.
fn legacy_body(buf: &mut Bytes) -> Result<Option<Bytes>, TypeError> {
    let [len] = take::<1>(buf)?;
    if len == 0xFF {
        return Ok(None);
    }
    take_bytes(buf, usize::from(len)).map(Some)
}

/// `USHORTLEN` body, or a PLP body for `(MAX)` columns.
fn var_body(buf: &mut Bytes, type_info: &TypeInfo) -> Result<Option<Bytes>, TypeError> {
    if type_info.is_plp() {
        return plp_body(buf);
    }
    let len = u16::from_le_bytes(take(buf)?);
    if len == 0xFFFF {
        return Ok(None);
    }
    take_bytes(buf, usize::from(len)).map(Some)
}

/// Partially length-prefixed body: a `u64` total followed by `u32` chunks
/// terminated by a zero-length chunk.
fn plp_body(buf: &mut Bytes) -> Result<Option<Bytes>, TypeError> {
    let total = u64::from_le_bytes(take(buf)?);
    if total == PLP_NULL {
        return Ok(None);
    }

    let mut data = Vec::with_capacity(if total == PLP_UNKNOWN_LEN {
        0
    } else {
        usize::try_from(total).unwrap_or(0).min(buf.remaining())
    });
    loop {
        let chunk = u32::from_le_bytes(take(buf)?) as usize;
        if chunk == 0 {
            break;
        }
        data.extend_from_slice(&take_bytes(buf, chunk)?);
    }

    if total != PLP_UNKNOWN_LEN && total != data.len() as u64 {
        return Err(TypeError::InvalidBinary(format!(
            "PLP length mismatch: announced {total}, received {}",
            data.len()
        )));
    }
    Ok(Some(Bytes::from(data)))
}

/// `TEXT`/`NTEXT`/`IMAGE` body: text pointer, timestamp, then `u32` length.
fn text_body(buf: &mut Bytes) -> Result<Option<Bytes>, TypeError> {
    let [ptr_len] = take::<1>(buf)?;
    if ptr_len == 0 {
        return Ok(None);
    }
    // text pointer plus the 8-byte timestamp
    need(buf, usize::from(ptr_len) + 8)?;
    buf.advance(usize::from(ptr_len) + 8);
    let len = u32::from_le_bytes(take(buf)?) as usize;
    take_bytes(buf, len).map(Some)
}

fn decode_intn(buf: &mut Bytes) -> Result<SqlValue, TypeError> {
    let Some(mut body) = byte_len_body(buf)? else {
        return Ok(SqlValue::Null);
    };
    match body.len() {
        1 => Ok(SqlValue::TinyInt(body.get_u8())),
        2 => Ok(SqlValue::SmallInt(body.get_i16_le())),
        4 => Ok(SqlValue::Int(body.get_i32_le())),
        8 => Ok(SqlValue::BigInt(body.get_i64_le())),
        n => Err(invalid_len("INTN", n)),
    }
}

fn decode_single_byte(data: &[u8], type_info: &TypeInfo) -> Result<String, TypeError> {
    #[cfg(feature = "encoding")]
    if let Some(collation) = type_info.collation {
        let (decoded, had_errors) = collation
            .encoding()
            .decode_without_bom_handling(data);
        if had_errors {
            return Err(TypeError::InvalidEncoding(format!(
                "invalid data for code page {}",
                collation.code_page()
            )));
        }
        return Ok(decoded.into_owned());
    }

    #[cfg(not(feature = "encoding"))]
    let _ = type_info;

    String::from_utf8(data.to_vec()).map_err(|e| TypeError::InvalidEncoding(e.to_string()))
}

/// Decode a UTF-16LE string from bytes.
pub fn decode_utf16_string(data: &[u8]) -> Result<String, TypeError> {
    if data.len() % 2 != 0 {
        return Err(TypeError::InvalidEncoding(
            "UTF-16 data must have even length".to_string(),
        ));
    }

    let utf16: Vec<u16> = data
        .chunks_exact(2)
        .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]]))
        .collect();

    String::from_utf16(&utf16).map_err(|e| TypeError::InvalidEncoding(e.to_string()))
}

#[cfg(feature = "uuid")]
fn decode_guid(buf: &mut Bytes) -> Result<SqlValue, TypeError> {
    let Some(body) = byte_len_body(buf)? else {
        return Ok(SqlValue::Null);
    };
    if body.len() != 16 {
        return Err(invalid_len("GUID", body.len()));
    }

    // First three groups are little-endian on the wire
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&body);
    bytes[0..4].reverse();
    bytes[4..6].reverse();
    bytes[6..8].reverse();
    Ok(SqlValue::Uuid(uuid::Uuid::from_bytes(bytes)))
}

/// Storage size (including the sign byte) for a decimal of this precision.
pub(crate) fn decimal_storage_len(precision: u8) -> u8 {
    match precision {
        0..=9 => 5,
        10..=19 => 9,
        20..=28 => 13,
        _ => 17,
    }
}

#[cfg(feature = "decimal")]
fn decode_decimal(buf: &mut Bytes, type_info: &TypeInfo) -> Result<SqlValue, TypeError> {
    use rust_decimal::Decimal;

    let Some(mut body) = byte_len_body(buf)? else {
        return Ok(SqlValue::Null);
    };
    if !matches!(body.len(), 5 | 9 | 13 | 17) {
        return Err(invalid_len("DECIMAL", body.len()));
    }

    // Sign byte: 0 = negative, 1 = positive
    let sign = body.get_u8();
    let mut magnitude = [0u8; 16];
    let n = body.remaining();
    body.copy_to_slice(&mut magnitude[..n]);
    let magnitude = u128::from_le_bytes(magnitude);

    let scale = u32::from(type_info.scale.unwrap_or(0));
    let mantissa = i128::try_from(magnitude)
        .map_err(|_| TypeError::InvalidDecimal("magnitude exceeds 127 bits".to_string()))?;
    let mut decimal = Decimal::try_from_i128_with_scale(mantissa, scale)
        .map_err(|e| TypeError::InvalidDecimal(e.to_string()))?;
    if sign == 0 {
        decimal.set_sign_negative(true);
    }
    Ok(SqlValue::Decimal(decimal))
}

/// `MONEY` is a 64-bit integer in ten-thousandths, sent high half first;
/// `SMALLMONEY` is a 32-bit integer.
#[cfg(feature = "decimal")]
fn decode_money(buf: &mut Bytes, width: usize) -> Result<SqlValue, TypeError> {
    let units = match width {
        4 => i64::from(i32::from_le_bytes(take(buf)?)),
        8 => {
            let high = i32::from_le_bytes(take(buf)?);
            let low = u32::from_le_bytes(take(buf)?);
            (i64::from(high) << 32) | i64::from(low)
        }
        n => return Err(invalid_len("MONEY", n)),
    };
    Ok(SqlValue::Decimal(rust_decimal::Decimal::new(units, 4)))
}

/// `DATETIME` (days since 1900 plus 1/300 s ticks) or `SMALLDATETIME`
/// (days since 1900 plus minutes).
#[cfg(feature = "chrono")]
fn decode_datetime(buf: &mut Bytes, width: usize) -> Result<SqlValue, TypeError> {
    let (days, nanos) = match width {
        4 => {
            let days = i32::from(u16::from_le_bytes(take(buf)?));
            let minutes = u64::from(u16::from_le_bytes(take(buf)?));
            (days, minutes * 60 * 1_000_000_000)
        }
        8 => {
            let days = i32::from_le_bytes(take(buf)?);
            let ticks = u64::from(u32::from_le_bytes(take(buf)?));
            // Round to the nearest millisecond the way the server displays it
            let millis = (ticks % 300 * 10 + 1) / 3;
            (days, (ticks / 300) * 1_000_000_000 + millis * 1_000_000)
        }
        n => return Err(invalid_len("DATETIME", n)),
    };

    let date = (DAYS_TO_1900 + 1)
        .checked_add(days)
        .and_then(chrono::NaiveDate::from_num_days_from_ce_opt)
        .ok_or_else(|| TypeError::InvalidDateTime(format!("day offset {days} out of range")))?;
    let time = time_from_nanos(nanos)?;
    Ok(SqlValue::DateTime(date.and_time(time)))
}

/// `DATE`, `TIME`, `DATETIME2` and `DATETIMEOFFSET`, all prefixed by a
/// one-byte length where zero means NULL.
#[cfg(feature = "chrono")]
fn decode_scaled_temporal(buf: &mut Bytes, type_info: &TypeInfo) -> Result<SqlValue, TypeError> {
    let Some(mut body) = byte_len_body(buf)? else {
        return Ok(SqlValue::Null);
    };
    let scale = type_info.scale.unwrap_or(7);
    let len = body.len();

    match type_info.type_id {
        0x28 => {
            if len != 3 {
                return Err(invalid_len("DATE", len));
            }
            decode_date_body(&mut body).map(SqlValue::Date)
        }
        0x29 => decode_time_body(&mut body, len, scale).map(SqlValue::Time),
        0x2A => {
            let time = decode_time_body(&mut body, len.saturating_sub(3), scale)?;
            let date = decode_date_body(&mut body)?;
            Ok(SqlValue::DateTime(date.and_time(time)))
        }
        _ => {
            let time = decode_time_body(&mut body, len.saturating_sub(5), scale)?;
            let date = decode_date_body(&mut body)?;
            let offset_minutes = i16::from_le_bytes(take(&mut body)?);
            let offset = chrono::FixedOffset::east_opt(i32::from(offset_minutes) * 60)
                .ok_or_else(|| {
                    TypeError::InvalidDateTime(format!("invalid offset: {offset_minutes}"))
                })?;
            // Date and time are sent in UTC
            Ok(SqlValue::DateTimeOffset(
                chrono::DateTime::from_naive_utc_and_offset(date.and_time(time), offset),
            ))
        }
    }
}

#[cfg(feature = "chrono")]
fn decode_date_body(buf: &mut Bytes) -> Result<chrono::NaiveDate, TypeError> {
    let [a, b, c] = take::<3>(buf)?;
    let days = i32::from_le_bytes([a, b, c, 0]);
    chrono::NaiveDate::from_num_days_from_ce_opt(days + 1)
        .ok_or_else(|| TypeError::InvalidDateTime(format!("day number {days} out of range")))
}

#[cfg(feature = "chrono")]
fn decode_time_body(
    buf: &mut Bytes,
    len: usize,
    scale: u8,
) -> Result<chrono::NaiveTime, TypeError> {
    if scale > 7 {
        return Err(TypeError::InvalidDateTime(format!("invalid time scale: {scale}")));
    }
    if len != time_bytes_for_scale(scale) {
        return Err(invalid_len("TIME", len));
    }
    let mut raw = [0u8; 8];
    need(buf, len)?;
    buf.copy_to_slice(&mut raw[..len]);
    let intervals = u64::from_le_bytes(raw);
    time_from_nanos(intervals * 10u64.pow(9 - u32::from(scale)))
}

/// Number of bytes used by the time part at the given scale.
pub(crate) fn time_bytes_for_scale(scale: u8) -> usize {
    match scale {
        0..=2 => 3,
        3..=4 => 4,
        _ => 5,
    }
}

#[cfg(feature = "chrono")]
fn time_from_nanos(nanos: u64) -> Result<chrono::NaiveTime, TypeError> {
    let secs = u32::try_from(nanos / 1_000_000_000)
        .map_err(|_| TypeError::InvalidDateTime(format!("time of day out of range: {nanos}ns")))?;
    chrono::NaiveTime::from_num_seconds_from_midnight_opt(secs, (nanos % 1_000_000_000) as u32)
        .ok_or_else(|| TypeError::InvalidDateTime(format!("time of day out of range: {nanos}ns")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_int() {
        let mut buf = Bytes::from_static(&[42, 0, 0, 0]);
        let result = decode_value(&mut buf, &TypeInfo::new(0x38)).unwrap();
        assert_eq!(result, SqlValue::Int(42));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_intn_widths_and_null() {
        let mut buf = Bytes::from_static(&[4, 1, 0, 0, 0, 0, 2, 0xFE, 0xFF]);
        let info = TypeInfo::intn(4);
        assert_eq!(decode_value(&mut buf, &info).unwrap(), SqlValue::Int(1));
        assert_eq!(decode_value(&mut buf, &info).unwrap(), SqlValue::Null);
        assert_eq!(decode_value(&mut buf, &info).unwrap(), SqlValue::SmallInt(-2));
    }

    #[test]
    fn test_decode_utf16_string() {
        let data = [0x41, 0x00, 0x42, 0x00];
        assert_eq!(decode_utf16_string(&data).unwrap(), "AB");
        assert!(decode_utf16_string(&data[..3]).is_err());
    }

    #[test]
    fn test_decode_nvarchar() {
        let mut buf = Bytes::from_static(&[4, 0, 0x41, 0x00, 0x42, 0x00]);
        let result = decode_value(&mut buf, &TypeInfo::nvarchar(100)).unwrap();
        assert_eq!(result, SqlValue::String("AB".to_string()));
    }

    #[test]
    fn test_null_sentinel_versus_empty() {
        let info = TypeInfo::nvarchar(100);
        let mut null = Bytes::from_static(&[0xFF, 0xFF]);
        assert_eq!(decode_value(&mut null, &info).unwrap(), SqlValue::Null);

        let mut empty = Bytes::from_static(&[0, 0]);
        assert_eq!(
            decode_value(&mut empty, &info).unwrap(),
            SqlValue::String(String::new())
        );

        let legacy = TypeInfo::new(0x25).with_length(10);
        let mut null = Bytes::from_static(&[0xFF]);
        assert_eq!(decode_value(&mut null, &legacy).unwrap(), SqlValue::Null);
        let mut empty = Bytes::from_static(&[0x00]);
        assert_eq!(
            decode_value(&mut empty, &legacy).unwrap(),
            SqlValue::Binary(Bytes::new())
        );
    }

    #[test]
    fn test_decode_plp_chunks() {
        let info = TypeInfo::nvarchar(MAX_LENGTH_PLP);
        let mut buf = Bytes::from_static(&[
            4, 0, 0, 0, 0, 0, 0, 0, // total length
            2, 0, 0, 0, 0x48, 0x00, // "H"
            2, 0, 0, 0, 0x69, 0x00, // "i"
            0, 0, 0, 0, // terminator
        ]);
        assert_eq!(
            decode_value(&mut buf, &info).unwrap(),
            SqlValue::String("Hi".into())
        );
        assert!(buf.is_empty());

        let mut null = Bytes::from_static(&[0xFF; 8]);
        assert_eq!(decode_value(&mut null, &info).unwrap(), SqlValue::Null);
    }

    #[test]
    fn test_unsupported_type_is_explicit() {
        let mut buf = Bytes::from_static(&[0, 0, 0, 0]);
        let err = decode_value(&mut buf, &TypeInfo::new(0x62)).unwrap_err();
        assert!(matches!(err, TypeError::UnsupportedType(0x62)));
    }

    #[test]
    fn test_short_buffer_is_incomplete() {
        let mut buf = Bytes::from_static(&[10, 0, 0x41]);
        let err = decode_value(&mut buf, &TypeInfo::nvarchar(100)).unwrap_err();
        assert!(err.is_incomplete());
    }

    #[cfg(feature = "decimal")]
    #[test]
    fn test_decode_decimal() {
        // -123.45 as DECIMAL(5, 2): sign 0, magnitude 12345
        let mut buf = Bytes::from_static(&[5, 0, 0x39, 0x30, 0, 0]);
        let result = decode_value(&mut buf, &TypeInfo::decimal(5, 2)).unwrap();
        assert_eq!(result, SqlValue::Decimal("-123.45".parse().unwrap()));
    }

    #[cfg(feature = "decimal")]
    #[test]
    fn test_decode_money() {
        // 1.5 = 15000 ten-thousandths, high half first
        let mut buf = Bytes::from_static(&[0, 0, 0, 0, 0x98, 0x3A, 0, 0]);
        let result = decode_value(&mut buf, &TypeInfo::new(0x3C)).unwrap();
        assert_eq!(result, SqlValue::Decimal("1.5000".parse().unwrap()));
    }

    #[cfg(feature = "chrono")]
    #[test]
    fn test_decode_smalldatetime_and_datetime() {
        use chrono::NaiveDate;

        // 1900-01-02 00:01
        let mut buf = Bytes::from_static(&[1, 0, 1, 0]);
        let result = decode_value(&mut buf, &TypeInfo::new(0x3A)).unwrap();
        let expected = NaiveDate::from_ymd_opt(1900, 1, 2)
            .unwrap()
            .and_hms_opt(0, 1, 0)
            .unwrap();
        assert_eq!(result, SqlValue::DateTime(expected));

        // 1900-01-01 00:00:01 = 300 ticks
        let mut buf = Bytes::from_static(&[0, 0, 0, 0, 0x2C, 0x01, 0, 0]);
        let result = decode_value(&mut buf, &TypeInfo::new(0x3D)).unwrap();
        let expected = NaiveDate::from_ymd_opt(1900, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 1)
            .unwrap();
        assert_eq!(result, SqlValue::DateTime(expected));
    }

    #[cfg(feature = "chrono")]
    #[test]
    fn test_decode_date() {
        // 0001-01-01 is day zero
        let mut buf = Bytes::from_static(&[3, 0, 0, 0]);
        let result = decode_value(&mut buf, &TypeInfo::new(0x28)).unwrap();
        assert_eq!(
            result,
            SqlValue::Date(chrono::NaiveDate::from_ymd_opt(1, 1, 1).unwrap())
        );
    }

    #[cfg(feature = "uuid")]
    #[test]
    fn test_decode_guid_mixed_endian() {
        let mut buf = Bytes::from_static(&[
            16, 0x78, 0x56, 0x34, 0x12, 0x34, 0x12, 0x78, 0x56, 0x12, 0x34, 0x56, 0x78, 0x12,
            0x34, 0x56, 0x78,
        ]);
        let result = decode_value(&mut buf, &TypeInfo::new(0x24)).unwrap();
        let expected = uuid::Uuid::parse_str("12345678-1234-5678-1234-567812345678").unwrap();
        assert_eq!(result, SqlValue::Uuid(expected));
    }

    #[cfg(feature = "encoding")]
    #[test]
    fn test_decode_varchar_with_code_page() {
        // 0xE9 is 'é' in Windows-1252
        let info = TypeInfo::new(0xA7)
            .with_length(20)
            .with_collation(Collation {
                lcid: 0x0409,
                sort_id: 0,
            });
        let mut buf = Bytes::from_static(&[2, 0, b'e', 0xE9]);
        assert_eq!(
            decode_value(&mut buf, &info).unwrap(),
            SqlValue::String("eé".into())
        );
    }

    #[test]
    fn test_collation_code_pages() {
        let cyrillic = Collation {
            lcid: 0x0419,
            sort_id: 0,
        };
        assert_eq!(cyrillic.code_page(), 1251);
        let utf8 = Collation {
            lcid: 0x0800_0409,
            sort_id: 0,
        };
        assert!(utf8.is_utf8());
        assert_eq!(Collation::from_bytes(cyrillic.to_bytes()), cyrillic);
    }
}
