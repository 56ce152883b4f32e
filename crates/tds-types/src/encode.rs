//! TDS binary encoding for column values.
//!
//! [`encode_value`] writes a value in the row representation of a target
//! type, including whatever length prefix or NULL sentinel that type uses,
//! so that [`decode_value`](crate::decode_value) with the same
//! [`TypeInfo`] reads it back.

use bytes::{BufMut, BytesMut};

use crate::decode::{PLP_NULL, TypeInfo, decimal_storage_len};
use crate::error::TypeError;
use crate::value::SqlValue;

/// Encode a value in the wire representation of `type_info`.
pub fn encode_value(
    value: &SqlValue,
    type_info: &TypeInfo,
    buf: &mut BytesMut,
) -> Result<(), TypeError> {
    let null = value.is_null();
    match type_info.type_id {
        // Fixed-length types have no NULL representation
        0x30 | 0x32 | 0x34 | 0x38 | 0x7F | 0x3B | 0x3E | 0x3C | 0x7A | 0x3D | 0x3A if null => {
            Err(TypeError::UnexpectedNull)
        }
        0x32 => {
            buf.put_u8(u8::from(bool_of(value)?));
            Ok(())
        }
        0x30 => {
            buf.put_u8(int_in_range(value, "TINYINT", 0, i64::from(u8::MAX))? as u8);
            Ok(())
        }
        0x34 => {
            let v = int_in_range(value, "SMALLINT", i16::MIN.into(), i16::MAX.into())?;
            buf.put_i16_le(v as i16);
            Ok(())
        }
        0x38 => {
            let v = int_in_range(value, "INT", i32::MIN.into(), i32::MAX.into())?;
            buf.put_i32_le(v as i32);
            Ok(())
        }
        0x7F => {
            buf.put_i64_le(int_in_range(value, "BIGINT", i64::MIN, i64::MAX)?);
            Ok(())
        }
        0x3B => {
            buf.put_f32_le(float_of(value)? as f32);
            Ok(())
        }
        0x3E => {
            buf.put_f64_le(float_of(value)?);
            Ok(())
        }
        #[cfg(feature = "decimal")]
        0x3C => encode_money(value, 8, buf),
        #[cfg(feature = "decimal")]
        0x7A => encode_money(value, 4, buf),
        #[cfg(feature = "chrono")]
        0x3D => encode_datetime(value, 8, buf),
        #[cfg(feature = "chrono")]
        0x3A => encode_datetime(value, 4, buf),

        // Byte-length nullable types: zero length is NULL
        _ if null && is_zero_null(type_info.type_id) => {
            buf.put_u8(0);
            Ok(())
        }
        0x26 => {
            let width = type_info.length.unwrap_or(8);
            let (lo, hi) = match width {
                1 => (0, i64::from(u8::MAX)),
                2 => (i16::MIN.into(), i16::MAX.into()),
                4 => (i32::MIN.into(), i32::MAX.into()),
                8 => (i64::MIN, i64::MAX),
                n => return Err(TypeError::InvalidBinary(format!("invalid INTN length: {n}"))),
            };
            let v = int_in_range(value, "INTN", lo, hi)?;
            buf.put_u8(width as u8);
            buf.put_slice(&v.to_le_bytes()[..width as usize]);
            Ok(())
        }
        0x68 => {
            buf.put_u8(1);
            buf.put_u8(u8::from(bool_of(value)?));
            Ok(())
        }
        0x6D => {
            if type_info.length == Some(4) {
                buf.put_u8(4);
                buf.put_f32_le(float_of(value)? as f32);
            } else {
                buf.put_u8(8);
                buf.put_f64_le(float_of(value)?);
            }
            Ok(())
        }
        #[cfg(feature = "decimal")]
        0x6E => {
            let width = if type_info.length == Some(4) { 4 } else { 8 };
            buf.put_u8(width as u8);
            encode_money(value, width, buf)
        }
        #[cfg(feature = "chrono")]
        0x6F => {
            let width = if type_info.length == Some(4) { 4 } else { 8 };
            buf.put_u8(width as u8);
            encode_datetime(value, width, buf)
        }
        #[cfg(feature = "uuid")]
        0x24 => match value {
            SqlValue::Uuid(u) => {
                buf.put_u8(16);
                encode_uuid(*u, buf);
                Ok(())
            }
            other => Err(mismatch("UNIQUEIDENTIFIER", other)),
        },
        #[cfg(feature = "decimal")]
        0x37 | 0x3F | 0x6A | 0x6C => encode_decimal(value, type_info, buf),
        #[cfg(feature = "chrono")]
        0x28 | 0x29 | 0x2A | 0x2B => encode_scaled_temporal(value, type_info, buf),

        // Legacy byte-length character and binary types: 0xFF is NULL
        0x2F | 0x27 | 0x2D | 0x25 => {
            if null {
                buf.put_u8(0xFF);
                return Ok(());
            }
            let body = body_of(value, type_info)?;
            check_len(&body, type_info, 0xFE)?;
            buf.put_u8(body.len() as u8);
            buf.put_slice(&body);
            Ok(())
        }

        // u16-length character and binary types, PLP for (MAX)
        0xAF | 0xA7 | 0xEF | 0xE7 | 0xAD | 0xA5 | 0xF1 => {
            if type_info.is_plp() {
                if null {
                    buf.put_u64_le(PLP_NULL);
                    return Ok(());
                }
                encode_plp(&body_of(value, type_info)?, buf);
                return Ok(());
            }
            if null {
                buf.put_u16_le(0xFFFF);
                return Ok(());
            }
            let body = body_of(value, type_info)?;
            check_len(&body, type_info, 0xFFFE)?;
            buf.put_u16_le(body.len() as u16);
            buf.put_slice(&body);
            Ok(())
        }

        // Text pointer types: a zero pointer length is NULL
        0x23 | 0x63 | 0x22 => {
            if null {
                buf.put_u8(0);
                return Ok(());
            }
            let body = body_of(value, type_info)?;
            let len = u32::try_from(body.len()).map_err(|_| TypeError::OutOfRange {
                target_type: "TEXT",
            })?;
            buf.put_u8(16);
            buf.put_bytes(0, 16); // text pointer
            buf.put_bytes(0, 8); // timestamp
            buf.put_u32_le(len);
            buf.put_slice(&body);
            Ok(())
        }

        other => Err(TypeError::UnsupportedType(other)),
    }
}

fn is_zero_null(type_id: u8) -> bool {
    matches!(
        type_id,
        0x26 | 0x68 | 0x6D | 0x6E | 0x6F | 0x24 | 0x37 | 0x3F | 0x6A | 0x6C | 0x28 | 0x29 | 0x2A
            | 0x2B
    )
}

fn mismatch(expected: &'static str, value: &SqlValue) -> TypeError {
    TypeError::TypeMismatch {
        expected,
        actual: value.type_name().to_string(),
    }
}

fn bool_of(value: &SqlValue) -> Result<bool, TypeError> {
    match value {
        SqlValue::Bool(v) => Ok(*v),
        other => other
            .as_i64()
            .map(|v| v != 0)
            .ok_or_else(|| mismatch("BIT", other)),
    }
}

fn int_in_range(
    value: &SqlValue,
    target_type: &'static str,
    lo: i64,
    hi: i64,
) -> Result<i64, TypeError> {
    let v = value.as_i64().ok_or_else(|| mismatch(target_type, value))?;
    if v < lo || v > hi {
        return Err(TypeError::OutOfRange { target_type });
    }
    Ok(v)
}

fn float_of(value: &SqlValue) -> Result<f64, TypeError> {
    value
        .as_f64()
        .or_else(|| value.as_i32().map(f64::from))
        .ok_or_else(|| mismatch("FLOAT", value))
}

fn check_len(body: &[u8], type_info: &TypeInfo, wire_max: usize) -> Result<(), TypeError> {
    let declared = type_info.length.map_or(wire_max, |l| (l as usize).min(wire_max));
    if body.len() > declared {
        return Err(TypeError::OutOfRange {
            target_type: "declared column length",
        });
    }
    Ok(())
}

/// Raw body bytes of a character, binary or XML value for the target type.
fn body_of(value: &SqlValue, type_info: &TypeInfo) -> Result<Vec<u8>, TypeError> {
    match (type_info.type_id, value) {
        (0xEF | 0xE7 | 0x63 | 0xF1, SqlValue::String(s) | SqlValue::Xml(s)) => {
            let mut out = BytesMut::with_capacity(s.len() * 2);
            encode_utf16_string_no_len(s, &mut out);
            Ok(out.to_vec())
        }
        (0x2F | 0x27 | 0xAF | 0xA7 | 0x23, SqlValue::String(s)) => encode_single_byte(s, type_info),
        (0x2D | 0x25 | 0xAD | 0xA5 | 0x22, SqlValue::Binary(b)) => Ok(b.to_vec()),
        (0xF1, other) => Err(mismatch("XML", other)),
        (0x2D | 0x25 | 0xAD | 0xA5 | 0x22, other) => Err(mismatch("VARBINARY", other)),
        (_, other) => Err(mismatch("VARCHAR", other)),
    }
}

fn encode_single_byte(s: &str, type_info: &TypeInfo) -> Result<Vec<u8>, TypeError> {
    #[cfg(feature = "encoding")]
    if let Some(collation) = type_info.collation {
        let (encoded, _, unmappable) = collation.encoding().encode(s);
        if unmappable {
            return Err(TypeError::InvalidEncoding(format!(
                "string not representable in code page {}",
                collation.code_page()
            )));
        }
        return Ok(encoded.into_owned());
    }

    #[cfg(not(feature = "encoding"))]
    let _ = type_info;

    if !s.is_ascii() {
        return Err(TypeError::InvalidEncoding(
            "non-ASCII text needs a collation".to_string(),
        ));
    }
    Ok(s.as_bytes().to_vec())
}

/// Write a PLP body as a single chunk followed by the terminator.
fn encode_plp(body: &[u8], buf: &mut BytesMut) {
    buf.put_u64_le(body.len() as u64);
    if !body.is_empty() {
        buf.put_u32_le(body.len() as u32);
        buf.put_slice(body);
    }
    buf.put_u32_le(0);
}

/// Encode a string as UTF-16LE without length prefix.
fn encode_utf16_string_no_len(s: &str, buf: &mut BytesMut) {
    for code_unit in s.encode_utf16() {
        buf.put_u16_le(code_unit);
    }
}

/// Encode a UUID in SQL Server's mixed-endian format.
///
/// The first three groups are little-endian, the last eight bytes are
/// written as-is.
#[cfg(feature = "uuid")]
pub fn encode_uuid(uuid: uuid::Uuid, buf: &mut BytesMut) {
    let mut bytes = *uuid.as_bytes();
    bytes[0..4].reverse();
    bytes[4..6].reverse();
    bytes[6..8].reverse();
    buf.put_slice(&bytes);
}

#[cfg(feature = "decimal")]
fn encode_decimal(
    value: &SqlValue,
    type_info: &TypeInfo,
    buf: &mut BytesMut,
) -> Result<(), TypeError> {
    let mut decimal = match value {
        SqlValue::Decimal(d) => *d,
        other => other
            .as_i64()
            .map(rust_decimal::Decimal::from)
            .ok_or_else(|| mismatch("DECIMAL", other))?,
    };
    let precision = type_info.precision.unwrap_or(38);
    let scale = u32::from(type_info.scale.unwrap_or(0));
    decimal.rescale(scale);
    if decimal.scale() != scale {
        return Err(TypeError::InvalidDecimal(format!(
            "cannot represent {decimal} at scale {scale}"
        )));
    }

    let magnitude = decimal.mantissa().unsigned_abs();
    let digits = magnitude.checked_ilog10().map_or(1, |d| d + 1);
    if digits > u32::from(precision) {
        return Err(TypeError::OutOfRange {
            target_type: "DECIMAL precision",
        });
    }

    let len = decimal_storage_len(precision);
    buf.put_u8(len);
    buf.put_u8(u8::from(!decimal.is_sign_negative()));
    buf.put_slice(&magnitude.to_le_bytes()[..usize::from(len) - 1]);
    Ok(())
}

#[cfg(feature = "decimal")]
fn encode_money(value: &SqlValue, width: u32, buf: &mut BytesMut) -> Result<(), TypeError> {
    let mut decimal = match value {
        SqlValue::Decimal(d) => *d,
        other => other
            .as_i64()
            .map(rust_decimal::Decimal::from)
            .ok_or_else(|| mismatch("MONEY", other))?,
    };
    decimal.rescale(4);
    let units = i64::try_from(decimal.mantissa()).map_err(|_| TypeError::OutOfRange {
        target_type: "MONEY",
    })?;
    if width == 4 {
        let units = i32::try_from(units).map_err(|_| TypeError::OutOfRange {
            target_type: "SMALLMONEY",
        })?;
        buf.put_i32_le(units);
    } else {
        buf.put_i32_le((units >> 32) as i32);
        buf.put_u32_le(units as u32);
    }
    Ok(())
}

#[cfg(feature = "chrono")]
fn naive_datetime_of(value: &SqlValue) -> Result<chrono::NaiveDateTime, TypeError> {
    match value {
        SqlValue::DateTime(dt) => Ok(*dt),
        SqlValue::Date(d) => Ok(d.and_time(chrono::NaiveTime::MIN)),
        SqlValue::DateTimeOffset(dt) => Ok(dt.naive_utc()),
        other => Err(mismatch("DATETIME", other)),
    }
}

#[cfg(feature = "chrono")]
fn encode_datetime(value: &SqlValue, width: u32, buf: &mut BytesMut) -> Result<(), TypeError> {
    use chrono::{Datelike, Timelike};

    let dt = naive_datetime_of(value)?;
    let days = dt.date().num_days_from_ce() - crate::decode::DAYS_TO_1900 - 1;
    let nanos = u64::from(dt.time().num_seconds_from_midnight()) * 1_000_000_000
        + u64::from(dt.time().nanosecond());

    if width == 4 {
        let days = u16::try_from(days).map_err(|_| TypeError::OutOfRange {
            target_type: "SMALLDATETIME",
        })?;
        buf.put_u16_le(days);
        buf.put_u16_le((nanos / 60_000_000_000) as u16);
    } else {
        // 1/300 second ticks, rounded
        let ticks = (nanos * 3 + 5_000_000) / 10_000_000;
        let (days, ticks) = if ticks >= 300 * 86_400 {
            (days + 1, ticks - 300 * 86_400)
        } else {
            (days, ticks)
        };
        buf.put_i32_le(days);
        buf.put_u32_le(ticks as u32);
    }
    Ok(())
}

#[cfg(feature = "chrono")]
fn encode_scaled_temporal(
    value: &SqlValue,
    type_info: &TypeInfo,
    buf: &mut BytesMut,
) -> Result<(), TypeError> {
    let scale = type_info.scale.unwrap_or(7).min(7);
    let time_len = crate::decode::time_bytes_for_scale(scale);

    match (type_info.type_id, value) {
        (0x28, SqlValue::Date(d)) => {
            buf.put_u8(3);
            put_date(*d, buf)
        }
        (0x29, SqlValue::Time(t)) => {
            buf.put_u8(time_len as u8);
            put_time(*t, scale, time_len, buf);
            Ok(())
        }
        (0x2A, SqlValue::DateTime(_) | SqlValue::Date(_)) => {
            let dt = naive_datetime_of(value)?;
            buf.put_u8(time_len as u8 + 3);
            put_time(dt.time(), scale, time_len, buf);
            put_date(dt.date(), buf)
        }
        (0x2B, SqlValue::DateTimeOffset(dt)) => {
            use chrono::Offset;

            let utc = dt.naive_utc();
            buf.put_u8(time_len as u8 + 5);
            put_time(utc.time(), scale, time_len, buf);
            put_date(utc.date(), buf)?;
            buf.put_i16_le((dt.offset().fix().local_minus_utc() / 60) as i16);
            Ok(())
        }
        (0x28, other) => Err(mismatch("DATE", other)),
        (0x29, other) => Err(mismatch("TIME", other)),
        (0x2A, other) => Err(mismatch("DATETIME2", other)),
        (_, other) => Err(mismatch("DATETIMEOFFSET", other)),
    }
}

#[cfg(feature = "chrono")]
fn put_date(date: chrono::NaiveDate, buf: &mut BytesMut) -> Result<(), TypeError> {
    use chrono::Datelike;

    let days = u32::try_from(date.num_days_from_ce() - 1).map_err(|_| TypeError::OutOfRange {
        target_type: "DATE",
    })?;
    buf.put_slice(&days.to_le_bytes()[..3]);
    Ok(())
}

#[cfg(feature = "chrono")]
fn put_time(time: chrono::NaiveTime, scale: u8, time_len: usize, buf: &mut BytesMut) {
    use chrono::Timelike;

    let nanos = u64::from(time.num_seconds_from_midnight()) * 1_000_000_000
        + u64::from(time.nanosecond());
    let intervals = nanos / 10u64.pow(9 - u32::from(scale));
    buf.put_slice(&intervals.to_le_bytes()[..time_len]);
}
