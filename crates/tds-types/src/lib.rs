//! # tds-types
//!
//! Scalar value codec for the Tabular Data Stream protocol.
//!
//! Every value that crosses the wire in a row or parameter is described by a
//! [`TypeInfo`] taken from column metadata. [`decode_value`] turns the wire
//! bytes for one column into a [`SqlValue`]; [`encode_value`] is the inverse.
//! Type codes the codec does not implement are rejected with
//! [`TypeError::UnsupportedType`] rather than coerced.
//!
//! ## Features
//!
//! - `chrono` (default): date/time types via chrono
//! - `uuid` (default): `UNIQUEIDENTIFIER` via uuid
//! - `decimal` (default): `DECIMAL`/`NUMERIC`/`MONEY` via rust_decimal
//! - `encoding` (default): code-page aware `CHAR`/`VARCHAR` via encoding_rs
//!
//! With a type feature disabled the matching type codes decode to
//! [`TypeError::UnsupportedType`].
//!
//! ## Type Mappings
//!
//! | SQL Server Type | Wire code | Rust Type |
//! |-----------------|-----------|-----------|
//! | `BIT` | `0x32`, `0x68` | `bool` |
//! | `TINYINT` | `0x30`, `0x26` | `u8` |
//! | `SMALLINT` | `0x34`, `0x26` | `i16` |
//! | `INT` | `0x38`, `0x26` | `i32` |
//! | `BIGINT` | `0x7F`, `0x26` | `i64` |
//! | `REAL`/`FLOAT` | `0x3B`, `0x3E`, `0x6D` | `f32`/`f64` |
//! | `DECIMAL`/`NUMERIC` | `0x37`, `0x3F`, `0x6A`, `0x6C` | `rust_decimal::Decimal` |
//! | `MONEY`/`SMALLMONEY` | `0x3C`, `0x7A`, `0x6E` | `rust_decimal::Decimal` |
//! | `CHAR`/`VARCHAR`/`TEXT` | `0x2F`, `0x27`, `0xAF`, `0xA7`, `0x23` | `String` |
//! | `NCHAR`/`NVARCHAR`/`NTEXT` | `0xEF`, `0xE7`, `0x63` | `String` |
//! | `BINARY`/`VARBINARY`/`IMAGE` | `0x2D`, `0x25`, `0xAD`, `0xA5`, `0x22` | `bytes::Bytes` |
//! | `DATE` | `0x28` | `chrono::NaiveDate` |
//! | `TIME` | `0x29` | `chrono::NaiveTime` |
//! | `DATETIME`/`SMALLDATETIME`/`DATETIME2` | `0x3D`, `0x3A`, `0x6F`, `0x2A` | `chrono::NaiveDateTime` |
//! | `DATETIMEOFFSET` | `0x2B` | `chrono::DateTime<FixedOffset>` |
//! | `UNIQUEIDENTIFIER` | `0x24` | `uuid::Uuid` |
//! | `XML` | `0xF1` | `String` |

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod decode;
pub mod encode;
pub mod error;
pub mod from_sql;
pub mod value;

pub use decode::{Collation, TypeInfo, decode_utf16_string, decode_value};
pub use encode::encode_value;
pub use error::TypeError;
pub use from_sql::FromSql;
pub use value::SqlValue;
