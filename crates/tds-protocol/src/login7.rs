//! TDS LOGIN7 message construction.
//!
//! The LOGIN7 message is the first thing the client sends on a session. It
//! carries client identity, capability flags and SQL credentials.
//!
//! ## Layout
//!
//! - a fixed 94-byte header: lengths, versions, flags, then an
//!   `(offset, length)` table for every variable field
//! - the variable data block: UTF-16LE strings in table order, SSPI bytes
//!
//! Offsets are measured from the start of the LOGIN7 payload and lengths
//! count UTF-16 code units (bytes for SSPI). The encoder appends each field
//! to the variable block and records its offset at that moment, then writes
//! the fixed header once the block is complete.
//!
//! ## Security Note
//!
//! The password is obfuscated, not encrypted.

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::{read_utf16_string, write_utf16_string};
use crate::error::ProtocolError;
use crate::packet::DEFAULT_PACKET_SIZE;
use crate::version::TdsVersion;

/// LOGIN7 fixed header size.
pub const LOGIN7_HEADER_SIZE: usize = 94;

bitflags! {
    /// LOGIN7 `OptionFlags1`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct OptionFlags1: u8 {
        /// Big-endian byte order.
        const BYTE_ORDER_BE = 0x01;
        /// EBCDIC character set.
        const CHAR_EBCDIC = 0x02;
        /// VAX floating point (bits 2-3, zero is IEEE 754).
        const FLOAT_VAX = 0x04;
        /// ND5000 floating point.
        const FLOAT_ND5000 = 0x08;
        /// Dump/load off.
        const DUMP_LOAD_OFF = 0x10;
        /// Warn on database change.
        const USE_DB = 0x20;
        /// Fail the login if the initial database cannot be set.
        const DATABASE_FATAL = 0x40;
        /// Warn on language change.
        const SET_LANG = 0x80;
    }
}

bitflags! {
    /// LOGIN7 `OptionFlags2`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct OptionFlags2: u8 {
        /// Fail the login if the initial language cannot be set.
        const LANGUAGE_FATAL = 0x01;
        /// Client is an ODBC driver.
        const ODBC = 0x02;
        /// Obsolete transaction boundary flag.
        const TRAN_BOUNDARY = 0x04;
        /// Obsolete cache-connect flag.
        const CACHE_CONNECT = 0x08;
        /// User type bits (normal, server, remote, replication).
        const USER_TYPE = 0x70;
        /// Integrated (SSPI) security.
        const INTEGRATED_SECURITY = 0x80;
    }
}

bitflags! {
    /// LOGIN7 `TypeFlags`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TypeFlags: u8 {
        /// SQL dialect is T-SQL.
        const SQL_TSQL = 0x01;
        /// Client is an OLE DB provider.
        const OLEDB = 0x10;
        /// Read-only application intent.
        const READ_ONLY_INTENT = 0x20;
    }
}

bitflags! {
    /// LOGIN7 `OptionFlags3`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct OptionFlags3: u8 {
        /// Request a password change.
        const CHANGE_PASSWORD = 0x01;
        /// Request a user instance.
        const USER_INSTANCE = 0x02;
        /// Accept binary XML.
        const SEND_YUKON_BINARY_XML = 0x04;
        /// Accept collations the client does not know.
        const UNKNOWN_COLLATION_HANDLING = 0x08;
        /// A feature-extension block follows.
        const EXTENSION = 0x10;
    }
}

/// LOGIN7 message builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Login7 {
    /// TDS version to request.
    pub tds_version: TdsVersion,
    /// Requested packet size.
    pub packet_size: u32,
    /// Client program version.
    pub client_prog_version: u32,
    /// Client process ID.
    pub client_pid: u32,
    /// Connection ID.
    pub connection_id: u32,
    /// Option flags 1.
    pub option_flags1: OptionFlags1,
    /// Option flags 2.
    pub option_flags2: OptionFlags2,
    /// Type flags.
    pub type_flags: TypeFlags,
    /// Option flags 3.
    pub option_flags3: OptionFlags3,
    /// Client time zone offset in minutes.
    pub client_timezone: i32,
    /// Client LCID (locale ID).
    pub client_lcid: u32,
    /// Client machine name.
    pub hostname: String,
    /// Username for SQL authentication.
    pub username: String,
    /// Password for SQL authentication.
    pub password: String,
    /// Application name.
    pub app_name: String,
    /// Server name.
    pub server_name: String,
    /// Client library name.
    pub library_name: String,
    /// Initial language.
    pub language: String,
    /// Initial database.
    pub database: String,
    /// Client ID (typically a MAC address).
    pub client_id: [u8; 6],
    /// SSPI data for integrated authentication.
    pub sspi_data: Vec<u8>,
    /// Database file to attach.
    pub attach_db_file: String,
    /// New password, when changing it.
    pub new_password: String,
}

impl Default for Login7 {
    fn default() -> Self {
        Self {
            tds_version: TdsVersion::V7_4,
            packet_size: DEFAULT_PACKET_SIZE as u32,
            client_prog_version: 0,
            client_pid: std::process::id(),
            connection_id: 0,
            option_flags1: OptionFlags1::USE_DB
                | OptionFlags1::DATABASE_FATAL
                | OptionFlags1::SET_LANG,
            option_flags2: OptionFlags2::LANGUAGE_FATAL | OptionFlags2::ODBC,
            type_flags: TypeFlags::empty(),
            option_flags3: OptionFlags3::UNKNOWN_COLLATION_HANDLING,
            client_timezone: 0,
            client_lcid: 0x0409,
            hostname: String::new(),
            username: String::new(),
            password: String::new(),
            app_name: String::new(),
            server_name: String::new(),
            library_name: String::new(),
            language: String::new(),
            database: String::new(),
            client_id: [0u8; 6],
            sspi_data: Vec::new(),
            attach_db_file: String::new(),
            new_password: String::new(),
        }
    }
}

/// Variable data block with offset bookkeeping.
struct VarBlock {
    data: BytesMut,
}

impl VarBlock {
    fn offset(&self) -> usize {
        LOGIN7_HEADER_SIZE + self.data.len()
    }

    /// Append a field and return its `(offset, length)` table entry.
    fn push(
        &mut self,
        field: &'static str,
        write: impl FnOnce(&mut BytesMut),
        units: usize,
    ) -> Result<(u16, u16), ProtocolError> {
        let offset = self.offset();
        write(&mut self.data);
        let offset = u16::try_from(offset).map_err(|_| ProtocolError::InvalidField {
            field,
            value: offset as u32,
        })?;
        let len = u16::try_from(units).map_err(|_| ProtocolError::InvalidField {
            field,
            value: units as u32,
        })?;
        Ok((offset, len))
    }

    fn push_str(&mut self, field: &'static str, s: &str) -> Result<(u16, u16), ProtocolError> {
        self.push(field, |b| write_utf16_string(b, s), s.encode_utf16().count())
    }

    fn push_password(&mut self, field: &'static str, s: &str) -> Result<(u16, u16), ProtocolError> {
        self.push(field, |b| write_obfuscated_password(b, s), s.encode_utf16().count())
    }
}

impl Login7 {
    /// Create a new Login7 builder with default flags.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the TDS version.
    #[must_use]
    pub fn with_tds_version(mut self, version: TdsVersion) -> Self {
        self.tds_version = version;
        self
    }

    /// Set SQL authentication credentials.
    #[must_use]
    pub fn with_sql_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self.option_flags2.remove(OptionFlags2::INTEGRATED_SECURITY);
        self
    }

    /// Set the initial database.
    #[must_use]
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Set the client machine name.
    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Set the application name.
    #[must_use]
    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }

    /// Set the server name.
    #[must_use]
    pub fn with_server_name(mut self, server_name: impl Into<String>) -> Self {
        self.server_name = server_name.into();
        self
    }

    /// Set the packet size.
    #[must_use]
    pub fn with_packet_size(mut self, packet_size: u32) -> Self {
        self.packet_size = packet_size;
        self
    }

    /// Enable read-only intent.
    #[must_use]
    pub fn with_read_only_intent(mut self, read_only: bool) -> Self {
        self.type_flags.set(TypeFlags::READ_ONLY_INTENT, read_only);
        self
    }

    /// Encode the LOGIN7 payload.
    ///
    /// Output is a pure function of the builder's fields. Fails only when
    /// the variable data no longer fits the 16-bit offset table.
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let mut var = VarBlock {
            data: BytesMut::with_capacity(256),
        };

        let hostname = var.push_str("hostname", &self.hostname)?;
        let username = var.push_str("username", &self.username)?;
        let password = var.push_password("password", &self.password)?;
        let app_name = var.push_str("app_name", &self.app_name)?;
        let server_name = var.push_str("server_name", &self.server_name)?;
        let library_name = var.push_str("library_name", &self.library_name)?;
        let language = var.push_str("language", &self.language)?;
        let database = var.push_str("database", &self.database)?;
        let sspi = var.push(
            "sspi",
            |b| b.put_slice(&self.sspi_data),
            self.sspi_data.len(),
        )?;
        let attach_db = var.push_str("attach_db_file", &self.attach_db_file)?;
        let new_password = var.push_password("new_password", &self.new_password)?;

        let total_length = var.offset();
        let mut buf = BytesMut::with_capacity(total_length);

        buf.put_u32_le(total_length as u32);
        buf.put_u32_le(self.tds_version.raw());
        buf.put_u32_le(self.packet_size);
        buf.put_u32_le(self.client_prog_version);
        buf.put_u32_le(self.client_pid);
        buf.put_u32_le(self.connection_id);

        buf.put_u8(self.option_flags1.bits());
        buf.put_u8(self.option_flags2.bits());
        buf.put_u8(self.type_flags.bits());
        buf.put_u8(self.option_flags3.bits());

        buf.put_i32_le(self.client_timezone);
        buf.put_u32_le(self.client_lcid);

        for (offset, len) in [hostname, username, password, app_name, server_name] {
            buf.put_u16_le(offset);
            buf.put_u16_le(len);
        }
        // Extension slot: no feature-extension block is sent
        buf.put_u16_le(0);
        buf.put_u16_le(0);
        for (offset, len) in [library_name, language, database] {
            buf.put_u16_le(offset);
            buf.put_u16_le(len);
        }

        buf.put_slice(&self.client_id);

        for (offset, len) in [sspi, attach_db, new_password] {
            buf.put_u16_le(offset);
            buf.put_u16_le(len);
        }

        // SSPI long length, only used above 65535 bytes
        buf.put_u32_le(0);

        debug_assert_eq!(buf.len(), LOGIN7_HEADER_SIZE);
        buf.put_slice(&var.data);

        Ok(buf.freeze())
    }

    /// Decode a LOGIN7 payload, reversing the password obfuscation.
    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        if payload.len() < LOGIN7_HEADER_SIZE {
            return Err(ProtocolError::UnexpectedEof);
        }
        let mut src = payload;

        let total_length = src.get_u32_le() as usize;
        if total_length != payload.len() {
            return Err(ProtocolError::InvalidField {
                field: "length",
                value: total_length as u32,
            });
        }

        let tds_version = TdsVersion::new(src.get_u32_le());
        let packet_size = src.get_u32_le();
        let client_prog_version = src.get_u32_le();
        let client_pid = src.get_u32_le();
        let connection_id = src.get_u32_le();
        let option_flags1 = OptionFlags1::from_bits_retain(src.get_u8());
        let option_flags2 = OptionFlags2::from_bits_retain(src.get_u8());
        let type_flags = TypeFlags::from_bits_retain(src.get_u8());
        let option_flags3 = OptionFlags3::from_bits_retain(src.get_u8());
        let client_timezone = src.get_i32_le();
        let client_lcid = src.get_u32_le();

        let mut table = [(0u16, 0u16); 9];
        for entry in &mut table {
            *entry = (src.get_u16_le(), src.get_u16_le());
        }
        let mut client_id = [0u8; 6];
        src.copy_to_slice(&mut client_id);
        let sspi = (src.get_u16_le(), src.get_u16_le());
        let attach_db = (src.get_u16_le(), src.get_u16_le());
        let new_password = (src.get_u16_le(), src.get_u16_le());

        let field = |name: &'static str, (offset, len): (u16, u16), units: usize| {
            let start = usize::from(offset);
            let end = start + usize::from(len) * units;
            payload.get(start..end).ok_or(ProtocolError::InvalidField {
                field: name,
                value: u32::from(offset),
            })
        };
        let string = |name: &'static str, entry: (u16, u16)| {
            let mut bytes = field(name, entry, 2)?;
            read_utf16_string(&mut bytes, usize::from(entry.1))
        };
        let secret = |name: &'static str, entry: (u16, u16)| deobfuscate_password(field(name, entry, 2)?);

        Ok(Self {
            tds_version,
            packet_size,
            client_prog_version,
            client_pid,
            connection_id,
            option_flags1,
            option_flags2,
            type_flags,
            option_flags3,
            client_timezone,
            client_lcid,
            hostname: string("hostname", table[0])?,
            username: string("username", table[1])?,
            password: secret("password", table[2])?,
            app_name: string("app_name", table[3])?,
            server_name: string("server_name", table[4])?,
            library_name: string("library_name", table[6])?,
            language: string("language", table[7])?,
            database: string("database", table[8])?,
            client_id,
            sspi_data: field("sspi", sspi, 1)?.to_vec(),
            attach_db_file: string("attach_db_file", attach_db)?,
            new_password: secret("new_password", new_password)?,
        })
    }
}

/// Write a password with the LOGIN7 obfuscation: swap the nibbles of
/// every byte of the UTF-16LE form, then XOR with 0xA5.
pub fn write_obfuscated_password(dst: &mut impl BufMut, password: &str) {
    for unit in password.encode_utf16() {
        for byte in unit.to_le_bytes() {
            dst.put_u8(byte.rotate_right(4) ^ 0xA5);
        }
    }
}

/// Reverse [`write_obfuscated_password`].
pub fn deobfuscate_password(data: &[u8]) -> Result<String, ProtocolError> {
    let plain: Vec<u8> = data.iter().map(|b| (b ^ 0xA5).rotate_left(4)).collect();
    let mut src = plain.as_slice();
    read_utf16_string(&mut src, plain.len() / 2)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_login7_default() {
        let login = Login7::new();
        assert_eq!(login.tds_version, TdsVersion::V7_4);
        assert_eq!(login.packet_size, 4096);
        assert!(login.option_flags2.contains(OptionFlags2::ODBC));
    }

    #[test]
    fn test_login7_encode_header_fields() {
        let login = Login7::new()
            .with_hostname("TESTHOST")
            .with_sql_auth("testuser", "testpass")
            .with_database("testdb")
            .with_app_name("TestApp");

        let encoded = login.encode().unwrap();
        let total = u32::from_le_bytes([encoded[0], encoded[1], encoded[2], encoded[3]]);
        assert_eq!(total as usize, encoded.len());

        let tds_version = u32::from_le_bytes([encoded[4], encoded[5], encoded[6], encoded[7]]);
        assert_eq!(tds_version, TdsVersion::V7_4.raw());

        // hostname starts right after the fixed header
        assert_eq!(&encoded[36..40], &[94, 0, 8, 0]);
    }

    #[test]
    fn test_empty_fields_point_at_next_position() {
        let login = Login7::new().with_hostname("ab");
        let encoded = login.encode().unwrap();
        // username is empty: (offset 98, length 0)
        assert_eq!(&encoded[40..44], &[98, 0, 0, 0]);
        // extension slot is always (0, 0)
        assert_eq!(&encoded[56..60], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_password_obfuscation() {
        let mut buf = BytesMut::new();
        write_obfuscated_password(&mut buf, "a");
        // 0x61 -> 0x16 -> 0xB3, 0x00 -> 0x00 -> 0xA5
        assert_eq!(&buf[..], &[0xB3, 0xA5]);
        assert_eq!(deobfuscate_password(&buf).unwrap(), "a");
    }

    #[test]
    fn test_decode_reverses_encode() {
        let login = Login7::new()
            .with_hostname("host")
            .with_sql_auth("sa", "p@ssw0rd")
            .with_database("master")
            .with_read_only_intent(true);
        let decoded = Login7::decode(&login.encode().unwrap()).unwrap();
        assert_eq!(decoded, login);
    }

    #[test]
    fn test_decode_rejects_bad_offsets() {
        let mut encoded = BytesMut::from(&Login7::new().with_hostname("h").encode().unwrap()[..]);
        encoded[36] = 0xFF;
        encoded[37] = 0x7F;
        assert!(matches!(
            Login7::decode(&encoded),
            Err(ProtocolError::InvalidField { field: "hostname", .. })
        ));
    }

    #[test]
    fn test_oversized_fields_fail() {
        let login = Login7::new().with_database("x".repeat(40_000));
        assert!(matches!(
            login.encode(),
            Err(ProtocolError::InvalidField { .. })
        ));
    }
}
