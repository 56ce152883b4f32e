//! Session configuration.

use std::borrow::Cow;

use tds_protocol::{Login7, TdsVersion};

use crate::error::{Error, Result};

/// Longest value, in UTF-16 code units, accepted for most login strings.
pub const MAX_LOGIN_STRING: usize = 128;

/// Longest value, in UTF-16 code units, accepted for the attach-DB file path.
pub const MAX_ATTACH_DB_FILE: usize = 260;

/// Smallest packet size a client may request.
pub const MIN_REQUESTED_PACKET_SIZE: u32 = 512;

/// Largest packet size a client may request.
pub const MAX_REQUESTED_PACKET_SIZE: u32 = 32767;

/// SQL Server authentication credentials.
#[derive(Clone)]
pub struct Credentials {
    username: Cow<'static, str>,
    password: Cow<'static, str>,
}

impl Credentials {
    /// Create SQL Server credentials.
    pub fn sql_server(
        username: impl Into<Cow<'static, str>>,
        password: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Get the username.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    pub(crate) fn password(&self) -> &str {
        &self.password
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Values sent in the login message.
///
/// ```rust,ignore
/// let config = ClientConfig::new()
///     .app_name("billing")
///     .database("ledger")
///     .packet_size(8192);
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Client machine name.
    pub hostname: String,
    /// Application name (shown in server management tools).
    pub app_name: String,
    /// Server name as the client addressed it.
    pub server_name: String,
    /// Client library name.
    pub library_name: String,
    /// Initial language, empty for the server default.
    pub language: String,
    /// Initial database, empty for the login's default.
    pub database: String,
    /// Database file to attach on login.
    pub attach_db_file: String,
    /// Requested packet size. The server may grant a different one.
    pub packet_size: u32,
    /// TDS version to request.
    pub tds_version: TdsVersion,
    /// Client program version.
    pub client_prog_version: u32,
    /// Client process id.
    pub client_pid: u32,
    /// Client time zone offset from UTC, in minutes.
    pub client_timezone: i32,
    /// Client locale id.
    pub client_lcid: u32,
    /// Client id, conventionally a MAC address.
    pub client_id: [u8; 6],
    /// Declare the session read-only.
    pub read_only_intent: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            hostname: String::new(),
            app_name: env!("CARGO_PKG_NAME").to_string(),
            server_name: String::new(),
            library_name: env!("CARGO_PKG_NAME").to_string(),
            language: String::new(),
            database: String::new(),
            attach_db_file: String::new(),
            packet_size: 4096,
            tds_version: TdsVersion::V7_4,
            client_prog_version: 0,
            client_pid: std::process::id(),
            client_timezone: 0,
            client_lcid: 0x0409,
            client_id: [0u8; 6],
            read_only_intent: false,
        }
    }
}

impl ClientConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the client machine name.
    #[must_use]
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Set the application name.
    #[must_use]
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Set the server name.
    #[must_use]
    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }

    /// Set the client library name.
    #[must_use]
    pub fn library_name(mut self, name: impl Into<String>) -> Self {
        self.library_name = name.into();
        self
    }

    /// Set the initial language.
    #[must_use]
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Set the initial database.
    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Set a database file to attach on login.
    #[must_use]
    pub fn attach_db_file(mut self, path: impl Into<String>) -> Self {
        self.attach_db_file = path.into();
        self
    }

    /// Set the requested packet size.
    #[must_use]
    pub fn packet_size(mut self, size: u32) -> Self {
        self.packet_size = size;
        self
    }

    /// Set the TDS version to request.
    #[must_use]
    pub fn tds_version(mut self, version: TdsVersion) -> Self {
        self.tds_version = version;
        self
    }

    /// Set the client program version.
    #[must_use]
    pub fn client_prog_version(mut self, version: u32) -> Self {
        self.client_prog_version = version;
        self
    }

    /// Set the client process id.
    #[must_use]
    pub fn client_pid(mut self, pid: u32) -> Self {
        self.client_pid = pid;
        self
    }

    /// Set the client time zone offset in minutes.
    #[must_use]
    pub fn client_timezone(mut self, minutes: i32) -> Self {
        self.client_timezone = minutes;
        self
    }

    /// Set the client locale id.
    #[must_use]
    pub fn client_lcid(mut self, lcid: u32) -> Self {
        self.client_lcid = lcid;
        self
    }

    /// Set the client id.
    #[must_use]
    pub fn client_id(mut self, id: [u8; 6]) -> Self {
        self.client_id = id;
        self
    }

    /// Declare the session read-only.
    #[must_use]
    pub fn read_only_intent(mut self, read_only: bool) -> Self {
        self.read_only_intent = read_only;
        self
    }

    /// Check the configuration against the login message limits.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_REQUESTED_PACKET_SIZE..=MAX_REQUESTED_PACKET_SIZE).contains(&self.packet_size) {
            return Err(Error::Config(format!(
                "packet size {} outside {MIN_REQUESTED_PACKET_SIZE}..={MAX_REQUESTED_PACKET_SIZE}",
                self.packet_size
            )));
        }
        for (field, value) in [
            ("hostname", &self.hostname),
            ("app_name", &self.app_name),
            ("server_name", &self.server_name),
            ("library_name", &self.library_name),
            ("language", &self.language),
            ("database", &self.database),
        ] {
            check_len(field, value, MAX_LOGIN_STRING)?;
        }
        check_len("attach_db_file", &self.attach_db_file, MAX_ATTACH_DB_FILE)
    }

    /// Build the login message for these settings and credentials.
    pub fn login_message(&self, credentials: &Credentials) -> Result<Login7> {
        self.validate()?;
        check_len("username", credentials.username(), MAX_LOGIN_STRING)?;
        check_len("password", credentials.password(), MAX_LOGIN_STRING)?;

        let mut login = Login7::new()
            .with_tds_version(self.tds_version)
            .with_packet_size(self.packet_size)
            .with_hostname(self.hostname.as_str())
            .with_app_name(self.app_name.as_str())
            .with_server_name(self.server_name.as_str())
            .with_database(self.database.as_str())
            .with_sql_auth(credentials.username(), credentials.password())
            .with_read_only_intent(self.read_only_intent);
        login.library_name.clone_from(&self.library_name);
        login.language.clone_from(&self.language);
        login.attach_db_file.clone_from(&self.attach_db_file);
        login.client_prog_version = self.client_prog_version;
        login.client_pid = self.client_pid;
        login.client_timezone = self.client_timezone;
        login.client_lcid = self.client_lcid;
        login.client_id = self.client_id;
        Ok(login)
    }
}

fn check_len(field: &str, value: &str, max: usize) -> Result<()> {
    let len = value.encode_utf16().count();
    if len > max {
        return Err(Error::Config(format!(
            "{field} is {len} characters long, the limit is {max}"
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ClientConfig::default();
        assert_eq!(config.packet_size, 4096);
        assert_eq!(config.client_lcid, 0x0409);
        assert_eq!(config.tds_version, TdsVersion::V7_4);
        config.validate().unwrap();
    }

    #[test]
    fn test_packet_size_bounds() {
        assert!(ClientConfig::new().packet_size(512).validate().is_ok());
        assert!(ClientConfig::new().packet_size(32767).validate().is_ok());
        assert!(matches!(
            ClientConfig::new().packet_size(511).validate(),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            ClientConfig::new().packet_size(32768).validate(),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_string_limits() {
        let long = "x".repeat(129);
        let err = ClientConfig::new().database(long).validate().unwrap_err();
        assert!(err.to_string().contains("database"));

        let path = "p".repeat(260);
        assert!(ClientConfig::new().attach_db_file(path).validate().is_ok());
        let path = "p".repeat(261);
        assert!(ClientConfig::new().attach_db_file(path).validate().is_err());
    }

    #[test]
    fn test_login_message_carries_settings() {
        let config = ClientConfig::new()
            .hostname("host1")
            .app_name("app")
            .database("ledger")
            .library_name("lib")
            .packet_size(8192)
            .client_pid(42)
            .client_timezone(-300)
            .client_id([1, 2, 3, 4, 5, 6])
            .read_only_intent(true);
        let creds = Credentials::sql_server("sa", "secret");

        let login = config.login_message(&creds).unwrap();
        assert_eq!(login.hostname, "host1");
        assert_eq!(login.username, "sa");
        assert_eq!(login.password, "secret");
        assert_eq!(login.database, "ledger");
        assert_eq!(login.library_name, "lib");
        assert_eq!(login.packet_size, 8192);
        assert_eq!(login.client_pid, 42);
        assert_eq!(login.client_timezone, -300);
        assert_eq!(login.client_id, [1, 2, 3, 4, 5, 6]);

        let decoded = Login7::decode(&login.encode().unwrap()).unwrap();
        assert_eq!(decoded.database, "ledger");
        assert_eq!(decoded.password, "secret");
    }

    #[test]
    fn test_overlong_credentials_rejected() {
        let creds = Credentials::sql_server("u".repeat(129), "pw");
        assert!(matches!(
            ClientConfig::new().login_message(&creds),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = Credentials::sql_server("sa", "hunter2");
        let shown = format!("{creds:?}");
        assert!(shown.contains("sa"));
        assert!(!shown.contains("hunter2"));
    }
}
