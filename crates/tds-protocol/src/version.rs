//! TDS protocol version definitions.

use std::fmt;

/// TDS protocol version as carried in Login7 and LOGINACK.
///
/// Login7 sends the value little-endian; LOGINACK sends it big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TdsVersion(u32);

impl TdsVersion {
    /// TDS 7.0 (SQL Server 7.0)
    pub const V7_0: Self = Self(0x7000_0000);

    /// TDS 7.1 (SQL Server 2000)
    pub const V7_1: Self = Self(0x7100_0000);

    /// TDS 7.2 (SQL Server 2005)
    pub const V7_2: Self = Self(0x7209_0002);

    /// TDS 7.3A (SQL Server 2008)
    pub const V7_3A: Self = Self(0x730A_0003);

    /// TDS 7.3B (SQL Server 2008 R2)
    pub const V7_3B: Self = Self(0x730B_0003);

    /// TDS 7.4 (SQL Server 2012+)
    pub const V7_4: Self = Self(0x7400_0004);

    /// Create a version from its raw value.
    #[must_use]
    pub const fn new(version: u32) -> Self {
        Self(version)
    }

    /// Get the raw version value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Whether DATE, TIME, DATETIME2 and DATETIMEOFFSET may appear.
    #[must_use]
    pub const fn supports_date_time_types(self) -> bool {
        self.0 >= Self::V7_3A.0
    }

    /// Whether requests must start with an ALL_HEADERS block.
    #[must_use]
    pub const fn requires_all_headers(self) -> bool {
        self.0 >= Self::V7_2.0
    }

    /// Parse "7.0" through "7.4" (with "7.3a"/"7.3b" variants).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "7.0" => Some(Self::V7_0),
            "7.1" => Some(Self::V7_1),
            "7.2" => Some(Self::V7_2),
            "7.3" | "7.3a" => Some(Self::V7_3A),
            "7.3b" => Some(Self::V7_3B),
            "7.4" => Some(Self::V7_4),
            _ => None,
        }
    }

    /// Major version byte (7 for every TDS 7.x).
    #[must_use]
    pub const fn major(self) -> u8 {
        (self.0 >> 28) as u8
    }

    /// Minor version digit.
    #[must_use]
    pub const fn minor(self) -> u8 {
        ((self.0 >> 24) & 0x0F) as u8
    }
}

impl Default for TdsVersion {
    fn default() -> Self {
        Self::V7_4
    }
}

impl fmt::Display for TdsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::V7_3A => f.write_str("7.3A"),
            Self::V7_3B => f.write_str("7.3B"),
            v => write!(f, "{}.{}", v.major(), v.minor()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        assert_eq!(TdsVersion::parse("7.3"), Some(TdsVersion::V7_3A));
        assert_eq!(TdsVersion::parse(" 7.4 "), Some(TdsVersion::V7_4));
        assert_eq!(TdsVersion::parse("8.0"), None);
        assert_eq!(TdsVersion::V7_4.to_string(), "7.4");
        assert_eq!(TdsVersion::V7_3B.to_string(), "7.3B");
    }

    #[test]
    fn test_date_time_support() {
        assert!(!TdsVersion::V7_2.supports_date_time_types());
        assert!(TdsVersion::V7_3A.supports_date_time_types());
    }

    #[test]
    fn test_all_headers_from_7_2() {
        assert!(!TdsVersion::V7_1.requires_all_headers());
        assert!(TdsVersion::V7_2.requires_all_headers());
        assert!(TdsVersion::V7_4.requires_all_headers());
    }
}
