//! TDS data type identifiers as they appear in column metadata.

use bitflags::bitflags;

/// TDS data type identifiers this client can describe and decode.
///
/// Type bytes outside this set in `COLMETADATA` fail the response with
/// [`crate::ProtocolError::UnsupportedDataType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeId {
    /// Null type.
    Null = 0x1F,
    /// 8-bit unsigned integer.
    Int1 = 0x30,
    /// Bit (boolean).
    Bit = 0x32,
    /// 16-bit signed integer.
    Int2 = 0x34,
    /// 32-bit signed integer.
    Int4 = 0x38,
    /// 64-bit signed integer.
    Int8 = 0x7F,
    /// 32-bit floating point.
    Float4 = 0x3B,
    /// 64-bit floating point.
    Float8 = 0x3E,
    /// 8-byte money.
    Money = 0x3C,
    /// 4-byte money.
    Money4 = 0x7A,
    /// 8-byte datetime.
    DateTime = 0x3D,
    /// 4-byte small datetime.
    DateTime4 = 0x3A,

    /// Nullable GUID.
    Guid = 0x24,
    /// Nullable integer.
    IntN = 0x26,
    /// Legacy decimal.
    Decimal = 0x37,
    /// Legacy numeric.
    Numeric = 0x3F,
    /// Nullable bit.
    BitN = 0x68,
    /// Decimal.
    DecimalN = 0x6A,
    /// Numeric.
    NumericN = 0x6C,
    /// Nullable float.
    FloatN = 0x6D,
    /// Nullable money.
    MoneyN = 0x6E,
    /// Nullable datetime.
    DateTimeN = 0x6F,

    /// Legacy fixed-length character.
    Char = 0x2F,
    /// Legacy variable-length character.
    VarChar = 0x27,
    /// Legacy fixed-length binary.
    Binary = 0x2D,
    /// Legacy variable-length binary.
    VarBinary = 0x25,

    /// Variable-length character.
    BigVarChar = 0xA7,
    /// Variable-length binary.
    BigVarBinary = 0xA5,
    /// Fixed-length character.
    BigChar = 0xAF,
    /// Fixed-length binary.
    BigBinary = 0xAD,
    /// Fixed-length Unicode character.
    NChar = 0xEF,
    /// Variable-length Unicode character.
    NVarChar = 0xE7,

    /// Text.
    Text = 0x23,
    /// Image.
    Image = 0x22,
    /// NText.
    NText = 0x63,

    /// Date (3 bytes).
    Date = 0x28,
    /// Time with scale.
    Time = 0x29,
    /// DateTime2 with scale.
    DateTime2 = 0x2A,
    /// DateTimeOffset with scale.
    DateTimeOffset = 0x2B,

    /// XML.
    Xml = 0xF1,
}

/// Shape of the `TYPE_INFO` that follows a type byte in column metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeInfoLayout {
    /// Nothing follows.
    Fixed,
    /// One length byte.
    ByteLen,
    /// One length byte, precision, scale.
    Decimal,
    /// One length byte, then a collation.
    ByteLenCollation,
    /// Two length bytes.
    UShortLen,
    /// Two length bytes, then a collation.
    UShortLenCollation,
    /// Four length bytes and the table name.
    LongLen,
    /// Four length bytes, a collation, and the table name.
    LongLenCollation,
    /// One scale byte.
    Scale,
    /// XML schema information.
    Xml,
}

impl TypeId {
    /// Create a type ID from a raw byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0x1F => Self::Null,
            0x30 => Self::Int1,
            0x32 => Self::Bit,
            0x34 => Self::Int2,
            0x38 => Self::Int4,
            0x7F => Self::Int8,
            0x3B => Self::Float4,
            0x3E => Self::Float8,
            0x3C => Self::Money,
            0x7A => Self::Money4,
            0x3D => Self::DateTime,
            0x3A => Self::DateTime4,
            0x24 => Self::Guid,
            0x26 => Self::IntN,
            0x37 => Self::Decimal,
            0x3F => Self::Numeric,
            0x68 => Self::BitN,
            0x6A => Self::DecimalN,
            0x6C => Self::NumericN,
            0x6D => Self::FloatN,
            0x6E => Self::MoneyN,
            0x6F => Self::DateTimeN,
            0x2F => Self::Char,
            0x27 => Self::VarChar,
            0x2D => Self::Binary,
            0x25 => Self::VarBinary,
            0xA7 => Self::BigVarChar,
            0xA5 => Self::BigVarBinary,
            0xAF => Self::BigChar,
            0xAD => Self::BigBinary,
            0xEF => Self::NChar,
            0xE7 => Self::NVarChar,
            0x23 => Self::Text,
            0x22 => Self::Image,
            0x63 => Self::NText,
            0x28 => Self::Date,
            0x29 => Self::Time,
            0x2A => Self::DateTime2,
            0x2B => Self::DateTimeOffset,
            0xF1 => Self::Xml,
            _ => return None,
        })
    }

    /// Layout of the metadata that follows this type byte.
    #[must_use]
    pub const fn layout(self) -> TypeInfoLayout {
        match self {
            Self::Null
            | Self::Int1
            | Self::Bit
            | Self::Int2
            | Self::Int4
            | Self::Int8
            | Self::Float4
            | Self::Float8
            | Self::Money
            | Self::Money4
            | Self::DateTime
            | Self::DateTime4
            | Self::Date => TypeInfoLayout::Fixed,
            Self::Guid
            | Self::IntN
            | Self::BitN
            | Self::FloatN
            | Self::MoneyN
            | Self::DateTimeN
            | Self::Binary
            | Self::VarBinary => TypeInfoLayout::ByteLen,
            Self::Decimal | Self::Numeric | Self::DecimalN | Self::NumericN => {
                TypeInfoLayout::Decimal
            }
            Self::Char | Self::VarChar => TypeInfoLayout::ByteLenCollation,
            Self::BigBinary | Self::BigVarBinary => TypeInfoLayout::UShortLen,
            Self::BigChar | Self::BigVarChar | Self::NChar | Self::NVarChar => {
                TypeInfoLayout::UShortLenCollation
            }
            Self::Image => TypeInfoLayout::LongLen,
            Self::Text | Self::NText => TypeInfoLayout::LongLenCollation,
            Self::Time | Self::DateTime2 | Self::DateTimeOffset => TypeInfoLayout::Scale,
            Self::Xml => TypeInfoLayout::Xml,
        }
    }

    /// Check if values of this type carry no length prefix.
    #[must_use]
    pub const fn is_fixed_length(self) -> bool {
        self.fixed_size().is_some()
    }

    /// Check if this is a Unicode type.
    #[must_use]
    pub const fn is_unicode(self) -> bool {
        matches!(self, Self::NChar | Self::NVarChar | Self::NText)
    }

    /// Check if this is a date/time type.
    #[must_use]
    pub const fn is_datetime(self) -> bool {
        matches!(
            self,
            Self::DateTime
                | Self::DateTime4
                | Self::DateTimeN
                | Self::Date
                | Self::Time
                | Self::DateTime2
                | Self::DateTimeOffset
        )
    }

    /// Fixed wire size in bytes, for types without a length prefix.
    #[must_use]
    pub const fn fixed_size(self) -> Option<usize> {
        match self {
            Self::Null => Some(0),
            Self::Int1 | Self::Bit => Some(1),
            Self::Int2 => Some(2),
            Self::Int4 | Self::Float4 | Self::Money4 | Self::DateTime4 => Some(4),
            Self::Int8 | Self::Float8 | Self::Money | Self::DateTime => Some(8),
            _ => None,
        }
    }
}

bitflags! {
    /// Column flags from `COLMETADATA`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct ColumnFlags: u16 {
        /// Column accepts NULL.
        const NULLABLE = 0x0001;
        /// Case-sensitive comparison.
        const CASE_SENSITIVE = 0x0002;
        /// Updateability bits: 0 read-only, 1 read-write, 2 unknown.
        const UPDATEABLE = 0x000C;
        /// Identity column.
        const IDENTITY = 0x0010;
        /// Computed column.
        const COMPUTED = 0x0020;
        /// Fixed-length CLR type.
        const FIXED_LEN_CLR_TYPE = 0x0100;
        /// Sparse column set.
        const SPARSE_COLUMN_SET = 0x0200;
        /// Always Encrypted column.
        const ENCRYPTED = 0x0400;
        /// Hidden column.
        const HIDDEN = 0x2000;
        /// Key column.
        const KEY = 0x4000;
        /// Nullability unknown.
        const NULLABLE_UNKNOWN = 0x8000;
    }
}

impl ColumnFlags {
    /// Whether the column accepts NULL.
    #[must_use]
    pub const fn is_nullable(self) -> bool {
        self.contains(Self::NULLABLE)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_type_id_from_u8() {
        assert_eq!(TypeId::from_u8(0x38), Some(TypeId::Int4));
        assert_eq!(TypeId::from_u8(0xE7), Some(TypeId::NVarChar));
        assert_eq!(TypeId::from_u8(0x62), None); // sql_variant
        assert_eq!(TypeId::from_u8(0x99), None);
    }

    #[test]
    fn test_layouts() {
        assert!(TypeId::Int4.is_fixed_length());
        assert!(!TypeId::Date.is_fixed_length());
        assert_eq!(TypeId::Date.layout(), TypeInfoLayout::Fixed);
        assert_eq!(TypeId::NVarChar.layout(), TypeInfoLayout::UShortLenCollation);
        assert_eq!(TypeId::VarChar.layout(), TypeInfoLayout::ByteLenCollation);
        assert_eq!(TypeId::NumericN.layout(), TypeInfoLayout::Decimal);
        assert_eq!(TypeId::Time.layout(), TypeInfoLayout::Scale);
        assert_eq!(TypeId::Int8.fixed_size(), Some(8));
        assert_eq!(TypeId::IntN.fixed_size(), None);
    }

    #[test]
    fn test_column_flags() {
        // nullable, read-write, identity
        let flags = ColumnFlags::from_bits_retain(0x0015);
        assert!(flags.is_nullable());
        assert!(flags.contains(ColumnFlags::IDENTITY));
        assert_eq!(flags & ColumnFlags::UPDATEABLE, ColumnFlags::from_bits_retain(0x0004));
        assert!(!ColumnFlags::from_bits_retain(0x0014).is_nullable());
    }
}
