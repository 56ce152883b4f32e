//! Result rows and their column descriptions.

use std::sync::Arc;

use tds_protocol::{ColMetaData, ColumnData, TypeId, TypeInfo};
use tds_types::{FromSql, SqlValue, TypeError};

/// Description of one result column.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub struct Column {
    /// Column name, empty for unnamed expressions.
    pub name: String,
    /// Column index (0-based).
    pub index: usize,
    /// Wire type.
    pub type_id: TypeId,
    /// Length, precision, scale and collation.
    pub type_info: TypeInfo,
    /// Whether the column allows NULL values.
    pub nullable: bool,
}

impl Column {
    fn from_metadata(index: usize, data: &ColumnData) -> Self {
        Self {
            name: data.name.clone(),
            index,
            type_id: data.type_id,
            type_info: data.type_info.clone(),
            nullable: data.flags.is_nullable(),
        }
    }

    /// SQL type name, e.g. `INT` or `NVARCHAR`.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self.type_id {
            TypeId::Null => "NULL",
            TypeId::Int1 => "TINYINT",
            TypeId::Bit | TypeId::BitN => "BIT",
            TypeId::Int2 => "SMALLINT",
            TypeId::Int4 => "INT",
            TypeId::Int8 => "BIGINT",
            TypeId::IntN => match self.type_info.length {
                Some(1) => "TINYINT",
                Some(2) => "SMALLINT",
                Some(8) => "BIGINT",
                _ => "INT",
            },
            TypeId::Float4 => "REAL",
            TypeId::Float8 => "FLOAT",
            TypeId::FloatN => match self.type_info.length {
                Some(4) => "REAL",
                _ => "FLOAT",
            },
            TypeId::Money | TypeId::MoneyN => "MONEY",
            TypeId::Money4 => "SMALLMONEY",
            TypeId::DateTime | TypeId::DateTimeN => "DATETIME",
            TypeId::DateTime4 => "SMALLDATETIME",
            TypeId::Guid => "UNIQUEIDENTIFIER",
            TypeId::Decimal | TypeId::DecimalN => "DECIMAL",
            TypeId::Numeric | TypeId::NumericN => "NUMERIC",
            TypeId::Char | TypeId::BigChar => "CHAR",
            TypeId::VarChar | TypeId::BigVarChar => "VARCHAR",
            TypeId::Binary | TypeId::BigBinary => "BINARY",
            TypeId::VarBinary | TypeId::BigVarBinary => "VARBINARY",
            TypeId::NChar => "NCHAR",
            TypeId::NVarChar => "NVARCHAR",
            TypeId::Text => "TEXT",
            TypeId::Image => "IMAGE",
            TypeId::NText => "NTEXT",
            TypeId::Date => "DATE",
            TypeId::Time => "TIME",
            TypeId::DateTime2 => "DATETIME2",
            TypeId::DateTimeOffset => "DATETIMEOFFSET",
            TypeId::Xml => "XML",
        }
    }
}

/// Columns of one result set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnSet {
    columns: Vec<Column>,
}

impl ColumnSet {
    /// Build from decoded column metadata.
    #[must_use]
    pub fn from_metadata(meta: &ColMetaData) -> Self {
        Self {
            columns: meta
                .columns
                .iter()
                .enumerate()
                .map(|(i, c)| Column::from_metadata(i, c))
                .collect(),
        }
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Check if there are no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Get a column by index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    /// Find a column index by name (case-insensitive).
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Iterate over the columns in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Column> {
        self.columns.iter()
    }
}

impl<'a> IntoIterator for &'a ColumnSet {
    type Item = &'a Column;
    type IntoIter = std::slice::Iter<'a, Column>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// One decoded row.
///
/// Values are decoded as the row token arrives; the column set is shared
/// by every row of the same result set.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<ColumnSet>,
    values: Vec<SqlValue>,
}

impl Row {
    /// Create a row from its columns and values.
    #[must_use]
    pub fn new(columns: Arc<ColumnSet>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    /// Get a value by column index, converted to `T`.
    pub fn get<T: FromSql>(&self, index: usize) -> Result<T, TypeError> {
        self.values
            .get(index)
            .ok_or_else(|| TypeError::TypeMismatch {
                expected: "valid column index",
                actual: format!("index {index} out of bounds"),
            })
            .and_then(T::from_sql)
    }

    /// Get a value by column name (case-insensitive), converted to `T`.
    pub fn get_by_name<T: FromSql>(&self, name: &str) -> Result<T, TypeError> {
        let index = self
            .columns
            .find_by_name(name)
            .ok_or_else(|| TypeError::TypeMismatch {
                expected: "valid column name",
                actual: format!("column '{name}' not found"),
            })?;
        self.get(index)
    }

    /// Get a value by index, or `None` if it is NULL, missing or of
    /// another type.
    pub fn try_get<T: FromSql>(&self, index: usize) -> Option<T> {
        self.values
            .get(index)
            .and_then(|v| T::from_sql_nullable(v).ok().flatten())
    }

    /// Get the raw value by index.
    #[must_use]
    pub fn value(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    /// Check if a value is NULL. Missing columns count as NULL.
    #[must_use]
    pub fn is_null(&self, index: usize) -> bool {
        self.values.get(index).is_none_or(SqlValue::is_null)
    }

    /// Number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the row has no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Columns describing this row.
    #[must_use]
    pub fn columns(&self) -> &Arc<ColumnSet> {
        &self.columns
    }

    /// All values in column order.
    #[must_use]
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Take the values out of the row.
    #[must_use]
    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn columns() -> Arc<ColumnSet> {
        let meta = ColMetaData::new(vec![
            ColumnData::new("Id", TypeInfo::intn(4)).unwrap(),
            ColumnData::new("name", TypeInfo::nvarchar(100)).unwrap(),
        ]);
        Arc::new(ColumnSet::from_metadata(&meta))
    }

    #[test]
    fn test_column_set_lookup() {
        let cols = columns();
        assert_eq!(cols.len(), 2);
        assert_eq!(cols.find_by_name("ID"), Some(0));
        assert_eq!(cols.find_by_name("missing"), None);
        assert_eq!(cols.get(0).unwrap().type_name(), "INT");
        assert_eq!(cols.get(1).unwrap().type_name(), "NVARCHAR");
        assert_eq!(cols.get(1).unwrap().index, 1);
        assert!(cols.get(1).unwrap().nullable);
    }

    #[test]
    fn test_typed_access() {
        let row = Row::new(
            columns(),
            vec![SqlValue::Int(7), SqlValue::String("seven".into())],
        );
        assert_eq!(row.get::<i32>(0).unwrap(), 7);
        assert_eq!(row.get::<i64>(0).unwrap(), 7);
        assert_eq!(row.get_by_name::<String>("NAME").unwrap(), "seven");
        assert_eq!(row.value(1), Some(&SqlValue::String("seven".into())));
        assert!(row.value(2).is_none());
    }

    #[test]
    fn test_access_errors() {
        let row = Row::new(columns(), vec![SqlValue::Null, SqlValue::Int(1)]);
        assert!(matches!(row.get::<i32>(0), Err(TypeError::UnexpectedNull)));
        assert_eq!(row.get::<Option<i32>>(0).unwrap(), None);
        assert!(matches!(
            row.get::<i32>(5),
            Err(TypeError::TypeMismatch { expected: "valid column index", .. })
        ));
        assert!(matches!(
            row.get_by_name::<i32>("nope"),
            Err(TypeError::TypeMismatch { expected: "valid column name", .. })
        ));
        assert!(row.get::<String>(1).is_err());
        assert_eq!(row.try_get::<i32>(0), None);
        assert_eq!(row.try_get::<i32>(1), Some(1));
        assert!(row.is_null(0));
        assert!(row.is_null(9));
    }
}
