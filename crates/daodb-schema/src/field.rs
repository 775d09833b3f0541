//! Field descriptors.

use daodb_core::{Error, FieldType, Result};

/// How a field's textual value is turned into SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralPolicy {
    /// Single-quoted (`'value'`).
    Quoted,
    /// Emitted as-is (numbers).
    Raw,
    /// Wrapped in the configured date conversion function.
    DateConversion,
    /// Never inlined: bound as a `?` parameter or omitted.
    OutOfBand,
}

/// The rendering policy for a declared type.
pub const fn sql_literal_policy(field_type: FieldType) -> LiteralPolicy {
    if field_type.is_numeric() {
        LiteralPolicy::Raw
    } else if field_type.is_lob() {
        LiteralPolicy::OutOfBand
    } else if matches!(field_type, FieldType::Date) {
        LiteralPolicy::DateConversion
    } else {
        LiteralPolicy::Quoted
    }
}

/// SQL dialect implied by a date conversion format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateStyle {
    /// Numeric style code: `convert(datetime, 'v', 103)`.
    Convert,
    /// Pattern: `to_date('v', 'DD/MM/YYYY')`.
    ToDate,
}

impl DateStyle {
    /// Classify a SQL-side date format.
    pub fn of(format: &str) -> Self {
        if !format.is_empty() && format.bytes().all(|b| b.is_ascii_digit()) {
            DateStyle::Convert
        } else {
            DateStyle::ToDate
        }
    }
}

/// Immutable description of one column.
///
/// Descriptors are built once while a table is declared and then shared by reference
/// between every record that uses the table. The mutable counterpart holding a value is
/// the field instance in `daodb-record`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    name: String,
    field_type: FieldType,
    preset: bool,
    format: Option<String>,
    format_sql: Option<String>,
    size: Option<u32>,
}

impl FieldDescriptor {
    /// Create a descriptor. The name is lower-cased; an empty name is rejected.
    pub fn new(name: &str, field_type: FieldType) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidArgument(
                "field name must not be empty".to_string(),
            ));
        }
        if name.chars().any(char::is_whitespace) {
            return Err(Error::InvalidArgument(format!(
                "field name `{}` contains whitespace",
                name
            )));
        }
        Ok(Self {
            name: name.to_lowercase(),
            field_type,
            preset: false,
            format: None,
            format_sql: None,
            size: None,
        })
    }

    /// Mark the value as supplied by a database default or trigger.
    pub fn preset(mut self, value: bool) -> Self {
        self.preset = value;
        self
    }

    /// Read-side format: a chrono pattern for dates, a `0.00`-style pattern for floats.
    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// SQL-side conversion format for date literals and predicates.
    pub fn format_sql(mut self, format: impl Into<String>) -> Self {
        self.format_sql = Some(format.into());
        self
    }

    /// Declared length for character columns.
    pub fn size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    /// Copy of this descriptor with another declared type.
    pub fn with_type(&self, field_type: FieldType) -> Self {
        Self {
            field_type,
            ..self.clone()
        }
    }

    /// Lower-case column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared type.
    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    /// Whether the database supplies the value.
    pub fn is_preset(&self) -> bool {
        self.preset
    }

    /// Read-side format.
    pub fn read_format(&self) -> Option<&str> {
        self.format.as_deref()
    }

    /// SQL-side format.
    pub fn sql_format(&self) -> Option<&str> {
        self.format_sql.as_deref()
    }

    /// Declared length.
    pub fn declared_size(&self) -> Option<u32> {
        self.size
    }

    /// Rendering policy for this field's type.
    pub fn literal_policy(&self) -> LiteralPolicy {
        sql_literal_policy(self.field_type)
    }

    /// Case-insensitive name comparison.
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_is_lower_cased() {
        let f = FieldDescriptor::new("ItemID", FieldType::IntIdentity).unwrap();
        assert_eq!(f.name(), "itemid");
        assert!(f.is_named("ITEMID"));
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(matches!(
            FieldDescriptor::new("  ", FieldType::Varchar),
            Err(Error::InvalidArgument(_))
        ));
        assert!(FieldDescriptor::new("two words", FieldType::Varchar).is_err());
    }

    #[test]
    fn test_builder_and_type_downgrade() {
        let f = FieldDescriptor::new("created", FieldType::Date)
            .unwrap()
            .preset(true)
            .format("%d/%m/%Y")
            .format_sql("103");
        assert!(f.is_preset());
        assert_eq!(f.read_format(), Some("%d/%m/%Y"));
        let g = f.with_type(FieldType::Integer);
        assert_eq!(g.field_type(), FieldType::Integer);
        assert_eq!(g.sql_format(), Some("103"));
    }

    #[test]
    fn test_literal_policy() {
        assert_eq!(sql_literal_policy(FieldType::Varchar), LiteralPolicy::Quoted);
        assert_eq!(sql_literal_policy(FieldType::IntSequence), LiteralPolicy::Raw);
        assert_eq!(sql_literal_policy(FieldType::Date), LiteralPolicy::DateConversion);
        assert_eq!(sql_literal_policy(FieldType::Other), LiteralPolicy::OutOfBand);
        for numeric in [FieldType::Integer, FieldType::Float, FieldType::IntIdentity] {
            assert_eq!(sql_literal_policy(numeric), LiteralPolicy::Raw);
        }
    }

    #[test]
    fn test_date_style() {
        assert_eq!(DateStyle::of("103"), DateStyle::Convert);
        assert_eq!(DateStyle::of("DD/MM/YYYY"), DateStyle::ToDate);
        assert_eq!(DateStyle::of(""), DateStyle::ToDate);
    }
}
