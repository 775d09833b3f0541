//! DDL generation.
//!
//! The output is advisory scaffolding for development databases and tests, not portable
//! DDL: each declared type maps to one fixed column type and nothing else (keys,
//! constraints, defaults) is emitted.

use daodb_core::FieldType;

use crate::field::FieldDescriptor;
use crate::table::TableDescriptor;

/// Width used for unsized character columns.
pub const DEFAULT_VARCHAR_WIDTH: u32 = 256;

/// Width used for `Other` columns.
pub const OTHER_VARCHAR_WIDTH: u32 = 512;

/// Column type for a field.
pub fn column_type_sql(field: &FieldDescriptor, use_datetime_for_date: bool) -> String {
    match field.field_type() {
        FieldType::Varchar => match field.declared_size() {
            Some(n) => format!("char({})", n),
            None => format!("varchar({})", DEFAULT_VARCHAR_WIDTH),
        },
        FieldType::Integer | FieldType::IntSequence => "int".to_string(),
        FieldType::IntIdentity => "int IDENTITY not null".to_string(),
        FieldType::Float => "float".to_string(),
        FieldType::Date => {
            if use_datetime_for_date {
                "datetime".to_string()
            } else {
                "date".to_string()
            }
        }
        FieldType::Binary | FieldType::Blob => "blob".to_string(),
        FieldType::Clob => "clob".to_string(),
        FieldType::Other => format!("varchar({})", OTHER_VARCHAR_WIDTH),
    }
}

/// `create sequence <name>`.
pub fn create_sequence_sql(sequence_name: &str) -> String {
    format!("create sequence {}", sequence_name)
}

/// The `create table` statement followed by one `create sequence` per sequence field.
pub fn create_table_statements<F>(
    table: &TableDescriptor,
    use_datetime_for_date: bool,
    sequence_name: F,
) -> Vec<String>
where
    F: Fn(&FieldDescriptor) -> String,
{
    tracing::debug!(table = table.name(), "Generating DDL");

    let columns: Vec<String> = table
        .fields()
        .iter()
        .map(|f| format!("{} {}", f.name(), column_type_sql(f, use_datetime_for_date)))
        .collect();

    let mut statements = vec![format!(
        "create table {} ({})",
        table.name(),
        columns.join(", ")
    )];

    statements.extend(
        table
            .fields()
            .iter()
            .filter(|f| f.field_type() == FieldType::IntSequence)
            .map(|f| create_sequence_sql(&sequence_name(f))),
    );

    statements
}
