//! Schema metadata for daodb.
//!
//! `daodb-schema` describes tables and columns. Nothing here holds a value or talks to a
//! database: descriptors are declared once and then shared by every record built on them.
//!
//! # Layout
//!
//! - [`FieldDescriptor`]: name, declared type, formats and the preset flag of one column.
//! - [`TableDescriptor`]: a named, aliased, ordered list of fields, optionally carrying a
//!   join condition when used as an extra table.
//! - [`SchemaRegistry`]: the tables of one schema, looked up case-insensitively.
//! - [`ddl`]: advisory `create table` / `create sequence` generation.
//!
//! # Example
//!
//! ```
//! use daodb_core::FieldType;
//! use daodb_schema::{FieldDescriptor, SchemaRegistry, TableDescriptor};
//!
//! let mut db = SchemaRegistry::new("shop");
//! db.add_table(
//!     TableDescriptor::new(
//!         "Item",
//!         vec![
//!             FieldDescriptor::new("itemid", FieldType::IntIdentity)?,
//!             FieldDescriptor::new("description", FieldType::Varchar)?,
//!             FieldDescriptor::new("price", FieldType::Float)?.format("0.00"),
//!         ],
//!     )?,
//! );
//! assert_eq!(db.get_table("item")?.alias(), "a");
//! # Ok::<(), daodb_core::Error>(())
//! ```

pub mod ddl;
pub mod field;
pub mod registry;
pub mod table;

pub use field::{DateStyle, FieldDescriptor, LiteralPolicy, sql_literal_policy};
pub use registry::{SchemaRegistry, SequenceNamer};
pub use table::{DEFAULT_ALIAS, TableDescriptor};
