//! Records and record sets for daodb.
//!
//! A [`Record`] pairs the descriptors of a main table (and any joined extra tables) with
//! live [`FieldInstance`] values. It tracks its own lifecycle in [`RecordState`], renders
//! the SELECT/INSERT/UPDATE/DELETE statements for its pending change, and saves itself
//! through a [`Gateway`](daodb_core::Gateway).
//!
//! A [`RecordSet`] is an ordered list of records of one shape. Its descriptor record
//! doubles as the search template: values set on it become `where` predicates, and
//! [`RecordSet::save`] flushes every pending row inside one transaction.
//!
//! # Concurrency model
//!
//! UPDATE and DELETE statements match the stored row on every main-table column, using
//! the value seen at the last sync. If another writer changed the row in between, the
//! statement touches no row and the save fails with a conflict error.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use daodb_core::testing::ScriptedGateway;
//! use daodb_core::{FieldType, Row, Value};
//! use daodb_record::{Record, RecordState};
//! use daodb_schema::{FieldDescriptor, TableDescriptor};
//!
//! let item = Arc::new(TableDescriptor::new(
//!     "Item",
//!     vec![
//!         FieldDescriptor::new("itemid", FieldType::IntIdentity)?,
//!         FieldDescriptor::new("description", FieldType::Varchar)?,
//!     ],
//! )?);
//!
//! let mut record = Record::new(item);
//! record.populate_from_result_row(&Row::from_pairs(vec![
//!     ("itemid", Value::Int(1)),
//!     ("description", Value::Text("PC Athlon".to_string())),
//! ]));
//! record.set_field_value("description", "PC Intel")?;
//! assert_eq!(record.state(), RecordState::PendingUpdate);
//! assert_eq!(
//!     record.generate_update_sql()?,
//!     "update ITEM set description='PC Intel' where itemid=1 and description='PC Athlon'"
//! );
//!
//! let mut gateway = ScriptedGateway::new();
//! record.save(&mut gateway)?;
//! assert_eq!(record.state(), RecordState::Loaded);
//! # Ok::<(), daodb_core::Error>(())
//! ```

pub mod field_instance;
pub mod mapping;
pub mod record;
pub mod record_set;
pub mod xml;

pub use field_instance::{ActionHint, FieldInstance};
pub use mapping::{OtherCell, OtherTypeHandler, TextOtherHandler};
pub use record::{FieldKey, Record, RecordState, WhereMode};
pub use record_set::RecordSet;
pub use xml::{LIST_ITEM_TAG, LIST_SUFFIX, NULL_TEXT, RecordFactory, RecordTypeRegistry};
