//! daodb: declarative table/field mapping with dynamic SQL generation.
//!
//! Tables and columns are declared once as descriptors. Records hold live values for one
//! row, know which of them changed, and render the statement that persists the change.
//! Updates and deletes match the stored row on its last-seen values, so a concurrent
//! modification surfaces as a conflict instead of being overwritten.
//!
//! This crate re-exports the workspace:
//!
//! - [`daodb_core`]: errors, types, values, rows, configuration and the [`Gateway`] trait.
//! - [`daodb_schema`]: field and table descriptors, the schema registry, DDL.
//! - [`daodb_record`]: records, record sets, result mapping and the XML form.
//!
//! # Example
//!
//! ```
//! use daodb::prelude::*;
//! use daodb::testing::ScriptedGateway;
//!
//! let mut db = SchemaRegistry::new("shop");
//! db.add_table(TableDescriptor::new(
//!     "Item",
//!     vec![
//!         FieldDescriptor::new("itemID", FieldType::IntIdentity)?,
//!         FieldDescriptor::new("Description", FieldType::Varchar)?,
//!         FieldDescriptor::new("Price", FieldType::Float)?,
//!     ],
//! )?);
//!
//! let mut item = Record::from_registry(&db, "item")?;
//! item.set_field_value("Description", "PC Athlon")?;
//! item.set_field_value("Price", "5.00")?;
//!
//! let mut gateway = ScriptedGateway::new();
//! gateway.push_generated_key("1");
//! item.save(&mut gateway)?;
//!
//! assert_eq!(
//!     gateway.statements(),
//!     vec!["insert into ITEM (description, price) values ('PC Athlon', 5.00)"]
//! );
//! assert_eq!(item.value("itemid")?, Some("1"));
//! assert_eq!(item.state(), RecordState::Loaded);
//! # Ok::<(), daodb::Error>(())
//! ```

pub use daodb_core::{
    ConflictError, DaoConfig, Error, ExecOutcome, FieldType, Gateway, LobData, LobKind,
    LobParam, QueryError, Result, Row, Value, escape_literal,
};
pub use daodb_record::{
    ActionHint, FieldInstance, FieldKey, OtherCell, OtherTypeHandler, Record, RecordFactory,
    RecordSet, RecordState, RecordTypeRegistry, TextOtherHandler, WhereMode,
};
pub use daodb_schema::{FieldDescriptor, SchemaRegistry, SequenceNamer, TableDescriptor};

/// Test doubles: the scripted gateway and its event log.
pub mod testing {
    pub use daodb_core::testing::{GatewayEvent, ScriptedGateway};
}

/// Everything needed to declare tables and work with records.
pub mod prelude {
    pub use daodb_core::{
        DaoConfig, Error, FieldType, Gateway, LobData, LobKind, LobParam, Result, Row, Value,
    };
    pub use daodb_record::{
        FieldInstance, Record, RecordSet, RecordState, RecordTypeRegistry, WhereMode,
    };
    pub use daodb_schema::{FieldDescriptor, SchemaRegistry, TableDescriptor};
}
