//! Core types and the gateway contract for daodb.
//!
//! `daodb-core` is the **foundation layer** of the workspace. It defines the types every
//! other crate builds on and the one trait an embedding application has to implement.
//!
//! # Role In The Architecture
//!
//! - **Contract layer**: [`Gateway`] is the connection/statement/transaction boundary that
//!   records and record sets drive. daodb never opens connections itself.
//! - **Data model**: [`FieldType`], [`Value`] and [`Row`] describe declared columns and the
//!   cells a gateway hands back.
//! - **Errors and configuration**: [`Error`] carries the distinguishable error kinds;
//!   [`DaoConfig`] is the immutable settings struct shared behind an `Arc`.
//!
//! # Who Uses This Crate
//!
//! - `daodb-schema` builds field and table descriptors on top of [`FieldType`].
//! - `daodb-record` renders SQL from live field values and calls the [`Gateway`].
//! - Applications implement [`Gateway`] for their driver, or use
//!   [`testing::ScriptedGateway`] in tests and dry runs.

pub mod config;
pub mod error;
pub mod gateway;
pub mod identifiers;
pub mod row;
pub mod testing;
pub mod types;
pub mod value;

pub use config::{DEFAULT_SEQUENCE_SUFFIX, DaoConfig};
pub use error::{ConflictError, Error, QueryError, Result};
pub use gateway::{ExecOutcome, Gateway, LobData, LobParam};
pub use identifiers::{bare_name, escape_literal, is_valid_identifier, starts_with_keyword};
pub use row::Row;
pub use types::{FieldType, LobKind};
pub use value::Value;
