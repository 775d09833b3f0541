//! The persistence gateway contract.
//!
//! A `Gateway` is the boundary between daodb and an actual database connection. It owns
//! connection lifecycle and transaction state; daodb only hands it finished SQL text and,
//! for large objects, positional parameters.
//!
//! All calls are blocking. A caller that needs a timeout imposes it on the connection the
//! gateway wraps.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::row::Row;
use crate::types::LobKind;

/// Payload of an out-of-band parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LobData {
    /// Bytes for BLOB/binary parameters.
    Bytes(Vec<u8>),
    /// Text for CLOB parameters.
    Text(String),
}

/// A positional parameter bound to a `?` placeholder in generated SQL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobParam {
    /// SQL type tag.
    pub kind: LobKind,
    /// 1-based placeholder position.
    pub position: usize,
    /// The value.
    pub data: LobData,
}

impl LobParam {
    /// Create a parameter.
    pub fn new(kind: LobKind, position: usize, data: LobData) -> Self {
        Self {
            kind,
            position,
            data,
        }
    }

    /// Size of the payload in bytes.
    pub fn len(&self) -> usize {
        match &self.data {
            LobData::Bytes(b) => b.len(),
            LobData::Text(t) => t.len(),
        }
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of a data-modifying statement that may report a generated key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    /// Rows affected by the statement.
    pub rows_affected: u64,
    /// Key generated by the database, when one was requested and reported.
    pub generated_key: Option<String>,
}

impl ExecOutcome {
    /// Outcome without a generated key.
    pub fn rows(rows_affected: u64) -> Self {
        Self {
            rows_affected,
            generated_key: None,
        }
    }

    /// Outcome with a generated key.
    pub fn with_key(rows_affected: u64, key: impl Into<String>) -> Self {
        Self {
            rows_affected,
            generated_key: Some(key.into()),
        }
    }
}

/// Connection, statement and transaction capabilities daodb needs from a database.
pub trait Gateway {
    /// Run a read-only query. Failures are `Error::Query`.
    fn query(&mut self, sql: &str) -> Result<Vec<Row>>;

    /// Run a data-modifying statement and report affected rows. Failures are
    /// `Error::Statement`.
    fn exec_update(&mut self, sql: &str) -> Result<u64>;

    /// Run an INSERT and report the key generated for `key_column`.
    ///
    /// Drivers that cannot report generated keys fail with `Error::Unsupported`
    /// *without* executing the statement.
    fn exec_update_returning_key(&mut self, sql: &str, key_column: &str) -> Result<ExecOutcome>;

    /// Run a statement whose `?` placeholders are bound to `params`.
    fn exec_update_with_params(
        &mut self,
        sql: &str,
        params: &[LobParam],
        key_column: Option<&str>,
    ) -> Result<ExecOutcome>;

    /// Run a query returning a single textual cell (sequence lookups).
    fn query_scalar_string(&mut self, sql: &str) -> Result<String>;

    /// Begin an explicit transaction.
    fn transaction_begin(&mut self) -> Result<()>;

    /// Commit the current transaction.
    fn transaction_commit(&mut self) -> Result<()>;

    /// Roll back the current transaction.
    fn transaction_rollback(&mut self) -> Result<()>;
}

impl<G: Gateway + ?Sized> Gateway for &mut G {
    fn query(&mut self, sql: &str) -> Result<Vec<Row>> {
        (**self).query(sql)
    }

    fn exec_update(&mut self, sql: &str) -> Result<u64> {
        (**self).exec_update(sql)
    }

    fn exec_update_returning_key(&mut self, sql: &str, key_column: &str) -> Result<ExecOutcome> {
        (**self).exec_update_returning_key(sql, key_column)
    }

    fn exec_update_with_params(
        &mut self,
        sql: &str,
        params: &[LobParam],
        key_column: Option<&str>,
    ) -> Result<ExecOutcome> {
        (**self).exec_update_with_params(sql, params, key_column)
    }

    fn query_scalar_string(&mut self, sql: &str) -> Result<String> {
        (**self).query_scalar_string(sql)
    }

    fn transaction_begin(&mut self) -> Result<()> {
        (**self).transaction_begin()
    }

    fn transaction_commit(&mut self) -> Result<()> {
        (**self).transaction_commit()
    }

    fn transaction_rollback(&mut self) -> Result<()> {
        (**self).transaction_rollback()
    }
}
