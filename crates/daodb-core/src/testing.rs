//! A scripted in-process gateway.
//!
//! `ScriptedGateway` executes nothing. It records every call as a [`GatewayEvent`] and
//! answers from queues filled by the caller, which makes it suitable both for tests and for
//! dry runs that only need to see the SQL a unit of work would send.
//!
//! ```
//! use daodb_core::testing::{GatewayEvent, ScriptedGateway};
//! use daodb_core::Gateway;
//!
//! let mut gw = ScriptedGateway::new();
//! gw.push_affected_rows(1);
//! assert_eq!(gw.exec_update("delete from ITEM where itemid=1").unwrap(), 1);
//! assert_eq!(gw.statements(), vec!["delete from ITEM where itemid=1"]);
//! assert!(matches!(gw.events()[0], GatewayEvent::Update(_)));
//! ```

use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::gateway::{ExecOutcome, Gateway, LobParam};
use crate::row::Row;

/// One recorded gateway call.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    /// `transaction_begin`.
    Begin,
    /// `transaction_commit`.
    Commit,
    /// `transaction_rollback`.
    Rollback,
    /// `query`.
    Query(String),
    /// `query_scalar_string`.
    Scalar(String),
    /// `exec_update`.
    Update(String),
    /// `exec_update_returning_key`.
    UpdateReturningKey {
        /// Statement text.
        sql: String,
        /// Requested key column.
        key_column: String,
    },
    /// `exec_update_with_params`.
    UpdateWithParams {
        /// Statement text.
        sql: String,
        /// Bound parameters.
        params: Vec<LobParam>,
        /// Requested key column, if any.
        key_column: Option<String>,
    },
}

impl GatewayEvent {
    /// SQL text of data-modifying events.
    pub fn statement_sql(&self) -> Option<&str> {
        match self {
            GatewayEvent::Update(sql)
            | GatewayEvent::UpdateReturningKey { sql, .. }
            | GatewayEvent::UpdateWithParams { sql, .. } => Some(sql),
            _ => None,
        }
    }
}

/// A gateway double answering from scripted queues.
#[derive(Debug)]
pub struct ScriptedGateway {
    events: Vec<GatewayEvent>,
    query_results: VecDeque<Vec<Row>>,
    scalars: VecDeque<String>,
    generated_keys: VecDeque<String>,
    affected_rows: VecDeque<u64>,
    fail_on_statement: Option<usize>,
    statements_seen: usize,
    supports_generated_keys: bool,
    next_key: u64,
    in_transaction: bool,
}

impl Default for ScriptedGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedGateway {
    /// Create a gateway with empty queues.
    ///
    /// Statements affect one row and identity keys count up from 1 unless scripted otherwise.
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            query_results: VecDeque::new(),
            scalars: VecDeque::new(),
            generated_keys: VecDeque::new(),
            affected_rows: VecDeque::new(),
            fail_on_statement: None,
            statements_seen: 0,
            supports_generated_keys: true,
            next_key: 1,
            in_transaction: false,
        }
    }

    /// Simulate a driver that cannot report generated keys.
    pub fn without_generated_keys(mut self) -> Self {
        self.supports_generated_keys = false;
        self
    }

    /// Queue the rows returned by the next `query`.
    pub fn push_rows(&mut self, rows: Vec<Row>) -> &mut Self {
        self.query_results.push_back(rows);
        self
    }

    /// Queue the answer of the next `query_scalar_string`.
    pub fn push_scalar(&mut self, value: impl Into<String>) -> &mut Self {
        self.scalars.push_back(value.into());
        self
    }

    /// Queue the key reported by the next key-returning statement.
    pub fn push_generated_key(&mut self, key: impl Into<String>) -> &mut Self {
        self.generated_keys.push_back(key.into());
        self
    }

    /// Queue the affected-row count of the next data-modifying statement.
    pub fn push_affected_rows(&mut self, rows: u64) -> &mut Self {
        self.affected_rows.push_back(rows);
        self
    }

    /// Fail the n-th (1-based) data-modifying statement with `Error::Statement`.
    pub fn fail_on_statement(&mut self, n: usize) -> &mut Self {
        self.fail_on_statement = Some(n);
        self
    }

    /// Every recorded call, in order.
    pub fn events(&self) -> &[GatewayEvent] {
        &self.events
    }

    /// SQL text of every data-modifying statement, in order.
    pub fn statements(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(GatewayEvent::statement_sql)
            .collect()
    }

    /// SQL text of every `query`, in order.
    pub fn queries(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                GatewayEvent::Query(sql) => Some(sql.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Number of recorded events equal to `event`.
    pub fn count(&self, event: &GatewayEvent) -> usize {
        self.events.iter().filter(|e| *e == event).count()
    }

    /// Whether a transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Forget recorded events.
    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    fn next_statement(&mut self, sql: &str) -> Result<u64> {
        self.statements_seen += 1;
        if self.fail_on_statement == Some(self.statements_seen) {
            tracing::debug!(statement = self.statements_seen, sql, "Injecting scripted failure");
            return Err(Error::statement("scripted statement failure", sql));
        }
        Ok(self.affected_rows.pop_front().unwrap_or(1))
    }

    fn next_key(&mut self) -> String {
        if let Some(key) = self.generated_keys.pop_front() {
            return key;
        }
        let key = self.next_key;
        self.next_key += 1;
        key.to_string()
    }
}

impl Gateway for ScriptedGateway {
    fn query(&mut self, sql: &str) -> Result<Vec<Row>> {
        self.events.push(GatewayEvent::Query(sql.to_string()));
        Ok(self.query_results.pop_front().unwrap_or_default())
    }

    fn exec_update(&mut self, sql: &str) -> Result<u64> {
        self.events.push(GatewayEvent::Update(sql.to_string()));
        self.next_statement(sql)
    }

    fn exec_update_returning_key(&mut self, sql: &str, key_column: &str) -> Result<ExecOutcome> {
        if !self.supports_generated_keys {
            return Err(Error::Unsupported(
                "driver does not report generated keys".to_string(),
            ));
        }
        self.events.push(GatewayEvent::UpdateReturningKey {
            sql: sql.to_string(),
            key_column: key_column.to_string(),
        });
        let rows_affected = self.next_statement(sql)?;
        Ok(ExecOutcome::with_key(rows_affected, self.next_key()))
    }

    fn exec_update_with_params(
        &mut self,
        sql: &str,
        params: &[LobParam],
        key_column: Option<&str>,
    ) -> Result<ExecOutcome> {
        if key_column.is_some() && !self.supports_generated_keys {
            return Err(Error::Unsupported(
                "driver does not report generated keys".to_string(),
            ));
        }
        self.events.push(GatewayEvent::UpdateWithParams {
            sql: sql.to_string(),
            params: params.to_vec(),
            key_column: key_column.map(str::to_string),
        });
        let rows_affected = self.next_statement(sql)?;
        let generated_key = key_column.map(|_| self.next_key());
        Ok(ExecOutcome {
            rows_affected,
            generated_key,
        })
    }

    fn query_scalar_string(&mut self, sql: &str) -> Result<String> {
        self.events.push(GatewayEvent::Scalar(sql.to_string()));
        self.scalars
            .pop_front()
            .ok_or_else(|| Error::query("no scripted scalar result", sql))
    }

    fn transaction_begin(&mut self) -> Result<()> {
        self.events.push(GatewayEvent::Begin);
        self.in_transaction = true;
        Ok(())
    }

    fn transaction_commit(&mut self) -> Result<()> {
        self.events.push(GatewayEvent::Commit);
        self.in_transaction = false;
        Ok(())
    }

    fn transaction_rollback(&mut self) -> Result<()> {
        self.events.push(GatewayEvent::Rollback);
        self.in_transaction = false;
        Ok(())
    }
}
