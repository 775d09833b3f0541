//! Record sets: a parameterized query plus its fetched rows.

use daodb_core::{Error, Gateway, Result, starts_with_keyword};

use crate::record::{FieldKey, Record, RecordState, WhereMode};

/// Keywords after which a free-form condition is appended without `and`.
const TRAILING_CLAUSE_KEYWORDS: [&str; 3] = ["group", "order", "having"];

/// A query described by a descriptor record, and the rows it returned.
///
/// The descriptor doubles as the holder of search parameters (its set values become
/// SELECT predicates) and as the template every result row is stamped from.
#[derive(Debug, Clone)]
pub struct RecordSet {
    descriptor: Record,
    rows: Vec<Record>,
    condition: Option<String>,
}

impl RecordSet {
    /// An empty set over a descriptor record.
    pub fn new(descriptor: Record) -> Self {
        Self {
            descriptor,
            rows: Vec::new(),
            condition: None,
        }
    }

    /// The descriptor record.
    pub fn descriptor(&self) -> &Record {
        &self.descriptor
    }

    /// Mutable access to the descriptor record.
    pub fn descriptor_mut(&mut self) -> &mut Record {
        &mut self.descriptor
    }

    // ========================================================================
    // Search parameters
    // ========================================================================

    /// Match rows whose field equals `value`.
    pub fn set_search_param(&mut self, key: impl FieldKey, value: impl Into<String>) -> Result<()> {
        self.descriptor.set_field_value(key, value)
    }

    /// Match rows whose field is NULL.
    pub fn set_search_null(&mut self, key: impl FieldKey) -> Result<()> {
        self.descriptor.mark_where_is_null(key)
    }

    /// Read this LOB column into every row of subsequent reads.
    ///
    /// The mark stays on the descriptor until it is replaced.
    pub fn mark_lob_for_read(&mut self, key: impl FieldKey) -> Result<()> {
        self.descriptor.mark_lob_for_read(key)
    }

    /// Free-form text appended to the generated SELECT.
    ///
    /// A condition starting with `group`, `order` or `having` is appended as is; anything
    /// else is joined to the generated predicates with `and`. A leading `and` in the
    /// condition itself is dropped, so `"and a.x > 1"` and `"a.x > 1"` render the same.
    pub fn set_condition(&mut self, condition: impl Into<String>) {
        let condition = condition.into();
        self.condition = (!condition.trim().is_empty()).then_some(condition);
    }

    /// The free-form condition.
    pub fn condition(&self) -> Option<&str> {
        self.condition.as_deref()
    }

    /// Forget search values, marks and the free-form condition.
    pub fn reset_search(&mut self) {
        self.descriptor = self.descriptor.empty_template();
        self.condition = None;
    }

    // ========================================================================
    // Reading
    // ========================================================================

    /// `select a.*, o.col, ... from ... [where ...] [condition]`.
    ///
    /// The main table is selected with a wildcard; extra tables contribute only the
    /// fields they declare.
    pub fn generate_select_sql(&self) -> String {
        let descriptor = &self.descriptor;
        let mut columns = vec![format!("{}.*", descriptor.main_table().alias())];
        for extra in descriptor.extra_tables() {
            columns.extend(
                extra
                    .fields()
                    .iter()
                    .map(|f| format!("{}.{}", extra.alias(), f.name())),
            );
        }

        let (from, predicates) = descriptor.where_parts(WhereMode::Select);
        let mut sql = format!(
            "select {} {}",
            columns.join(", "),
            from.unwrap_or_default()
        );
        if !predicates.is_empty() {
            sql.push_str(" where ");
            sql.push_str(&predicates.join(" and "));
        }

        if let Some(condition) = self.condition.as_deref().map(without_leading_and) {
            if condition.is_empty() {
                return sql;
            }
            let trailing_clause = TRAILING_CLAUSE_KEYWORDS
                .iter()
                .any(|kw| starts_with_keyword(condition, kw));
            if trailing_clause {
                sql.push(' ');
            } else if predicates.is_empty() {
                sql.push_str(" where ");
            } else {
                sql.push_str(" and ");
            }
            sql.push_str(condition);
        }
        sql
    }

    /// Run the generated SELECT and replace the rows with its result.
    pub fn read<G: Gateway + ?Sized>(&mut self, gateway: &mut G) -> Result<usize> {
        let sql = self.generate_select_sql();
        self.read_with(gateway, &sql)
    }

    /// Run `sql` and replace the rows with its result, mapped through the descriptor.
    #[tracing::instrument(level = "debug", skip(self, gateway))]
    pub fn read_with<G: Gateway + ?Sized>(&mut self, gateway: &mut G, sql: &str) -> Result<usize> {
        self.rows.clear();
        tracing::debug!(
            sql = %sql,
            table = self.descriptor.main_table().name(),
            "Reading record set"
        );

        let result = gateway.query(sql).inspect_err(|e| {
            tracing::error!(sql = %sql, error = %e, "Query failed");
        })?;

        self.rows.reserve(result.len());
        for row in &result {
            let mut record = self.descriptor.read_template();
            record.populate_from_result_row(row);
            self.rows.push(record);
        }

        tracing::debug!(rows = self.rows.len(), "Record set read");
        Ok(self.rows.len())
    }

    // ========================================================================
    // Saving
    // ========================================================================

    /// Persist every pending row inside one transaction.
    ///
    /// Rows are saved in list order; deleted rows leave the list. When any row fails, or
    /// the commit fails, the transaction is rolled back and every row is restored to its
    /// state before the call. Does not touch the gateway when no row is pending.
    #[tracing::instrument(level = "debug", skip(self, gateway))]
    pub fn save<G: Gateway + ?Sized>(&mut self, gateway: &mut G) -> Result<()> {
        let pending = self.rows.iter().filter(|r| r.state().is_pending()).count();
        if pending == 0 {
            tracing::debug!("No pending rows, nothing to save");
            return Ok(());
        }

        tracing::info!(
            table = self.descriptor.main_table().name(),
            pending,
            "Saving record set"
        );
        let snapshot = self.rows.clone();

        gateway.transaction_begin()?;
        if let Err(e) = self.save_rows(gateway) {
            self.abort(gateway, snapshot);
            return Err(e);
        }
        if let Err(e) = gateway.transaction_commit() {
            tracing::error!(error = %e, "Commit failed");
            self.abort(gateway, snapshot);
            return Err(e);
        }

        tracing::info!(rows = self.rows.len(), "Record set saved");
        Ok(())
    }

    fn save_rows<G: Gateway + ?Sized>(&mut self, gateway: &mut G) -> Result<()> {
        let mut deleted = Vec::new();
        for (index, row) in self.rows.iter_mut().enumerate() {
            let state = row.state();
            if !state.is_pending() {
                continue;
            }
            row.save(gateway)?;
            if state == RecordState::PendingDelete {
                deleted.push(index);
            }
        }
        for index in deleted.into_iter().rev() {
            self.rows.remove(index);
        }
        Ok(())
    }

    fn abort<G: Gateway + ?Sized>(&mut self, gateway: &mut G, snapshot: Vec<Record>) {
        tracing::info!("Rolling back record set save");
        if let Err(e) = gateway.transaction_rollback() {
            tracing::error!(error = %e, "Rollback failed");
        }
        self.rows = snapshot;
    }

    // ========================================================================
    // Rows
    // ========================================================================

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row at a position.
    pub fn row(&self, index: usize) -> Result<&Record> {
        let len = self.rows.len();
        self.rows.get(index).ok_or(Error::OutOfRange { index, len })
    }

    /// Mutable row at a position.
    pub fn row_mut(&mut self, index: usize) -> Result<&mut Record> {
        let len = self.rows.len();
        self.rows
            .get_mut(index)
            .ok_or(Error::OutOfRange { index, len })
    }

    /// All rows.
    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    /// All rows, mutably.
    pub fn rows_mut(&mut self) -> &mut [Record] {
        &mut self.rows
    }

    /// Append a row.
    pub fn add_row(&mut self, record: Record) {
        self.rows.push(record);
    }

    /// A fresh, empty row shaped like the descriptor.
    pub fn new_row(&self) -> Record {
        self.descriptor.empty_template()
    }

    /// Take a row out of the set without deleting it in the database.
    pub fn remove_row(&mut self, index: usize) -> Result<Record> {
        if index >= self.rows.len() {
            return Err(Error::OutOfRange {
                index,
                len: self.rows.len(),
            });
        }
        Ok(self.rows.remove(index))
    }

    /// Drop every row.
    pub fn clear(&mut self) {
        self.rows.clear();
    }

    /// Iterate over the rows.
    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.rows.iter()
    }
}

/// Trim a condition and drop one leading `and` keyword.
fn without_leading_and(condition: &str) -> &str {
    let condition = condition.trim();
    if starts_with_keyword(condition, "and") {
        condition[3..].trim_start()
    } else {
        condition
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
