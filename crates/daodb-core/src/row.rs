//! Result rows.

use std::sync::Arc;

use crate::value::Value;

/// One row of a query result.
///
/// Column names are shared between all rows of the same result set.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    /// Create a row from column names and values.
    ///
    /// Missing trailing values read as NULL; extra values are ignored by name lookups.
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Build a row from `(column, value)` pairs.
    pub fn from_pairs<I, S, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, V)>,
        S: Into<String>,
        V: Into<Value>,
    {
        let (columns, values): (Vec<String>, Vec<Value>) = pairs
            .into_iter()
            .map(|(c, v)| (c.into(), v.into()))
            .unzip();
        Self {
            columns: columns.into(),
            values,
        }
    }

    /// Column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Value at a 0-based position.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Value of the first column with this name (case-insensitive).
    pub fn get_named(&self, name: &str) -> Option<&Value> {
        self.first_index_of(name).and_then(|i| self.get(i))
    }

    /// Position of the first column with this name (case-insensitive).
    pub fn first_index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| column_matches(c, name))
    }

    /// Position of the last column with this name (case-insensitive).
    pub fn last_index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().rposition(|c| column_matches(c, name))
    }
}

/// Drivers may report qualified labels (`a.price`); match on the bare part too.
fn column_matches(column: &str, name: &str) -> bool {
    if column.eq_ignore_ascii_case(name) {
        return true;
    }
    column
        .rsplit_once('.')
        .is_some_and(|(_, bare)| bare.eq_ignore_ascii_case(name))
}
