//! The schema registry.
//!
//! A `SchemaRegistry` owns the table descriptors of one schema. It is populated once at
//! startup and read-only afterwards, so it can be shared freely (`Arc<SchemaRegistry>`)
//! between threads that build records.

use std::fmt;
use std::sync::Arc;

use daodb_core::{DaoConfig, Error, FieldType, Result, bare_name};

use crate::ddl;
use crate::field::FieldDescriptor;
use crate::table::TableDescriptor;

/// Computes the sequence name of a sequence-typed field.
pub type SequenceNamer = Arc<dyn Fn(&TableDescriptor, &FieldDescriptor) -> String + Send + Sync>;

/// Owns the table descriptors of one schema.
pub struct SchemaRegistry {
    name: String,
    tables: Vec<Arc<TableDescriptor>>,
    config: Arc<DaoConfig>,
    sequence_namer: Option<SequenceNamer>,
}

impl SchemaRegistry {
    /// Create an empty registry with the shared default configuration.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, DaoConfig::shared_default())
    }

    /// Create an empty registry with an explicit configuration.
    pub fn with_config(name: impl Into<String>, config: Arc<DaoConfig>) -> Self {
        Self {
            name: name.into(),
            tables: Vec::new(),
            config,
            sequence_namer: None,
        }
    }

    /// Replace the default sequence naming rule.
    pub fn with_sequence_namer(mut self, namer: SequenceNamer) -> Self {
        self.sequence_namer = Some(namer);
        self
    }

    /// Registry name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration shared with records built from this registry.
    pub fn config(&self) -> &Arc<DaoConfig> {
        &self.config
    }

    /// Registered tables in registration order.
    pub fn tables(&self) -> &[Arc<TableDescriptor>] {
        &self.tables
    }

    /// Number of registered tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Whether no table is registered.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Register a table.
    ///
    /// Names are not checked for uniqueness: a later table with the same name shadows the
    /// earlier one in lookups, so re-registering a table replaces it for every record
    /// built afterwards.
    pub fn add_table(&mut self, table: TableDescriptor) -> Arc<TableDescriptor> {
        tracing::debug!(registry = %self.name, table = table.name(), "Registering table");
        let table = Arc::new(table);
        self.tables.push(Arc::clone(&table));
        table
    }

    /// Find a table by name.
    ///
    /// Matching is case-insensitive. When no exact match exists and exactly one of the two
    /// names carries a schema qualifier, the bare names are compared instead; such a
    /// degraded match is logged as a warning. Two differently qualified names never match.
    /// With `strict_table_match` configured the fallback is skipped.
    pub fn get_table(&self, name: &str) -> Result<Arc<TableDescriptor>> {
        let wanted = name.trim();

        if let Some(table) = self
            .tables
            .iter()
            .rev()
            .find(|t| t.name().eq_ignore_ascii_case(wanted))
        {
            return Ok(Arc::clone(table));
        }

        if !self.config.strict_table_match {
            let wanted_bare = bare_name(wanted);
            let wanted_qualified = wanted_bare.len() != wanted.len();
            if let Some(table) = self.tables.iter().rev().find(|t| {
                t.schema().is_some() != wanted_qualified
                    && t.bare_name().eq_ignore_ascii_case(wanted_bare)
            })
            {
                tracing::warn!(
                    registry = %self.name,
                    requested = wanted,
                    matched = table.name(),
                    "Table matched only after stripping schema qualifiers"
                );
                return Ok(Arc::clone(table));
            }
        }

        Err(Error::table_not_found(wanted))
    }

    /// Find a field of a table (both case-insensitive).
    pub fn get_field(&self, table_name: &str, field_name: &str) -> Result<Arc<FieldDescriptor>> {
        let table = self.get_table(table_name)?;
        table
            .field(field_name)
            .cloned()
            .ok_or_else(|| Error::field_not_found(table.name(), field_name))
    }

    /// Register a table derived from `base_name` with extra (audit/history) fields appended.
    ///
    /// When the extra fields bring their own identity or sequence column, the base table's
    /// generated columns become plain integers in the derived table.
    pub fn add_extended_table(
        &mut self,
        new_name: &str,
        base_name: &str,
        extra: Vec<FieldDescriptor>,
    ) -> Result<Arc<TableDescriptor>> {
        let base = self.get_table(base_name)?;
        let extra_generates = extra.iter().any(|f| f.field_type().is_generated());

        let fields: Vec<FieldDescriptor> = base
            .fields()
            .iter()
            .map(|f| {
                if extra_generates && f.field_type().is_generated() {
                    f.with_type(FieldType::Integer)
                } else {
                    FieldDescriptor::clone(f)
                }
            })
            .collect();

        let table = TableDescriptor::with_extra_fields(new_name, fields, &extra)?;
        Ok(self.add_table(table))
    }

    /// Build an extra table from a registered one, keeping only the listed fields.
    pub fn join_table(
        &self,
        name_with_alias: &str,
        join_condition: &str,
        field_names: &[&str],
    ) -> Result<TableDescriptor> {
        let name = name_with_alias.split_whitespace().next().unwrap_or_default();
        let base = self.get_table(name)?;
        let fields = field_names
            .iter()
            .map(|n| {
                base.field(n)
                    .map(|f| FieldDescriptor::clone(f))
                    .ok_or_else(|| Error::field_not_found(base.name(), n))
            })
            .collect::<Result<Vec<_>>>()?;
        let alias = name_with_alias.split_whitespace().nth(1);
        let qualified = match alias {
            Some(alias) => format!("{} {}", base.name(), alias),
            None => base.name().to_string(),
        };
        TableDescriptor::join(&qualified, join_condition, fields)
    }

    /// Sequence name for a field of a table.
    pub fn sequence_name(&self, table: &TableDescriptor, field: &FieldDescriptor) -> String {
        match &self.sequence_namer {
            Some(namer) => namer(table, field),
            None => table.sequence_name(field, &self.config.sequence_suffix),
        }
    }

    /// The effective naming rule as a shareable function.
    pub fn sequence_namer(&self) -> SequenceNamer {
        if let Some(namer) = &self.sequence_namer {
            return Arc::clone(namer);
        }
        let suffix = self.config.sequence_suffix.clone();
        Arc::new(move |table, field| table.sequence_name(field, &suffix))
    }

    /// DDL for every registered table, in registration order.
    pub fn create_all_sql(&self) -> Vec<String> {
        self.tables
            .iter()
            .flat_map(|t| {
                ddl::create_table_statements(t, self.config.datetime_for_date, |f| {
                    self.sequence_name(t, f)
                })
            })
            .collect()
    }
}

impl fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("name", &self.name)
            .field(
                "tables",
                &self.tables.iter().map(|t| t.name()).collect::<Vec<_>>(),
            )
            .field("config", &self.config)
            .field("sequence_namer", &self.sequence_namer.is_some())
            .finish()
    }
}
