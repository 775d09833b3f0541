//! Records: one row spanning a main table and optional extra tables.
//!
//! A [`Record`] owns one [`FieldInstance`] per field of its main table followed by the
//! fields of each extra table, in declaration order. Mutations drive a small state machine
//! and `save` renders INSERT/UPDATE/DELETE from the current field state.
//!
//! # State machine
//!
//! ```text
//! New ──set──▶ PendingInsert ──save──▶ Loaded ──set──▶ PendingUpdate ──save──▶ Loaded
//!  ▲                                      │
//!  └────────save──── PendingDelete ◀──mark_for_delete (from any state)
//! ```
//!
//! Reading a result row into a record always leaves it `Loaded`.
//!
//! # Optimistic concurrency
//!
//! UPDATE and DELETE statements match the whole row as it was last read, not only a key.
//! For fields changed since then the UPDATE predicate uses the value captured before the
//! first change. A statement that affects anything other than exactly one row fails with
//! [`Error::ConcurrencyConflict`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use daodb_core::{
    DaoConfig, Error, ExecOutcome, FieldType, Gateway, LobData, LobKind, LobParam, Result, Row,
    Value, starts_with_keyword,
};
use daodb_schema::{FieldDescriptor, SchemaRegistry, SequenceNamer, TableDescriptor};

use crate::field_instance::{ActionHint, FieldInstance};
use crate::mapping::{self, MappingContext, OtherTypeHandler, TextOtherHandler};

/// Join-clause keywords; conditions starting with one are appended to FROM verbatim.
const JOIN_KEYWORDS: [&str; 4] = ["join", "left", "right", "outer"];

static NULL_CELL: Value = Value::Null;

// ============================================================================
// State and modes
// ============================================================================

/// Lifecycle state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordState {
    /// Never stored, no changes.
    New,
    /// Changed since creation; `save` inserts.
    PendingInsert,
    /// In sync with the database.
    Loaded,
    /// Changed since the last sync; `save` updates.
    PendingUpdate,
    /// Marked for deletion; `save` deletes.
    PendingDelete,
}

impl RecordState {
    /// Whether `save` has work to do.
    pub const fn is_pending(self) -> bool {
        matches!(
            self,
            RecordState::PendingInsert | RecordState::PendingUpdate | RecordState::PendingDelete
        )
    }

    /// Stable lower-case name.
    pub const fn as_str(self) -> &'static str {
        match self {
            RecordState::New => "new",
            RecordState::PendingInsert => "pending_insert",
            RecordState::Loaded => "loaded",
            RecordState::PendingUpdate => "pending_update",
            RecordState::PendingDelete => "pending_delete",
        }
    }
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "new" => Ok(RecordState::New),
            "pending_insert" => Ok(RecordState::PendingInsert),
            "loaded" => Ok(RecordState::Loaded),
            "pending_update" => Ok(RecordState::PendingUpdate),
            "pending_delete" => Ok(RecordState::PendingDelete),
            other => Err(Error::InvalidArgument(format!(
                "unknown record state `{}`",
                other
            ))),
        }
    }
}

/// Which statement a WHERE clause is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhereMode {
    /// SELECT over main and extra tables, alias-qualified.
    Select,
    /// UPDATE of the main table; changed fields match their previous value.
    Update,
    /// DELETE from the main table.
    Delete,
}

// ============================================================================
// Field addressing
// ============================================================================

/// Something that designates one field of a record: a position or a name.
///
/// Names are case-insensitive and may be qualified with a table alias (`"o.orderdata"`).
pub trait FieldKey {
    /// Position of the designated field.
    fn resolve(&self, record: &Record) -> Result<usize>;
}

impl FieldKey for usize {
    fn resolve(&self, record: &Record) -> Result<usize> {
        if *self < record.field_count() {
            Ok(*self)
        } else {
            Err(Error::OutOfRange {
                index: *self,
                len: record.field_count(),
            })
        }
    }
}

impl FieldKey for &str {
    fn resolve(&self, record: &Record) -> Result<usize> {
        record
            .field_index(self)
            .ok_or_else(|| Error::field_not_found(record.main_table().name(), self))
    }
}

impl FieldKey for String {
    fn resolve(&self, record: &Record) -> Result<usize> {
        self.as_str().resolve(record)
    }
}

impl FieldKey for &String {
    fn resolve(&self, record: &Record) -> Result<usize> {
        self.as_str().resolve(record)
    }
}

// ============================================================================
// Record
// ============================================================================

/// One row's in-memory representation.
#[derive(Clone)]
pub struct Record {
    main: Arc<TableDescriptor>,
    extras: Vec<Arc<TableDescriptor>>,
    fields: Vec<FieldInstance>,
    state: RecordState,
    config: Arc<DaoConfig>,
    read_nulls_as_empty: bool,
    type_tag: String,
    other_handler: Arc<dyn OtherTypeHandler>,
    sequence_namer: Option<SequenceNamer>,
}

impl Record {
    /// A new record over a main table, using the shared default configuration.
    pub fn new(main: Arc<TableDescriptor>) -> Self {
        let config = DaoConfig::shared_default();
        let fields = main
            .fields()
            .iter()
            .map(|d| FieldInstance::owned_by(Arc::clone(d), 0))
            .collect();
        Self {
            type_tag: main.bare_name().to_lowercase(),
            read_nulls_as_empty: config.read_nulls_as_empty,
            main,
            extras: Vec::new(),
            fields,
            state: RecordState::New,
            config,
            other_handler: Arc::new(TextOtherHandler),
            sequence_namer: None,
        }
    }

    /// A new record over a registered table, sharing the registry's configuration and
    /// sequence naming rule.
    pub fn from_registry(registry: &SchemaRegistry, table_name: &str) -> Result<Self> {
        let table = registry.get_table(table_name)?;
        Ok(Self::new(table)
            .with_config(Arc::clone(registry.config()))
            .with_sequence_namer(registry.sequence_namer()))
    }

    /// Add an extra table. Its fields follow those already present.
    ///
    /// The table must carry a join condition and an alias not used by any table already
    /// in the record.
    pub fn with_extra(mut self, extra: Arc<TableDescriptor>) -> Result<Self> {
        if !extra.is_join() {
            return Err(Error::InvalidArgument(format!(
                "extra table `{}` has no join condition",
                extra.name()
            )));
        }
        let alias_taken = std::iter::once(&self.main)
            .chain(self.extras.iter())
            .any(|t| t.alias().eq_ignore_ascii_case(extra.alias()));
        if alias_taken {
            return Err(Error::InvalidArgument(format!(
                "alias `{}` of table `{}` is already used in this record",
                extra.alias(),
                extra.name()
            )));
        }
        let table_index = self.extras.len() + 1;
        self.fields.extend(
            extra
                .fields()
                .iter()
                .map(|d| FieldInstance::owned_by(Arc::clone(d), table_index)),
        );
        self.extras.push(extra);
        Ok(self)
    }

    /// Use another configuration. Also resets the read-nulls-as-empty flag to its default.
    pub fn with_config(mut self, config: Arc<DaoConfig>) -> Self {
        self.read_nulls_as_empty = config.read_nulls_as_empty;
        self.config = config;
        self
    }

    /// Override the sequence naming rule.
    pub fn with_sequence_namer(mut self, namer: SequenceNamer) -> Self {
        self.sequence_namer = Some(namer);
        self
    }

    /// Install the hook used for `Other` columns.
    pub fn with_other_handler(mut self, handler: Arc<dyn OtherTypeHandler>) -> Self {
        self.other_handler = handler;
        self
    }

    /// Tag naming this record's kind in the XML form.
    pub fn with_type_tag(mut self, tag: impl Into<String>) -> Self {
        self.type_tag = tag.into();
        self
    }

    /// Read SQL NULL into non-binary fields as the empty string.
    pub fn with_read_nulls_as_empty(mut self, value: bool) -> Self {
        self.read_nulls_as_empty = value;
        self
    }

    /// See [`Record::with_read_nulls_as_empty`].
    pub fn set_read_nulls_as_empty(&mut self, value: bool) {
        self.read_nulls_as_empty = value;
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Lifecycle state.
    pub fn state(&self) -> RecordState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: RecordState) {
        self.state = state;
    }

    /// The main table.
    pub fn main_table(&self) -> &Arc<TableDescriptor> {
        &self.main
    }

    /// Extra tables in join order.
    pub fn extra_tables(&self) -> &[Arc<TableDescriptor>] {
        &self.extras
    }

    /// The configuration in effect.
    pub fn config(&self) -> &Arc<DaoConfig> {
        &self.config
    }

    /// XML type tag.
    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    pub(crate) fn set_type_tag(&mut self, tag: &str) {
        tag.clone_into(&mut self.type_tag);
    }

    /// Whether SQL NULL is read as the empty string.
    pub fn reads_nulls_as_empty(&self) -> bool {
        self.read_nulls_as_empty
    }

    /// All fields: main table first, then each extra table.
    pub fn fields(&self) -> &[FieldInstance] {
        &self.fields
    }

    pub(crate) fn fields_mut(&mut self) -> &mut [FieldInstance] {
        &mut self.fields
    }

    /// Number of fields across all tables.
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// A field by position or name.
    pub fn field(&self, key: impl FieldKey) -> Result<&FieldInstance> {
        let index = key.resolve(self)?;
        Ok(&self.fields[index])
    }

    /// Whether a field with this name exists.
    pub fn has_field(&self, name: &str) -> bool {
        self.field_index(name).is_some()
    }

    /// Position of a field by (optionally alias-qualified) name.
    ///
    /// An unqualified name that appears in several tables designates the first occurrence.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        let name = name.trim();
        if let Some((alias, bare)) = name.split_once('.') {
            let table_index = std::iter::once(&self.main)
                .chain(self.extras.iter())
                .position(|t| t.alias().eq_ignore_ascii_case(alias))?;
            return self
                .fields
                .iter()
                .position(|f| f.table_index() == table_index && f.descriptor().is_named(bare));
        }
        self.fields.iter().position(|f| f.descriptor().is_named(name))
    }

    /// Current textual value of a field.
    pub fn value(&self, key: impl FieldKey) -> Result<Option<&str>> {
        Ok(self.field(key)?.value())
    }

    fn table_of(&self, field: &FieldInstance) -> &TableDescriptor {
        match field.table_index() {
            0 => self.main.as_ref(),
            n => self.extras[n - 1].as_ref(),
        }
    }

    fn main_fields(&self) -> impl Iterator<Item = &FieldInstance> {
        self.fields.iter().filter(|f| f.table_index() == 0)
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Set a field's textual value.
    pub fn set_field_value(&mut self, key: impl FieldKey, value: impl Into<String>) -> Result<()> {
        let index = key.resolve(self)?;
        self.fields[index].set_value(Some(value.into()));
        self.touch();
        Ok(())
    }

    /// Clear a field's value. The change is saved as SQL NULL.
    pub fn set_field_null(&mut self, key: impl FieldKey) -> Result<()> {
        let index = key.resolve(self)?;
        self.fields[index].set_value(None);
        self.touch();
        Ok(())
    }

    /// Set a field to a SQL expression rendered unquoted (`getdate()`).
    pub fn set_field_as_function_call(
        &mut self,
        key: impl FieldKey,
        expression: impl Into<String>,
    ) -> Result<()> {
        let index = key.resolve(self)?;
        self.fields[index].set_function_call(expression);
        self.touch();
        Ok(())
    }

    /// Set a field's binary value.
    pub fn set_binary_value(&mut self, key: impl FieldKey, value: Option<Vec<u8>>) -> Result<()> {
        let index = key.resolve(self)?;
        self.fields[index].set_binary_value(value);
        self.touch();
        Ok(())
    }

    /// Set the opaque payload of an `Other` field.
    pub fn set_other_value(
        &mut self,
        key: impl FieldKey,
        value: Option<serde_json::Value>,
    ) -> Result<()> {
        let index = key.resolve(self)?;
        self.fields[index].set_other_value(value);
        self.touch();
        Ok(())
    }

    /// Force `alias.field is null` into the SELECT predicate.
    pub fn mark_where_is_null(&mut self, key: impl FieldKey) -> Result<()> {
        let index = key.resolve(self)?;
        self.fields[index].mark_where_is_null();
        Ok(())
    }

    /// Populate a LOB field when reading rows stamped from this record.
    pub fn mark_lob_for_read(&mut self, key: impl FieldKey) -> Result<()> {
        let index = key.resolve(self)?;
        self.fields[index].mark_lob_for_read();
        Ok(())
    }

    /// Delete the row on the next `save`, whatever the current state.
    pub fn mark_for_delete(&mut self) {
        self.state = RecordState::PendingDelete;
    }

    fn touch(&mut self) {
        self.state = match self.state {
            RecordState::New => RecordState::PendingInsert,
            RecordState::Loaded => RecordState::PendingUpdate,
            pending => pending,
        };
    }

    // ========================================================================
    // Copies
    // ========================================================================

    /// Independent copy with all values.
    pub fn clone_deep(&self) -> Self {
        self.clone()
    }

    /// Same structure, every field empty and every hint dropped; state `New`.
    pub fn empty_template(&self) -> Self {
        Self {
            fields: self.fields.iter().map(FieldInstance::empty_template).collect(),
            state: RecordState::New,
            ..self.clone_shell()
        }
    }

    /// Same structure, every field empty but action hints kept; state `New`.
    ///
    /// Used to stamp result rows, so a LOB marked for reading on a record set's
    /// descriptor is read into every row.
    pub fn read_template(&self) -> Self {
        Self {
            fields: self.fields.iter().map(FieldInstance::read_template).collect(),
            state: RecordState::New,
            ..self.clone_shell()
        }
    }

    fn clone_shell(&self) -> Self {
        Self {
            main: Arc::clone(&self.main),
            extras: self.extras.clone(),
            fields: Vec::new(),
            state: self.state,
            config: Arc::clone(&self.config),
            read_nulls_as_empty: self.read_nulls_as_empty,
            type_tag: self.type_tag.clone(),
            other_handler: Arc::clone(&self.other_handler),
            sequence_namer: self.sequence_namer.clone(),
        }
    }

    /// Copy the state of same-named fields from another record.
    ///
    /// Fields without a counterpart are left alone. Copying a changed field marks this
    /// record as changed too.
    pub fn populate_values_from(&mut self, other: &Record) {
        let mut copied_dirty = false;
        for field in &mut self.fields {
            if let Some(source) = other.fields.iter().find(|f| f.name() == field.name()) {
                field.populate_from(source);
                copied_dirty |= source.is_dirty();
            }
        }
        if copied_dirty {
            self.touch();
        }
    }

    // ========================================================================
    // Result mapping
    // ========================================================================

    /// Load one result row. Main-table fields take the first column with their name,
    /// extra-table fields the last, so `select a.*, o.x` resolves `x` to `o.x`.
    pub fn populate_from_result_row(&mut self, row: &Row) {
        let ctx = MappingContext {
            date_format: self.config.date_format.as_deref(),
            read_nulls_as_empty: self.read_nulls_as_empty,
            other_handler: self.other_handler.as_ref(),
        };
        for field in &mut self.fields {
            let position = if field.table_index() == 0 {
                row.first_index_of(field.name())
            } else {
                row.last_index_of(field.name())
            };
            let cell = position.map(|i| row.get(i).unwrap_or(&NULL_CELL));
            let mapped = mapping::map_cell(field, cell, &ctx);
            field.load(mapped.value, mapped.binary, mapped.other, mapped.is_null);
        }
        self.state = RecordState::Loaded;
    }

    // ========================================================================
    // SQL generation
    // ========================================================================

    /// The FROM/WHERE fragment for a statement.
    ///
    /// `Select` yields `from MAIN a[, EXTRA o ...][ where ...]` over all tables;
    /// `Update` and `Delete` yield `where ...` over the main table, or an empty string when
    /// there is nothing to match on.
    pub fn build_where_clause(&self, mode: WhereMode) -> String {
        let (from, predicates) = self.where_parts(mode);
        let where_part = if predicates.is_empty() {
            String::new()
        } else {
            format!("where {}", predicates.join(" and "))
        };
        match from {
            Some(from) if where_part.is_empty() => from,
            Some(from) => format!("{} {}", from, where_part),
            None => where_part,
        }
    }

    /// FROM clause (select mode only) and the list of predicates.
    pub(crate) fn where_parts(&self, mode: WhereMode) -> (Option<String>, Vec<String>) {
        let mut predicates = Vec::new();

        let from = (mode == WhereMode::Select).then(|| {
            let mut from = format!("from {}", self.main.from_item());
            for extra in &self.extras {
                let condition = extra.join_condition().unwrap_or_default();
                if JOIN_KEYWORDS
                    .iter()
                    .any(|kw| starts_with_keyword(condition, kw))
                {
                    from.push(' ');
                    from.push_str(condition);
                } else {
                    from.push_str(", ");
                    from.push_str(&extra.from_item());
                    predicates.push(condition.to_string());
                }
            }
            from
        });

        let default_format = self.config.sql_date_format.as_deref();
        let fields = self
            .fields
            .iter()
            .filter(|f| mode == WhereMode::Select || f.table_index() == 0);
        for field in fields {
            if field.field_type().is_lob() || field.action_hint() == ActionHint::IsFunctionCall {
                continue;
            }
            let column = match mode {
                WhereMode::Select => format!("{}.{}", self.table_of(field).alias(), field.name()),
                WhereMode::Update | WhereMode::Delete => field.name().to_string(),
            };
            let (text, observed_null) = if mode == WhereMode::Update && field.is_dirty() {
                (field.previous_value(), field.is_null())
            } else {
                (field.value(), field.is_null() && !field.is_dirty())
            };
            let forced_null =
                mode == WhereMode::Select && field.action_hint() == ActionHint::ForcedNull;

            if observed_null || forced_null {
                predicates.push(format!("{} is null", column));
            } else if let Some(text) = text {
                predicates.push(field.render_predicate(&column, text, default_format));
            }
        }

        (from, predicates)
    }

    /// `delete from MAIN where ...`.
    pub fn generate_delete_sql(&self) -> Result<String> {
        let where_clause = self.build_where_clause(WhereMode::Delete);
        if where_clause.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "refusing to delete from `{}` without a where clause",
                self.main.name()
            )));
        }
        Ok(format!("delete from {} {}", self.main.name(), where_clause))
    }

    /// `insert into MAIN (cols) values (literals)`.
    ///
    /// Identity and sequence columns are never sent: the database fills them. Preset
    /// columns are sent as `default` whatever their value; other columns without a value
    /// are left out.
    pub fn generate_insert_sql(&self) -> Result<String> {
        let (columns, values, _) = self.insert_items();
        if columns.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "nothing to insert into `{}`",
                self.main.name()
            )));
        }
        Ok(format!(
            "insert into {} ({}) values ({})",
            self.main.name(),
            columns.join(", "),
            values.join(", ")
        ))
    }

    /// `update MAIN set col=literal, ... where <previous row>`.
    pub fn generate_update_sql(&self) -> Result<String> {
        let (assignments, _) = self.update_items();
        if assignments.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "nothing to update in `{}`",
                self.main.name()
            )));
        }
        let where_clause = self.build_where_clause(WhereMode::Update);
        if where_clause.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "refusing to update `{}` without a where clause",
                self.main.name()
            )));
        }
        Ok(format!(
            "update {} set {} {}",
            self.main.name(),
            assignments.join(", "),
            where_clause
        ))
    }

    fn insert_items(&self) -> (Vec<&str>, Vec<String>, Vec<LobParam>) {
        let default_format = self.config.sql_date_format.as_deref();
        let mut columns = Vec::new();
        let mut values = Vec::new();
        let mut params = Vec::new();
        for field in self.main_fields() {
            if field.field_type().is_generated() {
                continue;
            }
            if field.descriptor().is_preset() {
                columns.push(field.name());
                values.push("default".to_string());
                continue;
            }
            if !field.has_content() {
                continue;
            }
            let literal = field.render_sql_literal(default_format);
            if literal.is_empty() {
                continue;
            }
            if is_placeholder(field, &literal) {
                params.push(self.lob_param(field, params.len() + 1));
            }
            columns.push(field.name());
            values.push(literal);
        }
        (columns, values, params)
    }

    fn update_items(&self) -> (Vec<String>, Vec<LobParam>) {
        let default_format = self.config.sql_date_format.as_deref();
        let mut assignments = Vec::new();
        let mut params = Vec::new();
        for field in self.main_fields() {
            if field.field_type() == FieldType::IntIdentity {
                continue;
            }
            if field.descriptor().is_preset() {
                assignments.push(format!("{}=default", field.name()));
                continue;
            }
            if !field.is_dirty() {
                continue;
            }
            let literal = field.render_sql_literal(default_format);
            if literal.is_empty() {
                continue;
            }
            if is_placeholder(field, &literal) {
                params.push(self.lob_param(field, params.len() + 1));
            }
            assignments.push(format!("{}={}", field.name(), literal));
        }
        (assignments, params)
    }

    fn lob_param(&self, field: &FieldInstance, position: usize) -> LobParam {
        let as_bytes = || {
            field
                .binary_value()
                .map(<[u8]>::to_vec)
                .or_else(|| field.value().map(|v| v.as_bytes().to_vec()))
                .unwrap_or_default()
        };
        match field.field_type().lob_kind() {
            Some(LobKind::Clob) => {
                let text = field
                    .value()
                    .map(str::to_string)
                    .or_else(|| {
                        field
                            .binary_value()
                            .map(|b| String::from_utf8_lossy(b).into_owned())
                    })
                    .unwrap_or_default();
                LobParam::new(LobKind::Clob, position, LobData::Text(text))
            }
            Some(kind) => LobParam::new(kind, position, LobData::Bytes(as_bytes())),
            None => {
                let (kind, data) = self.other_handler.bind(field);
                LobParam::new(kind, position, data)
            }
        }
    }

    /// Sequence name for a field of the main table.
    pub fn sequence_name(&self, field: &FieldDescriptor) -> String {
        match &self.sequence_namer {
            Some(namer) => namer(&self.main, field),
            None => self.main.sequence_name(field, &self.config.sequence_suffix),
        }
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Persist pending changes.
    ///
    /// Does nothing unless the record is `PendingInsert`, `PendingUpdate` or
    /// `PendingDelete`. The gateway's errors are logged with the statement text and
    /// returned unchanged; a statement affecting other than one row fails with
    /// [`Error::ConcurrencyConflict`]. No transaction is opened here.
    #[tracing::instrument(level = "debug", skip(self, gateway), fields(table = %self.main.name()))]
    pub fn save<G: Gateway + ?Sized>(&mut self, gateway: &mut G) -> Result<()> {
        self.save_inner(gateway, None)
    }

    /// Like [`Record::save`], executing `sql` instead of the generated statement.
    ///
    /// LOB parameters are still collected from the fields.
    #[tracing::instrument(level = "debug", skip(self, gateway), fields(table = %self.main.name()))]
    pub fn save_with_sql<G: Gateway + ?Sized>(&mut self, gateway: &mut G, sql: &str) -> Result<()> {
        self.save_inner(gateway, Some(sql))
    }

    fn save_inner<G: Gateway + ?Sized>(
        &mut self,
        gateway: &mut G,
        override_sql: Option<&str>,
    ) -> Result<()> {
        match self.state {
            RecordState::PendingInsert => self.save_insert(gateway, override_sql),
            RecordState::PendingUpdate => self.save_update(gateway, override_sql),
            RecordState::PendingDelete => self.save_delete(gateway, override_sql),
            RecordState::New | RecordState::Loaded => {
                tracing::debug!(state = %self.state, "Nothing to save");
                Ok(())
            }
        }
    }

    fn save_insert<G: Gateway + ?Sized>(
        &mut self,
        gateway: &mut G,
        override_sql: Option<&str>,
    ) -> Result<()> {
        self.assign_sequence_values(gateway)?;

        let key_column = self
            .main_fields()
            .find(|f| f.field_type() == FieldType::IntIdentity && f.value().is_none())
            .map(|f| f.name().to_string());

        let sql = match override_sql {
            Some(sql) => sql.to_string(),
            None => self.generate_insert_sql()?,
        };
        let (_, _, params) = self.insert_items();

        tracing::debug!(sql = %sql, params = params.len(), "Inserting record");
        let outcome = self.execute(gateway, &sql, &params, key_column.as_deref())?;
        self.expect_single_row(&sql, outcome.rows_affected)?;

        if let (Some(column), Some(key)) = (key_column, outcome.generated_key) {
            if let Some(field) = self
                .fields
                .iter_mut()
                .find(|f| f.table_index() == 0 && f.name() == column)
            {
                field.assign_synced(key);
            }
        }
        self.sync_main_fields();
        self.state = RecordState::Loaded;
        Ok(())
    }

    fn save_update<G: Gateway + ?Sized>(
        &mut self,
        gateway: &mut G,
        override_sql: Option<&str>,
    ) -> Result<()> {
        let changed = self
            .main_fields()
            .any(|f| f.is_dirty() && f.field_type() != FieldType::IntIdentity);
        if !changed && override_sql.is_none() {
            tracing::debug!("No main-table field changed, skipping update");
            self.sync_main_fields();
            self.state = RecordState::Loaded;
            return Ok(());
        }

        let sql = match override_sql {
            Some(sql) => sql.to_string(),
            None => self.generate_update_sql()?,
        };
        let (_, params) = self.update_items();

        tracing::debug!(sql = %sql, params = params.len(), "Updating record");
        let outcome = self.execute(gateway, &sql, &params, None)?;
        self.expect_single_row(&sql, outcome.rows_affected)?;

        self.sync_main_fields();
        self.state = RecordState::Loaded;
        Ok(())
    }

    fn save_delete<G: Gateway + ?Sized>(
        &mut self,
        gateway: &mut G,
        override_sql: Option<&str>,
    ) -> Result<()> {
        let sql = match override_sql {
            Some(sql) => sql.to_string(),
            None => self.generate_delete_sql()?,
        };

        tracing::debug!(sql = %sql, "Deleting record");
        let rows = gateway.exec_update(&sql).inspect_err(|e| {
            tracing::error!(sql = %sql, error = %e, "Delete failed");
        })?;
        self.expect_single_row(&sql, rows)?;

        self.fields.iter_mut().for_each(FieldInstance::clear);
        self.state = RecordState::New;
        Ok(())
    }

    fn assign_sequence_values<G: Gateway + ?Sized>(&mut self, gateway: &mut G) -> Result<()> {
        for index in 0..self.fields.len() {
            let field = &self.fields[index];
            if field.table_index() != 0
                || field.field_type() != FieldType::IntSequence
                || field.value().is_some()
            {
                continue;
            }
            let sql = format!(
                "select {}.nextval from dual",
                self.sequence_name(field.descriptor())
            );
            tracing::debug!(sql = %sql, field = field.name(), "Fetching sequence value");
            let next = gateway.query_scalar_string(&sql).inspect_err(|e| {
                tracing::error!(sql = %sql, error = %e, "Sequence lookup failed");
            })?;
            self.fields[index].assign_synced(next.trim().to_string());
        }
        Ok(())
    }

    /// Run a data-modifying statement through the most specific gateway call.
    fn execute<G: Gateway + ?Sized>(
        &self,
        gateway: &mut G,
        sql: &str,
        params: &[LobParam],
        key_column: Option<&str>,
    ) -> Result<ExecOutcome> {
        let result = match key_column {
            _ if !params.is_empty() => gateway.exec_update_with_params(sql, params, key_column),
            Some(key) => gateway.exec_update_returning_key(sql, key),
            None => gateway.exec_update(sql).map(ExecOutcome::rows),
        };

        let result = match result {
            Err(Error::Unsupported(reason)) if key_column.is_some() => {
                tracing::warn!(
                    table = self.main.name(),
                    reason = %reason,
                    "Generated keys unavailable, inserting without key retrieval"
                );
                if params.is_empty() {
                    gateway.exec_update(sql).map(ExecOutcome::rows)
                } else {
                    gateway.exec_update_with_params(sql, params, None)
                }
            }
            other => other,
        };

        result.inspect_err(|e| {
            tracing::error!(sql = %sql, error = %e, "Statement failed");
        })
    }

    fn expect_single_row(&self, sql: &str, rows_affected: u64) -> Result<()> {
        if rows_affected == 1 {
            return Ok(());
        }
        tracing::error!(
            sql = %sql,
            rows_affected,
            table = self.main.name(),
            "Statement did not affect exactly one row"
        );
        Err(Error::conflict(sql, rows_affected))
    }

    fn sync_main_fields(&mut self) {
        self.fields
            .iter_mut()
            .filter(|f| f.table_index() == 0)
            .for_each(FieldInstance::mark_synced);
    }
}

/// Whether `literal` is the out-of-band placeholder of a LOB-like field.
fn is_placeholder(field: &FieldInstance, literal: &str) -> bool {
    field.field_type().is_lob()
        && field.action_hint() != ActionHint::IsFunctionCall
        && literal == "?"
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("main", &self.main.name())
            .field(
                "extras",
                &self.extras.iter().map(|t| t.name()).collect::<Vec<_>>(),
            )
            .field("state", &self.state)
            .field("fields", &self.fields)
            .field("type_tag", &self.type_tag)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daodb_core::testing::{GatewayEvent, ScriptedGateway};

    fn field(name: &str, ty: FieldType) -> FieldDescriptor {
        FieldDescriptor::new(name, ty).unwrap()
    }

    fn item_table() -> Arc<TableDescriptor> {
        Arc::new(
            TableDescriptor::new(
                "Item",
                vec![
                    field("itemID", FieldType::IntIdentity),
                    field("Description", FieldType::Varchar),
                    field("Price", FieldType::Float),
                ],
            )
            .unwrap(),
        )
    }

    fn loaded_item() -> Record {
        let mut item = Record::new(item_table());
        item.populate_from_result_row(&Row::from_pairs([
            ("itemid", Value::Int(1)),
            ("description", Value::from("PC Athlon")),
            ("price", Value::Decimal("5.00".to_string())),
        ]));
        item
    }

    #[test]
    fn test_state_machine() {
        let mut item = Record::new(item_table());
        assert_eq!(item.state(), RecordState::New);
        item.set_field_value("description", "PC").unwrap();
        assert_eq!(item.state(), RecordState::PendingInsert);

        let mut loaded = loaded_item();
        assert_eq!(loaded.state(), RecordState::Loaded);
        loaded.set_field_value("price", "6.00").unwrap();
        assert_eq!(loaded.state(), RecordState::PendingUpdate);
        loaded.mark_for_delete();
        loaded.set_field_value("price", "7.00").unwrap();
        assert_eq!(loaded.state(), RecordState::PendingDelete);
    }

    #[test]
    fn test_field_lookup() {
        let item = Record::new(item_table());
        assert_eq!(item.field_count(), 3);
        assert_eq!(item.field("PRICE").unwrap().name(), "price");
        assert_eq!(item.field("a.price").unwrap().name(), "price");
        assert_eq!(item.field(1usize).unwrap().name(), "description");
        assert!(matches!(
            item.field(3usize),
            Err(Error::OutOfRange { index: 3, len: 3 })
        ));
        assert!(item.field("weight").unwrap_err().is_not_found());
        assert!(item.field("x.price").is_err());
        assert!(item.has_field("ItemId"));
    }

    #[test]
    fn test_extra_alias_must_be_unique() {
        let join = Arc::new(
            TableDescriptor::join("Item a", "a.itemid = a.itemid", vec![]).unwrap(),
        );
        assert!(Record::new(item_table()).with_extra(join).is_err());

        let not_join = item_table();
        assert!(Record::new(item_table()).with_extra(not_join).is_err());
    }

    #[test]
    fn test_insert_sql() {
        let mut item = Record::new(item_table());
        item.set_field_value("Description", "PC Athlon").unwrap();
        item.set_field_value("Price", "5.00").unwrap();
        assert_eq!(
            item.generate_insert_sql().unwrap(),
            "insert into ITEM (description, price) values ('PC Athlon', 5.00)"
        );
    }

    #[test]
    fn test_insert_skips_generated_columns() {
        let table = Arc::new(
            TableDescriptor::new(
                "Invoice",
                vec![
                    field("invoiceid", FieldType::IntSequence),
                    field("lineno", FieldType::IntIdentity),
                    field("total", FieldType::Float),
                ],
            )
            .unwrap(),
        );
        let mut invoice = Record::new(table);
        invoice.set_field_value("invoiceid", "100").unwrap();
        invoice.set_field_value("lineno", "3").unwrap();
        invoice.set_field_value("total", "9.50").unwrap();
        assert_eq!(
            invoice.generate_insert_sql().unwrap(),
            "insert into INVOICE (total) values (9.50)"
        );
    }

    #[test]
    fn test_insert_preset_uses_default() {
        let table = Arc::new(
            TableDescriptor::new(
                "Note",
                vec![
                    field("body", FieldType::Varchar),
                    field("created", FieldType::Date).preset(true),
                ],
            )
            .unwrap(),
        );
        let mut note = Record::new(table);
        note.set_field_value("body", "hi").unwrap();
        note.set_field_value("created", "2003-02-01").unwrap();
        assert_eq!(
            note.generate_insert_sql().unwrap(),
            "insert into NOTE (body, created) values ('hi', default)"
        );
    }

    #[test]
    fn test_update_uses_previous_value() {
        let mut item = loaded_item();
        item.set_field_value("description", "PC Intel").unwrap();
        assert_eq!(
            item.generate_update_sql().unwrap(),
            "update ITEM set description='PC Intel' where itemid=1 and description='PC Athlon' and price=5.00"
        );
    }

    #[test]
    fn test_update_null_previous_value() {
        let mut item = Record::new(item_table());
        item.populate_from_result_row(&Row::from_pairs([
            ("itemid", Value::Int(2)),
            ("description", Value::Null),
            ("price", Value::Null),
        ]));
        item.set_field_value("description", "named").unwrap();
        assert_eq!(
            item.generate_update_sql().unwrap(),
            "update ITEM set description='named' where itemid=2 and description is null and price is null"
        );
    }

    #[test]
    fn test_delete_sql_and_empty_where() {
        let mut item = loaded_item();
        item.mark_for_delete();
        assert_eq!(
            item.generate_delete_sql().unwrap(),
            "delete from ITEM where itemid=1 and description='PC Athlon' and price=5.00"
        );
        let fresh = Record::new(item_table());
        assert!(matches!(
            fresh.generate_delete_sql(),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_where_skips_function_calls_and_lobs() {
        let table = Arc::new(
            TableDescriptor::new(
                "Doc",
                vec![
                    field("docid", FieldType::Integer),
                    field("body", FieldType::Clob),
                    field("stamp", FieldType::Date),
                ],
            )
            .unwrap(),
        );
        let mut doc = Record::new(table);
        doc.set_field_value("docid", "4").unwrap();
        doc.set_field_value("body", "text").unwrap();
        doc.set_field_as_function_call("stamp", "getdate()").unwrap();
        assert_eq!(
            doc.build_where_clause(WhereMode::Select),
            "from DOC a where a.docid=4"
        );
    }

    #[test]
    fn test_save_insert_assigns_identity() {
        let mut gw = ScriptedGateway::new();
        gw.push_generated_key("41");
        let mut item = Record::new(item_table());
        item.set_field_value("description", "PC Athlon").unwrap();
        item.save(&mut gw).unwrap();

        assert_eq!(item.state(), RecordState::Loaded);
        assert_eq!(item.value("itemid").unwrap(), Some("41"));
        assert!(!item.field("itemid").unwrap().is_dirty());
        assert_eq!(
            gw.events()[0],
            GatewayEvent::UpdateReturningKey {
                sql: "insert into ITEM (description) values ('PC Athlon')".to_string(),
                key_column: "itemid".to_string(),
            }
        );
    }

    #[test]
    fn test_save_insert_without_key_support() {
        let mut gw = ScriptedGateway::new().without_generated_keys();
        let mut item = Record::new(item_table());
        item.set_field_value("description", "PC").unwrap();
        item.save(&mut gw).unwrap();
        assert_eq!(item.state(), RecordState::Loaded);
        assert_eq!(item.value("itemid").unwrap(), None);
        assert_eq!(
            gw.events(),
            &[GatewayEvent::Update(
                "insert into ITEM (description) values ('PC')".to_string()
            )]
        );
    }

    #[test]
    fn test_save_insert_with_sequence() {
        let table = Arc::new(
            TableDescriptor::new(
                "sales.Invoice",
                vec![
                    field("invoiceid", FieldType::IntSequence),
                    field("total", FieldType::Float),
                ],
            )
            .unwrap(),
        );
        let mut gw = ScriptedGateway::new();
        gw.push_scalar("100");
        let mut invoice = Record::new(table);
        invoice.set_field_value("total", "9.50").unwrap();
        invoice.save(&mut gw).unwrap();

        assert_eq!(invoice.value("invoiceid").unwrap(), Some("100"));
        assert_eq!(
            gw.events(),
            &[
                GatewayEvent::Scalar("select SALES.invoiceid_sq.nextval from dual".to_string()),
                GatewayEvent::Update(
                    "insert into SALES.INVOICE (total) values (9.50)".to_string()
                ),
            ]
        );
    }

    #[test]
    fn test_save_update_conflict() {
        let mut gw = ScriptedGateway::new();
        gw.push_affected_rows(0);
        let mut item = loaded_item();
        item.set_field_value("price", "6.00").unwrap();
        let err = item.save(&mut gw).unwrap_err();
        assert!(err.is_concurrency_conflict());
        assert!(err.is_retryable());
        assert_eq!(item.state(), RecordState::PendingUpdate);
        assert!(item.field("price").unwrap().is_dirty());
    }

    #[test]
    fn test_save_syncs_dirty_fields() {
        let mut gw = ScriptedGateway::new();
        let mut item = loaded_item();
        item.set_field_value("price", "6.00").unwrap();
        item.save(&mut gw).unwrap();
        let price = item.field("price").unwrap();
        assert!(!price.is_dirty());
        assert_eq!(price.previous_value(), price.value());
        assert_eq!(item.state(), RecordState::Loaded);
    }

    #[test]
    fn test_save_delete_clears_fields() {
        let mut gw = ScriptedGateway::new();
        let mut item = loaded_item();
        item.mark_for_delete();
        item.save(&mut gw).unwrap();
        assert_eq!(item.state(), RecordState::New);
        assert!(item.fields().iter().all(|f| !f.has_content()));
    }

    #[test]
    fn test_save_noop_when_not_pending() {
        let mut gw = ScriptedGateway::new();
        let mut item = loaded_item();
        item.save(&mut gw).unwrap();
        assert!(gw.events().is_empty());
    }

    #[test]
    fn test_save_binds_lob_parameters() {
        let table = Arc::new(
            TableDescriptor::new(
                "Photo",
                vec![
                    field("photoid", FieldType::Integer),
                    field("image", FieldType::Blob),
                    field("caption", FieldType::Clob),
                ],
            )
            .unwrap(),
        );
        let mut photo = Record::new(table);
        photo.populate_from_result_row(&Row::from_pairs([
            ("photoid", Value::Int(3)),
            ("image", Value::Null),
            ("caption", Value::Null),
        ]));
        photo.set_binary_value("image", Some(vec![0xca, 0xfe])).unwrap();
        photo.set_field_value("caption", "sunset").unwrap();

        let mut gw = ScriptedGateway::new();
        photo.save(&mut gw).unwrap();
        match &gw.events()[0] {
            GatewayEvent::UpdateWithParams {
                sql,
                params,
                key_column,
            } => {
                assert_eq!(sql, "update PHOTO set image=?, caption=? where photoid=3");
                assert_eq!(key_column, &None);
                assert_eq!(
                    params,
                    &vec![
                        LobParam::new(LobKind::Blob, 1, LobData::Bytes(vec![0xca, 0xfe])),
                        LobParam::new(LobKind::Clob, 2, LobData::Text("sunset".to_string())),
                    ]
                );
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_templates_and_populate_values() {
        let mut item = loaded_item();
        item.mark_lob_for_read("description").unwrap();

        let empty = item.empty_template();
        assert_eq!(empty.state(), RecordState::New);
        assert!(empty.fields().iter().all(|f| !f.has_content()));
        assert_eq!(
            empty.field("description").unwrap().action_hint(),
            ActionHint::None
        );

        let read = item.read_template();
        assert_eq!(
            read.field("description").unwrap().action_hint(),
            ActionHint::LobMarkedForRead
        );

        let mut copy = Record::new(item_table());
        copy.populate_values_from(&item);
        assert_eq!(copy.value("itemid").unwrap(), Some("1"));
        assert_eq!(copy.state(), RecordState::New);

        let deep = item.clone_deep();
        item.set_field_value("price", "1.00").unwrap();
        assert_eq!(deep.value("price").unwrap(), Some("5.00"));
    }

    #[test]
    fn test_state_names() {
        for state in [
            RecordState::New,
            RecordState::PendingInsert,
            RecordState::Loaded,
            RecordState::PendingUpdate,
            RecordState::PendingDelete,
        ] {
            assert_eq!(state.as_str().parse::<RecordState>().unwrap(), state);
        }
        assert!("gone".parse::<RecordState>().is_err());
    }
}
