//! Live field values.

use std::sync::Arc;

use daodb_core::FieldType;
use daodb_schema::{DateStyle, FieldDescriptor, LiteralPolicy};

/// Transient per-field override consulted by SQL generation and result mapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ActionHint {
    /// Default handling.
    #[default]
    None,
    /// Render `col is null` in a SELECT predicate even without a value.
    ForcedNull,
    /// The value is a SQL expression (`getdate()`) rendered unquoted.
    IsFunctionCall,
    /// Populate this LOB column when mapping result rows.
    LobMarkedForRead,
}

/// The mutable value holder paired with a [`FieldDescriptor`].
///
/// Every non-binary value is kept as text; the descriptor's type decides how that text is
/// rendered into SQL. `previous_value` holds the value seen at the last database sync and
/// is captured on the first mutation after it, so UPDATE predicates can still match the
/// stored row after the in-memory value has moved on.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldInstance {
    descriptor: Arc<FieldDescriptor>,
    table_index: usize,
    value: Option<String>,
    binary_value: Option<Vec<u8>>,
    other_value: Option<serde_json::Value>,
    previous_value: Option<String>,
    is_null: bool,
    is_dirty: bool,
    action_hint: ActionHint,
}

impl FieldInstance {
    /// An empty instance of a descriptor.
    pub fn new(descriptor: Arc<FieldDescriptor>) -> Self {
        Self::owned_by(descriptor, 0)
    }

    pub(crate) fn owned_by(descriptor: Arc<FieldDescriptor>, table_index: usize) -> Self {
        Self {
            descriptor,
            table_index,
            value: None,
            binary_value: None,
            other_value: None,
            previous_value: None,
            is_null: false,
            is_dirty: false,
            action_hint: ActionHint::None,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// The shared descriptor.
    pub fn descriptor(&self) -> &Arc<FieldDescriptor> {
        &self.descriptor
    }

    /// Lower-case field name.
    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    /// Declared type.
    pub fn field_type(&self) -> FieldType {
        self.descriptor.field_type()
    }

    /// 0 for the main table, `n` for the n-th extra table.
    pub(crate) fn table_index(&self) -> usize {
        self.table_index
    }

    /// Current textual value.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Current binary value.
    pub fn binary_value(&self) -> Option<&[u8]> {
        self.binary_value.as_deref()
    }

    /// Opaque payload of `Other` fields.
    pub fn other_value(&self) -> Option<&serde_json::Value> {
        self.other_value.as_ref()
    }

    /// Value at the last database sync, once the field has been changed since.
    pub fn previous_value(&self) -> Option<&str> {
        self.previous_value.as_deref()
    }

    /// Whether the database reported SQL NULL for this field.
    pub fn is_null(&self) -> bool {
        self.is_null
    }

    /// Whether the field holds unsaved changes.
    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    /// Active action hint.
    pub fn action_hint(&self) -> ActionHint {
        self.action_hint
    }

    /// Whether any payload slot holds something.
    pub fn has_content(&self) -> bool {
        self.value.is_some() || self.binary_value.is_some() || self.other_value.is_some()
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Replace the textual value.
    ///
    /// The value held before the first change since the last sync is kept as
    /// `previous_value`; later changes leave it alone.
    pub fn set_value(&mut self, value: Option<String>) {
        if !self.is_dirty {
            self.previous_value = self.value.clone();
        }
        self.value = value;
        self.is_dirty = true;
    }

    /// Replace the binary value. No previous value is tracked for bytes.
    pub fn set_binary_value(&mut self, value: Option<Vec<u8>>) {
        self.binary_value = value;
        self.is_dirty = true;
    }

    /// Replace the opaque payload of an `Other` field.
    pub fn set_other_value(&mut self, value: Option<serde_json::Value>) {
        self.other_value = value;
        self.is_dirty = true;
    }

    /// Store a SQL expression that is rendered unquoted.
    pub fn set_function_call(&mut self, expression: impl Into<String>) {
        self.set_value(Some(expression.into()));
        self.action_hint = ActionHint::IsFunctionCall;
    }

    /// Force `col is null` into SELECT predicates.
    pub fn mark_where_is_null(&mut self) {
        self.action_hint = ActionHint::ForcedNull;
    }

    /// Ask result mapping to populate this LOB column.
    pub fn mark_lob_for_read(&mut self) {
        self.action_hint = ActionHint::LobMarkedForRead;
    }

    /// Drop the action hint.
    pub fn clear_action_hint(&mut self) {
        self.action_hint = ActionHint::None;
    }

    /// Store a database-generated value without marking the field dirty.
    pub(crate) fn assign_synced(&mut self, value: String) {
        self.previous_value = Some(value.clone());
        self.value = Some(value);
        self.is_null = false;
        self.is_dirty = false;
    }

    /// The in-memory value now matches the stored row.
    pub(crate) fn mark_synced(&mut self) {
        if self.is_dirty {
            self.is_null = !self.has_content();
        }
        self.previous_value = self.value.clone();
        self.is_dirty = false;
    }

    /// Install the result of mapping one cell.
    pub(crate) fn load(
        &mut self,
        value: Option<String>,
        binary_value: Option<Vec<u8>>,
        other_value: Option<serde_json::Value>,
        is_null: bool,
    ) {
        self.value = value;
        self.binary_value = binary_value;
        self.other_value = other_value;
        self.is_null = is_null;
        self.previous_value = None;
        self.is_dirty = false;
        self.action_hint = ActionHint::None;
    }

    /// Install state read back from a serialized form.
    pub(crate) fn restore(
        &mut self,
        value: Option<String>,
        binary_value: Option<Vec<u8>>,
        other_value: Option<serde_json::Value>,
        previous_value: Option<String>,
        is_null: bool,
        is_dirty: bool,
    ) {
        self.value = value;
        self.binary_value = binary_value;
        self.other_value = other_value;
        self.previous_value = previous_value;
        self.is_null = is_null;
        self.is_dirty = is_dirty;
        self.action_hint = ActionHint::None;
    }

    /// Forget value, flags and hint.
    pub fn clear(&mut self) {
        self.value = None;
        self.binary_value = None;
        self.other_value = None;
        self.previous_value = None;
        self.is_null = false;
        self.is_dirty = false;
        self.action_hint = ActionHint::None;
    }

    // ========================================================================
    // Copies
    // ========================================================================

    /// Same descriptor, no value, flags or hint.
    pub fn empty_template(&self) -> Self {
        Self::owned_by(Arc::clone(&self.descriptor), self.table_index)
    }

    /// Same descriptor, no value or flags, action hint kept.
    pub fn read_template(&self) -> Self {
        Self {
            action_hint: self.action_hint,
            ..self.empty_template()
        }
    }

    /// Copy every piece of state from another instance.
    pub fn populate_from(&mut self, other: &FieldInstance) {
        self.value.clone_from(&other.value);
        self.binary_value.clone_from(&other.binary_value);
        self.other_value.clone_from(&other.other_value);
        self.previous_value.clone_from(&other.previous_value);
        self.is_null = other.is_null;
        self.is_dirty = other.is_dirty;
        self.action_hint = other.action_hint;
    }

    // ========================================================================
    // SQL rendering
    // ========================================================================

    /// Render the current value as a SQL literal.
    ///
    /// LOB-like fields never inline their payload: they render `null` when empty, the `?`
    /// placeholder when dirty (the payload is bound out-of-band) and nothing otherwise.
    /// Varchar values are quoted but not escaped.
    pub fn render_sql_literal(&self, default_sql_format: Option<&str>) -> String {
        if self.action_hint == ActionHint::IsFunctionCall {
            return self.value.clone().unwrap_or_else(|| "null".to_string());
        }
        if self.field_type().is_lob() {
            return if !self.has_content() {
                "null".to_string()
            } else if self.is_dirty {
                "?".to_string()
            } else {
                String::new()
            };
        }
        match &self.value {
            Some(value) => self.render_text(value, default_sql_format),
            None => "null".to_string(),
        }
    }

    /// Render an arbitrary text in this field's literal style.
    pub(crate) fn render_text(&self, text: &str, default_sql_format: Option<&str>) -> String {
        match self.descriptor.literal_policy() {
            LiteralPolicy::Quoted | LiteralPolicy::OutOfBand => format!("'{}'", text),
            LiteralPolicy::Raw => text.to_string(),
            LiteralPolicy::DateConversion => match self.sql_format(default_sql_format) {
                Some(fmt) => match DateStyle::of(fmt) {
                    DateStyle::Convert => format!("convert(datetime, '{}', {})", text, fmt),
                    DateStyle::ToDate => format!("to_date('{}','{}')", text, fmt),
                },
                None => format!("'{}'", text),
            },
        }
    }

    /// An equality predicate on `column` against `text`.
    ///
    /// Dates compare the quoted text against the column converted to text, so a value that
    /// does not parse under the conversion format cannot match by accident.
    pub(crate) fn render_predicate(
        &self,
        column: &str,
        text: &str,
        default_sql_format: Option<&str>,
    ) -> String {
        if self.field_type() == FieldType::Date {
            if let Some(fmt) = self.sql_format(default_sql_format) {
                return match DateStyle::of(fmt) {
                    DateStyle::Convert => {
                        format!("'{}'=convert(varchar, {}, {})", text, column, fmt)
                    }
                    DateStyle::ToDate => format!("'{}'=to_char({},'{}')", text, column, fmt),
                };
            }
        }
        format!("{}={}", column, self.render_text(text, default_sql_format))
    }

    fn sql_format<'a>(&'a self, default_sql_format: Option<&'a str>) -> Option<&'a str> {
        self.descriptor.sql_format().or(default_sql_format)
    }
}
