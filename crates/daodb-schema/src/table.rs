//! Table descriptors.

use std::sync::Arc;

use daodb_core::{DEFAULT_SEQUENCE_SUFFIX, Error, Result, bare_name, is_valid_identifier};

use crate::ddl;
use crate::field::FieldDescriptor;

/// Alias used when a table is declared without one.
pub const DEFAULT_ALIAS: &str = "a";

/// A named, aliased, ordered collection of field descriptors.
///
/// A table acting as an "extra" table inside a record also carries the condition that joins
/// it to the record's main table. The condition is either a predicate (`o.orderid =
/// a.orderid`), which ends up in the WHERE clause, or a complete join clause (`left join
/// ORDERS o on ...`), which is appended to FROM verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDescriptor {
    name: String,
    alias: String,
    fields: Vec<Arc<FieldDescriptor>>,
    join_cond: Option<String>,
}

impl TableDescriptor {
    /// Declare a table from `"Name"` or `"Name alias"` and its core fields.
    pub fn new(name_with_alias: &str, fields: Vec<FieldDescriptor>) -> Result<Self> {
        Self::with_extra_fields(name_with_alias, fields, &[])
    }

    /// Declare a table whose core fields are followed by copies of shared extra fields
    /// (audit or history columns).
    pub fn with_extra_fields(
        name_with_alias: &str,
        fields: Vec<FieldDescriptor>,
        extra: &[FieldDescriptor],
    ) -> Result<Self> {
        if fields.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "table `{}` declared without fields",
                name_with_alias.trim()
            )));
        }
        let (name, alias) = split_name_alias(name_with_alias)?;
        let all = fields.into_iter().chain(extra.iter().cloned()).collect();
        Self::assemble(name, alias, all, None)
    }

    /// Declare an extra table joined to a record's main table.
    ///
    /// A join table may list no fields at all when it is only used to filter.
    pub fn join(
        name_with_alias: &str,
        join_condition: &str,
        fields: Vec<FieldDescriptor>,
    ) -> Result<Self> {
        let join_condition = join_condition.trim();
        if join_condition.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "join table `{}` needs a join condition",
                name_with_alias.trim()
            )));
        }
        let (name, alias) = split_name_alias(name_with_alias)?;
        Self::assemble(name, alias, fields, Some(join_condition.to_string()))
    }

    fn assemble(
        name: String,
        alias: String,
        fields: Vec<FieldDescriptor>,
        join_cond: Option<String>,
    ) -> Result<Self> {
        for (i, field) in fields.iter().enumerate() {
            if fields[..i].iter().any(|f| f.name() == field.name()) {
                return Err(Error::InvalidArgument(format!(
                    "duplicate field `{}` in table `{}`",
                    field.name(),
                    name
                )));
            }
        }
        Ok(Self {
            name,
            alias,
            fields: fields.into_iter().map(Arc::new).collect(),
            join_cond,
        })
    }

    /// Same table under another alias.
    pub fn with_alias(&self, alias: &str) -> Result<Self> {
        let alias = alias.trim();
        if alias.is_empty() || alias.contains('.') || !is_valid_identifier(alias) {
            return Err(Error::InvalidArgument(format!("invalid alias `{}`", alias)));
        }
        Ok(Self {
            alias: alias.to_string(),
            ..self.clone()
        })
    }

    /// Canonical upper-case name, possibly schema-qualified.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name without schema qualifier.
    pub fn bare_name(&self) -> &str {
        bare_name(&self.name)
    }

    /// Schema qualifier, if any.
    pub fn schema(&self) -> Option<&str> {
        self.name.rsplit_once('.').map(|(schema, _)| schema)
    }

    /// Alias used in SELECT statements.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Field descriptors in declaration order.
    pub fn fields(&self) -> &[Arc<FieldDescriptor>] {
        &self.fields
    }

    /// Number of fields.
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Field by name (case-insensitive).
    pub fn field(&self, name: &str) -> Option<&Arc<FieldDescriptor>> {
        self.fields.iter().find(|f| f.is_named(name))
    }

    /// Join condition of an extra table.
    pub fn join_condition(&self) -> Option<&str> {
        self.join_cond.as_deref()
    }

    /// Whether this descriptor was declared as a join table.
    pub fn is_join(&self) -> bool {
        self.join_cond.is_some()
    }

    /// `"NAME alias"`, as used in FROM clauses.
    pub fn from_item(&self) -> String {
        format!("{} {}", self.name, self.alias)
    }

    /// The default sequence name rule: `[schema.]field<suffix>`.
    pub fn sequence_name(&self, field: &FieldDescriptor, suffix: &str) -> String {
        match self.schema() {
            Some(schema) => format!("{}.{}{}", schema, field.name(), suffix),
            None => format!("{}{}", field.name(), suffix),
        }
    }

    /// DDL for this table: `create table` followed by one `create sequence` per
    /// sequence-typed field.
    pub fn create_table_sql(&self, use_datetime_for_date: bool) -> Vec<String> {
        ddl::create_table_statements(self, use_datetime_for_date, |f| {
            self.sequence_name(f, DEFAULT_SEQUENCE_SUFFIX)
        })
    }
}

/// Split `"Name alias"` on whitespace; the alias defaults to [`DEFAULT_ALIAS`].
fn split_name_alias(name_with_alias: &str) -> Result<(String, String)> {
    let mut parts = name_with_alias.split_whitespace();
    let Some(name) = parts.next() else {
        return Err(Error::InvalidArgument(
            "table name must not be empty".to_string(),
        ));
    };
    let alias = parts.next().unwrap_or(DEFAULT_ALIAS);
    if parts.next().is_some() {
        return Err(Error::InvalidArgument(format!(
            "expected `name [alias]`, got `{}`",
            name_with_alias.trim()
        )));
    }
    if !is_valid_identifier(name) {
        return Err(Error::InvalidArgument(format!("invalid table name `{}`", name)));
    }
    if alias.contains('.') || !is_valid_identifier(alias) {
        return Err(Error::InvalidArgument(format!("invalid alias `{}`", alias)));
    }
    Ok((name.to_uppercase(), alias.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use daodb_core::FieldType;

    fn item_fields() -> Vec<FieldDescriptor> {
        vec![
            FieldDescriptor::new("itemID", FieldType::IntIdentity).unwrap(),
            FieldDescriptor::new("Description", FieldType::Varchar).unwrap(),
            FieldDescriptor::new("Price", FieldType::Float).unwrap(),
        ]
    }

    #[test]
    fn test_default_alias_and_upper_case() {
        let t = TableDescriptor::new("Item", item_fields()).unwrap();
        assert_eq!(t.name(), "ITEM");
        assert_eq!(t.alias(), "a");
        assert_eq!(t.field_count(), 3);
        assert_eq!(t.fields()[1].name(), "description");
        assert!(!t.is_join());
    }

    #[test]
    fn test_explicit_alias() {
        let t = TableDescriptor::new("Item it", item_fields()).unwrap();
        assert_eq!(t.alias(), "it");
        assert_eq!(t.from_item(), "ITEM it");
    }

    #[test]
    fn test_invalid_construction() {
        assert!(matches!(
            TableDescriptor::new("", item_fields()),
            Err(Error::InvalidArgument(_))
        ));
        assert!(TableDescriptor::new("Item", vec![]).is_err());
        assert!(TableDescriptor::new("Item a b", item_fields()).is_err());
        let mut dup = item_fields();
        dup.push(FieldDescriptor::new("PRICE", FieldType::Integer).unwrap());
        assert!(TableDescriptor::new("Item", dup).is_err());
    }

    #[test]
    fn test_extra_fields_are_appended() {
        let audit = vec![
            FieldDescriptor::new("modified_by", FieldType::Varchar).unwrap(),
            FieldDescriptor::new("modified_at", FieldType::Date)
                .unwrap()
                .preset(true),
        ];
        let t = TableDescriptor::with_extra_fields("Item", item_fields(), &audit).unwrap();
        assert_eq!(t.field_count(), 5);
        assert_eq!(t.fields()[4].name(), "modified_at");
        assert!(t.field("MODIFIED_AT").unwrap().is_preset());
    }

    #[test]
    fn test_join_table() {
        let t = TableDescriptor::join(
            "Orders o",
            "o.orderid = a.orderid",
            vec![FieldDescriptor::new("OrderData", FieldType::Varchar).unwrap()],
        )
        .unwrap();
        assert_eq!(t.join_condition(), Some("o.orderid = a.orderid"));
        assert!(TableDescriptor::join("Orders o", "  ", vec![]).is_err());
        assert!(TableDescriptor::join("Orders o", "o.id = a.id", vec![]).is_ok());
    }

    #[test]
    fn test_schema_and_sequence_name() {
        let f = FieldDescriptor::new("id", FieldType::IntSequence).unwrap();
        let t = TableDescriptor::new("sales.Invoice", vec![f.clone()]).unwrap();
        assert_eq!(t.schema(), Some("SALES"));
        assert_eq!(t.bare_name(), "INVOICE");
        assert_eq!(t.sequence_name(&f, "_sq"), "SALES.id_sq");
        let plain = TableDescriptor::new("Invoice", vec![f.clone()]).unwrap();
        assert_eq!(plain.sequence_name(&f, "_sq"), "id_sq");
    }

    #[test]
    fn test_with_alias() {
        let t = TableDescriptor::new("Item", item_fields()).unwrap();
        assert_eq!(t.with_alias("it").unwrap().alias(), "it");
        assert!(t.with_alias("x.y").is_err());
    }
}
