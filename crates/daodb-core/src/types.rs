//! Declared column types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// The declared type of a column.
///
/// All non-binary values travel as text inside a field instance; the type decides how that
/// text is rendered into SQL and how result cells are mapped back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Character data, rendered single-quoted.
    Varchar,
    /// Integral number, rendered raw.
    Integer,
    /// Date or timestamp, rendered through the configured SQL conversion format.
    Date,
    /// Floating point or decimal number, rendered raw.
    Float,
    /// Raw bytes held inline.
    Binary,
    /// Binary large object.
    Blob,
    /// Character large object.
    Clob,
    /// Driver-specific payload handled by an injectable hook.
    Other,
    /// Integer generated by the database on insert (identity/auto-increment).
    IntIdentity,
    /// Integer drawn from a named sequence before insert.
    IntSequence,
}

/// The SQL type tag attached to an out-of-band LOB parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LobKind {
    /// `BLOB` parameter.
    Blob,
    /// `CLOB` parameter.
    Clob,
    /// `VARBINARY`-style parameter.
    Binary,
}

impl FieldType {
    /// Types whose payload is not carried in the textual value.
    pub const fn is_lob(self) -> bool {
        matches!(
            self,
            FieldType::Blob | FieldType::Clob | FieldType::Binary | FieldType::Other
        )
    }

    /// Types stored in the binary slot of a field instance.
    pub const fn is_binary(self) -> bool {
        matches!(self, FieldType::Binary | FieldType::Blob)
    }

    /// Types rendered as raw numeric text.
    pub const fn is_numeric(self) -> bool {
        matches!(
            self,
            FieldType::Integer | FieldType::Float | FieldType::IntIdentity | FieldType::IntSequence
        )
    }

    /// Types whose value is produced by the database or a sequence.
    pub const fn is_generated(self) -> bool {
        matches!(self, FieldType::IntIdentity | FieldType::IntSequence)
    }

    /// Parameter tag for types that are bound out-of-band on UPDATE/INSERT.
    pub const fn lob_kind(self) -> Option<LobKind> {
        match self {
            FieldType::Blob => Some(LobKind::Blob),
            FieldType::Clob => Some(LobKind::Clob),
            FieldType::Binary => Some(LobKind::Binary),
            _ => None,
        }
    }

    /// Canonical lower-case name.
    pub const fn as_str(self) -> &'static str {
        match self {
            FieldType::Varchar => "varchar",
            FieldType::Integer => "integer",
            FieldType::Date => "date",
            FieldType::Float => "float",
            FieldType::Binary => "binary",
            FieldType::Blob => "blob",
            FieldType::Clob => "clob",
            FieldType::Other => "other",
            FieldType::IntIdentity => "int identity",
            FieldType::IntSequence => "int sequence",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        match normalized.as_str() {
            "varchar" | "char" | "string" | "text" => Ok(FieldType::Varchar),
            "integer" | "int" => Ok(FieldType::Integer),
            "date" | "datetime" | "timestamp" => Ok(FieldType::Date),
            "float" | "double" | "decimal" | "numeric" => Ok(FieldType::Float),
            "binary" | "varbinary" => Ok(FieldType::Binary),
            "blob" => Ok(FieldType::Blob),
            "clob" => Ok(FieldType::Clob),
            "other" => Ok(FieldType::Other),
            "int identity" | "identity" | "intidentity" => Ok(FieldType::IntIdentity),
            "int sequence" | "sequence" | "intsequence" => Ok(FieldType::IntSequence),
            _ => Err(Error::InvalidArgument(format!("unknown field type `{}`", s))),
        }
    }
}
