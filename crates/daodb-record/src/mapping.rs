//! Result cell to field mapping.
//!
//! Each declared type has one mapping rule. Binary columns keep their bytes; BLOB/CLOB
//! columns are only populated when the field was marked for reading; dates and floats are
//! re-rendered with their configured formats; `Other` columns go through an
//! [`OtherTypeHandler`]; everything else is passed through as text.

use std::fmt::Write as _;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use daodb_core::{FieldType, LobData, LobKind, Value};
use daodb_schema::FieldDescriptor;

use crate::field_instance::{ActionHint, FieldInstance};

/// What an [`OtherTypeHandler`] extracts from a cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OtherCell {
    /// Textual form stored as the field value.
    pub text: Option<String>,
    /// Structured payload stored as the field's other value.
    pub payload: Option<serde_json::Value>,
}

/// Hook for driver-specific `Other` columns.
pub trait OtherTypeHandler: Send + Sync {
    /// Map a non-NULL cell.
    fn read(&self, field: &FieldDescriptor, cell: &Value) -> OtherCell;

    /// The out-of-band parameter for a changed field.
    fn bind(&self, field: &FieldInstance) -> (LobKind, LobData) {
        let text = match (field.value(), field.other_value()) {
            (Some(text), _) => text.to_string(),
            (None, Some(payload)) => payload.to_string(),
            (None, None) => String::new(),
        };
        (LobKind::Clob, LobData::Text(text))
    }
}

/// Default `Other` handling: the cell's text, plus the structure of JSON cells.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextOtherHandler;

impl OtherTypeHandler for TextOtherHandler {
    fn read(&self, _field: &FieldDescriptor, cell: &Value) -> OtherCell {
        OtherCell {
            text: cell.to_text(),
            payload: match cell {
                Value::Json(json) => Some(json.clone()),
                _ => None,
            },
        }
    }
}

/// Settings that influence mapping.
pub(crate) struct MappingContext<'a> {
    pub date_format: Option<&'a str>,
    pub read_nulls_as_empty: bool,
    pub other_handler: &'a dyn OtherTypeHandler,
}

/// The mapped state of one field.
#[derive(Debug, Default)]
pub(crate) struct MappedCell {
    pub value: Option<String>,
    pub binary: Option<Vec<u8>>,
    pub other: Option<serde_json::Value>,
    pub is_null: bool,
}

/// Map one cell. `None` means the result has no column for the field.
pub(crate) fn map_cell(
    field: &FieldInstance,
    cell: Option<&Value>,
    ctx: &MappingContext<'_>,
) -> MappedCell {
    let Some(cell) = cell else {
        return MappedCell::default();
    };
    let field_type = field.field_type();

    if cell.is_null() {
        let keeps_bytes = matches!(
            field_type,
            FieldType::Binary | FieldType::Blob | FieldType::Clob
        );
        return MappedCell {
            value: (ctx.read_nulls_as_empty && !keeps_bytes).then(String::new),
            is_null: true,
            ..MappedCell::default()
        };
    }

    let lob_requested = field.action_hint() == ActionHint::LobMarkedForRead;
    match field_type {
        FieldType::Binary => MappedCell {
            binary: cell.to_bytes(),
            ..MappedCell::default()
        },
        FieldType::Blob if lob_requested => MappedCell {
            binary: cell.to_bytes(),
            ..MappedCell::default()
        },
        FieldType::Clob if lob_requested => MappedCell {
            value: cell.to_text(),
            ..MappedCell::default()
        },
        FieldType::Blob | FieldType::Clob => MappedCell::default(),
        FieldType::Date => {
            let format = field.descriptor().read_format().or(ctx.date_format);
            MappedCell {
                value: render_date(cell, format),
                ..MappedCell::default()
            }
        }
        FieldType::Float => MappedCell {
            value: render_float(cell, field.descriptor().read_format()),
            ..MappedCell::default()
        },
        FieldType::Other => {
            let mapped = ctx.other_handler.read(field.descriptor(), cell);
            MappedCell {
                value: mapped.text,
                other: mapped.payload,
                ..MappedCell::default()
            }
        }
        FieldType::Varchar
        | FieldType::Integer
        | FieldType::IntIdentity
        | FieldType::IntSequence => MappedCell {
            value: cell.to_text(),
            ..MappedCell::default()
        },
    }
}

/// Render a date cell.
///
/// Without a format, a timestamp at exactly midnight is shown as a plain date: drivers
/// report DATE columns as midnight timestamps.
pub(crate) fn render_date(cell: &Value, format: Option<&str>) -> Option<String> {
    let timestamp = match cell {
        Value::Date(d) => d.and_time(NaiveTime::MIN),
        Value::Timestamp(ts) => *ts,
        Value::Text(s) => match parse_timestamp(s) {
            Some(ts) => ts,
            None => return Some(s.clone()),
        },
        other => return other.to_text(),
    };
    Some(render_timestamp(timestamp, format))
}

fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

fn render_timestamp(timestamp: NaiveDateTime, format: Option<&str>) -> String {
    if let Some(format) = format {
        let mut out = String::new();
        if write!(out, "{}", timestamp.format(format)).is_ok() {
            return out;
        }
        tracing::warn!(
            date_format = format,
            "Unusable date format, falling back to ISO rendering"
        );
    }
    if timestamp.time() == NaiveTime::MIN {
        timestamp.format("%Y-%m-%d").to_string()
    } else {
        timestamp.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

/// Render a numeric cell with a `0.00`-style pattern.
pub(crate) fn render_float(cell: &Value, pattern: Option<&str>) -> Option<String> {
    match (pattern, cell.as_f64()) {
        (Some(pattern), Some(number)) => Some(format!("{:.*}", decimal_places(pattern), number)),
        _ => cell.to_text(),
    }
}

fn decimal_places(pattern: &str) -> usize {
    pattern.split_once('.').map_or(0, |(_, fraction)| {
        fraction
            .chars()
            .take_while(|c| matches!(c, '0' | '#'))
            .count()
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn instance(descriptor: FieldDescriptor) -> FieldInstance {
        FieldInstance::new(Arc::new(descriptor))
    }

    fn ctx() -> MappingContext<'static> {
        MappingContext {
            date_format: None,
            read_nulls_as_empty: false,
            other_handler: &TextOtherHandler,
        }
    }

    #[test]
    fn test_midnight_timestamp_renders_as_date() {
        let ts = NaiveDate::from_ymd_opt(2003, 2, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(
            render_date(&Value::Timestamp(ts), None).as_deref(),
            Some("2003-02-01")
        );
        let ts = ts.date().and_hms_opt(13, 5, 0).unwrap();
        assert_eq!(
            render_date(&Value::Timestamp(ts), None).as_deref(),
            Some("2003-02-01 13:05:00")
        );
    }

    #[test]
    fn test_date_with_format() {
        let d = NaiveDate::from_ymd_opt(2003, 2, 1).unwrap();
        assert_eq!(
            render_date(&Value::Date(d), Some("%d/%m/%Y")).as_deref(),
            Some("01/02/2003")
        );
        assert_eq!(
            render_date(&Value::Text("2003-02-01 00:00:00".to_string()), Some("%d/%m/%Y"))
                .as_deref(),
            Some("01/02/2003")
        );
        assert_eq!(
            render_date(&Value::Text("yesterday".to_string()), None).as_deref(),
            Some("yesterday")
        );
    }

    #[test]
    fn test_unusable_date_format_falls_back() {
        let d = NaiveDate::from_ymd_opt(2003, 2, 1).unwrap();
        // %z needs an offset that a naive timestamp does not have
        assert_eq!(
            render_date(&Value::Date(d), Some("%z")).as_deref(),
            Some("2003-02-01")
        );
    }

    #[test]
    fn test_float_pattern() {
        assert_eq!(
            render_float(&Value::Double(5.0), Some("0.00")).as_deref(),
            Some("5.00")
        );
        assert_eq!(
            render_float(&Value::Decimal("3.14159".to_string()), Some("#,##0.0")).as_deref(),
            Some("3.1")
        );
        assert_eq!(render_float(&Value::Int(7), Some("0")).as_deref(), Some("7"));
        assert_eq!(render_float(&Value::Double(2.5), None).as_deref(), Some("2.5"));
    }

    #[test]
    fn test_lob_columns_are_lazy() {
        let mut blob =
            instance(FieldDescriptor::new("photo", daodb_core::FieldType::Blob).unwrap());
        let cell = Value::Bytes(vec![1, 2]);
        assert_eq!(map_cell(&blob, Some(&cell), &ctx()).binary, None);

        blob.mark_lob_for_read();
        assert_eq!(map_cell(&blob, Some(&cell), &ctx()).binary, Some(vec![1, 2]));
    }

    #[test]
    fn test_null_cells() {
        let text = instance(FieldDescriptor::new("name", FieldType::Varchar).unwrap());
        let mapped = map_cell(&text, Some(&Value::Null), &ctx());
        assert!(mapped.is_null);
        assert_eq!(mapped.value, None);

        let empty_ctx = MappingContext {
            read_nulls_as_empty: true,
            ..ctx()
        };
        let mapped = map_cell(&text, Some(&Value::Null), &empty_ctx);
        assert_eq!(mapped.value.as_deref(), Some(""));

        let bin = instance(FieldDescriptor::new("raw", FieldType::Binary).unwrap());
        let mapped = map_cell(&bin, Some(&Value::Null), &empty_ctx);
        assert_eq!(mapped.value, None);
        assert!(mapped.is_null);
    }

    #[test]
    fn test_other_handler_keeps_json() {
        let other = instance(FieldDescriptor::new("meta", FieldType::Other).unwrap());
        let cell = Value::Json(serde_json::json!({"mime": "image/png"}));
        let mapped = map_cell(&other, Some(&cell), &ctx());
        assert_eq!(mapped.other, Some(serde_json::json!({"mime": "image/png"})));
        assert_eq!(mapped.value.as_deref(), Some(r#"{"mime":"image/png"}"#));
    }
}
